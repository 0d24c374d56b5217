use logos::Logos;
use std::fmt;

/// Token type for operation expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Integer literal (supports underscores).
    Integer(i64),
    /// Floating-point literal.
    Float(f64),
    /// Quoted string literal, escapes already processed.
    Str(String),
    /// A `!${name}$!` reference; holds `name`.
    Reference(String),
    /// Bare identifier (function names).
    Ident(String),
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `//`
    SlashSlash,
    /// `%`
    Percent,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Integer(n) => write!(f, "{n}"),
            Token::Float(n) => write!(f, "{n}"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::Reference(name) => write!(f, "!${{{name}}}$!"),
            Token::Ident(name) => write!(f, "{name}"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::SlashSlash => write!(f, "//"),
            Token::Percent => write!(f, "%"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
        }
    }
}

/// Internal logos token, converted to an owned [`Token`] after lexing.
#[derive(Logos, Debug)]
#[logos(skip r"[ \t\r\n]+")]
enum RawToken {
    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("//")]
    SlashSlash,

    #[token("%")]
    Percent,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(",")]
    Comma,

    #[regex(r"!\$\{[^}]*\}\$!")]
    Reference,

    #[regex(r#""([^"\\]|\\.)*""#)]
    DoubleQuoted,

    #[regex(r"'([^'\\]|\\.)*'")]
    SingleQuoted,

    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*([eE][+-]?[0-9]+)?")]
    Float,

    #[regex(r"[0-9][0-9_]*")]
    Integer,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}

/// A lexer error with source location.
#[derive(Debug, Clone)]
pub struct LexError {
    /// Byte range of the erroneous input in the source.
    pub span: std::ops::Range<usize>,
    /// Human-readable description of the lexer error.
    pub message: String,
}

/// Lex an expression into `(Token, Span)` pairs plus any lexing errors.
pub fn lex(source: &str) -> (Vec<(Token, std::ops::Range<usize>)>, Vec<LexError>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut lexer = RawToken::lexer(source);

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let slice = lexer.slice();
        let token = match result {
            Ok(RawToken::Plus) => Ok(Token::Plus),
            Ok(RawToken::Minus) => Ok(Token::Minus),
            Ok(RawToken::Star) => Ok(Token::Star),
            Ok(RawToken::Slash) => Ok(Token::Slash),
            Ok(RawToken::SlashSlash) => Ok(Token::SlashSlash),
            Ok(RawToken::Percent) => Ok(Token::Percent),
            Ok(RawToken::LParen) => Ok(Token::LParen),
            Ok(RawToken::RParen) => Ok(Token::RParen),
            Ok(RawToken::Comma) => Ok(Token::Comma),
            Ok(RawToken::Reference) => Ok(Token::Reference(slice[3..slice.len() - 3].to_string())),
            Ok(RawToken::DoubleQuoted | RawToken::SingleQuoted) => {
                Ok(Token::Str(unescape(&slice[1..slice.len() - 1])))
            }
            Ok(RawToken::Float) => number(slice, "float").map(Token::Float),
            Ok(RawToken::Integer) => number(slice, "integer").map(Token::Integer),
            Ok(RawToken::Ident) => Ok(Token::Ident(slice.to_string())),
            Err(()) => Err(format!("unexpected character {slice:?}")),
        };
        match token {
            Ok(token) => tokens.push((token, span)),
            Err(message) => errors.push(LexError { span, message }),
        }
    }

    (tokens, errors)
}

/// Parse a numeric literal, ignoring `_` digit separators.
fn number<T: std::str::FromStr>(slice: &str, kind: &str) -> Result<T, String> {
    slice
        .replace('_', "")
        .parse()
        .map_err(|_| format!("{kind} literal {slice} is out of range"))
}

/// Resolve backslash escapes inside a quoted literal. Unknown escapes and a
/// trailing backslash are kept verbatim.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            match c {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                '\\' | '"' | '\'' => out.push(c),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            out.push(c);
        }
    }
    if escaped {
        out.push('\\');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        let (tokens, errors) = lex(source);
        assert!(errors.is_empty(), "errors: {errors:?}");
        tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn lex_arithmetic() {
        assert_eq!(
            tokens("1 + 2.5 * x"),
            vec![
                Token::Integer(1),
                Token::Plus,
                Token::Float(2.5),
                Token::Star,
                Token::Ident("x".into()),
            ]
        );
    }

    #[test]
    fn lex_floor_division_is_one_token() {
        assert_eq!(
            tokens("7 // 2 / 1"),
            vec![
                Token::Integer(7),
                Token::SlashSlash,
                Token::Integer(2),
                Token::Slash,
                Token::Integer(1),
            ]
        );
    }

    #[test]
    fn lex_reference() {
        assert_eq!(
            tokens("!${max hp}$! - 3"),
            vec![
                Token::Reference("max hp".into()),
                Token::Minus,
                Token::Integer(3),
            ]
        );
    }

    #[test]
    fn lex_strings_both_quotes() {
        assert_eq!(
            tokens(r#""Sir " + 'Brom\'s'"#),
            vec![
                Token::Str("Sir ".into()),
                Token::Plus,
                Token::Str("Brom's".into()),
            ]
        );
    }

    #[test]
    fn lex_underscored_integers() {
        assert_eq!(tokens("45_000"), vec![Token::Integer(45_000)]);
    }

    #[test]
    fn lex_reports_bad_characters() {
        let (tokens, errors) = lex("1 $ 2");
        assert_eq!(tokens.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].span, 2..3);
    }

    #[test]
    fn lex_reports_integer_overflow() {
        let (_, errors) = lex("99999999999999999999");
        assert!(errors[0].message.contains("integer literal"));
    }

    #[test]
    fn unescape_keeps_unknown_and_trailing_backslashes() {
        assert_eq!(unescape(r"a\tb\n"), "a\tb\n");
        assert_eq!(unescape(r"\q"), "\\q");
        assert_eq!(unescape("end\\"), "end\\");
    }

    #[test]
    fn lex_preserves_spans() {
        let (tokens, _) = lex("ab + 12");
        assert_eq!(tokens[0].1, 0..2);
        assert_eq!(tokens[2].1, 5..7);
    }
}
