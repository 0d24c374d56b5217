use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::lexer::Token;

type Span = SimpleSpan;

/// Parse error with source span.
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Byte range of the offending input.
    pub span: std::ops::Range<usize>,
    /// Human-readable description.
    pub message: String,
}

/// Build the expression parser.
///
/// Precedence, loosest first: `+ -`, then `* / // %`, then unary `+ -`.
/// All binary operators are left-associative.
fn expression_parser<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = Span>,
{
    recursive(|expr| {
        let literal = select! {
            Token::Integer(n) => Expr::Integer(n),
            Token::Float(n) => Expr::Float(n),
            Token::Str(s) => Expr::String(s),
            Token::Reference(name) => Expr::Reference(name),
        }
        .labelled("value");

        let ident = select! { Token::Ident(name) => name }.labelled("function name");

        let call = ident
            .then(
                expr.clone()
                    .separated_by(just(Token::Comma))
                    .allow_trailing()
                    .collect::<Vec<Expr>>()
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .map(|(name, args)| Expr::Call { name, args });

        let atom = choice((
            literal,
            call,
            expr.delimited_by(just(Token::LParen), just(Token::RParen)),
        ));

        let unary = choice((
            just(Token::Minus).to(UnaryOp::Neg),
            just(Token::Plus).to(UnaryOp::Pos),
        ))
        .repeated()
        .foldr(atom, |op, operand| Expr::Unary {
            op,
            operand: Box::new(operand),
        });

        let product = unary.clone().foldl(
            choice((
                just(Token::Star).to(BinaryOp::Mul),
                just(Token::SlashSlash).to(BinaryOp::FloorDiv),
                just(Token::Slash).to(BinaryOp::Div),
                just(Token::Percent).to(BinaryOp::Rem),
            ))
            .then(unary)
            .repeated(),
            |lhs, (op, rhs)| Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        );

        product.clone().foldl(
            choice((
                just(Token::Plus).to(BinaryOp::Add),
                just(Token::Minus).to(BinaryOp::Sub),
            ))
            .then(product)
            .repeated(),
            |lhs, (op, rhs)| Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        )
    })
}

/// Parse a token stream into an expression tree.
pub fn parse(tokens: &[(Token, std::ops::Range<usize>)]) -> Result<Expr, Vec<ParseError>> {
    let token_iter = tokens
        .iter()
        .map(|(tok, span)| (tok.clone(), Span::from(span.clone())));

    let len = tokens.last().map_or(0, |(_, s)| s.end);
    let eoi: Span = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let (output, errors) = expression_parser()
        .then_ignore(end())
        .parse(stream)
        .into_output_errors();

    if let Some(expr) = output
        && errors.is_empty()
    {
        return Ok(expr);
    }

    Err(errors
        .into_iter()
        .map(|e| ParseError {
            span: e.span().into_range(),
            message: e.to_string(),
        })
        .collect())
}
