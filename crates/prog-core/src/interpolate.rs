//! `!${key}$!` placeholder substitution.

use crate::snapshot::Snapshot;

/// Opening delimiter of a placeholder.
pub const OPEN: &str = "!${";
/// Closing delimiter of a placeholder.
pub const CLOSE: &str = "}$!";
/// Substituted for placeholders whose key has no value.
pub const MISSING_VALUE: &str = "<value not found>";

/// Every placeholder in `text` as `(byte range, key)`, left to right.
/// An opening delimiter without a matching close ends the scan.
pub fn placeholders(text: &str) -> Vec<(std::ops::Range<usize>, &str)> {
    let mut found = Vec::new();
    let mut pos = 0;
    while let Some(offset) = text[pos..].find(OPEN) {
        let start = pos + offset;
        let name_start = start + OPEN.len();
        let Some(len) = text[name_start..].find(CLOSE) else {
            break;
        };
        let end = name_start + len + CLOSE.len();
        found.push((start..end, &text[name_start..name_start + len]));
        pos = end;
    }
    found
}

/// Keys referenced by `text`, deduplicated, in order of first appearance.
pub fn references(text: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for (_, key) in placeholders(text) {
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }
    keys
}

/// Substitute every placeholder using `lookup`, writing `missing` for keys it
/// cannot resolve.
pub fn translate_with<F>(text: &str, lookup: F, missing: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (range, key) in placeholders(text) {
        out.push_str(&text[last..range.start]);
        match lookup(key) {
            Some(value) => out.push_str(&value),
            None => out.push_str(missing),
        }
        last = range.end;
    }
    out.push_str(&text[last..]);
    out
}

/// Substitute every placeholder with its value in `snapshot`.
pub fn translate(text: &str, snapshot: &Snapshot) -> String {
    translate_with(
        text,
        |key| snapshot.get(key).map(ToString::to_string),
        MISSING_VALUE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn sheet() -> Snapshot {
        [
            ("hp", Value::Integer(7)),
            ("class", Value::from("Ranger")),
            ("speed", Value::Float(30.0)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn translate_substitutes_values() {
        assert_eq!(
            translate("!${class}$! with !${hp}$! HP", &sheet()),
            "Ranger with 7 HP"
        );
    }

    #[test]
    fn translate_marks_missing_values() {
        assert_eq!(
            translate("Mana: !${mana}$!", &sheet()),
            "Mana: <value not found>"
        );
    }

    #[test]
    fn translate_without_placeholders_is_identity() {
        assert_eq!(translate("plain text", &sheet()), "plain text");
        assert_eq!(translate("", &sheet()), "");
    }

    #[test]
    fn unterminated_placeholder_is_left_alone() {
        assert_eq!(translate("hp !${hp", &sheet()), "hp !${hp");
    }

    #[test]
    fn adjacent_placeholders() {
        assert_eq!(translate("!${hp}$!!${speed}$!", &sheet()), "730.0");
    }

    #[test]
    fn references_are_deduplicated_in_order() {
        assert_eq!(
            references("!${b}$! + !${a}$! * !${b}$!"),
            vec!["b".to_string(), "a".to_string()]
        );
        assert!(references("1 + 2").is_empty());
    }

    #[test]
    fn translate_with_custom_missing_text() {
        let out = translate_with("!${x}$!", |_| None, "?");
        assert_eq!(out, "?");
    }
}
