use std::path::Path;

use ariadne::{Color, Label, Report, ReportKind, Source};
use prog_core::{Diagnostic, Severity};

pub fn run(path: &Path) -> Result<(), String> {
    let campaign = super::load(path)?;

    let diagnostics: Vec<&Diagnostic> = campaign.diagnostics().collect();
    for diagnostic in &diagnostics {
        match diagnostic.expression() {
            Some((expression, span)) => eprint!("{}", render(diagnostic, expression, span)),
            None => eprintln!("{diagnostic}"),
        }
    }

    let errors = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    let warnings = diagnostics.len() - errors;

    if errors > 0 {
        return Err(format!("{errors} error(s), {warnings} warning(s)"));
    }

    println!("  All checks passed for '{}'.", campaign.meta.name);
    println!(
        "  {} characters, {} entries, {} warning(s)",
        campaign.store().character_count(),
        campaign.history().len(),
        warnings
    );

    Ok(())
}

/// Render an operation diagnostic against its expression text.
fn render(diagnostic: &Diagnostic, expression: &str, span: Option<std::ops::Range<usize>>) -> String {
    let (kind, color) = match diagnostic.severity {
        Severity::Error => (ReportKind::Error, Color::Red),
        Severity::Warning => (ReportKind::Warning, Color::Yellow),
    };
    let name = "expression";
    let span = span
        .filter(|s| s.end <= expression.len())
        .unwrap_or(0..expression.len());

    let mut output = Vec::new();
    Report::build(kind, (name, span.clone()))
        .with_message(&diagnostic.message)
        .with_label(
            Label::new((name, span))
                .with_message(&diagnostic.message)
                .with_color(color),
        )
        .finish()
        .write((name, Source::from(expression)), &mut output)
        .ok();

    String::from_utf8(output).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prog_core::DiagnosticKind;

    #[test]
    fn render_points_at_the_expression() {
        let diagnostic = Diagnostic::error(
            DiagnosticKind::Unresolved {
                index: 0,
                character: prog_core::CharacterId::new(),
                entry: None,
                key: "hp".into(),
                expression: "!${hp_max}$! - 2".into(),
                waiting_on: vec!["hp_max".into()],
            },
            "hp never resolved",
        );
        let rendered = render(&diagnostic, "!${hp_max}$! - 2", None);
        assert!(rendered.contains("hp never resolved"));
        assert!(rendered.contains("!${hp_max}$! - 2"));
    }
}
