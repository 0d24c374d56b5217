use std::path::Path;

use colored::Colorize;
use comfy_table::{ContentArrangement, Table};

pub fn run(path: &Path) -> Result<(), String> {
    let campaign = super::load(path)?;

    if campaign.history().is_empty() {
        println!("  No entries yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["#", "Character", "Category", "Entry", "Output"]);

    let head = campaign.current_index();
    for (index, id) in campaign.history().iter().enumerate() {
        let Some(entry) = campaign.entry(*id) else {
            continue;
        };
        let character = campaign
            .character(entry.character)
            .map_or("?", |c| c.name.as_str());
        let category = campaign
            .category(entry.category)
            .map_or("?", |k| k.name.as_str());
        let mut text = campaign.describe_entry(*id).unwrap_or_default();
        if entry.disabled {
            text = format!("{text} (disabled)");
        }
        let output = campaign
            .index()
            .output_at(index)
            .and_then(|o| campaign.output(o))
            .map_or(String::new(), |o| o.name.clone());
        let marker = if Some(index) == head {
            format!("{index} *")
        } else {
            index.to_string()
        };

        table.add_row(vec![marker, character.into(), category.into(), text, output]);
    }

    println!("{table}");
    println!();
    match head {
        Some(i) => println!("  {} entries, head at {}", campaign.history().len(), i.to_string().bold()),
        None => println!("  {} entries, head before the first entry", campaign.history().len()),
    }

    Ok(())
}
