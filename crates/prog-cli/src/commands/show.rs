use std::path::Path;

use colored::Colorize;
use comfy_table::{ContentArrangement, Table};

pub fn run(path: &Path, name: &str, index: Option<usize>) -> Result<(), String> {
    let campaign = super::load(path)?;
    let character = super::find_character(&campaign, name)?;

    let Some(index) = super::resolve_index(&campaign, index)? else {
        println!("  {}", character.name.bold());
        println!();
        println!("  No entries yet.");
        return Ok(());
    };

    println!(
        "  {} [{}]",
        character.name.bold(),
        format!("after entry {index}").dimmed()
    );
    println!();

    let snapshot = campaign
        .snapshot(character.id, index)
        .map_err(|e| e.to_string())?;
    if snapshot.is_empty() {
        println!("  No variables.");
    } else {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Key", "Value", "Type"]);
        for (key, value) in snapshot.iter() {
            table.add_row(vec![
                key.to_string(),
                value.to_string(),
                value.value_type().to_string(),
            ]);
        }
        println!("{table}");
    }

    for category in character.categories.iter().filter_map(|k| campaign.category(*k)) {
        if !category.show_on_overview {
            continue;
        }
        let visible = campaign.entries_visible_for(character.id, category.id, Some(index));
        println!();
        println!("  {}:", category.name.bold());
        if visible.is_empty() {
            println!("    -");
        }
        for id in visible {
            println!("    {}", campaign.describe_entry(id).unwrap_or_default());
        }
    }

    Ok(())
}
