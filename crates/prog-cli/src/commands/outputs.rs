use std::path::Path;

use comfy_table::{ContentArrangement, Table};
use prog_core::OutputId;

pub fn run(path: &Path) -> Result<(), String> {
    let campaign = super::load(path)?;

    let mut outputs: Vec<_> = campaign.store().outputs().collect();
    if outputs.is_empty() {
        println!("  No outputs.");
        return Ok(());
    }

    let end_of = |id: OutputId| {
        campaign
            .index()
            .outputs()
            .find(|(_, o)| *o == id)
            .map(|(i, _)| i)
    };
    outputs.sort_by_key(|o| (end_of(o.id).is_none(), end_of(o.id), o.name.clone()));

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "Target", "Ends at", "Included", "Ignored"]);

    for output in &outputs {
        let end = end_of(output.id).map_or("(no range)".to_string(), |i| i.to_string());
        table.add_row(vec![
            output.name.clone(),
            output.target.clone(),
            end,
            output.included.len().to_string(),
            output.ignored.len().to_string(),
        ]);
    }

    println!("{table}");
    println!();
    println!("  {} outputs", outputs.len());

    Ok(())
}
