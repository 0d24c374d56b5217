use std::path::Path;

pub fn run(path: &Path, name: &str, text: &str, index: Option<usize>) -> Result<(), String> {
    let campaign = super::load(path)?;
    let character = super::find_character(&campaign, name)?;
    let index = super::resolve_index(&campaign, index)?;

    let translated = campaign
        .translate(text, character.id, index)
        .map_err(|e| e.to_string())?;
    println!("{translated}");

    Ok(())
}
