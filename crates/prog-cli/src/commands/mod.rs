pub mod check;
pub mod history;
pub mod init;
pub mod outputs;
pub mod show;
pub mod translate;

use std::fs;
use std::path::Path;

use prog_core::{Campaign, CampaignData, Character};

/// Read a campaign file and rebuild its caches.
fn load(path: &Path) -> Result<Campaign, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let data: CampaignData = serde_json::from_str(&text)
        .map_err(|e| format!("{} is not a campaign file: {e}", path.display()))?;
    Campaign::from_data(data).map_err(|e| format!("invalid campaign: {e}"))
}

/// Write a campaign file as pretty-printed JSON.
fn save(path: &Path, campaign: &Campaign) -> Result<(), String> {
    let json = serde_json::to_string_pretty(&campaign.to_data())
        .map_err(|e| format!("cannot serialize campaign: {e}"))?;
    fs::write(path, json).map_err(|e| format!("cannot write {}: {e}", path.display()))
}

fn find_character<'a>(campaign: &'a Campaign, name: &str) -> Result<&'a Character, String> {
    campaign
        .find_character(name)
        .ok_or_else(|| format!("character not found: \"{name}\""))
}

/// Resolve an explicit index or fall back to the head.
fn resolve_index(campaign: &Campaign, index: Option<usize>) -> Result<Option<usize>, String> {
    match index {
        Some(i) if i >= campaign.history().len() => Err(format!(
            "history index {i} out of range (length {})",
            campaign.history().len()
        )),
        Some(i) => Ok(Some(i)),
        None => Ok(campaign.current_index()),
    }
}
