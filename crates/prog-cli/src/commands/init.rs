use std::path::Path;

use prog_core::{
    Campaign, CampaignMeta, Category, Character, Entry, Field, OperationKind, Output,
};

pub fn run(path: &Path, name: &str) -> Result<(), String> {
    if path.exists() {
        return Err(format!("'{}' already exists", path.display()));
    }

    let campaign = demo(name).map_err(|e| format!("cannot build demo campaign: {e}"))?;
    super::save(path, &campaign)?;

    println!("Created campaign '{}' in {}", name, path.display());
    println!();
    println!("Get started:");
    println!("  prog history {}          # Entries in narrative order", path.display());
    println!("  prog show {} Aria        # Aria's variables at the head", path.display());
    println!("  prog check {}            # Report failing operations", path.display());

    Ok(())
}

/// A small campaign that exercises constants, templates, revisions, and an
/// output range.
fn demo(name: &str) -> prog_core::ProgResult<Campaign> {
    let mut meta = CampaignMeta::new(name);
    meta.system = Some("Generic d20".into());
    let mut campaign = Campaign::new(meta);

    let mut attributes = Category::new("Attributes")
        .with_field(Field::new("Strength"))
        .with_field(Field::new("Dexterity"))
        .with_template("str", OperationKind::AssignInteger, "!${Strength}$!")
        .with_template("dex", OperationKind::AssignInteger, "!${Dexterity}$!");
    attributes.single_entry_only = true;
    attributes.creation_template = "STR !${Strength}$!, DEX !${Dexterity}$!".into();
    attributes.update_template = "Attributes now STR !${Strength}$!, DEX !${Dexterity}$!".into();

    let mut hp = Category::new("HP")
        .with_field(Field::new("Reason"))
        .with_constant("hp_max", OperationKind::AssignInteger, "10 + !${str}$! // 2");
    hp.creation_template = "!${Reason}$!: HP set to !${hp}$!".into();
    hp.update_template = "!${Reason}$!: HP now !${hp}$!/!${hp_max}$!".into();

    let mut skills = Category::new("Skills")
        .with_field(Field::new("Skill"))
        .with_field(Field::new("Rank"))
        .with_field(Field::large("Notes"))
        .with_template(
            "skill_!${Skill}$!",
            OperationKind::AssignInteger,
            "!${Rank}$! + (!${dex}$! - 10) // 2",
        );
    skills.creation_template = "Learned !${Skill}$! at rank !${Rank}$!".into();
    skills.update_template = "!${Skill}$! improved to rank !${Rank}$!".into();

    let attributes = campaign.add_category(attributes);
    let hp = campaign.add_category(hp);
    let skills = campaign.add_category(skills);

    let aria = campaign.add_character(
        Character::new("Aria")
            .with_category(attributes)
            .with_category(hp)
            .with_category(skills),
    )?;
    let bram = campaign.add_character(
        Character::new("Bram")
            .with_category(attributes)
            .with_category(hp),
    )?;

    let mut batch = campaign.batch();
    batch.add_entry_at_head(Entry::new(aria, attributes).with_values(["12", "15"]))?;
    batch.add_entry_at_head(Entry::new(bram, attributes).with_values(["16", "9"]))?;
    let aria_hp = batch.add_entry_at_head(
        Entry::new(aria, hp)
            .with_values(["Starting health"])
            .with_operation("hp", OperationKind::AssignInteger, "!${hp_max}$!"),
    )?;
    batch.add_entry_at_head(
        Entry::new(bram, hp)
            .with_values(["Starting health"])
            .with_operation("hp", OperationKind::AssignInteger, "!${hp_max}$!"),
    )?;
    let archery = batch.add_entry_at_head(
        Entry::new(aria, skills).with_values(["Archery", "1", "Taught by her father."]),
    )?;
    let ambush = batch.update_entry(
        aria_hp,
        Entry::new(aria, hp)
            .with_values(["Goblin ambush"])
            .with_operation("hp", OperationKind::SubtractInteger, "3"),
    )?;
    batch.update_entry(
        archery,
        Entry::new(aria, skills).with_values(["Archery", "2", "Practised on the road."]),
    )?;
    batch.add_output(Output::new("Session 1", "Aria's sheet"), ambush)?;
    drop(batch);

    Ok(campaign)
}
