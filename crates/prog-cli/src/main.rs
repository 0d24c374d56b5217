//! CLI frontend for the Progression campaign engine.

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "prog",
    about = "Progression: character progression tracking over a campaign timeline",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a demo campaign file to get started with
    Init {
        /// Campaign file to create
        file: PathBuf,

        /// Campaign name
        #[arg(short, long, default_value = "Demo Campaign")]
        name: String,
    },

    /// List the history of entries in narrative order
    History {
        /// Campaign file
        file: PathBuf,
    },

    /// Show a character's variables and visible entries
    Show {
        /// Campaign file
        file: PathBuf,

        /// Character name (case-insensitive)
        character: String,

        /// History index to inspect (default: the head)
        #[arg(short, long)]
        index: Option<usize>,
    },

    /// Substitute a character's variables into a piece of text
    Translate {
        /// Campaign file
        file: PathBuf,

        /// Character name (case-insensitive)
        character: String,

        /// Text containing !${key}$! placeholders
        text: String,

        /// History index to evaluate at (default: the head)
        #[arg(short, long)]
        index: Option<usize>,
    },

    /// List outputs and the history ranges they cover
    Outputs {
        /// Campaign file
        file: PathBuf,
    },

    /// Report structural problems and failing operations
    Check {
        /// Campaign file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { file, name } => commands::init::run(&file, &name),
        Commands::History { file } => commands::history::run(&file),
        Commands::Show {
            file,
            character,
            index,
        } => commands::show::run(&file, &character, index),
        Commands::Translate {
            file,
            character,
            text,
            index,
        } => commands::translate::run(&file, &character, &text, index),
        Commands::Outputs { file } => commands::outputs::run(&file),
        Commands::Check { file } => commands::check::run(&file),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
