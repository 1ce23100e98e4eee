//! Vault CLI - a passphrase-gated store for secrets.
//!
//! This is the command-line caller for the core library. It owns the
//! passphrase prompts and output formatting; everything else is the
//! core's job.

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use dialoguer::Password;

use vault_core::{Record, RecordWithHistory, SearchMode, Vault, VERSION};

/// Vault - a passphrase-gated store for secrets
#[derive(Parser)]
#[command(name = "vault")]
#[command(version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the vault database file
    #[arg(short = 'f', long, global = true, env = "VAULT_PATH")]
    vault: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new vault
    Init,

    /// Report vault status (warns when the default passphrase is still set)
    Status,

    /// Add a new record
    Add {
        /// Record title
        #[arg(value_name = "TITLE")]
        title: String,

        /// Grouping label
        #[arg(short, long, default_value = "")]
        label: String,

        /// Account username
        #[arg(short, long, default_value = "")]
        username: String,

        /// Free-text notes
        #[arg(short, long, default_value = "")]
        notes: String,

        /// Skip the password prompt (store an empty password)
        #[arg(long)]
        no_password: bool,
    },

    /// List all records (passwords redacted)
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search records by label or title (passwords redacted)
    Search {
        /// Search pattern
        #[arg(value_name = "PATTERN")]
        pattern: String,

        /// Search mode
        #[arg(long, value_enum, default_value_t = Mode::LabelAndTitle)]
        mode: Mode,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one record with its history
    Show {
        /// Record id (e.g. M000002)
        #[arg(value_name = "ID")]
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Edit a record's fields (appends one history snapshot)
    Edit {
        /// Record id
        #[arg(value_name = "ID")]
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        label: Option<String>,

        #[arg(short, long)]
        username: Option<String>,

        #[arg(short, long)]
        notes: Option<String>,

        /// Prompt for a new password
        #[arg(long)]
        password: bool,
    },

    /// Delete a record and all its history
    Rm {
        /// Record id
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Delete a single history snapshot
    RmHistory {
        /// History entry id
        #[arg(value_name = "HISTORY_ID")]
        history_id: String,
    },

    /// Print the real password of one record
    Reveal {
        /// Record id
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Import records from a JSON file
    Import {
        /// Path to a JSON array of records-with-history
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Change the vault passphrase
    ChangePassphrase,

    /// Copy the sealed database file somewhere safe
    Backup {
        /// Destination path
        #[arg(value_name = "DEST")]
        destination: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Exact label match
    Label,
    /// Exact label match or title substring
    LabelAndTitle,
}

impl From<Mode> for SearchMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Label => SearchMode::LabelOnly,
            Mode::LabelAndTitle => SearchMode::LabelAndTitle,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let path = cli
        .vault
        .clone()
        .ok_or_else(|| anyhow!("No vault path provided. Use --vault or set VAULT_PATH."))?;

    match cli.command {
        Commands::Init => {
            let vault = Vault::open(&path)?;
            let passphrase = prompt_new_passphrase("Enter passphrase")?;
            vault.initialize_store(&passphrase)?;
            if !cli.quiet {
                println!("Initialized new vault at {}", path.display());
            }
        }
        Commands::Status => {
            let vault = Vault::open(&path)?;
            let default = vault.is_default_passphrase()?;
            if !cli.quiet {
                println!("Vault: {}", path.display());
            }
            if default {
                println!("WARNING: the default passphrase is still set; change it now.");
            } else if !cli.quiet {
                println!("Passphrase: custom");
            }
        }
        Commands::Add {
            title,
            label,
            username,
            notes,
            no_password,
        } => {
            let vault = open_unlocked(&path)?;
            let password = if no_password {
                String::new()
            } else {
                Password::new()
                    .with_prompt("Record password")
                    .allow_empty_password(true)
                    .interact()
                    .context("Failed to read record password")?
            };

            let id = vault.insert(Record {
                title,
                label,
                username,
                password,
                notes,
                ..Record::default()
            })?;
            if !cli.quiet {
                println!("Added record {}", id);
            }
        }
        Commands::List { json } => {
            let vault = open_unlocked(&path)?;
            let records = vault.list_all()?;
            print_records(&records, json, cli.quiet)?;
        }
        Commands::Search {
            pattern,
            mode,
            json,
        } => {
            let vault = open_unlocked(&path)?;
            let records = vault.search(&pattern, mode.into())?;
            print_records(&records, json, cli.quiet)?;
        }
        Commands::Show { id, json } => {
            let vault = open_unlocked(&path)?;
            let bundle = vault.get(&id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&redacted(bundle))?);
            } else {
                print_bundle(&bundle, cli.quiet);
            }
        }
        Commands::Edit {
            id,
            title,
            label,
            username,
            notes,
            password,
        } => {
            let vault = open_unlocked(&path)?;
            let mut record = vault.get(&id)?.record;
            if let Some(value) = title {
                record.title = value;
            }
            if let Some(value) = label {
                record.label = value;
            }
            if let Some(value) = username {
                record.username = value;
            }
            if let Some(value) = notes {
                record.notes = value;
            }
            if password {
                record.password = Password::new()
                    .with_prompt("New record password")
                    .allow_empty_password(true)
                    .interact()
                    .context("Failed to read record password")?;
            }
            vault.update(record)?;
            if !cli.quiet {
                println!("Updated record {}", id);
            }
        }
        Commands::Rm { id } => {
            let vault = open_unlocked(&path)?;
            vault.delete(&id)?;
            if !cli.quiet {
                println!("Deleted record {}", id);
            }
        }
        Commands::RmHistory { history_id } => {
            let vault = open_unlocked(&path)?;
            vault.delete_history(&history_id)?;
            if !cli.quiet {
                println!("Deleted history entry {}", history_id);
            }
        }
        Commands::Reveal { id } => {
            let vault = open_unlocked(&path)?;
            println!("{}", vault.reveal_password(&id)?);
        }
        Commands::Import { file } => {
            let vault = open_unlocked(&path)?;
            let data = fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let items: Vec<RecordWithHistory> =
                serde_json::from_slice(&data).context("Invalid import file")?;
            let count = items.len();
            vault.import(items)?;
            if !cli.quiet {
                println!("Imported {} record(s)", count);
            }
        }
        Commands::ChangePassphrase => {
            let vault = Vault::open(&path)?;
            let old = Password::new()
                .with_prompt("Current passphrase")
                .interact()
                .context("Failed to read passphrase")?;
            let new = prompt_new_passphrase("New passphrase")?;
            vault.change_passphrase(&old, &new)?;
            if !cli.quiet {
                println!("Passphrase changed.");
            }
        }
        Commands::Backup { destination } => {
            let count = fs::copy(&path, &destination).with_context(|| {
                format!(
                    "Failed to copy vault from {} to {}",
                    path.display(),
                    destination.display()
                )
            })?;
            if count == 0 {
                bail!("Backup failed: zero bytes written");
            }
            if !cli.quiet {
                println!("Backed up vault to {}", destination.display());
            }
        }
    }

    Ok(())
}

/// Open the vault, unlock it with the prompted passphrase and fill the
/// working cache.
fn open_unlocked(path: &std::path::Path) -> anyhow::Result<Vault> {
    let vault = Vault::open(path)?;
    let passphrase = prompt_passphrase()?;
    if !vault.unlock(&passphrase)? {
        bail!("Wrong passphrase");
    }
    vault.rebuild_cache()?;
    Ok(vault)
}

fn prompt_passphrase() -> anyhow::Result<String> {
    if let Ok(value) = std::env::var("VAULT_PASSPHRASE") {
        if !value.trim().is_empty() {
            return Ok(value);
        }
    }
    Password::new()
        .with_prompt("Passphrase")
        .interact()
        .context("Failed to read passphrase")
}

fn prompt_new_passphrase(prompt: &str) -> anyhow::Result<String> {
    if let Ok(value) = std::env::var("VAULT_PASSPHRASE") {
        if !value.trim().is_empty() {
            return Ok(value);
        }
    }
    Password::new()
        .with_prompt(prompt)
        .with_confirmation("Confirm passphrase", "Passphrases do not match")
        .interact()
        .context("Failed to read passphrase")
}

fn print_records(records: &[Record], json: bool, quiet: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }
    if !quiet {
        println!("ID | TITLE | LABEL | USERNAME");
    }
    for record in records {
        println!(
            "{} | {} | {} | {}",
            record.id, record.title, record.label, record.username
        );
    }
    Ok(())
}

fn print_bundle(bundle: &RecordWithHistory, quiet: bool) {
    let record = &bundle.record;
    println!("ID: {}", record.id);
    println!("Title: {}", record.title);
    if !record.label.is_empty() {
        println!("Label: {}", record.label);
    }
    if !record.username.is_empty() {
        println!("Username: {}", record.username);
    }
    if !record.notes.is_empty() {
        println!("Notes: {}", record.notes);
    }
    if !quiet {
        println!("Created: {}", record.created_at);
        println!("Modified: {}", record.modified_at);
    }
    if !bundle.history.is_empty() {
        println!();
        println!("History ({} snapshot(s)):", bundle.history.len());
        for entry in &bundle.history {
            println!(
                "  {} | {} | {} | at {}",
                entry.id, entry.title, entry.username, entry.created_at
            );
        }
    }
}

/// A bundle safe to print: the password fields replaced by the fixed
/// placeholder.
fn redacted(mut bundle: RecordWithHistory) -> RecordWithHistory {
    if !bundle.record.password.is_empty() {
        bundle.record.password = vault_core::model::REDACTED_PASSWORD.to_string();
    }
    for entry in &mut bundle.history {
        if !entry.password.is_empty() {
            entry.password = vault_core::model::REDACTED_PASSWORD.to_string();
        }
    }
    bundle
}
