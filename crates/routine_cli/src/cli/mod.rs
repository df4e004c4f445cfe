use clap::{Parser, Subcommand};
use routine_core::config::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(author, version, about = "Track daily routines without double-booking", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Owner to act for (falls back to `default_owner` from the config file)
    #[arg(long, env = "ROUTINE_OWNER", global = true)]
    pub owner: Option<String>,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a task occupying a time window
    ///
    /// Example: routine add "Morning run" --start 07:00 --end 07:45
    /// Example: routine add Reading --start 21:00 --end 21:30 --date 2025-03-22 --priority high
    Add {
        name: Option<String>,
        #[arg(long, value_name = "HH:MM")]
        start: String,
        #[arg(long, value_name = "HH:MM")]
        end: String,
        /// Day of the task (defaults to today)
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<String>,
        /// high, medium or low
        #[arg(long)]
        priority: Option<String>,
        /// daily, weekly, custom or none
        #[arg(long)]
        recurrence: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Check whether a time window is free without saving anything
    ///
    /// Example: routine check --start 09:30 --end 10:30
    /// Example: routine check --start 09:00 --end 09:45 --exclude task-1
    Check {
        #[arg(long, value_name = "HH:MM")]
        start: String,
        #[arg(long, value_name = "HH:MM")]
        end: String,
        /// Day to check (defaults to the excluded task's day, else today)
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<String>,
        /// Task being edited; it never conflicts with itself
        #[arg(long, value_name = "ID")]
        exclude: Option<String>,
    },
    /// List tasks
    ///
    /// Example: routine list
    /// Example: routine list --date 2025-03-22
    List {
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<String>,
    },
    /// Show details of a task
    ///
    /// Example: routine show task-1
    Show { id: String },
    /// Edit a task; changing the window re-checks it for overlaps
    ///
    /// Example: routine edit task-1 --end 09:45
    /// Example: routine edit task-1 --name "Evening run" --priority low
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        recurrence: Option<String>,
        #[arg(long, value_name = "HH:MM")]
        start: Option<String>,
        #[arg(long, value_name = "HH:MM")]
        end: Option<String>,
        /// Move the task to another day (defaults to its current day)
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<String>,
    },
    /// Delete a task and its completion records
    ///
    /// Example: routine delete task-1
    Delete { id: String },
    /// Mark a task completed for a day
    ///
    /// Example: routine done task-1
    /// Example: routine done task-1 --date 2025-03-22
    Done {
        id: String,
        /// Day of completion (defaults to today)
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<String>,
    },
    /// Show completion history, newest first
    ///
    /// Example: routine history
    History,
    /// Count completed tasks for a day
    ///
    /// Example: routine summary --date 2025-03-22
    Summary {
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOverrideTarget {
    Theme,
    DefaultOwner,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfigOverride {
    pub target: ConfigOverrideTarget,
    pub value: String,
}

/// Parse a raw `KEY=VALUE` override string into a structured target.
pub fn parse_config_override(raw: &str) -> Result<ParsedConfigOverride, String> {
    let (key_raw, value_raw) = raw
        .trim()
        .split_once('=')
        .ok_or_else(|| "override must be in KEY=VALUE format".to_string())?;

    let field =
        canonicalize_flag_name(key_raw).ok_or_else(|| "override key cannot be empty".to_string())?;
    let target = match field.as_str() {
        "theme" => ConfigOverrideTarget::Theme,
        "default_owner" | "owner" => ConfigOverrideTarget::DefaultOwner,
        other => return Err(format!("unknown config field '{other}'")),
    };

    Ok(ParsedConfigOverride {
        target,
        value: value_raw.trim().to_string(),
    })
}

/// Folds every `--config-override` into one set; later values win.
pub fn collect_config_overrides(raw: &[String]) -> Result<ConfigOverrides, String> {
    let mut overrides = ConfigOverrides::default();
    for entry in raw {
        let parsed = parse_config_override(entry)?;
        match parsed.target {
            ConfigOverrideTarget::Theme => overrides.theme = Some(parsed.value),
            ConfigOverrideTarget::DefaultOwner => overrides.default_owner = Some(parsed.value),
        }
    }
    Ok(overrides)
}

fn canonicalize_flag_name(name: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
