use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{Local, NaiveDate, Utc};
use clap::Args;
use colored::Colorize;

use crate::config::{self, Overrides};
use crate::healthcheck::HealthcheckNotifier;
use crate::manager::AutoBalanceManager;
use crate::registry::default_fetcher_registry;

#[derive(Debug, Default, Args)]
pub struct Command {
    /// Override the ledger output path from the config file.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
    /// Process these dates instead of today, ignoring the runtime cutoff.
    #[arg(short, long, value_name = "YYYY-MM-DD")]
    pub date: Vec<NaiveDate>,
}

pub fn execute_command(config_path: &Path, cmd: &Command) -> Result<i32> {
    let raw = config::load_config_file(config_path)?;
    let default_currency = raw
        .get("default_currency")
        .and_then(|value| value.as_str())
        .unwrap_or("USD");
    let overrides = Overrides::from_config(&raw);
    let notifier =
        HealthcheckNotifier::new(raw.get("healthcheck_url").and_then(|value| value.as_str()));

    let auto_config = config::load_auto_balance_config(&raw, default_currency)?;
    if auto_config.entries.is_empty() {
        println!("No auto-balance entries configured; nothing to do.");
        notifier.notify_success();
        return Ok(0);
    }

    let output = resolve_output_path(config_path, auto_config.ledger.as_deref(), cmd.output.as_deref());
    let now = match auto_config.timezone {
        Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
        None => Local::now().naive_local(),
    };

    let registry = default_fetcher_registry(overrides)?;
    let manager = AutoBalanceManager::new(auto_config, output.clone(), registry);

    let outcome = if cmd.date.is_empty() {
        manager.process_now(now)
    } else {
        manager.process_dates(&cmd.date)
    };
    let (additions, errors) = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            notifier.notify_failure();
            return Err(e);
        }
    };

    for failed in errors.iter() {
        eprintln!(
            "{} Failed fetching {} ({}): {}",
            "[error]".red(),
            failed.spec.account,
            failed.spec.currency,
            failed.error
        );
    }

    if additions.is_empty() {
        let scope = if cmd.date.is_empty() {
            "today's date"
        } else {
            "the requested date(s)"
        };
        println!("No balance assertions written for {}.", scope);
    } else {
        println!(
            "Wrote {} balance assertion(s) to {}",
            additions.len(),
            output.display()
        );
    }

    if errors.is_empty() {
        notifier.notify_success();
        Ok(0)
    } else {
        notifier.notify_failure();
        Ok(1)
    }
}

/// CLI override wins, then the configured path (relative to the config
/// file's directory), then a sibling `beancount_output` file.
fn resolve_output_path(
    config_path: &Path,
    configured: Option<&Path>,
    cli_override: Option<&Path>,
) -> PathBuf {
    let relative_to = config_path.parent().unwrap_or(Path::new("."));
    match (cli_override, configured) {
        (Some(path), _) => path.to_owned(),
        (None, Some(path)) if path.is_absolute() => path.to_owned(),
        (None, Some(path)) => relative_to.join(path),
        (None, None) => relative_to.join("beancount_output"),
    }
}
