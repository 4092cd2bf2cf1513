use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;

/// True when the ledger content already holds an assertion for this
/// date/account pair. The prefix match is the whole de-duplication
/// contract: re-running the scheduler for a pair that is present is
/// always a no-op.
pub fn has_assertion(content: &str, date: NaiveDate, account: &str) -> bool {
    let prefix = assertion_prefix(date, account);
    content.lines().any(|line| line.starts_with(&prefix))
}

fn assertion_prefix(date: NaiveDate, account: &str) -> String {
    format!("{} balance {} ", date, account)
}

/// Formats one assertion line. `amount` must already carry the scale it
/// should be printed at.
pub fn format_assertion(
    date: NaiveDate,
    account: &str,
    amount: &BigDecimal,
    currency: &str,
) -> String {
    format!("{} balance {} {} {}\n", date, account, amount, currency)
}

/// Reads the whole ledger; a missing file reads as empty content. Any
/// other I/O failure is fatal, since without the existing content the
/// idempotency check cannot be trusted.
pub fn read_ledger(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => {
            Err(e).with_context(|| format!("Reading ledger {}", path.display()))
        }
    }
}

/// Appends one already-formatted assertion line, creating the file and any
/// missing parent directories on first write. The line goes out in a single
/// write so no partial assertion survives a failure.
pub fn append_assertion(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating {}", parent.display()))?;
        }
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Opening ledger {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("Appending to ledger {}", path.display()))?;

    Ok(())
}
