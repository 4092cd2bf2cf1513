use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use chrono::NaiveTime;
use chrono_tz::Tz;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::ConfigError;
use crate::model::{
    parse_date_matchers, AccountSource, AccountSpec, AutoBalanceConfig, AutoBalanceEntry,
};

pub const DEFAULT_PRECISION: u32 = 2;

lazy_static! {
    static ref CURRENCY: Regex = Regex::new(r"^[A-Z]{3,5}$").unwrap();
}

/// Loads the configuration file as a raw JSON mapping. Validation of the
/// auto-balance section happens in [`load_auto_balance_config`].
pub fn load_config_file(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Reading config file: {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Parsing config JSON in {}", path.display()))?;
    if !value.is_object() {
        anyhow::bail!("Config file must define a mapping at the top level");
    }
    Ok(value)
}

#[derive(Debug, Deserialize)]
struct RawSection {
    runtime: Option<String>,
    timezone: Option<String>,
    #[serde(default)]
    entries: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    date: OneOrMany,
    #[serde(default)]
    accounts: Vec<RawAccount>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(Scalar),
    Many(Vec<Scalar>),
}

impl OneOrMany {
    fn into_strings(self) -> Vec<String> {
        match self {
            OneOrMany::One(scalar) => vec![scalar.into_string()],
            OneOrMany::Many(scalars) => scalars.into_iter().map(Scalar::into_string).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(serde_json::Number),
    Text(String),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Number(number) => number.to_string(),
            Scalar::Text(text) => text,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    account: String,
    currency: Option<String>,
    balance: Option<Scalar>,
    api_function: Option<String>,
    #[serde(default)]
    args: HashMap<String, String>,
    precision: Option<u32>,
}

/// Validates the auto-balance section of an already-parsed config mapping.
/// A config without an `auto_balance` key is treated as if its top level
/// were that section.
pub fn load_auto_balance_config(
    config: &Value,
    default_currency: &str,
) -> Result<AutoBalanceConfig, ConfigError> {
    let section = match config.get("auto_balance").filter(|value| !value.is_null()) {
        Some(section) => section.clone(),
        None => config.clone(),
    };
    let raw: RawSection =
        serde_json::from_value(section).map_err(|e| ConfigError::Malformed(e.to_string()))?;

    let runtime = match &raw.runtime {
        Some(value) => parse_runtime(value)?,
        None => default_runtime(),
    };
    let timezone = match &raw.timezone {
        Some(value) => Some(
            Tz::from_str(value).map_err(|_| ConfigError::UnknownTimezone(value.clone()))?,
        ),
        None => None,
    };

    let default_currency = checked_currency(default_currency)?;
    let entries = raw
        .entries
        .into_iter()
        .map(|entry| load_entry(entry, &default_currency))
        .collect::<Result<Vec<_>, _>>()?;

    debug!("loaded {} auto-balance entries", entries.len());

    Ok(AutoBalanceConfig {
        entries,
        runtime,
        timezone,
        default_currency,
        ledger: ledger_path(config),
    })
}

pub fn default_runtime() -> NaiveTime {
    NaiveTime::from_hms_opt(1, 0, 0).expect("static runtime")
}

fn parse_runtime(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| ConfigError::InvalidRuntime(value.to_owned()))
}

fn checked_currency(value: &str) -> Result<String, ConfigError> {
    let value = value.trim().to_uppercase();
    if CURRENCY.is_match(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidCurrency(value))
    }
}

fn load_entry(entry: RawEntry, default_currency: &str) -> Result<AutoBalanceEntry, ConfigError> {
    let matchers = parse_date_matchers(&entry.date.into_strings())?;
    let accounts = entry
        .accounts
        .into_iter()
        .map(|account| load_account(account, default_currency))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AutoBalanceEntry { matchers, accounts })
}

fn load_account(account: RawAccount, default_currency: &str) -> Result<AccountSpec, ConfigError> {
    let currency = match account.currency {
        Some(currency) => checked_currency(&currency)?,
        None => default_currency.to_owned(),
    };

    // A fetcher wins over a literal; an account with neither is a manual
    // account asserted at zero until someone edits the config.
    let source = match (account.api_function, account.balance) {
        (Some(function), _) => AccountSource::Fetched {
            function,
            args: account.args,
        },
        (None, Some(balance)) => {
            let text = balance.into_string();
            let value = BigDecimal::from_str(text.trim()).map_err(|_| {
                ConfigError::InvalidBalance {
                    account: account.account.clone(),
                    value: text,
                }
            })?;
            AccountSource::Literal(value)
        }
        (None, None) => AccountSource::Literal(BigDecimal::from(0)),
    };

    Ok(AccountSpec {
        account: account.account,
        currency,
        source,
        precision: account.precision.unwrap_or(DEFAULT_PRECISION),
    })
}

fn ledger_path(config: &Value) -> Option<PathBuf> {
    ["beancount_output", "ledger"]
        .iter()
        .filter_map(|key| config.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Provider settings (RPC endpoints, API keys) collected from config keys
/// ending in `_endpoint`, `_api_key` or `_token`. Process environment
/// variables of the uppercased name remain readable as a fallback; the
/// environment is never written.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    values: HashMap<String, String>,
}

const OVERRIDE_SUFFIXES: [&str; 3] = ["_endpoint", "_api_key", "_token"];

impl Overrides {
    pub fn from_config(config: &Value) -> Self {
        let mut values = HashMap::new();
        if let Some(map) = config.as_object() {
            for (key, value) in map {
                let key = key.to_lowercase();
                if OVERRIDE_SUFFIXES.iter().any(|suffix| key.ends_with(suffix)) {
                    if let Some(text) = value.as_str() {
                        values.insert(key, text.to_owned());
                    }
                }
            }
        }
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key.to_uppercase()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cash_entry() -> Value {
        json!({
            "date": 5,
            "accounts": [{ "account": "Assets:Cash", "currency": "USD", "balance": "0" }]
        })
    }

    #[test]
    fn test_runtime_defaults_to_one_am() {
        let config = json!({ "auto_balance": { "entries": [cash_entry()] } });
        let loaded = load_auto_balance_config(&config, "USD").unwrap();

        assert_eq!(loaded.runtime, NaiveTime::from_hms_opt(1, 0, 0).unwrap());
    }

    #[test]
    fn test_runtime_read_from_config() {
        let config = json!({ "auto_balance": { "runtime": "05:45", "entries": [cash_entry()] } });
        let loaded = load_auto_balance_config(&config, "USD").unwrap();

        assert_eq!(loaded.runtime, NaiveTime::from_hms_opt(5, 45, 0).unwrap());
    }

    #[test]
    fn test_bad_runtime_is_rejected() {
        let config = json!({ "auto_balance": { "runtime": "quarter past", "entries": [] } });

        assert!(matches!(
            load_auto_balance_config(&config, "USD"),
            Err(ConfigError::InvalidRuntime(_))
        ));
    }

    #[test]
    fn test_top_level_entries_without_auto_balance_mapping() {
        let config = json!({ "default_currency": "usd", "entries": [cash_entry()] });
        let loaded = load_auto_balance_config(&config, "usd").unwrap();

        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.default_currency, "USD");
    }

    #[test]
    fn test_currency_falls_back_to_default_and_uppercases() {
        let config = json!({
            "auto_balance": {
                "entries": [{ "date": 1, "accounts": [{ "account": "Assets:Cash" }] }]
            }
        });
        let loaded = load_auto_balance_config(&config, "eur").unwrap();

        assert_eq!(loaded.entries[0].accounts[0].currency, "EUR");
    }

    #[test]
    fn test_precision_defaults_to_two() {
        let config = json!({ "auto_balance": { "entries": [cash_entry()] } });
        let loaded = load_auto_balance_config(&config, "USD").unwrap();

        assert_eq!(loaded.entries[0].accounts[0].precision, 2);
    }

    #[test]
    fn test_account_without_source_defaults_to_literal_zero() {
        let config = json!({
            "auto_balance": {
                "entries": [{ "date": 1, "accounts": [{ "account": "Assets:Cash" }] }]
            }
        });
        let loaded = load_auto_balance_config(&config, "USD").unwrap();

        match &loaded.entries[0].accounts[0].source {
            AccountSource::Literal(value) => assert_eq!(value, &BigDecimal::from(0)),
            other => panic!("expected literal source, got {:?}", other),
        }
    }

    #[test]
    fn test_api_function_wins_over_literal_balance() {
        let config = json!({
            "auto_balance": {
                "entries": [{
                    "date": 1,
                    "accounts": [{
                        "account": "Assets:Wallet",
                        "currency": "BTC",
                        "balance": "1",
                        "api_function": "dummy",
                        "args": { "value": "2" }
                    }]
                }]
            }
        });
        let loaded = load_auto_balance_config(&config, "USD").unwrap();

        match &loaded.entries[0].accounts[0].source {
            AccountSource::Fetched { function, args } => {
                assert_eq!(function, "dummy");
                assert_eq!(args.get("value").map(String::as_str), Some("2"));
            }
            other => panic!("expected fetched source, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_date_matcher_fails_load() {
        let config = json!({
            "auto_balance": {
                "entries": [{ "date": "soonish", "accounts": [] }]
            }
        });

        assert!(matches!(
            load_auto_balance_config(&config, "USD"),
            Err(ConfigError::InvalidDateMatcher(_))
        ));
    }

    #[test]
    fn test_unknown_timezone_fails_load() {
        let config = json!({ "auto_balance": { "timezone": "Mars/Olympus", "entries": [] } });

        assert!(matches!(
            load_auto_balance_config(&config, "USD"),
            Err(ConfigError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn test_ledger_path_prefers_beancount_output() {
        let config = json!({ "beancount_output": "out.beancount", "ledger": "other.beancount" });

        assert_eq!(ledger_path(&config), Some(PathBuf::from("out.beancount")));
    }

    #[test]
    fn test_overrides_collects_provider_keys() {
        let config = json!({
            "BSC_Endpoint": "https://rpc.example",
            "eth_api_key": "key",
            "default_currency": "usd"
        });
        let overrides = Overrides::from_config(&config);

        assert_eq!(overrides.get("bsc_endpoint").as_deref(), Some("https://rpc.example"));
        assert_eq!(overrides.get("eth_api_key").as_deref(), Some("key"));
        assert!(overrides.values.get("default_currency").is_none());
    }
}
