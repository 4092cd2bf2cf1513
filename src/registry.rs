use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bigdecimal::BigDecimal;

use crate::config::Overrides;
use crate::errors::SourceError;
use crate::sources::{self, FetchRequest, HttpTransport, Transport};

/// A balance source: the account's string arguments in, a normalized
/// decimal amount out.
pub type Fetcher = Box<dyn Fn(&HashMap<String, String>) -> Result<BigDecimal, SourceError> + Send + Sync>;

/// Name to fetcher table consulted when an account names an `api_function`.
/// Lookup happens at entry-processing time, so an unknown name fails only
/// the one account referencing it, never the whole run.
#[derive(Default)]
pub struct FetcherRegistry {
    fetchers: HashMap<String, Fetcher>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, fetcher: Fetcher) {
        self.fetchers.insert(name.into(), fetcher);
    }

    pub fn resolve(&self, name: &str) -> Result<&Fetcher, SourceError> {
        self.fetchers
            .get(name)
            .ok_or_else(|| SourceError::UnknownFetcher(name.to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fetchers.keys().map(String::as_str)
    }
}

/// Converts an account's `args` mapping into a [`FetchRequest`].
fn fetch_request(args: &HashMap<String, String>) -> Result<FetchRequest, SourceError> {
    let address = args
        .get("address")
        .cloned()
        .ok_or(SourceError::MissingArgument("address"))?;
    let timeout = match args.get("timeout") {
        Some(raw) => {
            let seconds = raw.parse::<u64>().map_err(|e| SourceError::InvalidArgument {
                name: "timeout",
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            Some(Duration::from_secs(seconds))
        }
        None => None,
    };

    Ok(FetchRequest {
        address,
        api_key: args.get("api_key").cloned(),
        endpoint: args.get("endpoint").cloned(),
        timeout,
    })
}

type FetchFn = fn(&FetchRequest, &Overrides, &dyn Transport) -> Result<BigDecimal, SourceError>;

const BUILTIN_FETCHERS: [(&str, FetchFn); 6] = [
    ("fetch_bnb_balance_on_bsc", sources::fetch_bnb_balance_on_bsc),
    ("fetch_usdt_balance_on_bsc", sources::fetch_usdt_balance_on_bsc),
    ("fetch_usdc_balance_on_bsc", sources::fetch_usdc_balance_on_bsc),
    ("fetch_eth_balance_on_ethereum", sources::fetch_eth_balance_on_ethereum),
    ("fetch_usdt_balance_on_ethereum", sources::fetch_usdt_balance_on_ethereum),
    ("fetch_usdc_balance_on_ethereum", sources::fetch_usdc_balance_on_ethereum),
];

/// The built-in chain fetchers, wired over the production HTTP transport.
pub fn default_fetcher_registry(overrides: Overrides) -> Result<FetcherRegistry> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
    let mut registry = FetcherRegistry::new();

    for (name, fetch) in BUILTIN_FETCHERS {
        let transport = transport.clone();
        let overrides = overrides.clone();
        registry.insert(
            name,
            Box::new(move |args| {
                let request = fetch_request(args)?;
                fetch(&request, &overrides, transport.as_ref())
            }),
        );
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    #[test]
    fn test_default_registry_exposes_builtin_fetchers() {
        let registry = default_fetcher_registry(Overrides::default()).unwrap();
        let names = registry.names().sorted().collect::<Vec<_>>();

        assert_eq!(
            names,
            vec![
                "fetch_bnb_balance_on_bsc",
                "fetch_eth_balance_on_ethereum",
                "fetch_usdc_balance_on_bsc",
                "fetch_usdc_balance_on_ethereum",
                "fetch_usdt_balance_on_bsc",
                "fetch_usdt_balance_on_ethereum",
            ]
        );
    }

    #[test]
    fn test_unknown_name_fails_resolution() {
        let registry = FetcherRegistry::new();

        assert!(matches!(
            registry.resolve("fetch_doge_balance_on_moon"),
            Err(SourceError::UnknownFetcher(_))
        ));
    }

    #[test]
    fn test_builtin_fetcher_requires_address_argument() {
        let registry = default_fetcher_registry(Overrides::default()).unwrap();
        let fetcher = registry.resolve("fetch_bnb_balance_on_bsc").unwrap();

        assert!(matches!(
            fetcher(&HashMap::new()),
            Err(SourceError::MissingArgument("address"))
        ));
    }

    #[test]
    fn test_bad_timeout_argument_is_rejected() {
        let args = HashMap::from([
            ("address".to_owned(), "0x0".to_owned()),
            ("timeout".to_owned(), "soon".to_owned()),
        ]);

        assert!(matches!(
            fetch_request(&args),
            Err(SourceError::InvalidArgument { name: "timeout", .. })
        ));
    }

    #[test]
    fn test_inserted_stub_is_resolvable() {
        let mut registry = FetcherRegistry::new();
        registry.insert("stub", Box::new(|_args| Ok(BigDecimal::from(7))));

        let fetcher = registry.resolve("stub").unwrap();
        assert_eq!(fetcher(&HashMap::new()).unwrap(), BigDecimal::from(7));
    }
}
