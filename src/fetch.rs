use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use clap::Args;

use crate::config::{self, Overrides};
use crate::registry::default_fetcher_registry;

/// One-off balance query against the configured RPC helpers.
#[derive(Debug, Args)]
pub struct Command {
    /// Token symbol (e.g. BNB, USDT)
    pub token: String,
    /// Chain identifier (e.g. BSC, Ethereum)
    pub chain: String,
    /// Wallet address (0x...) to query
    pub address: String,
    /// API key (Infura project id, etc.)
    #[arg(long)]
    pub api_key: Option<String>,
    /// Explicit RPC endpoint URL (overrides --api-key)
    #[arg(long)]
    pub endpoint: Option<String>,
    /// Request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,
    /// Print machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute_command(config_path: &Path, cmd: &Command) -> Result<i32> {
    // The config file only contributes endpoint defaults here; a missing
    // file is fine.
    let overrides = match config::load_config_file(config_path) {
        Ok(raw) => Overrides::from_config(&raw),
        Err(_) => Overrides::default(),
    };
    let registry = default_fetcher_registry(overrides)?;

    let name = format!(
        "fetch_{}_balance_on_{}",
        cmd.token.to_lowercase(),
        cmd.chain.to_lowercase()
    );

    let mut args = HashMap::new();
    args.insert("address".to_owned(), cmd.address.clone());
    args.insert("timeout".to_owned(), cmd.timeout.to_string());
    if let Some(api_key) = &cmd.api_key {
        args.insert("api_key".to_owned(), api_key.clone());
    }
    if let Some(endpoint) = &cmd.endpoint {
        args.insert("endpoint".to_owned(), endpoint.clone());
    }

    let balance = match registry.resolve(&name).and_then(|fetcher| fetcher(&args)) {
        Ok(balance) => balance,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(1);
        }
    };

    if cmd.json {
        println!(
            "{}",
            serde_json::json!({
                "token": cmd.token,
                "chain": cmd.chain,
                "address": cmd.address,
                "balance": balance.to_string(),
            })
        );
    } else {
        println!(
            "Token: {}\nChain: {}\nAddress: {}\nBalance: {}",
            cmd.token, cmd.chain, cmd.address, balance
        );
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_token_chain_pair_fails_cleanly() {
        let cmd = Command {
            token: "doge".into(),
            chain: "moon".into(),
            address: "0xb794f5ea0ba39494ce839613fffba74279579268".into(),
            api_key: None,
            endpoint: None,
            timeout: 10,
            json: false,
        };

        let code = execute_command(Path::new("no-such-config.json"), &cmd).unwrap();

        assert_eq!(code, 1);
    }
}
