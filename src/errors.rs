use thiserror::Error;

/// Configuration problems. These are fatal: nothing is fetched and nothing
/// is written once one is raised.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid date matcher '{0}'; expected a day-of-month (1-31) or YYYY-MM-DD")]
    InvalidDateMatcher(String),
    #[error("invalid runtime '{0}'; expected HH:MM")]
    InvalidRuntime(String),
    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
    #[error("invalid currency '{0}'; expected a 3-5 letter code")]
    InvalidCurrency(String),
    #[error("invalid balance '{value}' for account {account}")]
    InvalidBalance { account: String, value: String },
    #[error("malformed configuration: {0}")]
    Malformed(String),
}

/// Balance source failures. These are per-account: the scheduler records
/// them and keeps going, so one bad fetch never aborts the batch.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unknown balance source '{0}'")]
    UnknownFetcher(String),
    #[error("no rpc endpoint configured for chain '{0}'")]
    EndpointNotConfigured(&'static str),
    #[error("invalid address '{0}'; expected 0x followed by 40 hex digits")]
    InvalidAddress(String),
    #[error("missing required argument '{0}'")]
    MissingArgument(&'static str),
    #[error("invalid argument {name}='{value}': {reason}")]
    InvalidArgument {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("rpc request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("malformed rpc response: {0}")]
    MalformedResponse(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
}
