use std::time::Duration;

use tracing::{debug, warn};

const PING_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "autobalance/1.0";

/// Pings a healthcheck endpoint after a run: the base URL on success, the
/// `/fail` sibling on failure. Ping problems are logged and swallowed; a
/// monitoring hiccup must not fail the run itself.
#[derive(Debug, Default)]
pub struct HealthcheckNotifier {
    success_url: Option<String>,
    failure_url: Option<String>,
}

impl HealthcheckNotifier {
    pub fn new(base_url: Option<&str>) -> Self {
        match base_url.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => Self {
                success_url: Some(url.to_owned()),
                failure_url: Some(format!("{}/fail", url.trim_end_matches('/'))),
            },
            None => Self::default(),
        }
    }

    pub fn notify_success(&self) {
        if let Some(url) = &self.success_url {
            ping(url);
        }
    }

    pub fn notify_failure(&self) {
        if let Some(url) = self.failure_url.as_ref().or(self.success_url.as_ref()) {
            ping(url);
        }
    }
}

fn ping(url: &str) {
    debug!(url, "healthcheck ping");

    let client = match reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(PING_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!("Healthcheck client failed: {}", e);
            return;
        }
    };

    if let Err(e) = client.get(url).send().and_then(|r| r.error_for_status()) {
        warn!("Healthcheck ping failed for {}: {}", url, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_url_is_derived_from_base() {
        let notifier = HealthcheckNotifier::new(Some("https://hc.example/ping/abc"));

        assert_eq!(
            notifier.success_url.as_deref(),
            Some("https://hc.example/ping/abc")
        );
        assert_eq!(
            notifier.failure_url.as_deref(),
            Some("https://hc.example/ping/abc/fail")
        );
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let notifier = HealthcheckNotifier::new(Some("https://hc.example/ping/abc/"));

        assert_eq!(
            notifier.failure_url.as_deref(),
            Some("https://hc.example/ping/abc/fail")
        );
    }

    #[test]
    fn test_missing_or_blank_url_disables_pings() {
        assert!(HealthcheckNotifier::new(None).success_url.is_none());
        assert!(HealthcheckNotifier::new(Some("  ")).success_url.is_none());
    }
}
