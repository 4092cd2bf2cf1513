use std::collections::HashSet;
use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use anyhow::Result;
use bigdecimal::rounding::RoundingMode;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use itertools::Itertools;
use tracing::{debug, info, span, Level};

use crate::errors::SourceError;
use crate::ledger;
use crate::model::{AccountSource, AccountSpec, AutoBalanceConfig};
use crate::registry::FetcherRegistry;

/// A newly written balance assertion.
#[derive(Debug, Clone, PartialEq)]
pub struct Assertion {
    pub date: NaiveDate,
    pub account: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub line: String,
}

/// An account whose balance source failed this run.
#[derive(Debug)]
pub struct FailedAccount {
    pub spec: AccountSpec,
    pub error: SourceError,
}

/// Selects the accounts due on the processed dates, resolves their amounts
/// and appends assertions to the ledger, skipping pairs already present.
pub struct AutoBalanceManager {
    config: AutoBalanceConfig,
    ledger_path: PathBuf,
    registry: FetcherRegistry,
}

impl AutoBalanceManager {
    pub fn new(config: AutoBalanceConfig, ledger_path: PathBuf, registry: FetcherRegistry) -> Self {
        Self {
            config,
            ledger_path,
            registry,
        }
    }

    /// Processes today's entries, unless the wall clock has not reached the
    /// configured runtime cutoff yet; daily data may not have settled before
    /// that point, so an early invocation writes nothing at all.
    pub fn process_now(
        &self,
        now: NaiveDateTime,
    ) -> Result<(Vec<Assertion>, Vec<FailedAccount>)> {
        if now.time() < self.config.runtime {
            debug!(
                "{} is before the {} cutoff, skipping",
                now.time(),
                self.config.runtime
            );
            return Ok((Vec::new(), Vec::new()));
        }
        self.process_dates(&[now.date()])
    }

    /// Processes explicitly requested dates. Explicit requests always run;
    /// the runtime cutoff does not apply here.
    pub fn process_dates(
        &self,
        dates: &[NaiveDate],
    ) -> Result<(Vec<Assertion>, Vec<FailedAccount>)> {
        let _span = span!(Level::INFO, "process").entered();
        let started = Instant::now();

        let content = ledger::read_ledger(&self.ledger_path)?;
        let due = self.due_accounts(&content, dates);

        // Fetch phase: every due amount resolves on its own worker, so one
        // slow endpoint stalls only its own account.
        let amounts = thread::scope(|scope| {
            let workers = due
                .iter()
                .map(|(_, spec)| scope.spawn(move || self.resolve_amount(spec)))
                .collect_vec();
            workers
                .into_iter()
                .map(|worker| worker.join().expect("balance worker panicked"))
                .collect_vec()
        });

        // Write phase: serialized, in due order.
        let mut additions = Vec::new();
        let mut errors = Vec::new();
        for ((date, spec), amount) in due.into_iter().zip(amounts) {
            match amount {
                Ok(amount) => {
                    let scaled =
                        amount.with_scale_round(spec.precision as i64, RoundingMode::HalfUp);
                    let line =
                        ledger::format_assertion(date, &spec.account, &scaled, &spec.currency);
                    ledger::append_assertion(&self.ledger_path, &line)?;
                    additions.push(Assertion {
                        date,
                        account: spec.account.clone(),
                        amount: scaled,
                        currency: spec.currency.clone(),
                        line,
                    });
                }
                Err(error) => errors.push(FailedAccount {
                    spec: spec.clone(),
                    error,
                }),
            }
        }

        info!(
            "wrote {} assertion(s), {} error(s) in {:?}",
            additions.len(),
            errors.len(),
            started.elapsed()
        );
        Ok((additions, errors))
    }

    /// Matching (date, account) pairs that are not already asserted, in
    /// config order, de-duplicated within the run.
    fn due_accounts<'a>(
        &'a self,
        content: &str,
        dates: &[NaiveDate],
    ) -> Vec<(NaiveDate, &'a AccountSpec)> {
        let mut seen: HashSet<(NaiveDate, &str)> = HashSet::new();
        let mut due = Vec::new();
        for &date in dates {
            for entry in self.config.entries.iter().filter(|entry| entry.matches(date)) {
                for spec in entry.accounts.iter() {
                    if ledger::has_assertion(content, date, &spec.account) {
                        debug!("{} {} already asserted", date, spec.account);
                        continue;
                    }
                    if seen.insert((date, spec.account.as_str())) {
                        due.push((date, spec));
                    }
                }
            }
        }
        due
    }

    fn resolve_amount(&self, spec: &AccountSpec) -> Result<BigDecimal, SourceError> {
        match &spec.source {
            AccountSource::Literal(balance) => Ok(balance.clone()),
            AccountSource::Fetched { function, args } => {
                let fetcher = self.registry.resolve(function)?;
                fetcher(args)
            }
        }
    }
}
