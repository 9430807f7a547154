//! Offline ROE backfill for the constituent universe.
//!
//! Looks up ROE per symbol with a bounded rate-limit retry policy, records every answer in a
//! resumable progress file and finally produces an updated constituent list.

use crate::domain::constituent::{Constituent, UniverseSnapshot};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RoeLookup {
    Known(f64),
    Unknown,
    RateLimited,
}

#[async_trait::async_trait]
pub trait RoeSource: Send + Sync {
    async fn refresh_credentials(&self) -> Result<()>;

    /// Never fails: transport and parse problems are reported as `Unknown`.
    async fn fetch_roe(&self, symbol: &str) -> RoeLookup;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total lookups allowed per symbol, including the first one.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Normal,
    Backoff,
    RefreshingCredentials,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryAction {
    Fetch,
    Wait(Duration),
    RefreshCredentials,
    Finish(Option<f64>),
}

/// Per-symbol retry state machine.
///
/// `Normal --rate limited--> Backoff --waited--> RefreshingCredentials --ok--> Normal`. Every
/// lookup and every failed refresh uses up one attempt; once `max_attempts` is spent the symbol
/// finishes with an unknown ROE.
#[derive(Debug, Clone)]
pub struct RoeRetry {
    policy: RetryPolicy,
    state: RetryState,
    attempts: u32,
}

impl RoeRetry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Normal,
            attempts: 0,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn start(&mut self) -> RetryAction {
        self.fetch()
    }

    pub fn on_lookup(&mut self, lookup: RoeLookup) -> RetryAction {
        match lookup {
            RoeLookup::Known(roe) => self.finish(Some(roe)),
            RoeLookup::Unknown => self.finish(None),
            RoeLookup::RateLimited => self.back_off(),
        }
    }

    pub fn on_wait_elapsed(&mut self) -> RetryAction {
        self.state = RetryState::RefreshingCredentials;
        RetryAction::RefreshCredentials
    }

    pub fn on_refresh(&mut self, refreshed: bool) -> RetryAction {
        if refreshed {
            return self.fetch();
        }
        self.attempts += 1;
        self.back_off()
    }

    fn fetch(&mut self) -> RetryAction {
        if self.attempts >= self.policy.max_attempts {
            return self.finish(None);
        }
        self.attempts += 1;
        self.state = RetryState::Normal;
        RetryAction::Fetch
    }

    fn back_off(&mut self) -> RetryAction {
        if self.attempts >= self.policy.max_attempts {
            return self.finish(None);
        }
        self.state = RetryState::Backoff;
        RetryAction::Wait(self.policy.backoff)
    }

    fn finish(&mut self, roe: Option<f64>) -> RetryAction {
        self.state = RetryState::Done;
        RetryAction::Finish(roe)
    }
}

/// Drive [`RoeRetry`] against `source` until the symbol is settled.
pub async fn lookup_with_retry(
    source: &dyn RoeSource,
    symbol: &str,
    policy: RetryPolicy,
) -> Option<f64> {
    let mut machine = RoeRetry::new(policy);
    let mut action = machine.start();
    loop {
        action = match action {
            RetryAction::Fetch => machine.on_lookup(source.fetch_roe(symbol).await),
            RetryAction::Wait(backoff) => {
                tracing::warn!(%symbol, ?backoff, attempt = machine.attempts(), "rate limited; backing off");
                tokio::time::sleep(backoff).await;
                machine.on_wait_elapsed()
            }
            RetryAction::RefreshCredentials => {
                let refreshed = match source.refresh_credentials().await {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::warn!(%symbol, error = %err, "credential refresh failed");
                        false
                    }
                };
                machine.on_refresh(refreshed)
            }
            RetryAction::Finish(roe) => return roe,
        };
    }
}

/// Symbol -> ROE answers collected so far. A `None` entry is a settled "unknown" and is not
/// retried on resume.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackfillProgress {
    entries: BTreeMap<String, Option<f64>>,
}

impl BackfillProgress {
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read progress file {}", path.display()))?;
        let entries = serde_json::from_str::<BTreeMap<String, Option<f64>>>(&text)
            .with_context(|| format!("progress file {} is not a symbol map", path.display()))?;
        Ok(Self { entries })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.entries)
            .context("failed to serialize backfill progress")?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write progress file {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.entries.contains_key(symbol)
    }

    pub fn record(&mut self, symbol: &str, roe: Option<f64>) {
        self.entries.insert(symbol.to_string(), roe);
    }

    /// Constituents with ROE replaced by recorded answers; symbols without an answer keep
    /// their current value.
    pub fn apply(&self, universe: &UniverseSnapshot) -> Vec<Constituent> {
        universe
            .constituents()
            .iter()
            .map(|c| match self.entries.get(&c.symbol) {
                Some(roe) => Constituent {
                    roe: *roe,
                    ..c.clone()
                },
                None => c.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct BackfillOptions {
    pub progress_path: PathBuf,
    pub delay: Duration,
    pub policy: RetryPolicy,
    pub save_every: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub fetched: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub async fn run_backfill(
    universe: &UniverseSnapshot,
    source: &dyn RoeSource,
    progress: &mut BackfillProgress,
    opts: &BackfillOptions,
) -> Result<BackfillSummary> {
    anyhow::ensure!(opts.policy.max_attempts >= 1, "max_attempts must be >= 1");
    anyhow::ensure!(opts.save_every >= 1, "save_every must be >= 1");

    source
        .refresh_credentials()
        .await
        .context("initial credential fetch failed")?;

    let total = universe.len();
    let mut summary = BackfillSummary::default();
    let mut first_request = true;

    for c in universe.constituents() {
        if progress.contains(&c.symbol) {
            summary.skipped += 1;
            continue;
        }

        if !first_request && !opts.delay.is_zero() {
            tokio::time::sleep(opts.delay).await;
        }
        first_request = false;

        let roe = lookup_with_retry(source, &c.symbol, opts.policy).await;
        progress.record(&c.symbol, roe);
        match roe {
            Some(_) => summary.fetched += 1,
            None => summary.failed += 1,
        }

        let processed = summary.fetched + summary.failed;
        if processed % opts.save_every == 0 {
            tracing::info!(
                done = processed + summary.skipped,
                total,
                fetched = summary.fetched,
                failed = summary.failed,
                skipped = summary.skipped,
                "ROE backfill progress"
            );
            progress.save(&opts.progress_path)?;
        }
    }

    progress.save(&opts.progress_path)?;
    Ok(summary)
}
