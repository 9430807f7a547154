use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use newhigh_core::domain::constituent::{Constituent, UniverseSnapshot};
use newhigh_core::fundamentals::backfill::{
    run_backfill, BackfillOptions, BackfillProgress, BackfillSummary, RetryPolicy, RoeSource,
};

pub const DEFAULT_PROGRESS_FILE: &str = "data/roe_progress.json";
pub const DEFAULT_DELAY_MS: u64 = 200;
pub const DEFAULT_BACKOFF_SECS: u64 = 10;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
const SAVE_EVERY: usize = 10;

#[derive(Debug, Clone)]
pub struct BackfillArgs {
    pub progress_file: PathBuf,
    pub delay_ms: u64,
    pub backoff_secs: u64,
    pub max_attempts: u32,
}

impl BackfillArgs {
    fn options(&self) -> anyhow::Result<BackfillOptions> {
        anyhow::ensure!(
            self.max_attempts >= 1,
            "--max-attempts must be >= 1 (got {})",
            self.max_attempts
        );
        Ok(BackfillOptions {
            progress_path: self.progress_file.clone(),
            delay: Duration::from_millis(self.delay_ms),
            policy: RetryPolicy {
                max_attempts: self.max_attempts,
                backoff: Duration::from_secs(self.backoff_secs),
            },
            save_every: SAVE_EVERY,
        })
    }
}

/// Backfill ROE for every constituent in `universe_path` and rewrite that file in place.
pub async fn backfill_universe_file(
    universe_path: &Path,
    source: &dyn RoeSource,
    args: &BackfillArgs,
) -> anyhow::Result<BackfillSummary> {
    let opts = args.options()?;
    let universe = UniverseSnapshot::load(universe_path)?;
    let mut progress = BackfillProgress::load_or_default(&opts.progress_path)?;

    tracing::info!(
        universe = %universe_path.display(),
        constituents = universe.len(),
        resumed = progress.len(),
        "ROE backfill starting"
    );

    let summary = run_backfill(&universe, source, &mut progress, &opts).await?;

    let updated = progress.apply(&universe);
    write_universe(universe_path, &updated)?;

    tracing::info!(
        fetched = summary.fetched,
        failed = summary.failed,
        skipped = summary.skipped,
        with_roe = updated.iter().filter(|c| c.roe.is_some()).count(),
        total = updated.len(),
        "ROE backfill complete"
    );
    Ok(summary)
}

fn write_universe(path: &Path, constituents: &[Constituent]) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(constituents).context("serialize universe failed")?;
    std::fs::write(path, text + "\n")
        .with_context(|| format!("write universe file {} failed", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use newhigh_core::fundamentals::backfill::RoeLookup;

    struct FixedSource;

    #[async_trait::async_trait]
    impl RoeSource for FixedSource {
        async fn refresh_credentials(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn fetch_roe(&self, symbol: &str) -> RoeLookup {
            match symbol {
                "MSFT" => RoeLookup::Known(35.1),
                _ => RoeLookup::Unknown,
            }
        }
    }

    struct NoCredentials;

    #[async_trait::async_trait]
    impl RoeSource for NoCredentials {
        async fn refresh_credentials(&self) -> anyhow::Result<()> {
            anyhow::bail!("crumb request failed")
        }

        async fn fetch_roe(&self, _symbol: &str) -> RoeLookup {
            RoeLookup::Unknown
        }
    }

    fn args(dir: &Path) -> BackfillArgs {
        BackfillArgs {
            progress_file: dir.join("progress.json"),
            delay_ms: 0,
            backoff_secs: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    #[tokio::test]
    async fn rewrites_universe_with_backfilled_roe() {
        let dir = tempfile::tempdir().unwrap();
        let universe_path = dir.path().join("constituents.json");
        std::fs::write(
            &universe_path,
            r#"[{"symbol":"MSFT","name":"Microsoft","sector":"Information Technology","roe":null},
                {"symbol":"XYZ","name":"Block","sector":"Financials","roe":4.0}]"#,
        )
        .unwrap();

        let summary = backfill_universe_file(&universe_path, &FixedSource, &args(dir.path()))
            .await
            .unwrap();
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.failed, 1);

        let reloaded = UniverseSnapshot::load(&universe_path).unwrap();
        assert_eq!(reloaded.get("MSFT").and_then(|c| c.roe), Some(35.1));
        assert_eq!(reloaded.get("XYZ").and_then(|c| c.roe), None);
        assert!(dir.path().join("progress.json").exists());
    }

    #[tokio::test]
    async fn credential_failure_leaves_universe_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let universe_path = dir.path().join("constituents.json");
        let before = r#"[{"symbol":"MSFT","name":"Microsoft","sector":"Information Technology","roe":null}]"#;
        std::fs::write(&universe_path, before).unwrap();

        let err = backfill_universe_file(&universe_path, &NoCredentials, &args(dir.path()))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("crumb request failed"));
        assert_eq!(std::fs::read_to_string(&universe_path).unwrap(), before);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let mut a = args(Path::new("."));
        a.max_attempts = 0;
        assert!(a.options().is_err());
    }
}
