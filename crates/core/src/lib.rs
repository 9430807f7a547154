pub mod domain;
pub mod fundamentals;
pub mod ingest;
pub mod screener;

pub mod config {
    use anyhow::Context;

    pub const DEFAULT_UNIVERSE_PATH: &str = "data/constituents.json";

    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub universe_path: Option<String>,
        pub sentry_dsn: Option<String>,
        pub market_data_base_url: Option<String>,
        pub market_data_timeout_secs: Option<u64>,
        pub fundamentals_base_url: Option<String>,
        pub fundamentals_cookie_url: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Self::from_lookup(|key| std::env::var(key).ok())
        }

        /// Build settings from any key lookup. Blank values count as unset.
        pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
            let var = |key: &str| {
                lookup(key)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            };

            let market_data_timeout_secs = var("MARKET_DATA_TIMEOUT_SECS")
                .map(|s| {
                    s.parse::<u64>().with_context(|| {
                        format!("MARKET_DATA_TIMEOUT_SECS must be an integer (got {s:?})")
                    })
                })
                .transpose()?;

            Ok(Self {
                universe_path: var("UNIVERSE_PATH"),
                sentry_dsn: var("SENTRY_DSN"),
                market_data_base_url: var("MARKET_DATA_BASE_URL"),
                market_data_timeout_secs,
                fundamentals_base_url: var("FUNDAMENTALS_BASE_URL"),
                fundamentals_cookie_url: var("FUNDAMENTALS_COOKIE_URL"),
            })
        }

        pub fn universe_path(&self) -> &str {
            self.universe_path
                .as_deref()
                .unwrap_or(DEFAULT_UNIVERSE_PATH)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::collections::HashMap;

        fn settings(vars: &[(&str, &str)]) -> anyhow::Result<Settings> {
            let vars: HashMap<String, String> = vars
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            Settings::from_lookup(|key| vars.get(key).cloned())
        }

        #[test]
        fn blank_values_count_as_unset() {
            let s = settings(&[
                ("MARKET_DATA_TIMEOUT_SECS", ""),
                ("UNIVERSE_PATH", "   "),
                ("SENTRY_DSN", ""),
            ])
            .unwrap();
            assert_eq!(s.market_data_timeout_secs, None);
            assert_eq!(s.universe_path, None);
            assert_eq!(s.universe_path(), DEFAULT_UNIVERSE_PATH);
            assert_eq!(s.sentry_dsn, None);
        }

        #[test]
        fn parses_timeout_and_rejects_garbage() {
            let s = settings(&[("MARKET_DATA_TIMEOUT_SECS", " 15 ")]).unwrap();
            assert_eq!(s.market_data_timeout_secs, Some(15));

            let err = settings(&[("MARKET_DATA_TIMEOUT_SECS", "soon")]).unwrap_err();
            assert!(err.to_string().contains("MARKET_DATA_TIMEOUT_SECS"));
        }
    }
}
