use std::fmt;

/// Non-success reply from an upstream data source, kept for logs and diagnostics.
#[derive(Debug, Clone)]
pub struct ProviderResponseError {
    pub provider: &'static str,
    pub stage: &'static str,
    pub status: Option<u16>,
    pub detail: String,
}

impl ProviderResponseError {
    pub fn http(provider: &'static str, stage: &'static str, status: u16, body: &str) -> Self {
        Self {
            provider,
            stage,
            status: Some(status),
            detail: truncate(body, 256),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == Some(429)
    }
}

impl fmt::Display for ProviderResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "{} error (stage={}, status={}): {}",
                self.provider, self.stage, status, self.detail
            ),
            None => write!(
                f,
                "{} error (stage={}): {}",
                self.provider, self.stage, self.detail
            ),
        }
    }
}

impl std::error::Error for ProviderResponseError {}

fn truncate(s: &str, max_chars: usize) -> String {
    let trimmed = s.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
