// SPDX-License-Identifier: MIT
//! Runtime configuration (`gigd.toml`).
//!
//! Everything has a sensible default so the core boots with no config file
//! at all; a TOML file overrides individual sections.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_INITIAL_MS: u64 = 250;
const DEFAULT_RETRY_MAX_MS: u64 = 10_000;

// ─── RetrySettings ───────────────────────────────────────────────────────────

/// Backoff tuning for transient store / upload failures (`[retry]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            initial_delay_ms: DEFAULT_RETRY_INITIAL_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_MS,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> crate::retry::RetryConfig {
        crate::retry::RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: 2.0,
        }
    }
}

// ─── MessagingSettings ───────────────────────────────────────────────────────

/// Messaging behavior (`[messaging]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MessagingSettings {
    /// Keep writing the deprecated per-task message mirror. The mirror write
    /// happens inside the same transaction as the canonical thread write, so
    /// the two representations can never diverge. Default: true while the
    /// migration period lasts.
    pub mirror_task_messages: bool,
    /// Mirror status transitions into the chat as system messages so old
    /// clients that only read the chat still see progress. Default: true.
    pub mirror_status_messages: bool,
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            mirror_task_messages: true,
            mirror_status_messages: true,
        }
    }
}

// ─── CoreConfig ──────────────────────────────────────────────────────────────

/// Top-level configuration for the coordination core.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CoreConfig {
    pub retry: RetrySettings,
    pub messaging: MessagingSettings,
}

impl CoreConfig {
    /// Load from a TOML file. A missing file yields defaults; a malformed
    /// file is reported and also falls back to defaults rather than
    /// refusing to start.
    pub async fn load(path: &Path) -> Self {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match toml::from_str(&raw) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), err = %e, "malformed config, using defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_mirrors() {
        let cfg = CoreConfig::default();
        assert!(cfg.messaging.mirror_task_messages);
        assert!(cfg.messaging.mirror_status_messages);
        assert_eq!(cfg.retry.max_attempts, 3);
    }

    #[test]
    fn partial_toml_overrides_one_section() {
        let cfg: CoreConfig =
            toml::from_str("[messaging]\nmirror_task_messages = false\n").unwrap();
        assert!(!cfg.messaging.mirror_task_messages);
        assert!(cfg.messaging.mirror_status_messages);
        assert_eq!(cfg.retry.max_attempts, 3);
    }
}
