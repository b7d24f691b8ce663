// SPDX-License-Identifier: MIT
//! Earnings ledger, completed-task counter and badge grants.
//!
//! The ledger is a seam: production deployments may point it at an external
//! stats service, while the bundled SQLite implementation keeps the counters
//! in the `user_stats` table. Badge grants are idempotent — the grant checks
//! current state before writing and never duplicates.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{CoreError, Result};
use crate::storage::{now_ms, with_timeout};

/// Badge thresholds on the completed-task counter.
const BADGE_THRESHOLDS: [(i64, &str); 2] = [(1, "First Task"), (5, "Task Master")];

/// Outcome of crediting a completion.
#[derive(Debug, Clone)]
pub struct CompletionCredit {
    pub tasks_completed: i64,
    pub total_earnings: f64,
    /// Badges granted by this credit, in threshold order. Empty when no
    /// threshold was crossed (or the badge already existed).
    pub new_badges: Vec<String>,
}

/// External stats/ledger collaborator.
#[async_trait]
pub trait StatsLedger: Send + Sync {
    /// Credit `price` to the performer and bump the completed counter by
    /// one; grant any newly crossed badge thresholds, idempotently.
    async fn credit_completion(&self, user_id: &str, price: f64) -> Result<CompletionCredit>;
}

// ─── SQLite implementation ───────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct StatsRow {
    tasks_completed: i64,
    total_earnings: f64,
    badges: String,
}

#[derive(Clone)]
pub struct SqliteStats {
    pool: SqlitePool,
}

impl SqliteStats {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Current badge list for a user (empty when no stats row exists yet).
    pub async fn badges(&self, user_id: &str) -> Result<Vec<String>> {
        let raw: Option<String> = with_timeout(async {
            sqlx::query_scalar("SELECT badges FROM user_stats WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(CoreError::from)
        })
        .await?;
        Ok(raw
            .map(|s| serde_json::from_str(&s).unwrap_or_default())
            .unwrap_or_default())
    }
}

#[async_trait]
impl StatsLedger for SqliteStats {
    async fn credit_completion(&self, user_id: &str, price: f64) -> Result<CompletionCredit> {
        let mut tx = self.pool.begin().await.map_err(CoreError::from)?;
        let now = now_ms();

        // Upsert-then-read keeps the increment atomic under SQLite's
        // single-writer transaction.
        sqlx::query(
            "INSERT INTO user_stats (user_id, tasks_completed, total_earnings, updated_at)
             VALUES (?, 1, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 tasks_completed = tasks_completed + 1,
                 total_earnings  = total_earnings + excluded.total_earnings,
                 updated_at      = excluded.updated_at",
        )
        .bind(user_id)
        .bind(price)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let row: StatsRow = sqlx::query_as(
            "SELECT tasks_completed, total_earnings, badges FROM user_stats WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut badges: Vec<String> = serde_json::from_str(&row.badges).unwrap_or_default();
        let mut new_badges = Vec::new();
        for (threshold, name) in BADGE_THRESHOLDS {
            if row.tasks_completed >= threshold && !badges.iter().any(|b| b == name) {
                badges.push(name.to_string());
                new_badges.push(name.to_string());
            }
        }

        if !new_badges.is_empty() {
            let encoded = serde_json::to_string(&badges)
                .map_err(|e| CoreError::InvalidMessage(e.to_string()))?;
            sqlx::query("UPDATE user_stats SET badges = ?, updated_at = ? WHERE user_id = ?")
                .bind(&encoded)
                .bind(now)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await.map_err(CoreError::from)?;

        info!(
            user_id,
            price,
            tasks_completed = row.tasks_completed,
            new_badges = ?new_badges,
            "completion credited"
        );
        Ok(CompletionCredit {
            tasks_completed: row.tasks_completed,
            total_earnings: row.total_earnings,
            new_badges,
        })
    }
}
