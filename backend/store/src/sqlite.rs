//! SQLite-backed template store and learning queue.
//!
//! Uses `rusqlite` with JSON columns for the nested pattern structures.
//! Template and merchant rows are upserted whole, so a crash mid-promotion
//! leaves either the old or the new template, never a hybrid. Learning
//! records flip `processed` exactly once; reprocessing a batch after a
//! crash is safe because promotion dedupes by exact regex.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use slipguard_core::{
    IssuerTemplate, LearningQueue, LearningRecord, MerchantPatternSet, SlipError, TemplateStore,
};

const SCHEMA: &str = r#"
PRAGMA journal_mode=WAL;
CREATE TABLE IF NOT EXISTS issuer_templates (
    issuer_code   TEXT PRIMARY KEY,
    template_json TEXT NOT NULL,
    last_updated  INTEGER NOT NULL,
    source        TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS merchant_patterns (
    tenant_id     TEXT NOT NULL,
    issuer_code   TEXT NOT NULL,
    patterns_json TEXT NOT NULL,
    updated_at    INTEGER NOT NULL,
    PRIMARY KEY (tenant_id, issuer_code)
);
CREATE TABLE IF NOT EXISTS learning_queue (
    id            TEXT PRIMARY KEY,
    issuer_code   TEXT NOT NULL,
    tenant_id     TEXT NOT NULL,
    merchant_id   TEXT,
    ocr_text      TEXT NOT NULL,
    verified_json TEXT NOT NULL,
    patterns_json TEXT NOT NULL,
    confidence    REAL NOT NULL,
    learned_at    INTEGER NOT NULL,
    processed     INTEGER NOT NULL DEFAULT 0,
    processed_at  INTEGER
);
CREATE INDEX IF NOT EXISTS idx_queue_unprocessed ON learning_queue(processed, learned_at);
"#;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .context("failed to open SlipGuard database")?;
        conn.execute_batch(SCHEMA)
            .context("failed to initialize SlipGuard schema")?;
        info!("SqliteStore opened at {:?}", path.as_ref());
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (for tests).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Issuer codes with a stored template, for the operator surface.
    pub async fn list_issuer_codes(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT issuer_code FROM issuer_templates ORDER BY issuer_code")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut codes = Vec::new();
        for row in rows {
            codes.push(row?);
        }
        Ok(codes)
    }
}

#[async_trait]
impl TemplateStore for SqliteStore {
    async fn find(&self, issuer_code: &str) -> Result<Option<IssuerTemplate>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT template_json FROM issuer_templates WHERE issuer_code = ?1",
        )?;
        let json: Option<String> = stmt
            .query_row(params![issuer_code], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        match json {
            Some(json) => {
                let template = serde_json::from_str(&json)
                    .with_context(|| format!("corrupt template row for issuer {issuer_code}"))?;
                Ok(Some(template))
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, template: &IssuerTemplate) -> Result<()> {
        let conn = self.conn.lock().await;
        let json = serde_json::to_string(template)?;
        conn.execute(
            "INSERT OR REPLACE INTO issuer_templates (issuer_code, template_json, last_updated, source)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                template.issuer_code,
                json,
                template.last_updated.timestamp(),
                template.update_source.as_str(),
            ],
        )?;
        debug!(issuer = %template.issuer_code, patterns = template.patterns.len(), "template upserted");
        Ok(())
    }

    async fn find_merchant(
        &self,
        tenant_id: &str,
        issuer_code: &str,
    ) -> Result<Option<MerchantPatternSet>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT patterns_json FROM merchant_patterns WHERE tenant_id = ?1 AND issuer_code = ?2",
        )?;
        let json: Option<String> = stmt
            .query_row(params![tenant_id, issuer_code], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json).with_context(|| {
                format!("corrupt merchant row for tenant {tenant_id} issuer {issuer_code}")
            })?)),
            None => Ok(None),
        }
    }

    async fn upsert_merchant(&self, set: &MerchantPatternSet) -> Result<()> {
        let conn = self.conn.lock().await;
        let json = serde_json::to_string(set)?;
        conn.execute(
            "INSERT OR REPLACE INTO merchant_patterns (tenant_id, issuer_code, patterns_json, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![set.tenant_id, set.issuer_code, json, set.updated_at.timestamp()],
        )?;
        Ok(())
    }
}

#[async_trait]
impl LearningQueue for SqliteStore {
    async fn enqueue(&self, record: &LearningRecord) -> Result<()> {
        if record.tenant_id.trim().is_empty() {
            // Defense at the storage boundary too; the record constructor
            // already rejects this.
            warn!(
                issuer = %record.issuer_code,
                security = true,
                "refusing to persist learning record without tenant id"
            );
            return Err(SlipError::MissingTenant(record.issuer_code.clone()).into());
        }
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO learning_queue
             (id, issuer_code, tenant_id, merchant_id, ocr_text, verified_json, patterns_json,
              confidence, learned_at, processed, processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, NULL)",
            params![
                record.id.to_string(),
                record.issuer_code,
                record.tenant_id,
                record.merchant_id,
                record.ocr_text,
                serde_json::to_string(&record.verified_data)?,
                serde_json::to_string(&record.extracted_patterns)?,
                record.verification_confidence,
                record.learned_at.timestamp(),
            ],
        )?;
        debug!(issuer = %record.issuer_code, id = %record.id, "learning record enqueued");
        Ok(())
    }

    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<LearningRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, issuer_code, tenant_id, merchant_id, ocr_text, verified_json,
                    patterns_json, confidence, learned_at
             FROM learning_queue WHERE processed = 0
             ORDER BY learned_at ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, f64>(7)?,
                row.get::<_, i64>(8)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, issuer_code, tenant_id, merchant_id, ocr_text, verified, patterns, confidence, learned_at) =
                row?;
            records.push(LearningRecord {
                id: Uuid::parse_str(&id).context("corrupt record id")?,
                issuer_code,
                tenant_id,
                merchant_id,
                ocr_text,
                verified_data: serde_json::from_str(&verified)?,
                extracted_patterns: serde_json::from_str(&patterns)?,
                verification_confidence: confidence,
                learned_at: timestamp(learned_at),
                processed: false,
                processed_at: None,
            });
        }
        Ok(records)
    }

    async fn mark_processed(&self, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        let now = Utc::now().timestamp();
        let tx = conn.transaction()?;
        for id in ids {
            tx.execute(
                "UPDATE learning_queue SET processed = 1, processed_at = ?1 WHERE id = ?2",
                params![now, id.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn purge_processed(&self, older_than_days: i64) -> Result<usize> {
        let conn = self.conn.lock().await;
        let cutoff = Utc::now().timestamp() - older_than_days * 86_400;
        let n = conn.execute(
            "DELETE FROM learning_queue WHERE processed = 1 AND processed_at < ?1",
            params![cutoff],
        )?;
        if n > 0 {
            info!(purged = n, "retention sweep removed processed learning records");
        }
        Ok(n)
    }

    async fn depth(&self) -> Result<(usize, usize)> {
        let conn = self.conn.lock().await;
        let unprocessed: i64 = conn.query_row(
            "SELECT COUNT(*) FROM learning_queue WHERE processed = 0",
            [],
            |row| row.get(0),
        )?;
        let processed: i64 = conn.query_row(
            "SELECT COUNT(*) FROM learning_queue WHERE processed = 1",
            [],
            |row| row.get(0),
        )?;
        Ok((unprocessed as usize, processed as usize))
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}
