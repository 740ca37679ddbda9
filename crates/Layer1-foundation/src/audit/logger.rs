//! Audit Logger - 감사 로그 기록 및 관리
//!
//! 감사 기록을 SQLite 에 저장/조회하고, EventBus 이벤트를 감사 기록으로 변환한다.

use super::sink::{AuditSink, TracingAuditSink};
use super::types::{AuditId, AuditQuery, AuditRecord, AuditStatistics};
use crate::config::{AuditSettings, StorageSettings};
use crate::event::{EventBus, EventListener, GrantEvent, ListenerId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

// ============================================================================
// AuditLogger
// ============================================================================

/// 감사 로거 설정
#[derive(Debug, Clone)]
pub struct AuditLoggerConfig {
    /// 데이터베이스 경로
    pub db_path: PathBuf,

    /// 보관 기간 (일, None 이면 무기한)
    pub retention_days: Option<u32>,
}

impl Default for AuditLoggerConfig {
    fn default() -> Self {
        let db_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("warden")
            .join("audit.db");

        Self {
            db_path,
            retention_days: None,
        }
    }
}

impl AuditLoggerConfig {
    pub fn from_settings(storage: &StorageSettings, audit: &AuditSettings) -> Result<Self> {
        Ok(Self {
            db_path: storage.audit_path()?,
            retention_days: audit.retention_days,
        })
    }
}

/// SQLite 감사 로거
///
/// ```ignore
/// use warden_foundation::audit::{AuditLogger, AuditQuery, AuditRecord};
///
/// let logger = AuditLogger::in_memory()?;
/// logger.log(&AuditRecord::new("permission.assigned").with_subject("user:1"))?;
///
/// let entries = logger.query(&AuditQuery::new().with_subject("user:1").with_limit(10))?;
/// ```
pub struct AuditLogger {
    db: Mutex<Connection>,
    config: AuditLoggerConfig,
}

impl AuditLogger {
    pub fn new() -> Result<Self> {
        Self::with_config(AuditLoggerConfig::default())
    }

    pub fn with_config(config: AuditLoggerConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.db_path)?;
        let logger = Self {
            db: Mutex::new(conn),
            config,
        };
        logger.init_tables()?;

        info!(
            db_path = %logger.config.db_path.display(),
            "Audit logger initialized"
        );
        Ok(logger)
    }

    /// 인메모리 로거 생성 (테스트용)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let logger = Self {
            db: Mutex::new(conn),
            config: AuditLoggerConfig {
                db_path: PathBuf::from(":memory:"),
                retention_days: None,
            },
        };
        logger.init_tables()?;
        Ok(logger)
    }

    fn init_tables(&self) -> Result<()> {
        let db = self.db.lock();

        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audits (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                event TEXT NOT NULL,
                actor TEXT,
                subject TEXT,
                old_values TEXT,
                new_values TEXT,
                metadata TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audits_timestamp ON audits(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audits_event ON audits(event);
            CREATE INDEX IF NOT EXISTS idx_audits_subject ON audits(subject);
            CREATE INDEX IF NOT EXISTS idx_audits_actor ON audits(actor);
            "#,
        )?;

        Ok(())
    }

    /// 감사 기록 저장
    pub fn log(&self, record: &AuditRecord) -> Result<AuditId> {
        let db = self.db.lock();

        db.execute(
            r#"
            INSERT INTO audits (id, timestamp, event, actor, subject, old_values, new_values, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.id.0,
                record.timestamp.to_rfc3339(),
                record.event,
                record.actor,
                record.subject,
                encode(&record.old_values)?,
                encode(&record.new_values)?,
                encode(&record.metadata)?,
            ],
        )?;

        debug!(
            audit_id = %record.id,
            event = %record.event,
            "Audit entry logged"
        );
        Ok(record.id.clone())
    }

    /// ID로 조회
    pub fn get(&self, id: &AuditId) -> Result<Option<AuditRecord>> {
        let db = self.db.lock();
        let record = db
            .query_row(
                "SELECT id, timestamp, event, actor, subject, old_values, new_values, metadata
                 FROM audits WHERE id = ?1",
                params![id.0],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// 조건 조회 (최신순)
    pub fn query(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>> {
        let db = self.db.lock();

        let mut sql = String::from(
            "SELECT id, timestamp, event, actor, subject, old_values, new_values, metadata
             FROM audits WHERE 1=1",
        );
        let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(ref events) = query.events {
            let placeholders: Vec<&str> = events.iter().map(|_| "?").collect();
            sql.push_str(&format!(" AND event IN ({})", placeholders.join(", ")));
            for event in events {
                params_vec.push(Box::new(event.clone()));
            }
        }

        if let Some(ref actor) = query.actor {
            sql.push_str(" AND actor = ?");
            params_vec.push(Box::new(actor.clone()));
        }

        if let Some(ref subject) = query.subject {
            sql.push_str(" AND subject = ?");
            params_vec.push(Box::new(subject.clone()));
        }

        if let Some(ref from) = query.from {
            sql.push_str(" AND timestamp >= ?");
            params_vec.push(Box::new(from.to_rfc3339()));
        }
        if let Some(ref to) = query.to {
            sql.push_str(" AND timestamp <= ?");
            params_vec.push(Box::new(to.to_rfc3339()));
        }

        sql.push_str(" ORDER BY timestamp DESC, rowid DESC");

        // OFFSET 은 LIMIT 이 있어야 함
        match (query.limit, query.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }

        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let mut stmt = db.prepare(&sql)?;
        let records = stmt
            .query_map(params_refs.as_slice(), row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// 최근 기록
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        self.query(&AuditQuery::new().with_limit(limit))
    }

    /// 통계
    pub fn statistics(&self) -> Result<AuditStatistics> {
        let db = self.db.lock();

        let (total_entries, first, last): (u64, Option<String>, Option<String>) = db.query_row(
            "SELECT COUNT(*), MIN(timestamp), MAX(timestamp) FROM audits",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let mut by_event = std::collections::HashMap::new();
        let mut stmt = db.prepare("SELECT event, COUNT(*) FROM audits GROUP BY event")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let event: String = row.get(0)?;
            let count: u64 = row.get(1)?;
            by_event.insert(event, count);
        }

        Ok(AuditStatistics {
            total_entries,
            by_event,
            period_start: first.as_deref().and_then(parse_timestamp),
            period_end: last.as_deref().and_then(parse_timestamp),
        })
    }

    /// `days` 일보다 오래된 기록 삭제
    pub fn cleanup(&self, days: u32) -> Result<u64> {
        let db = self.db.lock();

        let cutoff = Utc::now() - chrono::Duration::days(days as i64);
        let deleted = db.execute(
            "DELETE FROM audits WHERE timestamp < ?1",
            params![cutoff.to_rfc3339()],
        )?;

        if deleted > 0 {
            info!(deleted = deleted, days = days, "Cleaned up old audit entries");
        }
        Ok(deleted as u64)
    }

    /// 설정된 보관 기간 적용 (보관 기간이 없으면 0)
    pub fn prune_expired(&self) -> Result<u64> {
        match self.config.retention_days {
            Some(days) => self.cleanup(days),
            None => Ok(0),
        }
    }

    pub fn count(&self) -> Result<u64> {
        let db = self.db.lock();
        Ok(db.query_row("SELECT COUNT(*) FROM audits", [], |row| row.get(0))?)
    }
}

impl AuditSink for AuditLogger {
    fn name(&self) -> &str {
        "database"
    }

    fn record(&self, record: &AuditRecord) -> Result<()> {
        self.log(record).map(|_| ())
    }
}

fn encode(value: &Value) -> Result<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(value)?))
}

fn decode(row: &Row<'_>, idx: usize) -> rusqlite::Result<Value> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) => serde_json::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(Value::Null),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<AuditRecord> {
    let timestamp: String = row.get(1)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    Ok(AuditRecord {
        id: AuditId(row.get(0)?),
        timestamp,
        event: row.get(2)?,
        actor: row.get(3)?,
        subject: row.get(4)?,
        old_values: decode(row, 5)?,
        new_values: decode(row, 6)?,
        metadata: decode(row, 7)?,
    })
}

// ============================================================================
// EventBus 연동
// ============================================================================

/// 이벤트를 감사 기록으로 변환해 sink 들에 전달
///
/// sink 실패는 로그로 남기고 삼킨다.
pub struct AuditEventListener {
    settings: AuditSettings,
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl AuditEventListener {
    pub fn new(settings: AuditSettings) -> Self {
        Self {
            settings,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// 설정에 따라 sink 구성 (비활성화면 None)
    pub fn from_settings(audit: &AuditSettings, storage: &StorageSettings) -> Result<Option<Self>> {
        if !audit.enabled {
            return Ok(None);
        }

        let mut listener = Self::new(audit.clone());
        if audit.database {
            let logger = AuditLogger::with_config(AuditLoggerConfig::from_settings(storage, audit)?)?;
            logger.prune_expired()?;
            listener = listener.with_sink(Arc::new(logger));
        }
        if audit.log {
            listener = listener.with_sink(Arc::new(TracingAuditSink::new()));
        }

        if listener.sinks.is_empty() {
            return Err(Error::Config(
                "audit is enabled but no audit driver is configured".to_string(),
            ));
        }
        Ok(Some(listener))
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// EventBus 에 등록
    pub fn register(self: Arc<Self>, bus: &EventBus) -> ListenerId {
        bus.subscribe(self)
    }
}

impl EventListener for AuditEventListener {
    fn name(&self) -> &str {
        "audit"
    }

    fn on_event(&self, event: &GrantEvent) -> Result<()> {
        if !self.settings.should_audit(event.name()) {
            return Ok(());
        }

        let record = AuditRecord::from_event(event);
        for sink in &self.sinks {
            if let Err(e) = sink.record(&record) {
                error!(
                    sink = sink.name(),
                    event = %record.event,
                    error = %e,
                    "Failed to write audit record"
                );
            }
        }
        Ok(())
    }
}
