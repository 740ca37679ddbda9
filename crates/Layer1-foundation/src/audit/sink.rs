//! Audit Sink - 감사 기록 출력 경계
//!
//! - `AuditLogger` (SQLite) 는 logger.rs 에서 구현
//! - `TracingAuditSink` 는 구조화 로그 한 줄로 남긴다

use super::types::AuditRecord;
use crate::Result;
use tracing::info;

/// 감사 기록 대상
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &str;

    fn record(&self, record: &AuditRecord) -> Result<()>;
}

/// tracing 으로 기록하는 sink (target = "warden::audit")
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

impl AuditSink for TracingAuditSink {
    fn name(&self) -> &str {
        "tracing"
    }

    fn record(&self, record: &AuditRecord) -> Result<()> {
        info!(
            target: "warden::audit",
            audit_id = %record.id,
            event = %record.event,
            actor = record.actor.as_deref().unwrap_or("system"),
            subject = record.subject.as_deref().unwrap_or("-"),
            old_values = %record.old_values,
            new_values = %record.new_values,
            "Audit: {}",
            record.event
        );
        Ok(())
    }
}
