//! Audit System - 감사 로깅 시스템
//!
//! 권한/역할 부여, 회수, 동기화, 계층 변경, 엔티티 변경을 기록합니다.
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  EventBus ──► AuditEventListener (events allow-list)         │
//! │                     │                                       │
//! │          ┌──────────┴──────────┐                            │
//! │          ▼                     ▼                            │
//! │   AuditLogger (SQLite)   TracingAuditSink (log)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 사용법
//!
//! ```ignore
//! use warden_foundation::audit::{AuditEventListener, AuditLogger, AuditQuery};
//!
//! let logger = Arc::new(AuditLogger::in_memory()?);
//! Arc::new(AuditEventListener::new(settings).with_sink(logger.clone())).register(&bus);
//!
//! let entries = logger.query(&AuditQuery::new().with_events(["role.assigned"]))?;
//! let removed = logger.cleanup(90)?;
//! ```

pub mod logger;
pub mod sink;
pub mod types;

pub use logger::{AuditEventListener, AuditLogger, AuditLoggerConfig};
pub use sink::{AuditSink, TracingAuditSink};
pub use types::{AuditId, AuditQuery, AuditRecord, AuditStatistics};
