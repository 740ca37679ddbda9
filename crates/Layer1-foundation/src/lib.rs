//! # warden-foundation
//!
//! Foundation layer for Warden:
//! - Model: Subject, Permission, Role, Context, 연결 primitive
//! - Storage: RbacStore (영속성 경계), SQLite 구현, JsonStore (설정)
//! - Config: 통합 설정 (WardenConfig)
//! - Event: 권한 변경 이벤트 버스
//! - Audit: 감사 기록 (SQLite, tracing)
//! - Cache: 권한 판정 캐시
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  warden-core (Warden, PermissionEngine, GrantStore)     │
//! │                     │                                   │
//! │          ┌──────────┼───────────────┐                   │
//! │          ▼          ▼               ▼                   │
//! │     RbacStore    EventBus    ResolutionCache            │
//! │     (SQLite)        │                                   │
//! │                     ▼                                   │
//! │             AuditEventListener ──► AuditSink            │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod audit;
pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Model (데이터 모델)
// ============================================================================
pub use model::{
    Context, ContextId, ContextScope, EntityRef, GrantHolder, GrantKind, NewPermission, NewRole,
    OwnerKey, Permission, PermissionId, Role, RoleId, SubjectRef, SyncDelta, ROLE_OWNER_TYPE,
};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    AuditSettings, AuthorizationSettings, CacheSettings, StorageSettings, SubjectSettings,
    WardenConfig, WARDEN_CONFIG_FILE,
};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{JsonStore, RbacStore, SqliteStore};

// ============================================================================
// Event (이벤트 시스템)
// ============================================================================
pub use event::{
    EventBus, EventBusConfig, EventCategory, EventFilter, EventId, EventListener, GrantEvent,
    GrantEventKind, ListenerId,
};

// ============================================================================
// Audit (감사 로깅)
// ============================================================================
pub use audit::{
    AuditEventListener, AuditId, AuditLogger, AuditLoggerConfig, AuditQuery, AuditRecord,
    AuditSink, AuditStatistics, TracingAuditSink,
};

// ============================================================================
// Cache (판정 캐시)
// ============================================================================
pub use cache::{CacheKey, CacheStats, ResolutionCache};
