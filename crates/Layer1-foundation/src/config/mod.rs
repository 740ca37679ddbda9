//! Config - 통합 설정 관리
//!
//! - `warden.rs` - WardenConfig 통합 설정 (cache, subjects, authorization, audit, storage)

mod warden;

pub use warden::{
    AuditSettings, AuthorizationSettings, CacheSettings, StorageSettings, SubjectSettings,
    WardenConfig, ENV_CACHE_ENABLED, ENV_CACHE_TTL, WARDEN_CONFIG_FILE,
};
