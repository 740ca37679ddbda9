//! Warden Config - 통합 설정
//!
//! 글로벌(~/.config/warden/) + 프로젝트(.warden/) JSON 을 병합하고
//! 환경변수 오버라이드를 적용한다.

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// 설정 파일명
pub const WARDEN_CONFIG_FILE: &str = "warden.json";

/// 캐시 활성화 환경변수
pub const ENV_CACHE_ENABLED: &str = "WARDEN_CACHE_ENABLED";

/// 캐시 TTL(초) 환경변수
pub const ENV_CACHE_TTL: &str = "WARDEN_CACHE_TTL";

// ============================================================================
// Warden Config (통합)
// ============================================================================

/// Warden 통합 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WardenConfig {
    /// 버전 (마이그레이션용)
    #[serde(default = "default_version")]
    pub version: u32,

    /// 권한 판정 캐시
    #[serde(default)]
    pub cache: CacheSettings,

    /// subject 타입 허용 목록
    #[serde(default)]
    pub subjects: SubjectSettings,

    /// 관리 작업 권한 검사
    #[serde(default)]
    pub authorization: AuthorizationSettings,

    /// 감사 로그
    #[serde(default)]
    pub audit: AuditSettings,

    /// 저장소 경로
    #[serde(default)]
    pub storage: StorageSettings,
}

impl WardenConfig {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            ..Default::default()
        }
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드 후 환경변수 적용
    pub fn load() -> Result<Self> {
        let global = JsonStore::global().ok();
        let project = JsonStore::current_project().ok();
        let mut config = Self::load_from(global.as_ref(), project.as_ref())?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 주어진 저장소들에서 로드 (나중 것이 우선)
    pub fn load_from(global: Option<&JsonStore>, project: Option<&JsonStore>) -> Result<Self> {
        let mut merged = Value::Object(Default::default());

        for store in [global, project].into_iter().flatten() {
            if let Some(layer) = store.load_optional::<Value>(WARDEN_CONFIG_FILE)? {
                merge_json(&mut merged, layer);
            }
        }

        serde_json::from_value(merged)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", WARDEN_CONFIG_FILE, e)))
    }

    pub fn save_global(&self) -> Result<()> {
        JsonStore::global()?.save(WARDEN_CONFIG_FILE, self)
    }

    pub fn save_project(&self) -> Result<()> {
        JsonStore::current_project()?.save(WARDEN_CONFIG_FILE, self)
    }

    /// 환경변수 오버라이드 (lookup 은 테스트에서 대체 가능)
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_CACHE_ENABLED) {
            self.cache.enabled = parse_bool(&raw).ok_or_else(|| {
                Error::Config(format!("{} must be a boolean, got '{}'", ENV_CACHE_ENABLED, raw))
            })?;
        }

        if let Some(raw) = lookup(ENV_CACHE_TTL) {
            self.cache.ttl_secs = raw.trim().parse().map_err(|_| {
                Error::Config(format!("{} must be seconds, got '{}'", ENV_CACHE_TTL, raw))
            })?;
        }

        Ok(())
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn with_cache(mut self, cache: CacheSettings) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_allowed_subjects<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subjects.allowed_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_authorization(mut self, authorization: AuthorizationSettings) -> Self {
        self.authorization = authorization;
        self
    }

    pub fn with_audit(mut self, audit: AuditSettings) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage.data_dir = Some(dir.into());
        self
    }
}

/// 객체는 재귀 병합, 그 외 값은 overlay 로 교체
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ============================================================================
// Cache Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 항목 만료 시간 (초)
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// 캐시 키 네임스페이스
    #[serde(default = "default_cache_namespace")]
    pub namespace: String,

    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
            namespace: default_cache_namespace(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl CacheSettings {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

// ============================================================================
// Subject Settings
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSettings {
    /// 허용 subject 타입 (None 이면 모두 허용)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_types: Option<Vec<String>>,
}

// ============================================================================
// Authorization Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationSettings {
    /// false 면 모든 actor 허용
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_super_admin_permission")]
    pub super_admin_permission: String,

    #[serde(default = "default_super_admin_role")]
    pub super_admin_role: String,

    /// 자신이 가진 권한만 부여 가능
    #[serde(default)]
    pub restrict_permission_assignment: bool,

    /// 자신이 가진 역할만 부여 가능
    #[serde(default)]
    pub restrict_role_assignment: bool,
}

impl Default for AuthorizationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            super_admin_permission: default_super_admin_permission(),
            super_admin_role: default_super_admin_role(),
            restrict_permission_assignment: false,
            restrict_role_assignment: false,
        }
    }
}

// ============================================================================
// Audit Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSettings {
    #[serde(default)]
    pub enabled: bool,

    /// 기록할 이벤트 이름 (None 이면 전부)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<String>>,

    /// SQLite 기록
    #[serde(default = "default_true")]
    pub database: bool,

    /// tracing 로그 기록
    #[serde(default)]
    pub log: bool,

    /// 보관 기간 (일, None 이면 무기한)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            events: None,
            database: true,
            log: false,
            retention_days: None,
        }
    }
}

impl AuditSettings {
    /// 이벤트가 기록 대상인지
    pub fn should_audit(&self, event: &str) -> bool {
        if !self.enabled {
            return false;
        }
        match &self.events {
            Some(events) => events.iter().any(|e| e == event),
            None => true,
        }
    }
}

// ============================================================================
// Storage Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSettings {
    /// 데이터 디렉토리 (None 이면 플랫폼 기본값)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_database_file")]
    pub database_file: String,

    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            database_file: default_database_file(),
            audit_file: default_audit_file(),
        }
    }
}

impl StorageSettings {
    /// 실제 데이터 디렉토리
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_local_dir()
            .map(|dir| dir.join("warden"))
            .ok_or_else(|| Error::Config("Cannot find data directory".to_string()))
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join(&self.database_file))
    }

    pub fn audit_path(&self) -> Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join(&self.audit_file))
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_cache_namespace() -> String {
    "warden.permissions".to_string()
}

fn default_cache_max_entries() -> usize {
    10_000
}

fn default_super_admin_permission() -> String {
    "warden.manage".to_string()
}

fn default_super_admin_role() -> String {
    "super-admin".to_string()
}

fn default_database_file() -> String {
    "warden.db".to_string()
}

fn default_audit_file() -> String {
    "audit.db".to_string()
}
