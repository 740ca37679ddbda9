//! Error types for Warden
//!
//! 모든 에러를 중앙에서 관리

use std::collections::BTreeMap;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Warden 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 입력 관련
    // ========================================================================
    /// 잘못된 인자 (알 수 없는 이름, 잘못된 context, 허용되지 않은 subject 타입)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 이름/설정 검증 실패 (field -> reason)
    #[error("Validation failed: {}", describe_fields(.fields))]
    Validation { fields: BTreeMap<String, String> },

    // ========================================================================
    // 역할 계층 관련
    // ========================================================================
    #[error("Circular dependency: role '{parent}' cannot inherit from '{child}'")]
    CircularDependency { parent: String, child: String },

    #[error("Self reference: role '{0}' cannot inherit from itself")]
    SelfReference(String),

    // ========================================================================
    // 권한 관련
    // ========================================================================
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    // ========================================================================
    // 엔티티 관련
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // ========================================================================
    // 설정 / 저장소
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

fn describe_fields(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(field, reason)| format!("{}: {}", field, reason))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// 단일 필드 검증 에러 생성
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.into(), reason.into());
        Error::Validation { fields }
    }

    /// 검증 실패 필드 목록 (Validation 이 아니면 None)
    pub fn fields(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Error::Validation { fields } => Some(fields),
            _ => None,
        }
    }

    /// 배치 작업에서 건너뛰고 계속 진행할 수 있는 에러인지
    pub fn is_batch_skippable(&self) -> bool {
        matches!(self, Error::InvalidArgument(_) | Error::Validation { .. })
    }

    /// 사용자에게 보여줄 에러인지
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_)
                | Error::Validation { .. }
                | Error::CircularDependency { .. }
                | Error::SelfReference(_)
                | Error::AuthorizationDenied(_)
                | Error::NotFound(_)
                | Error::AlreadyExists(_)
                | Error::Config(_)
        )
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
