//! Subject Policy - 연결을 만들 수 있는 subject 타입 allow-list
//!
//! `warden.role` 은 역할 보유자 전용 예약 타입이라 항상 거부한다.

use std::collections::BTreeSet;
use warden_foundation::{Error, Result, SubjectRef, SubjectSettings, ROLE_OWNER_TYPE};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectPolicy {
    /// None 이면 모든 타입 허용
    allowed: Option<BTreeSet<String>>,
}

impl SubjectPolicy {
    pub fn allow_any() -> Self {
        Self { allowed: None }
    }

    pub fn allow_only<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: Some(types.into_iter().map(Into::into).collect()),
        }
    }

    pub fn from_settings(settings: &SubjectSettings) -> Self {
        match &settings.allowed_types {
            Some(types) => Self::allow_only(types.iter().cloned()),
            None => Self::allow_any(),
        }
    }

    pub fn is_allowed(&self, subject_type: &str) -> bool {
        if subject_type.trim().is_empty() || subject_type == ROLE_OWNER_TYPE {
            return false;
        }
        match &self.allowed {
            Some(allowed) => allowed.contains(subject_type),
            None => true,
        }
    }

    pub fn check(&self, subject: &SubjectRef) -> Result<()> {
        if subject.subject_id.trim().is_empty() {
            return Err(Error::InvalidArgument(format!(
                "Subject id cannot be empty (type '{}')",
                subject.subject_type
            )));
        }
        if !self.is_allowed(&subject.subject_type) {
            return Err(Error::InvalidArgument(format!(
                "Subject type '{}' is not allowed to hold roles or permissions",
                subject.subject_type
            )));
        }
        Ok(())
    }

    pub fn allowed_types(&self) -> Option<Vec<&str>> {
        self.allowed
            .as_ref()
            .map(|set| set.iter().map(String::as_str).collect())
    }
}
