//! Grant primitives - 연결 종류, context 범위, 동기화 결과

use super::entity::ContextId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;

/// 연결 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    /// 보유자 -> 권한 (context 범위 있음)
    Permission,
    /// 보유자 -> 역할 (범위는 역할 자신의 context)
    Role,
}

impl GrantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantKind::Permission => "permission",
            GrantKind::Role => "role",
        }
    }
}

/// 조회/삭제 시 context 필터
///
/// `Exact(None)` 은 context 없는 행만 의미한다. 모든 context 는 `Any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextScope {
    Exact(Option<ContextId>),
    Any,
}

impl ContextScope {
    pub fn unscoped() -> Self {
        ContextScope::Exact(None)
    }

    pub fn matches(&self, context_id: Option<ContextId>) -> bool {
        match self {
            ContextScope::Exact(expected) => *expected == context_id,
            ContextScope::Any => true,
        }
    }
}

impl From<Option<ContextId>> for ContextScope {
    fn from(context_id: Option<ContextId>) -> Self {
        ContextScope::Exact(context_id)
    }
}

/// 동기화 결과 (추가/제거된 대상)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDelta<T> {
    pub attached: Vec<T>,
    pub detached: Vec<T>,
}

impl<T> Default for SyncDelta<T> {
    fn default() -> Self {
        Self {
            attached: Vec::new(),
            detached: Vec::new(),
        }
    }
}

impl<T: Copy + Eq + Hash> SyncDelta<T> {
    /// attached = desired - current, detached = current - desired (입력 순서 유지)
    pub fn compute(current: &[T], desired: &[T]) -> Self {
        let current_set: HashSet<T> = current.iter().copied().collect();
        let desired_set: HashSet<T> = desired.iter().copied().collect();

        let mut seen = HashSet::new();
        let attached = desired
            .iter()
            .copied()
            .filter(|t| !current_set.contains(t) && seen.insert(*t))
            .collect();
        let detached = current
            .iter()
            .copied()
            .filter(|t| !desired_set.contains(t))
            .collect();

        Self { attached, detached }
    }
}

impl<T> SyncDelta<T> {
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty()
    }

    pub fn map<U>(self, f: impl Fn(T) -> U) -> SyncDelta<U> {
        SyncDelta {
            attached: self.attached.into_iter().map(&f).collect(),
            detached: self.detached.into_iter().map(&f).collect(),
        }
    }
}
