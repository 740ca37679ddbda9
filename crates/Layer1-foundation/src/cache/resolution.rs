//! Resolution Cache - 권한 판정 결과 캐시
//!
//! 키: (namespace, subject_type, subject_id, permission, context_id)
//!
//! 무효화 시 generation 을 올린다. 계산 시작 후 generation 이 바뀌었으면
//! 결과를 저장하지 않으므로, 쓰기와 경쟁한 읽기가 오래된 값을 남기지 않는다.

use super::ttl::TtlCache;
use crate::config::CacheSettings;
use crate::model::{ContextId, SubjectRef};
use crate::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// 캐시 키
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub namespace: String,
    pub subject_type: String,
    pub subject_id: String,
    pub permission: String,
    pub context_id: Option<ContextId>,
}

impl CacheKey {
    pub fn new(
        namespace: impl Into<String>,
        subject: &SubjectRef,
        permission: impl Into<String>,
        context_id: Option<ContextId>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            subject_type: subject.subject_type.clone(),
            subject_id: subject.subject_id.clone(),
            permission: permission.into(),
            context_id,
        }
    }

    fn belongs_to(&self, subject: &SubjectRef) -> bool {
        self.subject_type == subject.subject_type && self.subject_id == subject.subject_id
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let context = self
            .context_id
            .map(|c| c.0.to_string())
            .unwrap_or_else(|| "null".to_string());
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.namespace, self.subject_type, self.subject_id, self.permission, context
        )
    }
}

/// 캐시 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub entries: usize,
}

/// 권한 판정 캐시
pub struct ResolutionCache {
    namespace: String,
    entries: Mutex<TtlCache<CacheKey, bool>>,
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl ResolutionCache {
    pub fn new(namespace: impl Into<String>, ttl: Duration, max_entries: usize) -> Self {
        Self {
            namespace: namespace.into(),
            entries: Mutex::new(TtlCache::new(max_entries, ttl)),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// 설정에서 생성 (비활성화면 None)
    pub fn from_settings(settings: &CacheSettings) -> Option<Self> {
        settings
            .enabled
            .then(|| Self::new(&settings.namespace, settings.ttl(), settings.max_entries))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(
        &self,
        subject: &SubjectRef,
        permission: &str,
        context_id: Option<ContextId>,
    ) -> CacheKey {
        CacheKey::new(&self.namespace, subject, permission, context_id)
    }

    pub fn get(&self, key: &CacheKey) -> Option<bool> {
        let value = self.entries.lock().get(key);
        match value {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        value
    }

    /// 캐시 조회, 없으면 계산 후 저장 (계산 중 무효화가 있었으면 저장 생략)
    pub fn get_or_try_insert_with<F>(&self, key: CacheKey, compute: F) -> Result<bool>
    where
        F: FnOnce() -> Result<bool>,
    {
        if let Some(value) = self.get(&key) {
            trace!(key = %key, "Resolution cache hit");
            return Ok(value);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let value = compute()?;

        let mut entries = self.entries.lock();
        if self.generation.load(Ordering::Acquire) == generation {
            entries.insert(key, value);
        } else {
            debug!(key = %key, "Skipping cache fill after concurrent invalidation");
        }
        Ok(value)
    }

    /// subject 의 모든 항목 제거
    pub fn invalidate_subject(&self, subject: &SubjectRef) -> usize {
        let mut entries = self.entries.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        let removed = entries.retain(|key| !key.belongs_to(subject));
        debug!(subject = %subject, removed, "Resolution cache invalidated for subject");
        removed
    }

    /// 네임스페이스 전체 제거
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        entries.clear();
        debug!(namespace = %self.namespace, "Resolution cache flushed");
    }

    pub fn cleanup_expired(&self) -> usize {
        self.entries.lock().cleanup_expired()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.entries.lock().len(),
        }
    }
}
