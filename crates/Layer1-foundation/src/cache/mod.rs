//! # Warden Cache
//!
//! 권한 판정 결과 캐시.
//!
//! - `ttl.rs` - 용량 제한 + TTL + LRU 축출 (범용)
//! - `resolution.rs` - (subject, permission, context) 판정 캐시, 무효화
//!
//! ```rust,ignore
//! use warden_foundation::cache::ResolutionCache;
//!
//! let cache = ResolutionCache::from_settings(&config.cache);
//! let allowed = cache.get_or_try_insert_with(key, || engine.resolve(...))?;
//! cache.invalidate_subject(&subject);
//! ```

mod resolution;
mod ttl;

pub use resolution::{CacheKey, CacheStats, ResolutionCache};
pub use ttl::TtlCache;
