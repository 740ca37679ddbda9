//! Storage module for Warden
//!
//! - `store`: RbacStore - 영속성 경계 (trait)
//! - `db`: SQLite - RbacStore 구현 (permissions, roles, contexts, 연결 테이블)
//! - `json`: JSON - 설정 파일 저장/로드

mod db;
mod json;
mod store;

// Persistence boundary
pub use store::RbacStore;

// SQLite Storage
pub use db::SqliteStore;

// JSON Storage (설정)
pub use json::JsonStore;
