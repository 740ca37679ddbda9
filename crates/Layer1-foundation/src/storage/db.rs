//! SQLite Storage for RBAC data
//!
//! 저장 데이터:
//! - permissions: 권한 (이름 전역 유일)
//! - contexts: 범위 (소유 엔티티당 1개)
//! - roles: 역할 ((name, context) 유일)
//! - subject_has_role: 보유자 -> 역할 (역할 계층 간선 포함)
//! - subject_has_permission: 보유자 -> 권한 (context 범위)
//!
//! 역할이 보유자일 때는 `subject_type = 'warden.role'`, `subject_id = role id`.
//! NULL context 는 유일성 검사에서 하나의 값으로 취급한다 (`COALESCE(context_id, -1)` 인덱스).

use crate::config::StorageSettings;
use crate::model::{
    Context, ContextId, ContextScope, EntityRef, GrantKind, NewPermission, NewRole, OwnerKey,
    Permission, PermissionId, Role, RoleId, SyncDelta, ROLE_OWNER_TYPE,
};
use crate::storage::RbacStore;
use crate::{Error, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql, TransactionBehavior};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

/// Current schema version
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// 다른 연결이 쓰기 잠금을 쥐고 있을 때 기다리는 시간
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const PERMISSION_COLUMNS: &str = r#"p.id, p.name, p.config, p."order", p.created_at, p.updated_at"#;

const ROLE_COLUMNS: &str =
    r#"r.id, r.name, r.context_id, r.config, r."order", r.created_at, r.updated_at"#;

const CONTEXT_COLUMNS: &str = "c.id, c.name, c.owner_type, c.owner_id, c.created_at, c.updated_at";

/// SQLite 기반 RbacStore
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// 파일 DB 열기 (상위 디렉토리 자동 생성)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create data directory: {}", e)))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| Error::Storage(format!("Failed to set pragmas: {}", e)))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| Error::Storage(format!("Failed to set busy timeout: {}", e)))?;

        Self::with_connection(conn)
    }

    /// 설정의 데이터 디렉토리에 DB 열기
    pub fn from_settings(settings: &StorageSettings) -> Result<Self> {
        Self::open(settings.database_path()?)
    }

    /// In-memory storage (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to create in-memory database: {}", e)))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        // cascade 삭제에 필요
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Storage(format!("Failed to enable foreign keys: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))
    }

    /// Get current schema version from database
    pub fn get_schema_version(&self) -> Result<i32> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::Storage(format!("Failed to get schema version: {}", e)))
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS contexts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT,
                owner_type TEXT,
                owner_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_contexts_owner
                ON contexts(owner_type, owner_id) WHERE owner_type IS NOT NULL;

            CREATE TABLE IF NOT EXISTS permissions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                config TEXT,
                "order" REAL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_permissions_order ON permissions("order");

            CREATE TABLE IF NOT EXISTS roles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                context_id INTEGER REFERENCES contexts(id) ON DELETE CASCADE,
                config TEXT,
                "order" REAL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_roles_name_context
                ON roles(name, COALESCE(context_id, -1));
            CREATE INDEX IF NOT EXISTS idx_roles_context ON roles(context_id);
            CREATE INDEX IF NOT EXISTS idx_roles_order ON roles("order");

            CREATE TABLE IF NOT EXISTS subject_has_role (
                role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
                subject_type TEXT NOT NULL,
                subject_id TEXT NOT NULL,
                PRIMARY KEY (role_id, subject_type, subject_id)
            );

            CREATE INDEX IF NOT EXISTS idx_subject_has_role_subject
                ON subject_has_role(subject_type, subject_id);

            CREATE TABLE IF NOT EXISTS subject_has_permission (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                permission_id INTEGER NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
                subject_type TEXT NOT NULL,
                subject_id TEXT NOT NULL,
                context_id INTEGER REFERENCES contexts(id) ON DELETE CASCADE
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_subject_has_permission_unique
                ON subject_has_permission(permission_id, subject_type, subject_id, COALESCE(context_id, -1));
            CREATE INDEX IF NOT EXISTS idx_subject_has_permission_subject
                ON subject_has_permission(subject_type, subject_id);
            CREATE INDEX IF NOT EXISTS idx_subject_has_permission_context
                ON subject_has_permission(context_id);
            "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to initialize schema: {}", e)))?;

        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| Error::Storage(format!("Failed to record schema version: {}", e)))?;

        info!(version = CURRENT_SCHEMA_VERSION, "RBAC schema ready");
        Ok(())
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Value>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn encode_json(value: Option<&Value>) -> Result<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => Ok(Some(serde_json::to_string(v)?)),
    }
}

fn permission_from_row(row: &Row<'_>) -> rusqlite::Result<Permission> {
    Ok(Permission {
        id: PermissionId(row.get(0)?),
        name: row.get(1)?,
        config: json_column(row, 2)?,
        order: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn role_from_row(row: &Row<'_>) -> rusqlite::Result<Role> {
    Ok(Role {
        id: RoleId(row.get(0)?),
        name: row.get(1)?,
        context_id: row.get::<_, Option<i64>>(2)?.map(ContextId),
        config: json_column(row, 3)?,
        order: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn context_from_row(row: &Row<'_>) -> rusqlite::Result<Context> {
    let owner_type: Option<String> = row.get(2)?;
    let owner_id: Option<String> = row.get(3)?;
    Ok(Context {
        id: ContextId(row.get(0)?),
        name: row.get(1)?,
        owner: owner_type.zip(owner_id).map(|(t, id)| EntityRef::new(t, id)),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// 제약 조건 위반을 도메인 에러로 변환
fn map_write_error(e: rusqlite::Error, what: &str) -> Error {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        match err.extended_code {
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                return Error::AlreadyExists(what.to_string());
            }
            rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                return Error::NotFound(format!("referenced entity for {}", what));
            }
            _ => {}
        }
    }
    Error::Storage(format!("Failed to write {}: {}", what, e))
}

fn scope_param(scope: ContextScope) -> Option<Option<i64>> {
    match scope {
        ContextScope::Exact(context_id) => Some(context_id.map(|c| c.0)),
        ContextScope::Any => None,
    }
}

// ============================================================================
// Association SQL
// ============================================================================

/// 연결 테이블 WHERE 절 빌더
struct AssociationFilter {
    sql: String,
    params: Vec<Box<dyn ToSql>>,
}

impl AssociationFilter {
    fn new(kind: GrantKind, owner: &OwnerKey, target: Option<i64>, scope: ContextScope) -> Self {
        let mut sql = String::from("subject_type = ? AND subject_id = ?");
        let mut params: Vec<Box<dyn ToSql>> = vec![
            Box::new(owner.owner_type.clone()),
            Box::new(owner.owner_id.clone()),
        ];

        if let Some(target) = target {
            sql.push_str(&format!(" AND {} = ?", target_column(kind)));
            params.push(Box::new(target));
        }

        if let Some(context_id) = scope_param(scope) {
            match kind {
                GrantKind::Permission => sql.push_str(" AND context_id IS ?"),
                GrantKind::Role => {
                    sql.push_str(" AND role_id IN (SELECT id FROM roles WHERE context_id IS ?)")
                }
            }
            params.push(Box::new(context_id));
        }

        Self { sql, params }
    }

    fn refs(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

fn table(kind: GrantKind) -> &'static str {
    match kind {
        GrantKind::Permission => "subject_has_permission",
        GrantKind::Role => "subject_has_role",
    }
}

fn target_column(kind: GrantKind) -> &'static str {
    match kind {
        GrantKind::Permission => "permission_id",
        GrantKind::Role => "role_id",
    }
}

fn attach_on(
    conn: &Connection,
    kind: GrantKind,
    owner: &OwnerKey,
    target: i64,
    context_id: Option<ContextId>,
) -> Result<bool> {
    let changed = match kind {
        GrantKind::Permission => conn.execute(
            "INSERT OR IGNORE INTO subject_has_permission (permission_id, subject_type, subject_id, context_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![target, owner.owner_type, owner.owner_id, context_id.map(|c| c.0)],
        ),
        GrantKind::Role => conn.execute(
            "INSERT OR IGNORE INTO subject_has_role (role_id, subject_type, subject_id)
             VALUES (?1, ?2, ?3)",
            params![target, owner.owner_type, owner.owner_id],
        ),
    }
    .map_err(|e| map_write_error(e, kind.as_str()))?;

    Ok(changed > 0)
}

fn detach_on(
    conn: &Connection,
    kind: GrantKind,
    owner: &OwnerKey,
    target: Option<i64>,
    scope: ContextScope,
) -> Result<usize> {
    let filter = AssociationFilter::new(kind, owner, target, scope);
    let sql = format!("DELETE FROM {} WHERE {}", table(kind), filter.sql);
    conn.execute(&sql, filter.refs().as_slice())
        .map_err(|e| Error::Storage(format!("Failed to detach {}: {}", kind.as_str(), e)))
}

/// from 에서 자식 간선을 따라 to 에 도달하는지 (UNION 이라 순환 데이터에서도 종료)
fn reaches_on(conn: &Connection, from: RoleId, to: RoleId) -> Result<bool> {
    let reached = conn.query_row(
        "WITH RECURSIVE reach(id) AS (
             SELECT ?1
             UNION
             SELECT e.role_id FROM subject_has_role e
             JOIN reach ON e.subject_type = ?3 AND e.subject_id = CAST(reach.id AS TEXT)
         )
         SELECT EXISTS(SELECT 1 FROM reach WHERE id = ?2)",
        params![from.0, to.0, ROLE_OWNER_TYPE],
        |row| row.get(0),
    )?;
    Ok(reached)
}

fn targets_on(
    conn: &Connection,
    kind: GrantKind,
    owner: &OwnerKey,
    scope: ContextScope,
) -> Result<Vec<i64>> {
    let filter = AssociationFilter::new(kind, owner, None, scope);
    let column = target_column(kind);
    let sql = format!(
        "SELECT DISTINCT {col} FROM {table} WHERE {filter} ORDER BY {col}",
        col = column,
        table = table(kind),
        filter = filter.sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(filter.refs().as_slice(), |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

/// 역할 소유 연결 삭제 (FK 로 지워지지 않는 보유자 쪽 행)
fn delete_role_owned(conn: &Connection, role: i64) -> Result<()> {
    let owner_id = role.to_string();
    conn.execute(
        "DELETE FROM subject_has_permission WHERE subject_type = ?1 AND subject_id = ?2",
        params![ROLE_OWNER_TYPE, owner_id],
    )?;
    conn.execute(
        "DELETE FROM subject_has_role WHERE subject_type = ?1 AND subject_id = ?2",
        params![ROLE_OWNER_TYPE, owner_id],
    )?;
    Ok(())
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ============================================================================
// RbacStore impl
// ============================================================================

impl RbacStore for SqliteStore {
    // ------------------------------------------------------------------------
    // Permissions
    // ------------------------------------------------------------------------

    fn insert_permission(&self, new: &NewPermission) -> Result<Permission> {
        let conn = self.lock()?;
        let now = now();

        conn.execute(
            r#"INSERT INTO permissions (name, config, "order", created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?4)"#,
            params![new.name, encode_json(new.config.as_ref())?, new.order, now],
        )
        .map_err(|e| map_write_error(e, &format!("permission '{}'", new.name)))?;

        let id = conn.last_insert_rowid();
        debug!(permission = %new.name, id, "Permission created");

        Ok(Permission {
            id: PermissionId(id),
            name: new.name.clone(),
            config: new.config.clone().filter(|v| !v.is_null()),
            order: new.order,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    fn permission(&self, id: PermissionId) -> Result<Option<Permission>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM permissions p WHERE p.id = ?1", PERMISSION_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id.0], permission_from_row)
            .optional()?)
    }

    fn permission_by_name(&self, name: &str) -> Result<Option<Permission>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM permissions p WHERE p.name = ?1", PERMISSION_COLUMNS);
        Ok(conn
            .query_row(&sql, params![name], permission_from_row)
            .optional()?)
    }

    fn permissions(&self) -> Result<Vec<Permission>> {
        let conn = self.lock()?;
        let sql = format!(
            r#"SELECT {} FROM permissions p ORDER BY p."order" IS NULL, p."order", p.id"#,
            PERMISSION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], permission_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn update_permission(&self, permission: &Permission) -> Result<Permission> {
        let conn = self.lock()?;
        let now = now();

        let changed = conn
            .execute(
                r#"UPDATE permissions SET name = ?1, config = ?2, "order" = ?3, updated_at = ?4
                   WHERE id = ?5"#,
                params![
                    permission.name,
                    encode_json(permission.config.as_ref())?,
                    permission.order,
                    now,
                    permission.id.0
                ],
            )
            .map_err(|e| map_write_error(e, &format!("permission '{}'", permission.name)))?;

        if changed == 0 {
            return Err(Error::NotFound(permission.id.to_string()));
        }

        Ok(Permission {
            updated_at: now,
            ..permission.clone()
        })
    }

    fn delete_permission(&self, id: PermissionId) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute("DELETE FROM permissions WHERE id = ?1", params![id.0])
            .map_err(|e| Error::Storage(format!("Failed to delete permission: {}", e)))?;
        Ok(changed > 0)
    }

    // ------------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------------

    fn insert_role(&self, new: &NewRole) -> Result<Role> {
        let conn = self.lock()?;
        let now = now();

        conn.execute(
            r#"INSERT INTO roles (name, context_id, config, "order", created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?5)"#,
            params![
                new.name,
                new.context_id.map(|c| c.0),
                encode_json(new.config.as_ref())?,
                new.order,
                now
            ],
        )
        .map_err(|e| map_write_error(e, &format!("role '{}'", new.name)))?;

        let id = conn.last_insert_rowid();
        debug!(role = %new.name, id, context_id = ?new.context_id, "Role created");

        Ok(Role {
            id: RoleId(id),
            name: new.name.clone(),
            context_id: new.context_id,
            config: new.config.clone().filter(|v| !v.is_null()),
            order: new.order,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    fn role(&self, id: RoleId) -> Result<Option<Role>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM roles r WHERE r.id = ?1", ROLE_COLUMNS);
        Ok(conn.query_row(&sql, params![id.0], role_from_row).optional()?)
    }

    fn role_by_name(&self, name: &str, context_id: Option<ContextId>) -> Result<Option<Role>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM roles r WHERE r.name = ?1 AND r.context_id IS ?2",
            ROLE_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![name, context_id.map(|c| c.0)], role_from_row)
            .optional()?)
    }

    fn roles(&self, scope: ContextScope) -> Result<Vec<Role>> {
        let conn = self.lock()?;
        let mut sql = format!("SELECT {} FROM roles r", ROLE_COLUMNS);
        let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(context_id) = scope_param(scope) {
            sql.push_str(" WHERE r.context_id IS ?");
            params_vec.push(Box::new(context_id));
        }
        sql.push_str(r#" ORDER BY r."order" IS NULL, r."order", r.id"#);

        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_refs.as_slice(), role_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn roles_by_ids(&self, ids: &[RoleId]) -> Result<Vec<Role>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        let sql = format!(
            r#"SELECT {} FROM roles r WHERE r.id IN ({}) ORDER BY r."order" IS NULL, r."order", r.id"#,
            ROLE_COLUMNS,
            placeholders(ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(ids.iter().map(|id| id.0)), role_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn update_role(&self, role: &Role) -> Result<Role> {
        let conn = self.lock()?;
        let now = now();

        let changed = conn
            .execute(
                r#"UPDATE roles SET name = ?1, config = ?2, "order" = ?3, updated_at = ?4
                   WHERE id = ?5"#,
                params![
                    role.name,
                    encode_json(role.config.as_ref())?,
                    role.order,
                    now,
                    role.id.0
                ],
            )
            .map_err(|e| map_write_error(e, &format!("role '{}'", role.name)))?;

        if changed == 0 {
            return Err(Error::NotFound(role.id.to_string()));
        }

        Ok(Role {
            updated_at: now,
            ..role.clone()
        })
    }

    fn delete_role(&self, id: RoleId) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        delete_role_owned(&tx, id.0)?;
        let changed = tx.execute("DELETE FROM roles WHERE id = ?1", params![id.0])?;

        tx.commit()
            .map_err(|e| Error::Storage(format!("Failed to delete role: {}", e)))?;
        Ok(changed > 0)
    }

    // ------------------------------------------------------------------------
    // Contexts
    // ------------------------------------------------------------------------

    fn insert_context(&self, name: Option<&str>, owner: Option<&EntityRef>) -> Result<Context> {
        let conn = self.lock()?;
        let now = now();

        conn.execute(
            "INSERT INTO contexts (name, owner_type, owner_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![
                name,
                owner.map(|o| o.entity_type.as_str()),
                owner.map(|o| o.entity_id.as_str()),
                now
            ],
        )
        .map_err(|e| {
            let what = match owner {
                Some(owner) => format!("context for {}", owner),
                None => "context".to_string(),
            };
            map_write_error(e, &what)
        })?;

        Ok(Context {
            id: ContextId(conn.last_insert_rowid()),
            name: name.map(str::to_string),
            owner: owner.cloned(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    fn context(&self, id: ContextId) -> Result<Option<Context>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM contexts c WHERE c.id = ?1", CONTEXT_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id.0], context_from_row)
            .optional()?)
    }

    fn context_by_owner(&self, owner: &EntityRef) -> Result<Option<Context>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM contexts c WHERE c.owner_type = ?1 AND c.owner_id = ?2",
            CONTEXT_COLUMNS
        );
        Ok(conn
            .query_row(
                &sql,
                params![owner.entity_type, owner.entity_id],
                context_from_row,
            )
            .optional()?)
    }

    fn contexts(&self) -> Result<Vec<Context>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM contexts c ORDER BY c.id", CONTEXT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], context_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn delete_context(&self, id: ContextId) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let role_ids = {
            let mut stmt = tx.prepare("SELECT id FROM roles WHERE context_id = ?1")?;
            let ids = stmt
                .query_map(params![id.0], |row| row.get::<_, i64>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            ids
        };
        for role in &role_ids {
            delete_role_owned(&tx, *role)?;
        }

        // roles, 범위 연결은 FK cascade
        let changed = tx.execute("DELETE FROM contexts WHERE id = ?1", params![id.0])?;

        tx.commit()
            .map_err(|e| Error::Storage(format!("Failed to delete context: {}", e)))?;

        debug!(context_id = id.0, roles = role_ids.len(), "Context deleted");
        Ok(changed > 0)
    }

    // ------------------------------------------------------------------------
    // Associations
    // ------------------------------------------------------------------------

    fn attach(
        &self,
        kind: GrantKind,
        owner: &OwnerKey,
        target: i64,
        context_id: Option<ContextId>,
    ) -> Result<bool> {
        let conn = self.lock()?;
        attach_on(&conn, kind, owner, target, context_id)
    }

    fn detach(
        &self,
        kind: GrantKind,
        owner: &OwnerKey,
        target: Option<i64>,
        scope: ContextScope,
    ) -> Result<usize> {
        let conn = self.lock()?;
        detach_on(&conn, kind, owner, target, scope)
    }

    fn exists(
        &self,
        kind: GrantKind,
        owner: &OwnerKey,
        target: i64,
        scope: ContextScope,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let filter = AssociationFilter::new(kind, owner, Some(target), scope);
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {})",
            table(kind),
            filter.sql
        );
        Ok(conn.query_row(&sql, filter.refs().as_slice(), |row| row.get(0))?)
    }

    fn targets(&self, kind: GrantKind, owner: &OwnerKey, scope: ContextScope) -> Result<Vec<i64>> {
        let conn = self.lock()?;
        targets_on(&conn, kind, owner, scope)
    }

    fn target_names(
        &self,
        kind: GrantKind,
        owner: &OwnerKey,
        scope: ContextScope,
    ) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let filter = AssociationFilter::new(kind, owner, None, scope);
        let entity_table = match kind {
            GrantKind::Permission => "permissions",
            GrantKind::Role => "roles",
        };
        let sql = format!(
            r#"SELECT name FROM {entity} WHERE id IN (SELECT {col} FROM {table} WHERE {filter})
               ORDER BY "order" IS NULL, "order", name"#,
            entity = entity_table,
            col = target_column(kind),
            table = table(kind),
            filter = filter.sql
        );
        let mut stmt = conn.prepare(&sql)?;
        let names = stmt
            .query_map(filter.refs().as_slice(), |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    fn sync(
        &self,
        kind: GrantKind,
        owner: &OwnerKey,
        desired: &[i64],
        context_id: Option<ContextId>,
    ) -> Result<SyncDelta<i64>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let scope = ContextScope::Exact(context_id);

        let current = targets_on(&tx, kind, owner, scope)?;
        let delta = SyncDelta::compute(&current, desired);

        for target in &delta.detached {
            detach_on(&tx, kind, owner, Some(*target), scope)?;
        }
        for target in &delta.attached {
            attach_on(&tx, kind, owner, *target, context_id)?;
        }

        tx.commit()
            .map_err(|e| Error::Storage(format!("Failed to commit sync: {}", e)))?;

        debug!(
            kind = kind.as_str(),
            owner = %owner,
            attached = delta.attached.len(),
            detached = delta.detached.len(),
            "Associations synced"
        );
        Ok(delta)
    }

    fn attach_child_role(&self, parent: &Role, child: &Role) -> Result<bool> {
        if parent.id == child.id {
            return Err(Error::SelfReference(parent.name.clone()));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if reaches_on(&tx, child.id, parent.id)? {
            return Err(Error::CircularDependency {
                parent: parent.name.clone(),
                child: child.name.clone(),
            });
        }
        let attached = attach_on(
            &tx,
            GrantKind::Role,
            &OwnerKey::for_role(parent.id),
            child.id.0,
            None,
        )?;

        tx.commit()
            .map_err(|e| Error::Storage(format!("Failed to commit role edge: {}", e)))?;
        debug!(parent = %parent.name, child = %child.name, attached, "Role edge attached");
        Ok(attached)
    }

    // ------------------------------------------------------------------------
    // Resolution helpers
    // ------------------------------------------------------------------------

    fn role_edges(&self) -> Result<Vec<(RoleId, RoleId)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT CAST(subject_id AS INTEGER), role_id FROM subject_has_role WHERE subject_type = ?1",
        )?;
        let edges = stmt
            .query_map(params![ROLE_OWNER_TYPE], |row| {
                Ok((RoleId(row.get(0)?), RoleId(row.get(1)?)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    fn permissions_held(&self, owners: &[OwnerKey], scope: ContextScope) -> Result<Vec<Permission>> {
        if owners.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;

        let owner_clause = vec!["(a.subject_type = ? AND a.subject_id = ?)"; owners.len()].join(" OR ");
        let mut sql = format!(
            "SELECT DISTINCT {} FROM permissions p
             JOIN subject_has_permission a ON a.permission_id = p.id
             WHERE ({})",
            PERMISSION_COLUMNS, owner_clause
        );
        let mut params_vec: Vec<Box<dyn ToSql>> = Vec::with_capacity(owners.len() * 2 + 1);
        for owner in owners {
            params_vec.push(Box::new(owner.owner_type.clone()));
            params_vec.push(Box::new(owner.owner_id.clone()));
        }
        if let Some(context_id) = scope_param(scope) {
            sql.push_str(" AND a.context_id IS ?");
            params_vec.push(Box::new(context_id));
        }
        sql.push_str(r#" ORDER BY p."order" IS NULL, p."order", p.id"#);

        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_refs.as_slice(), permission_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn roles_held(&self, owner: &OwnerKey, scope: ContextScope) -> Result<Vec<Role>> {
        let conn = self.lock()?;
        let mut sql = format!(
            "SELECT {} FROM roles r
             JOIN subject_has_role a ON a.role_id = r.id
             WHERE a.subject_type = ? AND a.subject_id = ?",
            ROLE_COLUMNS
        );
        let mut params_vec: Vec<Box<dyn ToSql>> = vec![
            Box::new(owner.owner_type.clone()),
            Box::new(owner.owner_id.clone()),
        ];
        if let Some(context_id) = scope_param(scope) {
            sql.push_str(" AND r.context_id IS ?");
            params_vec.push(Box::new(context_id));
        }
        sql.push_str(r#" ORDER BY r."order" IS NULL, r."order", r.id"#);

        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_refs.as_slice(), role_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn holders_of_permission(&self, id: PermissionId) -> Result<Vec<OwnerKey>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT subject_type, subject_id FROM subject_has_permission
             WHERE permission_id = ?1 ORDER BY subject_type, subject_id",
        )?;
        let rows = stmt
            .query_map(params![id.0], |row| Ok(OwnerKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn holders_of_role(&self, id: RoleId) -> Result<Vec<OwnerKey>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT subject_type, subject_id FROM subject_has_role
             WHERE role_id = ?1 ORDER BY subject_type, subject_id",
        )?;
        let rows = stmt
            .query_map(params![id.0], |row| Ok(OwnerKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GrantHolder, SubjectRef};
    use serde_json::json;

    fn store() -> SqliteStore {
        SqliteStore::in_memory().expect("Failed to create storage")
    }

    fn user(id: &str) -> OwnerKey {
        SubjectRef::new("user", id).owner_key()
    }

    #[test]
    fn test_schema_version() {
        let store = store();
        assert_eq!(store.get_schema_version().expect("version"), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_file_backed_store_reopens() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("nested").join("warden.db");
        {
            let store = SqliteStore::open(&path).expect("Failed to open");
            store
                .insert_permission(&NewPermission::new("posts.edit"))
                .expect("Failed to insert");
        }
        let store = SqliteStore::open(&path).expect("Failed to reopen");
        assert!(store.permission_by_name("posts.edit").expect("lookup").is_some());
    }

    #[test]
    fn test_permission_crud() {
        let store = store();
        let created = store
            .insert_permission(
                &NewPermission::new("posts.edit")
                    .with_config(json!({ "label": "Edit" }))
                    .with_order(2.0),
            )
            .expect("Failed to insert");

        let loaded = store
            .permission(created.id)
            .expect("lookup")
            .expect("permission should exist");
        assert_eq!(loaded.name, "posts.edit");
        assert_eq!(loaded.config, Some(json!({ "label": "Edit" })));
        assert_eq!(loaded.order, Some(2.0));

        let dup = store.insert_permission(&NewPermission::new("posts.edit"));
        assert!(matches!(dup, Err(Error::AlreadyExists(_))));

        let renamed = store
            .update_permission(&Permission {
                name: "posts.update".to_string(),
                ..loaded
            })
            .expect("Failed to update");
        assert_eq!(renamed.name, "posts.update");
        assert!(store.permission_by_name("posts.edit").expect("lookup").is_none());

        assert!(store.delete_permission(created.id).expect("delete"));
        assert!(!store.delete_permission(created.id).expect("delete"));
    }

    #[test]
    fn test_role_name_unique_per_context_including_null() {
        let store = store();
        let ctx = store.insert_context(Some("team"), None).expect("context");

        store.insert_role(&NewRole::new("editor")).expect("global role");
        store
            .insert_role(&NewRole::new("editor").in_context(Some(ctx.id)))
            .expect("scoped role");

        let dup_global = store.insert_role(&NewRole::new("editor"));
        assert!(matches!(dup_global, Err(Error::AlreadyExists(_))));

        let global = store.role_by_name("editor", None).expect("lookup").expect("exists");
        let scoped = store
            .role_by_name("editor", Some(ctx.id))
            .expect("lookup")
            .expect("exists");
        assert_ne!(global.id, scoped.id);
        assert_eq!(store.roles(ContextScope::Any).expect("roles").len(), 2);
        assert_eq!(store.roles(ContextScope::unscoped()).expect("roles").len(), 1);
    }

    #[test]
    fn test_role_with_missing_context_is_not_found() {
        let store = store();
        let result = store.insert_role(&NewRole::new("editor").in_context(Some(ContextId(99))));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_attach_is_idempotent_with_null_context() {
        let store = store();
        let perm = store.insert_permission(&NewPermission::new("posts.edit")).expect("perm");
        let owner = user("1");

        assert!(store.attach(GrantKind::Permission, &owner, perm.id.0, None).expect("attach"));
        assert!(!store.attach(GrantKind::Permission, &owner, perm.id.0, None).expect("attach"));

        let count: i64 = store
            .lock()
            .expect("lock")
            .query_row("SELECT COUNT(*) FROM subject_has_permission", [], |r| r.get(0))
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_detach_without_context_only_removes_unscoped() {
        let store = store();
        let ctx = store.insert_context(None, None).expect("context");
        let perm = store.insert_permission(&NewPermission::new("posts.edit")).expect("perm");
        let owner = user("1");

        store.attach(GrantKind::Permission, &owner, perm.id.0, None).expect("attach");
        store
            .attach(GrantKind::Permission, &owner, perm.id.0, Some(ctx.id))
            .expect("attach");

        let removed = store
            .detach(GrantKind::Permission, &owner, Some(perm.id.0), ContextScope::unscoped())
            .expect("detach");
        assert_eq!(removed, 1);
        assert!(store
            .exists(GrantKind::Permission, &owner, perm.id.0, ContextScope::Exact(Some(ctx.id)))
            .expect("exists"));
        assert!(!store
            .exists(GrantKind::Permission, &owner, perm.id.0, ContextScope::unscoped())
            .expect("exists"));
    }

    #[test]
    fn test_sync_is_context_local() {
        let store = store();
        let ctx_a = store.insert_context(Some("a"), None).expect("context");
        let ctx_b = store.insert_context(Some("b"), None).expect("context");
        let p1 = store.insert_permission(&NewPermission::new("p1")).expect("perm");
        let p2 = store.insert_permission(&NewPermission::new("p2")).expect("perm");
        let p3 = store.insert_permission(&NewPermission::new("p3")).expect("perm");
        let owner = user("1");

        store.attach(GrantKind::Permission, &owner, p1.id.0, Some(ctx_a.id)).expect("attach");
        store.attach(GrantKind::Permission, &owner, p2.id.0, Some(ctx_a.id)).expect("attach");
        store.attach(GrantKind::Permission, &owner, p1.id.0, Some(ctx_b.id)).expect("attach");

        let delta = store
            .sync(GrantKind::Permission, &owner, &[p2.id.0, p3.id.0], Some(ctx_a.id))
            .expect("sync");
        assert_eq!(delta.attached, vec![p3.id.0]);
        assert_eq!(delta.detached, vec![p1.id.0]);

        let in_a = store
            .targets(GrantKind::Permission, &owner, ContextScope::Exact(Some(ctx_a.id)))
            .expect("targets");
        assert_eq!(in_a, vec![p2.id.0, p3.id.0]);
        let in_b = store
            .targets(GrantKind::Permission, &owner, ContextScope::Exact(Some(ctx_b.id)))
            .expect("targets");
        assert_eq!(in_b, vec![p1.id.0]);
    }

    #[test]
    fn test_role_scope_uses_role_context() {
        let store = store();
        let ctx = store.insert_context(None, None).expect("context");
        let global = store.insert_role(&NewRole::new("viewer")).expect("role");
        let scoped = store
            .insert_role(&NewRole::new("editor").in_context(Some(ctx.id)))
            .expect("role");
        let owner = user("1");

        store.attach(GrantKind::Role, &owner, global.id.0, None).expect("attach");
        store.attach(GrantKind::Role, &owner, scoped.id.0, None).expect("attach");

        let names = store
            .target_names(GrantKind::Role, &owner, ContextScope::Exact(Some(ctx.id)))
            .expect("names");
        assert_eq!(names, vec!["editor".to_string()]);

        let held = store.roles_held(&owner, ContextScope::unscoped()).expect("held");
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].id, global.id);

        let delta = store
            .sync(GrantKind::Role, &owner, &[], Some(ctx.id))
            .expect("sync");
        assert_eq!(delta.detached, vec![scoped.id.0]);
        assert!(store
            .exists(GrantKind::Role, &owner, global.id.0, ContextScope::Any)
            .expect("exists"));
    }

    #[test]
    fn test_role_edges_and_delete_role_cleanup() {
        let store = store();
        let parent = store.insert_role(&NewRole::new("senior-editor")).expect("role");
        let child = store.insert_role(&NewRole::new("editor")).expect("role");
        let perm = store.insert_permission(&NewPermission::new("posts.edit")).expect("perm");

        store
            .attach(GrantKind::Role, &parent.owner_key(), child.id.0, None)
            .expect("edge");
        store
            .attach(GrantKind::Permission, &child.owner_key(), perm.id.0, None)
            .expect("role perm");
        store.attach(GrantKind::Role, &user("1"), child.id.0, None).expect("assign");

        assert_eq!(store.role_edges().expect("edges"), vec![(parent.id, child.id)]);
        assert_eq!(store.holders_of_role(child.id).expect("holders").len(), 2);

        assert!(store.delete_role(child.id).expect("delete"));
        assert!(store.role_edges().expect("edges").is_empty());
        assert!(store.holders_of_permission(perm.id).expect("holders").is_empty());
        assert!(store.targets(GrantKind::Role, &user("1"), ContextScope::Any).expect("targets").is_empty());
    }

    #[test]
    fn test_delete_context_cascades() {
        let store = store();
        let owner_entity = EntityRef::new("team", "42");
        let ctx = store
            .insert_context(Some("team 42"), Some(&owner_entity))
            .expect("context");
        let role = store
            .insert_role(&NewRole::new("lead").in_context(Some(ctx.id)))
            .expect("role");
        let perm = store.insert_permission(&NewPermission::new("team.manage")).expect("perm");
        let subject = user("1");

        store.attach(GrantKind::Role, &subject, role.id.0, None).expect("attach");
        store
            .attach(GrantKind::Permission, &role.owner_key(), perm.id.0, Some(ctx.id))
            .expect("attach");
        store
            .attach(GrantKind::Permission, &subject, perm.id.0, Some(ctx.id))
            .expect("attach");
        store.attach(GrantKind::Permission, &subject, perm.id.0, None).expect("attach");

        assert!(store.delete_context(ctx.id).expect("delete"));

        assert!(store.role(role.id).expect("lookup").is_none());
        assert!(store.context_by_owner(&owner_entity).expect("lookup").is_none());
        let remaining = store.holders_of_permission(perm.id).expect("holders");
        assert_eq!(remaining, vec![subject.clone()]);
        assert!(store
            .exists(GrantKind::Permission, &subject, perm.id.0, ContextScope::unscoped())
            .expect("exists"));
    }

    #[test]
    fn test_context_owner_unique() {
        let store = store();
        let owner = EntityRef::new("team", "1");
        let ctx = store.insert_context(None, Some(&owner)).expect("context");
        let dup = store.insert_context(None, Some(&owner));
        assert!(matches!(dup, Err(Error::AlreadyExists(_))));

        let found = store.context_by_owner(&owner).expect("lookup").expect("exists");
        assert_eq!(found.id, ctx.id);
        assert_eq!(found.owner, Some(owner));

        // 소유자 없는 context 는 여러 개 가능
        store.insert_context(Some("a"), None).expect("context");
        store.insert_context(Some("b"), None).expect("context");
        assert_eq!(store.contexts().expect("contexts").len(), 3);
    }

    #[test]
    fn test_permissions_held_by_many_owners() {
        let store = store();
        let p1 = store.insert_permission(&NewPermission::new("p1")).expect("perm");
        let p2 = store.insert_permission(&NewPermission::new("p2")).expect("perm");
        let role = store.insert_role(&NewRole::new("r")).expect("role");

        store.attach(GrantKind::Permission, &user("1"), p1.id.0, None).expect("attach");
        store
            .attach(GrantKind::Permission, &role.owner_key(), p1.id.0, None)
            .expect("attach");
        store
            .attach(GrantKind::Permission, &role.owner_key(), p2.id.0, None)
            .expect("attach");

        let held = store
            .permissions_held(&[user("1"), role.owner_key()], ContextScope::unscoped())
            .expect("held");
        let names: Vec<_> = held.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["p1", "p2"]);

        assert!(store
            .permissions_held(&[], ContextScope::Any)
            .expect("held")
            .is_empty());
    }

    #[test]
    fn test_attach_child_role_rejects_cycles() {
        let store = store();
        let a = store.insert_role(&NewRole::new("a")).expect("a");
        let b = store.insert_role(&NewRole::new("b")).expect("b");
        let c = store.insert_role(&NewRole::new("c")).expect("c");

        assert!(store.attach_child_role(&a, &b).expect("a -> b"));
        assert!(store.attach_child_role(&b, &c).expect("b -> c"));
        assert!(!store.attach_child_role(&a, &b).expect("a -> b again"));

        assert!(matches!(
            store.attach_child_role(&c, &a),
            Err(Error::CircularDependency { .. })
        ));
        assert!(matches!(store.attach_child_role(&a, &a), Err(Error::SelfReference(_))));
        assert_eq!(store.role_edges().expect("edges").len(), 2);
    }

    #[test]
    fn test_attach_child_role_across_connections() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("warden.db");
        let first = SqliteStore::open(&path).expect("Failed to open");
        let second = SqliteStore::open(&path).expect("Failed to open second connection");

        let a = first.insert_role(&NewRole::new("a")).expect("a");
        let b = first.insert_role(&NewRole::new("b")).expect("b");

        assert!(first.attach_child_role(&a, &b).expect("a -> b"));
        assert!(matches!(
            second.attach_child_role(&b, &a),
            Err(Error::CircularDependency { .. })
        ));
        assert_eq!(second.role_edges().expect("edges"), vec![(a.id, b.id)]);
    }
}
