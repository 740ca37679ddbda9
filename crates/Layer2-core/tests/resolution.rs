//! End-to-end resolution tests against an in-memory SQLite store

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use warden_core::{AllowAll, ContextInput, Warden};
use warden_foundation::{
    AuditEventListener, AuditLogger, AuditSettings, CacheSettings, ContextScope, EntityRef, Error,
    EventListener, GrantEvent, GrantHolder, GrantKind, NewPermission, NewRole, Result, RoleId,
    RbacStore, SqliteStore, SubjectRef, WardenConfig,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warden=debug")
        .with_test_writer()
        .try_init();
}

fn warden() -> Warden {
    init_tracing();
    Warden::in_memory(WardenConfig::new()).expect("Failed to create warden")
}

fn user(id: &str) -> SubjectRef {
    SubjectRef::new("user", id)
}

fn names<T>(items: Vec<T>, name: impl Fn(&T) -> &str) -> Vec<String> {
    let mut names: Vec<String> = items.iter().map(|i| name(i).to_string()).collect();
    names.sort();
    names
}

// ============================================================================
// Role hierarchy
// ============================================================================

#[test]
fn test_inherited_permission_through_child_role() {
    let warden = warden();
    warden.create_permission(NewPermission::new("publish")).expect("create");
    let editor = warden.create_role(NewRole::new("editor")).expect("role");
    let senior = warden.create_role(NewRole::new("senior-editor")).expect("role");

    warden.give_role_permission(&editor, "publish").expect("give");
    warden.assign_child_role(&senior, &editor).expect("child");
    warden.assign_role(&user("u"), &senior, ContextInput::Global).expect("assign");

    let roles = warden.roles_for(&user("u"), ContextInput::Global).expect("roles");
    assert_eq!(names(roles, |r| &r.name), vec!["editor", "senior-editor"]);
    assert!(warden.can(&user("u"), "publish", ContextInput::Global).expect("can"));
    assert!(warden
        .role_permissions(&senior)
        .expect("role permissions")
        .is_empty());
}

#[test]
fn test_cycle_and_self_reference_rejected() {
    let warden = warden();
    let a = warden.create_role(NewRole::new("a")).expect("role");
    let b = warden.create_role(NewRole::new("b")).expect("role");

    assert!(matches!(warden.assign_child_role(&a, &a), Err(Error::SelfReference(_))));
    assert!(warden.assign_child_role(&a, &b).expect("a -> b"));
    assert!(matches!(
        warden.assign_child_role(&b, &a),
        Err(Error::CircularDependency { .. })
    ));
}

#[test]
fn test_expansion_terminates_on_out_of_band_cycle() {
    let warden = warden();
    warden.create_permission(NewPermission::new("deep")).expect("create");
    let a = warden.create_role(NewRole::new("a")).expect("role");
    let b = warden.create_role(NewRole::new("b")).expect("role");
    let c = warden.create_role(NewRole::new("c")).expect("role");
    warden.assign_child_role(&a, &b).expect("a -> b");
    warden.assign_child_role(&b, &c).expect("b -> c");
    warden.give_role_permission(&c, "deep").expect("give");

    // 저장소에 직접 c -> a 간선을 넣어 순환을 만든다
    warden
        .store()
        .attach(GrantKind::Role, &c.owner_key(), a.id.0, None)
        .expect("raw edge");

    warden.assign_role(&user("u"), &b, ContextInput::Global).expect("assign");
    let roles = warden.roles_for(&user("u"), ContextInput::Global).expect("roles");
    assert_eq!(names(roles, |r| &r.name), vec!["a", "b", "c"]);
    assert!(warden.can(&user("u"), "deep", ContextInput::Global).expect("can"));
}

#[test]
fn test_concurrent_opposite_edges_leave_no_cycle() {
    let warden = warden();
    let a = warden.create_role(NewRole::new("a")).expect("role");
    let b = warden.create_role(NewRole::new("b")).expect("role");

    let results: Vec<bool> = std::thread::scope(|scope| {
        let forward = scope.spawn(|| warden.assign_child_role(&a, &b).is_ok());
        let backward = scope.spawn(|| warden.assign_child_role(&b, &a).is_ok());
        vec![
            forward.join().expect("thread"),
            backward.join().expect("thread"),
        ]
    });
    assert_eq!(results.iter().filter(|ok| **ok).count(), 1);

    let edges: Vec<(RoleId, RoleId)> = warden.store().role_edges().expect("edges");
    assert_eq!(edges.len(), 1);
}

#[test]
fn test_wardens_sharing_a_store_leave_no_cycle() {
    init_tracing();
    let store: Arc<dyn RbacStore> = Arc::new(SqliteStore::in_memory().expect("store"));
    let build = || {
        Warden::builder()
            .config(WardenConfig::new())
            .store(store.clone())
            .build()
            .expect("build")
    };
    let (first, second) = (build(), build());

    let pairs: Vec<_> = (0..100)
        .map(|i| {
            let a = first.create_role(NewRole::new(format!("a{}", i))).expect("role");
            let b = first.create_role(NewRole::new(format!("b{}", i))).expect("role");
            (a, b)
        })
        .collect();

    let barrier = Barrier::new(2);
    let attached: usize = std::thread::scope(|scope| {
        let forward = scope.spawn(|| {
            pairs
                .iter()
                .filter(|(a, b)| {
                    barrier.wait();
                    first.assign_child_role(a, b).is_ok()
                })
                .count()
        });
        let backward = scope.spawn(|| {
            pairs
                .iter()
                .filter(|(a, b)| {
                    barrier.wait();
                    second.assign_child_role(b, a).is_ok()
                })
                .count()
        });
        forward.join().expect("thread") + backward.join().expect("thread")
    });
    assert_eq!(attached, pairs.len());

    let edges = store.role_edges().expect("edges");
    assert_eq!(edges.len(), pairs.len());
    for (a, b) in &pairs {
        let both = edges.contains(&(a.id, b.id)) && edges.contains(&(b.id, a.id));
        assert!(!both, "{} and {} reach each other", a.name, b.name);
    }
}

#[test]
fn test_cross_context_child_role_rejected() {
    let warden = warden();
    warden.create_permission(NewPermission::new("publish")).expect("create");
    let team = warden.create_context(Some("c1"), None).expect("context");
    let lead = warden
        .create_role(NewRole::new("lead").in_context(Some(team.id)))
        .expect("role");
    let editor = warden.create_role(NewRole::new("editor")).expect("role");
    warden.give_role_permission(&editor, "publish").expect("give");

    assert!(matches!(
        warden.assign_child_role(&lead, &editor),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        warden.assign_child_role(&lead, editor.id),
        Err(Error::InvalidArgument(_))
    ));

    warden.assign_role(&user("u"), &lead, team.id).expect("assign");
    let roles = warden.roles_for(&user("u"), team.id).expect("roles");
    assert_eq!(names(roles, |r| &r.name), vec!["lead"]);
    assert!(!warden.can(&user("u"), "publish", team.id).expect("can"));
    assert!(warden.store().role_edges().expect("edges").is_empty());
}

// ============================================================================
// Sync / attach semantics
// ============================================================================

#[test]
fn test_sync_is_context_local() {
    let warden = warden();
    for name in ["p1", "p2", "p3"] {
        warden.create_permission(NewPermission::new(name)).expect("create");
    }
    let ctx = warden.create_context(Some("ctx"), None).expect("context");
    let s = user("s");

    warden.assign_permission(&s, "p1", ContextInput::Global).expect("global");
    warden.sync_permissions(&s, ["p1", "p2"], ctx.id).expect("sync");
    let delta = warden.sync_permissions(&s, ["p2", "p3"], ctx.id).expect("sync");

    let p1 = warden.find_permission("p1").expect("find").expect("p1");
    let p3 = warden.find_permission("p3").expect("find").expect("p3");
    assert_eq!(delta.attached, vec![p3.id]);
    assert_eq!(delta.detached, vec![p1.id]);
    assert_eq!(
        warden.permission_names(&s, ctx.id).expect("names"),
        vec!["p2", "p3"]
    );
    assert_eq!(
        warden.permission_names(&s, ContextInput::Global).expect("names"),
        vec!["p1"]
    );
}

#[test]
fn test_sync_with_unknown_permission_changes_nothing() {
    let warden = warden();
    warden.create_permission(NewPermission::new("p1")).expect("create");
    warden.assign_permission(&user("s"), "p1", ContextInput::Global).expect("assign");

    let err = warden
        .sync_permissions(&user("s"), ["missing"], ContextInput::Global)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(warden.can(&user("s"), "p1", ContextInput::Global).expect("can"));
}

#[test]
fn test_attach_detach_restores_prior_state() {
    let warden = warden();
    warden.create_permission(NewPermission::new("read")).expect("create");
    let s = user("s");
    let before = warden
        .store()
        .targets(GrantKind::Permission, &s.owner_key(), ContextScope::Any)
        .expect("targets");

    assert!(warden.assign_permission(&s, "read", ContextInput::Global).expect("assign"));
    assert!(!warden.assign_permission(&s, "read", ContextInput::Global).expect("again"));
    assert!(warden.revoke_permission(&s, "read", ContextInput::Global).expect("revoke"));

    let after = warden
        .store()
        .targets(GrantKind::Permission, &s.owner_key(), ContextScope::Any)
        .expect("targets");
    assert_eq!(before, after);
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_can_matches_permissions_for() {
    let warden = warden();
    for name in ["read", "write", "admin"] {
        warden.create_permission(NewPermission::new(name)).expect("create");
    }
    let role = warden.create_role(NewRole::new("writer")).expect("role");
    warden.give_role_permission(&role, "write").expect("give");
    warden.assign_role(&user("s"), &role, ContextInput::Global).expect("role");
    warden.assign_permission(&user("s"), "read", ContextInput::Global).expect("direct");

    let held = warden
        .permissions_for(&user("s"), ContextInput::Global)
        .expect("permissions");
    for name in ["read", "write", "admin", "unknown"] {
        let can = warden.can(&user("s"), name, ContextInput::Global).expect("can");
        assert_eq!(can, held.iter().any(|p| p.name == name), "mismatch for {}", name);
    }
}

#[test]
fn test_context_isolation() {
    let warden = warden();
    warden.create_permission(NewPermission::new("edit")).expect("create");
    let c1 = warden.create_context(Some("c1"), None).expect("c1");
    let c2 = warden.create_context(Some("c2"), None).expect("c2");

    warden.assign_permission(&user("s"), "edit", c1.id).expect("assign");
    assert!(warden.can(&user("s"), "edit", c1.id).expect("c1"));
    assert!(!warden.can(&user("s"), "edit", c2.id).expect("c2"));
    assert!(!warden.can(&user("s"), "edit", ContextInput::Global).expect("global"));
}

#[test]
fn test_context_owner_resolution() {
    let warden = warden();
    warden.create_permission(NewPermission::new("edit")).expect("create");
    let team = EntityRef::new("team", "7");

    let context = warden.context_for(&team).expect("context");
    assert_eq!(context.name.as_deref(), Some("team 7"));
    assert_eq!(warden.context_for(&team).expect("again").id, context.id);
    assert!(matches!(
        warden.create_context(None, Some(&team)),
        Err(Error::AlreadyExists(_))
    ));

    warden.assign_permission(&user("s"), "edit", &team).expect("assign");
    assert!(warden.can(&user("s"), "edit", context.id).expect("by id"));
    assert!(warden.can(&user("s"), "edit", &context).expect("by context"));

    // context 가 없는 소유자는 전역으로 해석된다
    let other = EntityRef::new("team", "8");
    assert!(!warden.can(&user("s"), "edit", &other).expect("unowned"));

    assert!(matches!(
        warden.can(&user("s"), "edit", "abc"),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_delete_context_cascades() {
    let warden = warden();
    warden.create_permission(NewPermission::new("edit")).expect("create");
    let context = warden.create_context(Some("c"), None).expect("context");
    let role = warden
        .create_role(NewRole::new("member").in_context(Some(context.id)))
        .expect("role");
    warden.give_role_permission(&role, "edit").expect("give");
    warden.assign_role(&user("s"), &role, context.id).expect("assign");
    assert!(warden.can(&user("s"), "edit", context.id).expect("can"));

    assert!(warden.delete_context(context.id).expect("delete"));
    assert!(warden.find_role("member", ContextInput::Global).expect("find").is_none());
    assert!(warden.store().role(role.id).expect("role").is_none());
    assert!(warden.subjects_with_role(&role).expect("holders").is_empty());
    assert!(!warden.delete_context(context.id).expect("delete again"));
}

// ============================================================================
// Batch
// ============================================================================

#[test]
fn test_batch_skips_invalid_items_and_emits_once() {
    let warden = warden();
    warden.create_permission(NewPermission::new("read")).expect("create");
    warden.create_permission(NewPermission::new("write")).expect("create");

    let outcome = warden
        .assign_permissions(&user("s"), ["read", "nope", "write"], ContextInput::Global)
        .expect("batch");
    assert_eq!(outcome.applied.len(), 2);
    assert_eq!(outcome.skipped.len(), 1);

    let history = warden.events().history(None);
    let batches: Vec<&GrantEvent> = history
        .iter()
        .filter(|e| e.name() == "permissions.assigned_batch")
        .collect();
    assert_eq!(batches.len(), 1);

    let outcome = warden
        .remove_roles(&user("s"), ["ghost"], ContextInput::Global)
        .expect("batch");
    assert!(!outcome.changed());
    assert_eq!(outcome.skipped.len(), 1);
}

// ============================================================================
// Events / audit
// ============================================================================

struct FailingListener {
    calls: AtomicUsize,
}

impl EventListener for FailingListener {
    fn name(&self) -> &str {
        "failing"
    }

    fn on_event(&self, _event: &GrantEvent) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Internal("listener exploded".to_string()))
    }
}

#[test]
fn test_listener_failure_does_not_fail_mutation() {
    let warden = warden();
    let listener = Arc::new(FailingListener {
        calls: AtomicUsize::new(0),
    });
    warden.subscribe(listener.clone());

    warden.create_permission(NewPermission::new("read")).expect("create");
    assert!(warden.assign_permission(&user("s"), "read", ContextInput::Global).expect("assign"));

    assert_eq!(listener.calls.load(Ordering::SeqCst), 2);
    assert_eq!(warden.events().failed_deliveries(), 2);
    assert!(warden.can(&user("s"), "read", ContextInput::Global).expect("can"));
}

#[test]
fn test_no_event_without_change() {
    let warden = warden();
    warden.create_permission(NewPermission::new("read")).expect("create");
    warden.assign_permission(&user("s"), "read", ContextInput::Global).expect("assign");
    let before = warden.events().event_count();

    warden.assign_permission(&user("s"), "read", ContextInput::Global).expect("again");
    warden.revoke_permission(&user("s"), "unknown", ContextInput::Global).expect("revoke");
    warden.sync_permissions(&user("s"), ["read"], ContextInput::Global).expect("sync");

    assert_eq!(warden.events().event_count(), before);
}

#[test]
fn test_audit_records_actor() {
    init_tracing();
    let logger = Arc::new(AuditLogger::in_memory().expect("audit"));
    let settings = AuditSettings {
        enabled: true,
        ..Default::default()
    };
    let warden = Warden::builder()
        .config(WardenConfig::new())
        .store(Arc::new(warden_foundation::SqliteStore::in_memory().expect("store")))
        .authorizer(Arc::new(AllowAll))
        .audit_listener(AuditEventListener::new(settings).with_sink(logger.clone()))
        .build()
        .expect("build");

    warden.create_permission(NewPermission::new("read")).expect("create");
    warden
        .acting_as(user("admin"))
        .assign_permission(&user("s"), "read", ContextInput::Global)
        .expect("assign");

    let records = logger.recent(10).expect("recent");
    assert_eq!(records.len(), 2);
    let assigned = records
        .iter()
        .find(|r| r.event == "permission.assigned")
        .expect("assigned record");
    assert_eq!(assigned.actor.as_deref(), Some("user:admin"));
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn test_cache_invalidated_on_writes() {
    let warden = warden();
    assert!(warden.engine().is_caching());
    warden.create_permission(NewPermission::new("read")).expect("create");
    let role = warden.create_role(NewRole::new("reader")).expect("role");
    warden.assign_role(&user("s"), &role, ContextInput::Global).expect("assign");

    assert!(!warden.can(&user("s"), "read", ContextInput::Global).expect("cold"));
    assert!(!warden.can(&user("s"), "read", ContextInput::Global).expect("cached"));

    // 역할 권한 변경은 전체 무효화
    warden.give_role_permission(&role, "read").expect("give");
    assert!(warden.can(&user("s"), "read", ContextInput::Global).expect("after give"));

    warden.remove_role(&user("s"), &role, ContextInput::Global).expect("remove");
    assert!(!warden.can(&user("s"), "read", ContextInput::Global).expect("after remove"));

    let stats = warden.cache_stats().expect("stats");
    assert!(stats.hits >= 1);
}

#[test]
fn test_disabled_cache() {
    init_tracing();
    let config = WardenConfig::new().with_cache(CacheSettings::disabled());
    let warden = Warden::in_memory(config).expect("warden");
    assert!(!warden.engine().is_caching());
    assert!(warden.cache_stats().is_none());
}

// ============================================================================
// Authorization
// ============================================================================

#[test]
fn test_acting_as_requires_super_admin() {
    let warden = warden();
    warden.create_permission(NewPermission::new("warden.manage")).expect("create");
    warden.create_permission(NewPermission::new("read")).expect("create");
    let admin = user("admin");
    warden
        .assign_permission(&admin, "warden.manage", ContextInput::Global)
        .expect("bootstrap");

    let denied = warden
        .acting_as(user("mallory"))
        .assign_permission(&user("s"), "read", ContextInput::Global)
        .unwrap_err();
    assert!(matches!(denied, Error::AuthorizationDenied(_)));

    assert!(warden
        .acting_as(admin.clone())
        .assign_permission(&user("s"), "read", ContextInput::Global)
        .expect("allowed"));

    let last = warden.events().history(Some(1));
    assert_eq!(last[0].actor, Some(admin));
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_reopen_keeps_grants() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let config = WardenConfig::new().with_data_dir(dir.path());

    {
        let warden = Warden::open(config.clone()).expect("open");
        warden.create_permission(NewPermission::new("read")).expect("create");
        warden.assign_permission(&user("s"), "read", ContextInput::Global).expect("assign");
    }

    let warden = Warden::open(config).expect("reopen");
    assert!(warden.can(&user("s"), "read", ContextInput::Global).expect("can"));
}
