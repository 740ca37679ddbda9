//! Context Resolver - 다양한 context 입력을 ContextId 로 정규화
//!
//! - `Global` → None (context 없는 범위)
//! - `Id` / `Context` → 그 ID
//! - `Owner` → 소유 엔티티의 context (없으면 None, 생성하지 않음)
//! - `Raw` → 숫자 문자열만 허용
//!
//! 그 외 입력은 `InvalidArgument`.

use std::sync::Arc;
use warden_foundation::{Context, ContextId, EntityRef, Error, RbacStore, Result};

/// context 입력
#[derive(Debug, Clone, PartialEq)]
pub enum ContextInput {
    Global,
    Id(ContextId),
    Context(Context),
    Owner(EntityRef),
    Raw(String),
}

impl From<Option<ContextId>> for ContextInput {
    fn from(id: Option<ContextId>) -> Self {
        match id {
            Some(id) => ContextInput::Id(id),
            None => ContextInput::Global,
        }
    }
}

impl From<ContextId> for ContextInput {
    fn from(id: ContextId) -> Self {
        ContextInput::Id(id)
    }
}

impl From<i64> for ContextInput {
    fn from(id: i64) -> Self {
        ContextInput::Id(ContextId(id))
    }
}

impl From<Context> for ContextInput {
    fn from(context: Context) -> Self {
        ContextInput::Context(context)
    }
}

impl From<&Context> for ContextInput {
    fn from(context: &Context) -> Self {
        ContextInput::Context(context.clone())
    }
}

impl From<EntityRef> for ContextInput {
    fn from(owner: EntityRef) -> Self {
        ContextInput::Owner(owner)
    }
}

impl From<&EntityRef> for ContextInput {
    fn from(owner: &EntityRef) -> Self {
        ContextInput::Owner(owner.clone())
    }
}

impl From<&str> for ContextInput {
    fn from(raw: &str) -> Self {
        ContextInput::Raw(raw.to_string())
    }
}

impl From<String> for ContextInput {
    fn from(raw: String) -> Self {
        ContextInput::Raw(raw)
    }
}

/// context 해석기
#[derive(Clone)]
pub struct ContextResolver {
    store: Arc<dyn RbacStore>,
}

impl ContextResolver {
    pub fn new(store: Arc<dyn RbacStore>) -> Self {
        Self { store }
    }

    pub fn resolve(&self, input: &ContextInput) -> Result<Option<ContextId>> {
        match input {
            ContextInput::Global => Ok(None),
            ContextInput::Id(id) => positive(id.0).map(Some),
            ContextInput::Context(context) => positive(context.id.0).map(Some),
            ContextInput::Owner(owner) => {
                if owner.entity_type.trim().is_empty() || owner.entity_id.trim().is_empty() {
                    return Err(invalid_context());
                }
                Ok(self.store.context_by_owner(owner)?.map(|c| c.id))
            }
            ContextInput::Raw(raw) => {
                let id: i64 = raw.trim().parse().map_err(|_| invalid_context())?;
                positive(id).map(Some)
            }
        }
    }
}

fn positive(id: i64) -> Result<ContextId> {
    if id <= 0 {
        return Err(invalid_context());
    }
    Ok(ContextId(id))
}

fn invalid_context() -> Error {
    Error::InvalidArgument("Invalid context provided.".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_foundation::SqliteStore;

    fn resolver() -> (ContextResolver, Arc<dyn RbacStore>) {
        let store: Arc<dyn RbacStore> =
            Arc::new(SqliteStore::in_memory().expect("Failed to create storage"));
        (ContextResolver::new(store.clone()), store)
    }

    #[test]
    fn test_global_and_id() {
        let (resolver, _) = resolver();
        assert_eq!(resolver.resolve(&ContextInput::Global).expect("resolve"), None);
        assert_eq!(
            resolver.resolve(&ContextInput::from(5i64)).expect("resolve"),
            Some(ContextId(5))
        );
        assert_eq!(
            resolver.resolve(&ContextInput::from(None)).expect("resolve"),
            None
        );
    }

    #[test]
    fn test_numeric_string() {
        let (resolver, _) = resolver();
        assert_eq!(
            resolver.resolve(&ContextInput::from(" 12 ")).expect("resolve"),
            Some(ContextId(12))
        );
        assert!(matches!(
            resolver.resolve(&ContextInput::from("team-a")),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            resolver.resolve(&ContextInput::from(0i64)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_owner_lookup_never_creates() {
        let (resolver, store) = resolver();
        let team = EntityRef::new("team", "1");

        assert_eq!(resolver.resolve(&ContextInput::from(&team)).expect("resolve"), None);
        assert!(store.contexts().expect("contexts").is_empty());

        let context = store.insert_context(None, Some(&team)).expect("insert");
        assert_eq!(
            resolver.resolve(&ContextInput::from(&team)).expect("resolve"),
            Some(context.id)
        );
        assert_eq!(
            resolver.resolve(&ContextInput::from(&context)).expect("resolve"),
            Some(context.id)
        );
    }

    #[test]
    fn test_empty_owner_is_invalid() {
        let (resolver, _) = resolver();
        let result = resolver.resolve(&ContextInput::Owner(EntityRef::new("", "1")));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
