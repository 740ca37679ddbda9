//! Role Hierarchy - 역할 계층 탐색
//!
//! 간선 (parent, child) 은 "parent 가 child 의 권한을 상속" 을 뜻한다.
//! 간선 목록은 해석 1회당 한 번만 읽고 메모리에서 탐색한다.
//! 방문 집합으로 중복 방문을 막으므로 데이터에 순환이 있어도 O(V+E) 에 종료한다.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::trace;
use warden_foundation::{RbacStore, Result, Role, RoleId};

/// 역할 계층 그래프 (인접 리스트)
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    children: HashMap<RoleId, Vec<RoleId>>,
    parents: HashMap<RoleId, Vec<RoleId>>,
}

impl RoleGraph {
    pub fn from_edges(edges: impl IntoIterator<Item = (RoleId, RoleId)>) -> Self {
        let mut graph = Self::default();
        for (parent, child) in edges {
            graph.children.entry(parent).or_default().push(child);
            graph.parents.entry(child).or_default().push(parent);
        }
        graph
    }

    pub fn load(store: &dyn RbacStore) -> Result<Self> {
        Ok(Self::from_edges(store.role_edges()?))
    }

    pub fn edge_count(&self) -> usize {
        self.children.values().map(Vec::len).sum()
    }

    pub fn children_of(&self, role: RoleId) -> &[RoleId] {
        self.children.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 시작 역할들과 child 간선으로 도달 가능한 모든 역할 (시작 순서 우선, 중복 없음)
    pub fn expand(&self, roots: &[RoleId]) -> Vec<RoleId> {
        walk(roots, |id| self.children_of(id))
    }

    /// from 에서 child 간선을 따라 to 에 도달하는지 (from == to 면 true)
    pub fn reaches(&self, from: RoleId, to: RoleId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(self.children_of(current).iter().copied());
        }
        false
    }

    /// 자신을 제외한 모든 하위 역할
    pub fn descendants(&self, role: RoleId) -> Vec<RoleId> {
        walk(&[role], |id| self.children_of(id))
            .into_iter()
            .filter(|id| *id != role)
            .collect()
    }

    /// 자신을 제외한 모든 상위 역할
    pub fn ancestors(&self, role: RoleId) -> Vec<RoleId> {
        let parents_of = |id: RoleId| self.parents.get(&id).map(Vec::as_slice).unwrap_or(&[]);
        walk(&[role], parents_of)
            .into_iter()
            .filter(|id| *id != role)
            .collect()
    }

    /// parent -> child 간선 추가 시 순환이 생기는지
    pub fn would_create_cycle(&self, parent: RoleId, child: RoleId) -> bool {
        parent == child || self.reaches(child, parent)
    }
}

/// 반복 DFS, 방문 순서대로 반환
fn walk<'a, F>(roots: &[RoleId], next: F) -> Vec<RoleId>
where
    F: Fn(RoleId) -> &'a [RoleId],
{
    let mut visited = HashSet::new();
    let mut order = Vec::new();

    for root in roots {
        let mut stack = vec![*root];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            order.push(current);
            // 자식을 역순으로 넣어 선언 순서대로 방문
            stack.extend(next(current).iter().rev().copied());
        }
    }

    order
}

/// 직접 역할을 전체 상속 역할로 확장
#[derive(Clone)]
pub struct HierarchyResolver {
    store: Arc<dyn RbacStore>,
}

impl HierarchyResolver {
    pub fn new(store: Arc<dyn RbacStore>) -> Self {
        Self { store }
    }

    pub fn graph(&self) -> Result<RoleGraph> {
        RoleGraph::load(self.store.as_ref())
    }

    /// 직접 역할 ∪ 하위 역할 전체 (id 기준 중복 제거)
    pub fn expand(&self, direct: &[Role]) -> Result<Vec<Role>> {
        if direct.is_empty() {
            return Ok(Vec::new());
        }
        let graph = self.graph()?;
        self.expand_with(&graph, direct)
    }

    /// 이미 로드한 그래프로 확장
    pub fn expand_with(&self, graph: &RoleGraph, direct: &[Role]) -> Result<Vec<Role>> {
        let roots: Vec<RoleId> = direct.iter().map(|r| r.id).collect();
        let ids = graph.expand(&roots);

        let known: HashSet<RoleId> = roots.iter().copied().collect();
        let missing: Vec<RoleId> = ids.iter().copied().filter(|id| !known.contains(id)).collect();

        let mut by_id: HashMap<RoleId, Role> = direct.iter().map(|r| (r.id, r.clone())).collect();
        if !missing.is_empty() {
            for role in self.store.roles_by_ids(&missing)? {
                by_id.insert(role.id, role);
            }
        }

        trace!(
            direct = direct.len(),
            expanded = ids.len(),
            "Role hierarchy expanded"
        );

        // 간선만 남고 역할이 사라진 경우는 건너뛴다
        Ok(ids.into_iter().filter_map(|id| by_id.remove(&id)).collect())
    }
}
