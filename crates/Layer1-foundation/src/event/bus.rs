//! Event Bus - 이벤트 발행 시스템
//!
//! 변경 연산과 같은 호출 안에서 동기적으로 리스너에 전달한다.
//! 리스너 에러는 잡아서 로그로 남기고 호출자에게 전파하지 않는다.

use super::types::{EventCategory, GrantEvent};
use crate::Result;
use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

// ============================================================================
// EventListener Trait
// ============================================================================

/// 이벤트 리스너 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// 이벤트 리스너 trait
pub trait EventListener: Send + Sync {
    /// 리스너 이름 (디버깅용)
    fn name(&self) -> &str;

    /// 관심 있는 카테고리 (None 이면 모든 이벤트)
    fn categories(&self) -> Option<Vec<EventCategory>> {
        None
    }

    /// 이벤트 처리. 실패해도 발행자에게는 영향 없음
    fn on_event(&self, event: &GrantEvent) -> Result<()>;
}

// ============================================================================
// EventFilter
// ============================================================================

/// 이벤트 필터
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// 카테고리 필터
    pub categories: Option<Vec<EventCategory>>,

    /// 이벤트 이름 패턴 (prefix 매칭)
    pub names: Option<Vec<String>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categories(mut self, categories: Vec<EventCategory>) -> Self {
        self.categories = Some(categories);
        self
    }

    pub fn with_names(mut self, names: Vec<String>) -> Self {
        self.names = Some(names);
        self
    }

    /// 이벤트가 필터를 통과하는지 확인
    pub fn matches(&self, event: &GrantEvent) -> bool {
        if let Some(ref cats) = self.categories {
            if !cats.contains(&event.category()) {
                return false;
            }
        }

        if let Some(ref names) = self.names {
            if !names.iter().any(|n| event.name().starts_with(n.as_str())) {
                return false;
            }
        }

        true
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// 이벤트 버스 설정
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// 브로드캐스트 채널 용량
    pub channel_capacity: usize,

    /// 이벤트 히스토리 보관 개수
    pub history_size: usize,

    /// 디버그 모드 (모든 이벤트 로깅)
    pub debug_mode: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            history_size: 100,
            debug_mode: false,
        }
    }
}

/// 등록된 리스너 정보
struct RegisteredListener {
    listener: Arc<dyn EventListener>,
    filter: Option<EventFilter>,
}

impl RegisteredListener {
    fn wants(&self, event: &GrantEvent) -> bool {
        match &self.filter {
            Some(filter) => filter.matches(event),
            None => match self.listener.categories() {
                Some(cats) => cats.contains(&event.category()),
                None => true,
            },
        }
    }
}

/// 이벤트 버스
///
/// 엔진 인스턴스마다 하나씩 소유한다 (전역 버스 없음).
///
/// ```ignore
/// use warden_foundation::event::{EventBus, GrantEvent, GrantEventKind};
///
/// let bus = EventBus::new();
/// let id = bus.subscribe(Arc::new(MyListener));
/// bus.publish(GrantEvent::new(kind));
/// bus.unsubscribe(id);
/// ```
pub struct EventBus {
    config: EventBusConfig,

    /// 비동기 소비자용 브로드캐스트 채널
    sender: broadcast::Sender<GrantEvent>,

    /// 등록 순서대로 전달
    listeners: RwLock<BTreeMap<ListenerId, RegisteredListener>>,

    listener_counter: AtomicU64,

    history: RwLock<VecDeque<GrantEvent>>,

    event_count: AtomicU64,

    /// 실패한 리스너 전달 수
    failed_deliveries: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));

        Self {
            config,
            sender,
            listeners: RwLock::new(BTreeMap::new()),
            listener_counter: AtomicU64::new(0),
            history: RwLock::new(VecDeque::new()),
            event_count: AtomicU64::new(0),
            failed_deliveries: AtomicU64::new(0),
        }
    }

    /// 리스너 등록
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        self.subscribe_with_filter(listener, None)
    }

    /// 필터와 함께 리스너 등록
    pub fn subscribe_with_filter(
        &self,
        listener: Arc<dyn EventListener>,
        filter: Option<EventFilter>,
    ) -> ListenerId {
        let id = ListenerId(self.listener_counter.fetch_add(1, Ordering::SeqCst));

        debug!(
            listener_name = listener.name(),
            listener_id = %id,
            "Registering event listener"
        );

        self.listeners
            .write()
            .insert(id, RegisteredListener { listener, filter });
        id
    }

    /// 리스너 해제
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let removed = self.listeners.write().remove(&id).is_some();
        if removed {
            debug!(listener_id = %id, "Unregistered event listener");
        }
        removed
    }

    /// 이벤트 발행 (실패하지 않음)
    pub fn publish(&self, event: GrantEvent) {
        let event_count = self.event_count.fetch_add(1, Ordering::SeqCst);

        if self.config.debug_mode {
            trace!(
                event_id = %event.id,
                event = event.name(),
                category = event.category().as_str(),
                "Publishing event #{}", event_count + 1
            );
        }

        {
            let mut history = self.history.write();
            history.push_back(event.clone());
            while history.len() > self.config.history_size {
                history.pop_front();
            }
        }

        // 수신자가 없으면 에러지만 무시
        let _ = self.sender.send(event.clone());

        // 리스너가 재진입해 subscribe 할 수 있도록 목록을 복사한 뒤 전달
        let targets: Vec<(ListenerId, Arc<dyn EventListener>)> = self
            .listeners
            .read()
            .iter()
            .filter(|(_, registered)| registered.wants(&event))
            .map(|(id, registered)| (*id, Arc::clone(&registered.listener)))
            .collect();

        for (id, listener) in targets {
            trace!(
                listener_id = %id,
                listener_name = listener.name(),
                event = event.name(),
                "Delivering event to listener"
            );

            // panic 도 실패로 센다 (발행자에게 전파하지 않음)
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.failed_deliveries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        listener_name = listener.name(),
                        event = event.name(),
                        error = %e,
                        "Event listener failed"
                    );
                }
                Err(_) => {
                    self.failed_deliveries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        listener_name = listener.name(),
                        event = event.name(),
                        "Event listener panicked"
                    );
                }
            }
        }
    }

    /// 브로드캐스트 수신자 생성 (비동기 소비자용)
    pub fn receiver(&self) -> broadcast::Receiver<GrantEvent> {
        self.sender.subscribe()
    }

    /// 최근 이벤트 (최신순)
    pub fn history(&self, limit: Option<usize>) -> Vec<GrantEvent> {
        let history = self.history.read();
        let limit = limit.unwrap_or(history.len());
        history.iter().rev().take(limit).cloned().collect()
    }

    /// 필터로 히스토리 검색 (발행순)
    pub fn search_history(&self, filter: &EventFilter) -> Vec<GrantEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// 총 발행된 이벤트 수
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }

    pub fn failed_deliveries(&self) -> u64 {
        self.failed_deliveries.load(Ordering::Relaxed)
    }

    pub fn clear_history(&self) {
        self.history.write().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// 테스트
// ============================================================================
