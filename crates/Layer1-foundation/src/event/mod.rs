//! Event System - 권한 변경 이벤트 발행/구독
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        EventBus                              │
//! │  publish(GrantEvent)  (동기, 실패 격리)                      │
//! │         │                                                   │
//! │         ├──────────────────┬──────────────────┐             │
//! │         ▼                  ▼                  ▼             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
//! │  │  AuditEvent  │  │   Custom     │  │  broadcast   │      │
//! │  │  Listener    │  │   Listener   │  │  receiver()  │      │
//! │  └──────────────┘  └──────────────┘  └──────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 사용법
//!
//! ```ignore
//! use warden_foundation::event::{EventBus, EventListener, GrantEvent};
//!
//! struct MyListener;
//!
//! impl EventListener for MyListener {
//!     fn name(&self) -> &str { "my_listener" }
//!
//!     fn on_event(&self, event: &GrantEvent) -> warden_foundation::Result<()> {
//!         println!("Received: {}", event.name());
//!         Ok(())
//!     }
//! }
//!
//! let bus = EventBus::new();
//! bus.subscribe(Arc::new(MyListener));
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventBusConfig, EventFilter, EventListener, ListenerId};

pub use types::{EventCategory, EventId, GrantEvent, GrantEventKind};
