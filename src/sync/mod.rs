//! Local-first sync core.
//!
//! SYSTEM CONTEXT
//! ==============
//! One [`SyncService`] per running context coordinates publish/subscribe of
//! whole-collection snapshots across every context attached to the same
//! [`crate::store::Origin`]. [`StorageBinding`] is the typed per-key surface
//! the rest of the app consumes; [`heartbeat`] reports liveness to the
//! companion server. There is deliberately no ambient singleton: the
//! composition root builds one service and hands the `Arc` down.

pub mod binding;
pub mod event;
pub mod heartbeat;
pub mod service;
pub mod topic;
pub mod transport;

pub use binding::{BindError, StorageBinding};
pub use event::{SyncAction, SyncEvent};
pub use heartbeat::HeartbeatConfig;
pub use service::{ListenerId, ServiceChannel, ServiceEvent, SyncConfig, SyncService};
pub use topic::SyncTopic;
pub use transport::{Transport, TransportKind};
