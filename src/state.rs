//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the presence tracker and the optional record backend; both are
//! cheap to clone (Arc-backed).

use std::sync::Arc;

use crate::records::RecordStore;
use crate::services::presence::PresenceTracker;

/// Shared application state, injected into Axum handlers via State
/// extractor. Clone is required by Axum — all inner fields are Arc-wrapped
/// or Clone.
#[derive(Clone)]
pub struct AppState {
    pub presence: PresenceTracker,
    /// Optional record backend. `None` when no backend is configured; the
    /// proxy routes then answer service-unavailable.
    pub records: Option<Arc<dyn RecordStore>>,
}

impl AppState {
    #[must_use]
    pub fn new(records: Option<Arc<dyn RecordStore>>) -> Self {
        Self { presence: PresenceTracker::new(), records }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
