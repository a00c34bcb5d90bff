//! Stacked — creator-pipeline manager with a local-first sync core.
//!
//! ARCHITECTURE
//! ============
//! Every running instance of the app is a *context*. Contexts on the same
//! machine attach to a shared [`store::Origin`] and keep their record
//! collections convergent through three redundant delivery paths: the origin
//! broadcast bus, the storage-change signal, and a polling safety net. The
//! [`sync::SyncService`] coordinates those paths per context;
//! [`sync::StorageBinding`] binds one storage key to typed reactive state.
//!
//! The binary in `main.rs` runs the companion HTTP server: a presence
//! endpoint fed by each context's heartbeat reporter, plus thin proxy routes
//! to an optional third-party record backend.

pub mod config;
pub mod records;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod sync;
