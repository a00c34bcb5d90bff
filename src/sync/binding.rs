//! Storage binding — one storage key bound to typed reactive state.
//!
//! DESIGN
//! ======
//! A binding hydrates from the store, writes through on every set, and
//! re-publishes via the sync service. Events originating elsewhere are
//! absorbed: memory and store are overwritten without re-emitting, which is
//! what keeps two live contexts from ping-ponging the same snapshot.
//!
//! Hydration is a discrete state. A setter call that lands before
//! hydration marks the binding dirty and the late read will not clobber
//! the caller's value (write-wins).

use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::event::SyncAction;
use super::service::{ListenerId, ServiceChannel, ServiceEvent, SyncService};
use super::topic::{self, SyncTopic};

#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// The key is missing from the topic table. Raised at bind time so a
    /// typo fails the composition root, not a runtime sync cycle.
    #[error("storage key not in the topic table: {0}")]
    UnmappedKey(String),
}

struct BindingState<T> {
    value: T,
    hydrated: bool,
    /// A write landed before hydration; the stored value must not win.
    dirty: bool,
}

/// Typed view over one synced storage key.
pub struct StorageBinding<T> {
    service: Arc<SyncService>,
    key: String,
    topic: SyncTopic,
    state: Arc<Mutex<BindingState<T>>>,
    listener: ListenerId,
}

impl<T> StorageBinding<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    /// Bind `key`, hydrating immediately.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::UnmappedKey`] when `key` is not in the topic
    /// table.
    pub fn bind(service: &Arc<SyncService>, key: &str, default: T) -> Result<Self, BindError> {
        let binding = Self::bind_deferred(service, key, default)?;
        binding.hydrate();
        Ok(binding)
    }

    /// Bind `key` without reading the store yet. The binding holds
    /// `default` and reports unhydrated until [`hydrate`](Self::hydrate).
    ///
    /// # Errors
    ///
    /// Returns [`BindError::UnmappedKey`] when `key` is not in the topic
    /// table.
    pub fn bind_deferred(service: &Arc<SyncService>, key: &str, default: T) -> Result<Self, BindError> {
        let Some((_, bound_topic)) = topic::lookup(key) else {
            return Err(BindError::UnmappedKey(key.to_owned()));
        };

        let state = Arc::new(Mutex::new(BindingState { value: default, hydrated: false, dirty: false }));

        let weak_state: Weak<Mutex<BindingState<T>>> = Arc::downgrade(&state);
        let weak_service = Arc::downgrade(service);
        let own_origin = service.origin_id().to_owned();
        let bound_key = key.to_owned();
        let listener = service.on(ServiceChannel::Sync, move |event| {
            let ServiceEvent::Sync(event) = event else {
                return;
            };
            if event.topic != bound_topic || event.origin_id == own_origin {
                return;
            }
            let Some(state) = weak_state.upgrade() else {
                return;
            };
            match serde_json::from_value::<T>(event.payload.clone()) {
                Ok(value) => {
                    {
                        let mut state = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                        state.value = value;
                        state.hydrated = true;
                        state.dirty = false;
                    }
                    // Absorption is terminal: persist, never re-emit. An
                    // external event was synthesized from the store itself,
                    // so there is nothing to write back.
                    if !event.is_external() {
                        if let Some(service) = weak_service.upgrade() {
                            service.write_raw(&bound_key, &event.payload.to_string());
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, key = %bound_key, "sync payload does not fit bound type; dropping");
                }
            }
        });

        Ok(Self {
            service: Arc::clone(service),
            key: key.to_owned(),
            topic: bound_topic,
            state,
            listener,
        })
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn topic(&self) -> SyncTopic {
        self.topic
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .value
            .clone()
    }

    #[must_use]
    pub fn is_hydrated(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .hydrated
    }

    /// Replace the value: memory, store, then a sync emit for the topic.
    pub fn set(&self, value: T) {
        let payload = match serde_json::to_value(&value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, key = %self.key, "value not serializable; kept in memory only");
                let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                if !state.hydrated {
                    state.dirty = true;
                }
                state.value = value;
                return;
            }
        };

        {
            let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if !state.hydrated {
                state.dirty = true;
            }
            state.value = value;
        }

        self.service.write_raw(&self.key, &payload.to_string());
        self.service.emit_sync_event(self.topic, SyncAction::Update, payload);
    }

    /// Replace the value as a function of the previous one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.get());
        self.set(next);
    }

    /// Read the store once and settle the hydration state. A value written
    /// by the caller before this runs is kept (write-wins); a stored value
    /// that does not parse is logged and the default kept. Never emits.
    pub fn hydrate(&self) {
        let already = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .hydrated;
        if already {
            return;
        }

        let stored = self.service.read_raw(&self.key);

        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.hydrated {
            // An absorbed event settled hydration while we were reading.
            return;
        }
        if let Some(raw) = stored {
            match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    if !state.dirty {
                        state.value = value;
                    }
                }
                Err(e) => warn!(error = %e, key = %self.key, "stored value unreadable; keeping default"),
            }
        }
        state.hydrated = true;
    }
}

impl<T> Drop for StorageBinding<T> {
    fn drop(&mut self) {
        self.service.off(ServiceChannel::Sync, self.listener);
    }
}

#[cfg(test)]
#[path = "binding_test.rs"]
mod tests;
