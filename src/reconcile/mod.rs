//! Reconciliation of the persisted document with the active state.
//!
//! The [`Reconciler`] owns the single active [`StateStore`]. Every change,
//! whether a reload of the backing document or a client write, runs the same
//! pipeline under one writer lock:
//!
//! 1. **Loading**: read the document (reloads only)
//! 2. **Diffing**: merge or write into a candidate store and diff it against
//!    the active one
//! 3. **Applying**: persist (writes only), swap the candidate in atomically,
//!    then notify subscribers
//!
//! Readers never take the lock; they load the active snapshot from an
//! [`ArcSwap`] and always observe either the old or the new state in full.

pub mod diff;
pub mod subscribers;
pub mod watcher;

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{Result, SettingsError, ValidationWarning};
use crate::merge;
use crate::path::SettingPath;
use crate::schema::UnifiedSchema;
use crate::state::StateStore;
use crate::storage::DocumentStore;

pub use diff::diff;
pub use subscribers::{
    ChangeEvent, SubscriberSet, Subscription, WatchFilter, DEFAULT_QUEUE_CAPACITY,
};
pub use watcher::{DocumentWatcher, WatchOptions};

/// Where the reconciler is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReconcilePhase {
    Idle = 0,
    Loading = 1,
    Diffing = 2,
    Applying = 3,
}

impl ReconcilePhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ReconcilePhase::Loading,
            2 => ReconcilePhase::Diffing,
            3 => ReconcilePhase::Applying,
            _ => ReconcilePhase::Idle,
        }
    }
}

/// Tunables for a reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    /// Per-subscriber queue capacity.
    pub queue_capacity: usize,
    /// Write the normalized document back after a startup load that
    /// produced no warnings, or when there was no document yet.
    pub persist_on_open: bool,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            persist_on_open: true,
        }
    }
}

/// Result of one applied change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
    /// Canonical paths of every leaf that changed.
    pub changed: Vec<SettingPath>,
    /// Warnings from lenient merges. Always empty for strict writes.
    pub warnings: Vec<ValidationWarning>,
    /// Revision of the active state after the change.
    pub revision: u64,
}

impl ApplyOutcome {
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Owns the active state and serializes every change to it.
pub struct Reconciler {
    schema: Arc<UnifiedSchema>,
    store: Box<dyn DocumentStore>,
    active: ArcSwap<StateStore>,
    write_lock: Mutex<()>,
    subscribers: Arc<SubscriberSet>,
    phase: AtomicU8,
    revision: AtomicU64,
    fingerprint: String,
}

impl Reconciler {
    /// Load the initial state.
    ///
    /// A missing document yields the defaults. So does an unreadable one;
    /// the broken file is then left untouched so it can be repaired by hand.
    /// A document with invalid values is not rewritten either: the values
    /// take their defaults in memory only. Never fails.
    pub fn open(
        schema: Arc<UnifiedSchema>,
        store: Box<dyn DocumentStore>,
        options: ReconcilerOptions,
    ) -> (Self, Vec<ValidationWarning>) {
        let fingerprint = schema.fingerprint();
        let subscribers = Arc::new(SubscriberSet::new(
            schema.leaf_tags(),
            options.queue_capacity,
        ));

        let (initial, warnings, persist) = match store.load() {
            Ok(Some(document)) => {
                if document.version().is_some_and(|v| v != fingerprint) {
                    info!(
                        stored = document.version().unwrap_or_default(),
                        current = %fingerprint,
                        "Schema changed since the state was last saved"
                    );
                }
                let (state, warnings) = merge::merge(&schema, &document);
                if !warnings.is_empty() {
                    info!(
                        store = %store.describe(),
                        warnings = warnings.len(),
                        "Saved state has invalid values, leaving it untouched"
                    );
                }
                let persist = options.persist_on_open && warnings.is_empty();
                (state, warnings, persist)
            }
            Ok(None) => {
                info!(store = %store.describe(), "No saved state, using defaults");
                (schema.defaults(), Vec::new(), options.persist_on_open)
            }
            Err(e) => {
                warn!(
                    store = %store.describe(),
                    error = %e,
                    "Saved state unreadable, using defaults"
                );
                (schema.defaults(), Vec::new(), false)
            }
        };

        if persist {
            if let Err(e) = store.save(&initial.to_document(Some(&fingerprint))) {
                warn!(store = %store.describe(), error = %e, "Failed to write initial state");
            }
        }

        info!(
            namespaces = schema.entries().len(),
            leaves = initial.leaves().len(),
            warnings = warnings.len(),
            "State loaded"
        );

        let reconciler = Self {
            schema,
            store,
            active: ArcSwap::from_pointee(initial),
            write_lock: Mutex::new(()),
            subscribers,
            phase: AtomicU8::new(ReconcilePhase::Idle as u8),
            revision: AtomicU64::new(0),
            fingerprint,
        };
        (reconciler, warnings)
    }

    pub fn schema(&self) -> &Arc<UnifiedSchema> {
        &self.schema
    }

    /// The active state. Cheap; never blocks on writers.
    pub fn snapshot(&self) -> Arc<StateStore> {
        self.active.load_full()
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> ReconcilePhase {
        ReconcilePhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn subscribers(&self) -> &Arc<SubscriberSet> {
        &self.subscribers
    }

    /// Subscribe to changes matching `filter`.
    pub fn subscribe(&self, filter: WatchFilter) -> Subscription {
        self.subscribers.subscribe(filter)
    }

    fn set_phase(&self, phase: ReconcilePhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
        debug!(phase = ?phase, "Reconcile phase");
    }

    /// Re-read the backing document and apply it.
    ///
    /// If the document cannot be read, parsed, or has disappeared, the
    /// active state is kept and the error returned.
    pub fn reload(&self) -> Result<ApplyOutcome> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        self.set_phase(ReconcilePhase::Loading);
        let document = match self.store.load() {
            Ok(Some(document)) => document,
            Ok(None) => {
                self.set_phase(ReconcilePhase::Idle);
                warn!(store = %self.store.describe(), "Saved state disappeared, keeping current state");
                return Err(SettingsError::NotFound(self.store.describe()));
            }
            Err(e) => {
                self.set_phase(ReconcilePhase::Idle);
                warn!(
                    store = %self.store.describe(),
                    error = %e,
                    "Reload failed, keeping current state"
                );
                return Err(e);
            }
        };

        self.set_phase(ReconcilePhase::Diffing);
        let (candidate, warnings) = merge::merge(&self.schema, &document);
        let mut outcome = self.apply(candidate, false)?;
        outcome.warnings = warnings;
        Ok(outcome)
    }

    /// Compute a candidate from the active state with `f`, then persist and
    /// apply it. If `f` or persistence fails nothing changes.
    pub fn write_with<F>(&self, f: F) -> Result<ApplyOutcome>
    where
        F: FnOnce(&UnifiedSchema, &StateStore) -> Result<(StateStore, Vec<ValidationWarning>)>,
    {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        self.set_phase(ReconcilePhase::Diffing);
        let current = self.active.load_full();
        let (candidate, warnings) = match f(self.schema.as_ref(), current.as_ref()) {
            Ok(result) => result,
            Err(e) => {
                self.set_phase(ReconcilePhase::Idle);
                return Err(e);
            }
        };
        let mut outcome = self.apply(candidate, true)?;
        outcome.warnings = warnings;
        Ok(outcome)
    }

    /// Diff, optionally persist, swap and publish. Caller holds the lock and
    /// has set the phase to `Diffing`.
    fn apply(&self, candidate: StateStore, persist: bool) -> Result<ApplyOutcome> {
        let current = self.active.load_full();
        let changes = diff(&current, &candidate);

        if changes.is_empty() && *current == candidate {
            self.set_phase(ReconcilePhase::Idle);
            return Ok(ApplyOutcome {
                revision: self.revision(),
                ..ApplyOutcome::default()
            });
        }

        self.set_phase(ReconcilePhase::Applying);
        if persist {
            let document = candidate.to_document(Some(&self.fingerprint));
            if let Err(e) = self.store.save(&document) {
                self.set_phase(ReconcilePhase::Idle);
                warn!(store = %self.store.describe(), error = %e, "Persist failed, change aborted");
                return Err(match e {
                    SettingsError::Persist(_) => e,
                    other => SettingsError::Persist(other.to_string()),
                });
            }
        }

        // Unknown-key-only changes still replace the store but bump nothing.
        let revision = if changes.is_empty() {
            self.revision()
        } else {
            self.revision.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.active.store(Arc::new(candidate));

        let applied_at = Utc::now();
        let batch: Vec<ChangeEvent> = changes
            .into_iter()
            .map(|(path, value)| ChangeEvent {
                path,
                value,
                revision,
                applied_at,
            })
            .collect();
        let dropped = self.subscribers.publish(&batch);
        self.set_phase(ReconcilePhase::Idle);

        if !batch.is_empty() {
            info!(
                revision,
                changed = batch.len(),
                disconnected = dropped,
                "State applied"
            );
        }

        Ok(ApplyOutcome {
            changed: batch.into_iter().map(|event| event.path).collect(),
            warnings: Vec::new(),
            revision,
        })
    }
}
