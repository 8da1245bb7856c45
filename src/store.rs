//! Pending event store with TTL eviction
//!
//! Every event created through the store is held under a fresh correlation
//! id until it is delivered or expires. Expiry is lazy: entries are only
//! swept when a new event is created, so an idle store keeps what it has.
//!
//! Delivery claims an entry before the network call and settles it after,
//! which keeps a second `track` on the same handle from sending twice and
//! keeps a late completion from resurrecting a removed entry.

use crate::builder::{EventBuilder, SerializedEvent};
use crate::clock::Clock;
use crate::delivery::DeliveryClient;
use crate::id;
use crate::log::EventLog;
use crate::types::{Assignment, Field, FieldSet, FieldValue};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::Level;
use uuid::Uuid;

/// What a `track` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// The sensor accepted the event and the entry was removed
    Delivered,
    /// Delivery failed; the entry stays pending for a manual retry or expiry
    Retained,
    /// No pending entry for this handle (foreign, delivered, or expired)
    Missing,
    /// Another `track` for the same handle is still sending
    InFlight,
}

/// Caller-side handle to a pending event
///
/// Clones share the same record. Edits are synchronous and may happen from
/// any thread until the event is tracked.
#[derive(Clone)]
pub struct EventHandle {
    id: Uuid,
    record: Arc<Mutex<EventBuilder>>,
    clock: Arc<dyn Clock>,
}

impl EventHandle {
    /// Correlation id of this event
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Mutate the record
    ///
    /// ```rust
    /// # async fn example(store: &a3s_tracker::EventStore) {
    /// let event = store.create_event().await;
    /// event.edit(|e| {
    ///     e.set_ip_address("1.1.1.1").set_url("/login");
    /// });
    /// # }
    /// ```
    pub fn edit<R>(&self, f: impl FnOnce(&mut EventBuilder) -> R) -> R {
        f(&mut lock(&self.record))
    }

    /// Read the record
    pub fn read<R>(&self, f: impl FnOnce(&EventBuilder) -> R) -> R {
        f(&lock(&self.record))
    }

    pub fn set(&self, field: Field, value: impl Into<FieldValue>) -> Assignment {
        self.edit(|e| e.set(field, value))
    }

    pub fn is_valid(&self) -> bool {
        self.read(EventBuilder::is_valid)
    }

    /// Snapshot as it would be sent now, on the store's clock
    pub fn serialize(&self) -> SerializedEvent {
        let now = self.clock.now();
        self.read(|e| e.serialize_at(now))
    }

    fn owns(&self, record: &Arc<Mutex<EventBuilder>>) -> bool {
        Arc::ptr_eq(&self.record, record)
    }
}

impl fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandle").field("id", &self.id).finish()
    }
}

struct Entry {
    record: Arc<Mutex<EventBuilder>>,
    created_at: i64,
    in_flight: bool,
}

enum Claim {
    Ready(SerializedEvent),
    Skip(TrackOutcome),
}

/// Correlation-id indexed table of pending events
pub struct EventStore {
    entries: RwLock<HashMap<Uuid, Entry>>,
    field_set: FieldSet,
    timeout_secs: i64,
    clock: Arc<dyn Clock>,
    log: Arc<dyn EventLog>,
}

impl EventStore {
    pub fn new(
        field_set: FieldSet,
        timeout: Duration,
        clock: Arc<dyn Clock>,
        log: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            field_set,
            timeout_secs: i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX),
            clock,
            log,
        }
    }

    /// Field set every new record is bound to
    pub fn field_set(&self) -> &FieldSet {
        &self.field_set
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs as u64)
    }

    /// Sweep expired entries, then store a fresh record under a new id
    pub async fn create_event(&self) -> EventHandle {
        let now = self.clock.epoch_seconds();
        let mut entries = self.entries.write().await;

        self.sweep(&mut entries, now);

        let id = loop {
            let id = id::mint();
            if !entries.contains_key(&id) {
                break id;
            }
        };

        let record = Arc::new(Mutex::new(EventBuilder::new(self.field_set.clone())));
        entries.insert(
            id,
            Entry {
                record: record.clone(),
                created_at: now,
                in_flight: false,
            },
        );

        EventHandle {
            id,
            record,
            clock: self.clock.clone(),
        }
    }

    /// Look up a pending event; never evicts
    pub async fn get_event(&self, id: &Uuid) -> Option<EventHandle> {
        let entries = self.entries.read().await;
        entries.get(id).map(|entry| EventHandle {
            id: *id,
            record: entry.record.clone(),
            clock: self.clock.clone(),
        })
    }

    pub async fn contains(&self, id: &Uuid) -> bool {
        self.entries.read().await.contains_key(id)
    }

    /// Number of pending events
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Deliver a pending event, removing it on success
    pub async fn track(&self, handle: &EventHandle, delivery: &DeliveryClient) -> TrackOutcome {
        let event = match self.claim(handle).await {
            Claim::Ready(event) => event,
            Claim::Skip(outcome) => return outcome,
        };

        let delivered = delivery.send(&event).await;
        self.settle(handle, delivered).await
    }

    fn sweep(&self, entries: &mut HashMap<Uuid, Entry>, now: i64) -> usize {
        let expired: Vec<Uuid> = entries
            .iter()
            .filter(|(_, entry)| !entry.in_flight && now - entry.created_at >= self.timeout_secs)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(entry) = entries.remove(id) {
                let content = lock(&entry.record).serialize_at(self.clock.now());
                let json = serde_json::to_string(&content).unwrap_or_default();
                self.log.log(
                    Level::DEBUG,
                    &format!("Event {} was outdated, dropping event with content {}", id, json),
                );
            }
        }

        expired.len()
    }

    async fn claim(&self, handle: &EventHandle) -> Claim {
        let mut entries = self.entries.write().await;

        let Some(entry) = entries
            .get_mut(&handle.id)
            .filter(|entry| handle.owns(&entry.record))
        else {
            self.log.log(
                Level::DEBUG,
                &format!(
                    "Tracker misses event with id {}; create events through the tracker and do not reuse them",
                    handle.id
                ),
            );
            return Claim::Skip(TrackOutcome::Missing);
        };

        if entry.in_flight {
            self.log.log(
                Level::DEBUG,
                &format!("Event {} is already being delivered", handle.id),
            );
            return Claim::Skip(TrackOutcome::InFlight);
        }

        entry.in_flight = true;
        let event = lock(&entry.record).serialize_at(self.clock.now());

        if !event.defaulted().is_empty() {
            let names: Vec<&str> = event.defaulted().iter().map(|f| f.name()).collect();
            self.log.log(
                Level::DEBUG,
                &format!("Required fields were empty (filled with \"\"): {}", names.join(", ")),
            );
        }

        Claim::Ready(event)
    }

    async fn settle(&self, handle: &EventHandle, delivered: bool) -> TrackOutcome {
        let mut entries = self.entries.write().await;
        let owned = entries
            .get(&handle.id)
            .is_some_and(|entry| handle.owns(&entry.record));

        match (delivered, owned) {
            (true, true) => {
                entries.remove(&handle.id);
                TrackOutcome::Delivered
            }
            (true, false) => TrackOutcome::Delivered,
            (false, _) => {
                if let Some(entry) = entries.get_mut(&handle.id).filter(|e| handle.owns(&e.record)) {
                    entry.in_flight = false;
                }
                TrackOutcome::Retained
            }
        }
    }
}

fn lock(record: &Mutex<EventBuilder>) -> MutexGuard<'_, EventBuilder> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}
