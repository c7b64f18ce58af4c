use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::session::{MemorySessionStorage, SessionStorage, LATEST_TRIP_KEY};
use crate::types::itinerary::Itinerary;

/// Holder of the current itinerary.
///
/// One value at a time, overwritten on every successful generation and mirrored to
/// the session slot `latestTripPlan`. Collaborators (detail view, map view, export)
/// read it by value or subscribe to changes; none of them write.
#[derive(Debug)]
pub struct TripStore {
    current: watch::Sender<Option<Arc<Itinerary>>>,
    session: Arc<dyn SessionStorage>,
}

impl TripStore {
    pub fn new(session: Arc<dyn SessionStorage>) -> Self {
        let (current, _) = watch::channel(None);
        Self { current, session }
    }

    /// Store backed by process-local session storage
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStorage::new()))
    }

    /// Replace the current itinerary and mirror it to the session slot.
    ///
    /// A failed session write is logged; the in-memory value is still replaced.
    pub fn set(&self, itinerary: Itinerary) -> Arc<Itinerary> {
        let itinerary = Arc::new(itinerary);

        match serde_json::to_string(itinerary.as_ref()) {
            Ok(json) => {
                if let Err(err) = self.session.set(LATEST_TRIP_KEY, &json) {
                    warn!(target: "tripgen::store", error = %err, "failed to mirror itinerary to session");
                }
            }
            Err(err) => {
                warn!(target: "tripgen::store", error = %err, "failed to serialize itinerary");
            }
        }

        self.current.send_replace(Some(Arc::clone(&itinerary)));
        info!(
            target: "tripgen::store",
            city = %itinerary.city,
            days = itinerary.days.len(),
            activities = itinerary.activity_count(),
            "stored itinerary"
        );
        itinerary
    }

    /// Current itinerary, reading through to the session slot when nothing has been
    /// produced in this process yet.
    pub fn get(&self) -> Option<Arc<Itinerary>> {
        let current = self.current.borrow().clone();
        current.or_else(|| self.restore())
    }

    /// Owned copy for collaborators that want the value itself
    pub fn snapshot(&self) -> Option<Itinerary> {
        self.get().map(|itinerary| itinerary.as_ref().clone())
    }

    /// Change notifications; the receiver sees `None` until the first write
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Itinerary>>> {
        self.current.subscribe()
    }

    /// Drop the in-memory value and the session mirror
    pub fn clear(&self) {
        self.current.send_replace(None);
        if let Err(err) = self.session.remove(LATEST_TRIP_KEY) {
            warn!(target: "tripgen::store", error = %err, "failed to clear session itinerary");
        }
    }

    fn restore(&self) -> Option<Arc<Itinerary>> {
        let json = match self.session.get(LATEST_TRIP_KEY) {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(err) => {
                warn!(target: "tripgen::store", error = %err, "failed to read session itinerary");
                return None;
            }
        };

        let itinerary = match serde_json::from_str::<Itinerary>(&json) {
            Ok(itinerary) => Arc::new(itinerary),
            Err(err) => {
                warn!(target: "tripgen::store", error = %err, "discarding unreadable session itinerary");
                return None;
            }
        };

        // a write that raced the restore wins
        self.current.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(Arc::clone(&itinerary));
                true
            } else {
                false
            }
        });
        debug!(target: "tripgen::store", city = %itinerary.city, "restored itinerary from session");

        self.current.borrow().clone()
    }
}

impl Default for TripStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
