//! Typed publish/subscribe hub used to decouple the engine's stateful objects.
//!
//! Subscriptions are explicit: callers keep the returned [`SubscriptionId`] and
//! unsubscribe with [`EventHub::off`]. `destroy` clears the registry so no
//! listener outlives the hub by accident.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::regions::{RegionId, RegionSnapshot};

/// Identifier returned by [`EventHub::on`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Typed event registry with explicit unsubscription.
pub struct EventHub<E> {
    inner: Mutex<HubInner<E>>,
}

struct HubInner<E> {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Callback<E>)>,
    destroyed: bool,
}

impl<E> EventHub<E> {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HubInner {
                next_id: 1,
                subscribers: Vec::new(),
                destroyed: false,
            }),
        }
    }

    /// Register a listener and return its subscription id.
    ///
    /// Listeners registered after `destroy` are dropped immediately.
    pub fn on(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> SubscriptionId {
        let mut inner = self.inner.lock().expect("event hub lock");
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        if !inner.destroyed {
            inner.subscribers.push((id, Arc::new(callback)));
        }
        id
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn off(&self, id: SubscriptionId) {
        let mut inner = self.inner.lock().expect("event hub lock");
        inner.subscribers.retain(|(existing, _)| *existing != id);
    }

    /// Deliver an event to every live subscriber in registration order.
    ///
    /// Callbacks run outside the lock so a listener may subscribe or
    /// unsubscribe while handling an event.
    pub fn emit(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = {
            let inner = self.inner.lock().expect("event hub lock");
            if inner.destroyed {
                return;
            }
            inner
                .subscribers
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect()
        };
        for callback in callbacks {
            callback(event);
        }
    }

    /// Drop every subscriber and refuse further registrations.
    pub fn destroy(&self) {
        let mut inner = self.inner.lock().expect("event hub lock");
        inner.destroyed = true;
        inner.subscribers.clear();
    }

    /// Number of live subscribers, used by teardown tests.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("event hub lock").subscribers.len()
    }
}

impl<E> Default for EventHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Idempotent destroyed flag shared by every stateful engine object.
///
/// Methods on destroyed objects are silent no-ops so late asynchronous
/// callbacks cannot crash the host after teardown.
#[derive(Debug, Default)]
pub struct DestroyFlag(AtomicBool);

impl DestroyFlag {
    /// Create a live flag.
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// True once `destroy` has run.
    pub fn is_destroyed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Mark destroyed. Returns true only for the first call.
    pub fn destroy(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

/// Events published on the facade's single external surface.
#[derive(Clone, Debug, PartialEq)]
pub enum WaveformEvent {
    /// Fetch and decode finished; the engine is playback-ready.
    Load,
    /// A network or decode failure, with a human-readable message.
    Error(String),
    /// Load progress: `(loaded_bytes, total_bytes)`, total `-1` when unknown.
    Progress(i64, i64),
    Play,
    Pause,
    /// Playback time advanced (seconds).
    Playing(f64),
    /// Playback position changed by an explicit seek (seconds).
    Seek(f64),
    /// Playback reached the end of its effective range.
    PlayEnd,
    Zoom(f32),
    VolumeChanged(f32),
    RateChanged(f32),
    /// Duration became known or changed (seconds).
    DurationChanged(f64),
    Scroll(f32),
    RegionCreated(RegionSnapshot),
    RegionUpdated(RegionSnapshot),
    /// A drag/resize gesture on a region finished.
    RegionUpdatedEnd(RegionSnapshot),
    RegionSelected(RegionSnapshot),
    RegionRemoved(RegionId),
    /// Layer stack membership or visibility changed.
    LayersUpdated,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn emit_reaches_subscribers_in_order() {
        let hub = EventHub::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&seen);
        let second = Arc::clone(&seen);
        hub.on(move |value| first.lock().unwrap().push(("a", *value)));
        hub.on(move |value| second.lock().unwrap().push(("b", *value)));

        hub.emit(&7);

        assert_eq!(*seen.lock().unwrap(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn off_removes_only_the_requested_subscriber() {
        let hub = EventHub::<u32>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let kept = Arc::clone(&count);
        let dropped = Arc::clone(&count);
        hub.on(move |_| {
            kept.fetch_add(1, Ordering::Relaxed);
        });
        let id = hub.on(move |_| {
            dropped.fetch_add(10, Ordering::Relaxed);
        });
        hub.off(id);

        hub.emit(&1);

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn destroy_clears_registry_and_blocks_new_listeners() {
        let hub = EventHub::<u32>::new();
        hub.on(|_| {});
        hub.destroy();
        hub.on(|_| {});
        assert_eq!(hub.subscriber_count(), 0);
        // Emitting after destroy must be a silent no-op.
        hub.emit(&1);
    }

    #[test]
    fn destroy_flag_reports_first_call_only() {
        let flag = DestroyFlag::new();
        assert!(!flag.is_destroyed());
        assert!(flag.destroy());
        assert!(!flag.destroy());
        assert!(flag.is_destroyed());
    }
}
