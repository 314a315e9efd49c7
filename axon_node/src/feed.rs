//! In-process latest-value feeds.
//!
//! External collaborators (the arming feed, the per-group control
//! setpoint feeds) deliver updates as single-writer latest-value
//! channels: a publisher overwrites the current value and bumps a
//! sequence number; a subscriber observes "changed since last read" and
//! is woken through a pollable [`DataEvent`]. A slow consumer sees the
//! newest value, never a backlog.

use std::io;
use std::sync::{Arc, Mutex};

use axon_common::consts::MAX_CONTROL_GROUPS;
use axon_common::control::ControlSetpoints;
use axon_common::event::DataEvent;

// ─── Watch (single-slot feed) ───────────────────────────────────────

struct WatchSlot<T> {
    value: Option<T>,
    seq: u64,
}

struct WatchShared<T> {
    slot: Mutex<WatchSlot<T>>,
    event: Arc<DataEvent>,
}

/// Publisher half of a latest-value feed.
pub struct WatchSender<T> {
    shared: Arc<WatchShared<T>>,
}

/// Subscriber half of a latest-value feed.
pub struct WatchReceiver<T> {
    shared: Arc<WatchShared<T>>,
    seen: u64,
}

/// Create a latest-value feed pair.
pub fn watch<T: Clone>() -> io::Result<(WatchSender<T>, WatchReceiver<T>)> {
    let shared = Arc::new(WatchShared {
        slot: Mutex::new(WatchSlot {
            value: None,
            seq: 0,
        }),
        event: Arc::new(DataEvent::new()?),
    });
    Ok((
        WatchSender {
            shared: Arc::clone(&shared),
        },
        WatchReceiver { shared, seen: 0 },
    ))
}

impl<T: Clone> WatchSender<T> {
    /// Replace the current value and wake the subscriber.
    pub fn send(&self, value: T) {
        {
            let mut slot = self.shared.slot.lock().expect("watch lock");
            slot.value = Some(value);
            slot.seq += 1;
        }
        self.shared.event.raise();
    }
}

impl<T: Clone> WatchReceiver<T> {
    /// The wake event for the multiplexed wait.
    pub fn event(&self) -> Arc<DataEvent> {
        Arc::clone(&self.shared.event)
    }

    /// Return the current value if it changed since the last call.
    pub fn latest_if_new(&mut self) -> Option<T> {
        self.shared.event.drain();
        let slot = self.shared.slot.lock().expect("watch lock");
        if slot.seq == self.seen {
            return None;
        }
        self.seen = slot.seq;
        slot.value.clone()
    }
}

// ─── Control hub (one slot per control group) ───────────────────────

struct ControlSlotInner {
    value: Option<ControlSetpoints>,
    seq: u64,
    /// Wake event of the current subscriber, if any.
    notify: Option<Arc<DataEvent>>,
}

struct ControlSlot {
    inner: Mutex<ControlSlotInner>,
}

/// Hub of per-group control setpoint feeds.
///
/// Publishers write setpoints for a group at any time; the node's event
/// loop subscribes to exactly the groups the current mixer requires.
pub struct ControlHub {
    slots: [ControlSlot; MAX_CONTROL_GROUPS],
}

/// Publisher handle onto a [`ControlHub`].
#[derive(Clone)]
pub struct ControlPublisher {
    hub: Arc<ControlHub>,
}

/// One control-group subscription held by the event loop.
///
/// Dropping the subscription unsubscribes the group.
pub struct ControlSubscription {
    hub: Arc<ControlHub>,
    group: u8,
    event: Arc<DataEvent>,
    seen: u64,
}

impl ControlHub {
    /// Create a hub with all group slots empty.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slots: std::array::from_fn(|_| ControlSlot {
                inner: Mutex::new(ControlSlotInner {
                    value: None,
                    seq: 0,
                    notify: None,
                }),
            }),
        })
    }

    /// Publisher handle for control sources.
    pub fn publisher(self: &Arc<Self>) -> ControlPublisher {
        ControlPublisher {
            hub: Arc::clone(self),
        }
    }

    /// Subscribe to one group's feed.
    ///
    /// # Errors
    /// `InvalidInput` if the group index is out of range; eventfd
    /// creation errors are passed through.
    pub fn subscribe(self: &Arc<Self>, group: u8) -> io::Result<ControlSubscription> {
        let slot = self
            .slots
            .get(group as usize)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "group out of range"))?;

        let event = Arc::new(DataEvent::new()?);
        let mut inner = slot.inner.lock().expect("control slot lock");
        inner.notify = Some(Arc::clone(&event));

        Ok(ControlSubscription {
            hub: Arc::clone(self),
            group,
            event,
            seen: 0,
        })
    }
}

impl ControlPublisher {
    /// Publish setpoints for one group.
    ///
    /// Returns `false` if the group index is out of range.
    pub fn publish(&self, group: u8, setpoints: ControlSetpoints) -> bool {
        let Some(slot) = self.hub.slots.get(group as usize) else {
            return false;
        };
        let notify = {
            let mut inner = slot.inner.lock().expect("control slot lock");
            inner.value = Some(setpoints);
            inner.seq += 1;
            inner.notify.clone()
        };
        if let Some(event) = notify {
            event.raise();
        }
        true
    }
}

impl ControlSubscription {
    /// Group index this subscription covers.
    #[inline]
    pub fn group(&self) -> u8 {
        self.group
    }

    /// The wake event for the multiplexed wait.
    pub fn event(&self) -> Arc<DataEvent> {
        Arc::clone(&self.event)
    }

    /// Copy out the latest setpoints if they changed since the last call.
    pub fn take_latest(&mut self) -> Option<ControlSetpoints> {
        self.event.drain();
        let inner = self.hub.slots[self.group as usize]
            .inner
            .lock()
            .expect("control slot lock");
        if inner.seq == self.seen {
            return None;
        }
        self.seen = inner.seq;
        inner.value
    }
}

impl Drop for ControlSubscription {
    fn drop(&mut self) {
        let mut inner = self.hub.slots[self.group as usize]
            .inner
            .lock()
            .expect("control slot lock");
        // Only clear our own registration; a replacement subscription may
        // already be installed.
        if let Some(notify) = inner.notify.as_ref()
            && Arc::ptr_eq(notify, &self.event)
        {
            inner.notify = None;
        }
    }
}
