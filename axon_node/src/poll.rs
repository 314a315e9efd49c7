//! Poll set: the event loop's multiplexed wait.
//!
//! An ordered, fixed-capacity sequence of event sources (one per
//! subscribed control group, plus the arming feed, plus bus RX
//! readiness). Rebuilt whenever the subscription set changes; consumed
//! each loop iteration by the blocking bounded-timeout wait.

use std::os::fd::AsFd;
use std::sync::Arc;

use heapless::Vec;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use axon_common::consts::MAX_CONTROL_GROUPS;
use axon_common::event::DataEvent;

/// Maximum poll sources: all control groups + arming + bus RX.
pub const POLL_SOURCES_CAP: usize = MAX_CONTROL_GROUPS + 2;

/// Readiness bitmask over poll-set source indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadySet(u32);

impl ReadySet {
    /// No source ready (timeout).
    pub const EMPTY: Self = Self(0);

    /// Whether the source at `index` is ready.
    #[inline]
    pub fn is_ready(self, index: usize) -> bool {
        self.0 & (1 << index) != 0
    }

    /// Whether any source is ready.
    #[inline]
    pub fn any(self) -> bool {
        self.0 != 0
    }
}

/// Ordered sequence of event sources for the multiplexed wait.
pub struct PollSet {
    sources: Vec<Arc<DataEvent>, POLL_SOURCES_CAP>,
}

impl PollSet {
    /// Empty poll set.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Remove all sources (start of a rebuild).
    pub fn clear(&mut self) {
        self.sources.clear();
    }

    /// Append a source; returns its index in the readiness mask.
    ///
    /// # Panics
    /// Panics if more than [`POLL_SOURCES_CAP`] sources are added — the
    /// subscription set is bounded by construction.
    pub fn push(&mut self, source: Arc<DataEvent>) -> usize {
        let index = self.sources.len();
        self.sources
            .push(source)
            .unwrap_or_else(|_| panic!("poll set overflow"));
        index
    }

    /// Number of sources currently in the set.
    #[inline]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Block until a source is ready or the timeout elapses.
    ///
    /// A signal interruption reads as a timeout; real poll failures are
    /// returned for the loop to escalate.
    pub fn wait(&self, timeout_ms: u16) -> Result<ReadySet, Errno> {
        let mut fds: Vec<PollFd, POLL_SOURCES_CAP> = Vec::new();
        for source in &self.sources {
            let _ = fds.push(PollFd::new(source.as_fd(), PollFlags::POLLIN));
        }

        match poll(&mut fds, PollTimeout::from(timeout_ms)) {
            Ok(0) => Ok(ReadySet::EMPTY),
            Ok(_) => {
                let mut ready = 0u32;
                for (index, fd) in fds.iter().enumerate() {
                    if let Some(revents) = fd.revents()
                        && revents.intersects(
                            PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP,
                        )
                    {
                        ready |= 1 << index;
                    }
                }
                Ok(ReadySet(ready))
            }
            Err(Errno::EINTR) => Ok(ReadySet::EMPTY),
            Err(e) => Err(e),
        }
    }
}

impl Default for PollSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn event() -> Arc<DataEvent> {
        Arc::new(DataEvent::new().expect("eventfd"))
    }

    #[test]
    fn empty_wait_times_out() {
        let set = PollSet::new();
        let start = Instant::now();
        let ready = set.wait(20).expect("wait");
        assert!(!ready.any());
        assert!(start.elapsed().as_millis() >= 15, "should have blocked");
    }

    #[test]
    fn raised_source_reports_ready_at_its_index() {
        let mut set = PollSet::new();
        let a = event();
        let b = event();
        let idx_a = set.push(Arc::clone(&a));
        let idx_b = set.push(Arc::clone(&b));

        b.raise();
        let ready = set.wait(100).expect("wait");
        assert!(!ready.is_ready(idx_a));
        assert!(ready.is_ready(idx_b));
    }

    #[test]
    fn drained_source_is_not_ready() {
        let mut set = PollSet::new();
        let a = event();
        let idx = set.push(Arc::clone(&a));

        a.raise();
        a.drain();
        let ready = set.wait(10).expect("wait");
        assert!(!ready.is_ready(idx));
    }

    #[test]
    fn clear_and_rebuild() {
        let mut set = PollSet::new();
        set.push(event());
        set.push(event());
        assert_eq!(set.len(), 2);

        set.clear();
        assert!(set.is_empty());
        let idx = set.push(event());
        assert_eq!(idx, 0);
    }
}
