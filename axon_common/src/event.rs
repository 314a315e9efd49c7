//! Pollable data-ready event primitive.
//!
//! A thin wrapper over a non-blocking `eventfd`. Producers call
//! [`DataEvent::raise`] when new data is available; the event-loop task
//! includes the descriptor in its multiplexed wait and calls
//! [`DataEvent::drain`] after waking. Raising is idempotent between
//! drains — the loop consumes the latest value, not a backlog.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

use nix::sys::eventfd::{EfdFlags, EventFd};

/// A level-style wake event backed by an `eventfd`.
#[derive(Debug)]
pub struct DataEvent {
    fd: EventFd,
}

impl DataEvent {
    /// Create a new, unsignalled event.
    pub fn new() -> Result<Self, std::io::Error> {
        let fd = EventFd::from_value_and_flags(0, EfdFlags::EFD_NONBLOCK)
            .map_err(std::io::Error::from)?;
        Ok(Self { fd })
    }

    /// Signal the event. Wakes any poller waiting on the descriptor.
    pub fn raise(&self) {
        // EAGAIN on counter overflow is harmless: the event is already
        // signalled and the poller will wake.
        let _ = self.fd.write(1);
    }

    /// Clear the event so the descriptor no longer reports readable.
    pub fn drain(&self) {
        let mut buf = [0u8; 8];
        // SAFETY: valid fd for the lifetime of self, buffer is 8 bytes as
        // required by eventfd reads. EAGAIN (not signalled) is fine.
        unsafe {
            libc::read(self.fd.as_fd().as_raw_fd(), buf.as_mut_ptr().cast(), 8);
        }
    }
}

impl AsFd for DataEvent {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

    fn is_readable(ev: &DataEvent) -> bool {
        let mut fds = [PollFd::new(ev.as_fd(), PollFlags::POLLIN)];
        let n = poll(&mut fds, PollTimeout::from(0u16)).expect("poll");
        n > 0
    }

    #[test]
    fn new_event_is_not_readable() {
        let ev = DataEvent::new().expect("eventfd");
        assert!(!is_readable(&ev));
    }

    #[test]
    fn raised_event_is_readable_until_drained() {
        let ev = DataEvent::new().expect("eventfd");
        ev.raise();
        assert!(is_readable(&ev));

        // Raising twice then draining once clears the whole counter.
        ev.raise();
        ev.drain();
        assert!(!is_readable(&ev));
    }

    #[test]
    fn drain_on_unsignalled_event_is_harmless() {
        let ev = DataEvent::new().expect("eventfd");
        ev.drain();
        ev.raise();
        assert!(is_readable(&ev));
    }
}
