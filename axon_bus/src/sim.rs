//! Simulation driver implementation.
//!
//! The `SimBusDriver` implements the `BusDriver` trait to provide a
//! software-only loopback bus for development and testing without
//! physical hardware. A `SimBusHandle` lets a harness inject inbound
//! messages and observe transmitted frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use axon_common::bus::BusMessage;
use axon_common::driver::BusDriver;
use axon_common::error::BusError;
use axon_common::event::DataEvent;

/// State shared between the driver and its handle.
#[derive(Default)]
struct SimShared {
    /// Injected inbound messages, drained by `receive`.
    rx: Mutex<VecDeque<BusMessage>>,
    /// Captured outbound messages.
    tx: Mutex<Vec<BusMessage>>,
    /// RX notify handed over at init time.
    notify: Mutex<Option<Arc<DataEvent>>>,
    /// Force the next `init` to fail (startup-error testing).
    fail_init: AtomicBool,
}

/// Harness-side handle: inject RX traffic, observe TX traffic.
#[derive(Clone)]
pub struct SimBusHandle {
    shared: Arc<SimShared>,
}

impl SimBusHandle {
    /// Inject one inbound message and wake the node's RX wait.
    pub fn inject_rx(&self, msg: BusMessage) {
        self.shared.rx.lock().expect("sim rx lock").push_back(msg);
        if let Some(notify) = self.shared.notify.lock().expect("sim notify lock").as_ref() {
            notify.raise();
        }
    }

    /// Take all messages transmitted since the last call.
    pub fn take_sent(&self) -> Vec<BusMessage> {
        std::mem::take(&mut *self.shared.tx.lock().expect("sim tx lock"))
    }

    /// Number of messages transmitted since the last `take_sent`.
    pub fn sent_count(&self) -> usize {
        self.shared.tx.lock().expect("sim tx lock").len()
    }

    /// Make the next `init` fail with `BusError::InitFailed`.
    pub fn fail_next_init(&self) {
        self.shared.fail_init.store(true, Ordering::SeqCst);
    }
}

/// Loopback bus driver implementing the `BusDriver` trait.
pub struct SimBusDriver {
    shared: Arc<SimShared>,
    initialized: bool,
}

impl SimBusDriver {
    /// Create a new simulation driver instance.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SimShared::default()),
            initialized: false,
        }
    }

    /// Handle for injecting RX traffic and observing TX traffic.
    pub fn handle(&self) -> SimBusHandle {
        SimBusHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for SimBusDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl BusDriver for SimBusDriver {
    fn name(&self) -> &'static str {
        "sim"
    }

    fn init(&mut self, bitrate: u32, rx_notify: Arc<DataEvent>) -> Result<(), BusError> {
        if self.shared.fail_init.swap(false, Ordering::SeqCst) {
            return Err(BusError::InitFailed(
                "simulated transport bring-up failure".to_string(),
            ));
        }
        if bitrate == 0 {
            return Err(BusError::InitFailed("bitrate must be nonzero".to_string()));
        }
        *self.shared.notify.lock().expect("sim notify lock") = Some(rx_notify);
        self.initialized = true;
        info!("Simulation bus driver up at {bitrate} bit/s");
        Ok(())
    }

    fn transmit(&mut self, msg: &BusMessage) -> Result<(), BusError> {
        if !self.initialized {
            return Err(BusError::Transport("driver not initialized".to_string()));
        }
        self.shared.tx.lock().expect("sim tx lock").push(msg.clone());
        Ok(())
    }

    fn receive(&mut self) -> Option<BusMessage> {
        self.shared.rx.lock().expect("sim rx lock").pop_front()
    }

    fn shutdown(&mut self) -> Result<(), BusError> {
        debug!("Simulation bus driver shut down");
        self.initialized = false;
        *self.shared.notify.lock().expect("sim notify lock") = None;
        self.shared.rx.lock().expect("sim rx lock").clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_common::bus::{MSG_ESC_RAW_COMMAND, MSG_ESC_STATUS};

    fn init_driver() -> (SimBusDriver, SimBusHandle, Arc<DataEvent>) {
        let mut driver = SimBusDriver::new();
        let handle = driver.handle();
        let notify = Arc::new(DataEvent::new().expect("eventfd"));
        driver.init(1_000_000, Arc::clone(&notify)).expect("init");
        (driver, handle, notify)
    }

    #[test]
    fn transmit_before_init_fails() {
        let mut driver = SimBusDriver::new();
        let result = driver.transmit(&BusMessage::new(MSG_ESC_RAW_COMMAND));
        assert!(matches!(result, Err(BusError::Transport(_))));
    }

    #[test]
    fn init_can_be_forced_to_fail_once() {
        let mut driver = SimBusDriver::new();
        let handle = driver.handle();
        let notify = Arc::new(DataEvent::new().expect("eventfd"));

        handle.fail_next_init();
        assert!(driver.init(1_000_000, Arc::clone(&notify)).is_err());
        // The failure is one-shot.
        assert!(driver.init(1_000_000, notify).is_ok());
    }

    #[test]
    fn injected_rx_is_received_in_order() {
        let (mut driver, handle, _notify) = init_driver();

        handle.inject_rx(BusMessage::with_payload(MSG_ESC_STATUS, &[1]).unwrap());
        handle.inject_rx(BusMessage::with_payload(MSG_ESC_STATUS, &[2]).unwrap());

        assert_eq!(driver.receive().unwrap().payload[0], 1);
        assert_eq!(driver.receive().unwrap().payload[0], 2);
        assert!(driver.receive().is_none());
    }

    #[test]
    fn transmitted_messages_are_captured() {
        let (mut driver, handle, _notify) = init_driver();

        driver
            .transmit(&BusMessage::new(MSG_ESC_RAW_COMMAND))
            .expect("transmit");
        let sent = handle.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].type_id, MSG_ESC_RAW_COMMAND);
        assert_eq!(handle.sent_count(), 0);
    }
}
