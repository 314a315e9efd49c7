//! Bus stack: driver ownership, memory pool accounting, TX queue, spin.
//!
//! The `BusStack` struct is the single owner of the transport driver.
//! All transmit/receive/spin calls happen on the event-loop task; other
//! contexts reach the stack only through the node's mutex.

use std::sync::Arc;
use std::time::Instant;

use heapless::Deque;
use tracing::{debug, info, warn};

use axon_common::bus::{BusMessage, NodeId};
use axon_common::config::NodeConfig;
use axon_common::consts::{POOL_BLOCK_BYTES, TX_QUEUE_CAP};
use axon_common::driver::BusDriver;
use axon_common::error::BusError;
use axon_common::event::DataEvent;

/// Counters for transient bus-level conditions.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusStats {
    /// Messages handed to the transport.
    pub tx_sent: u64,
    /// Transport-level transmit failures (message dropped).
    pub tx_errors: u64,
    /// Messages dispatched from the transport.
    pub rx_dispatched: u64,
}

/// The protocol-stack instance: driver, clock origin, pool, TX queue.
pub struct BusStack {
    /// Active transport driver.
    driver: Box<dyn BusDriver>,
    /// This node's bus identity (stamped on outbound messages).
    node_id: NodeId,
    /// Outbound queue, flushed on each spin.
    tx_queue: Deque<BusMessage, TX_QUEUE_CAP>,
    /// Runtime TX depth limit (≤ TX_QUEUE_CAP).
    tx_depth: usize,
    /// RX-ready event, signalled by the driver.
    rx_event: Arc<DataEvent>,
    /// Clock origin for message timestamps.
    epoch: Instant,
    /// Transient-condition counters.
    stats: BusStats,
}

impl BusStack {
    /// Initialize the protocol stack: validate the memory pool against
    /// the declared protocol objects, then bring up the transport.
    ///
    /// # Errors
    /// - `BusError::PoolExhausted` if the configured pool cannot hold the
    ///   declared TX + RX queue objects (fatal startup error).
    /// - `BusError::InitFailed` if the transport rejects the bitrate.
    pub fn init(mut driver: Box<dyn BusDriver>, config: &NodeConfig) -> Result<Self, BusError> {
        let required = (config.tx_queue_depth + config.rx_queue_depth) * POOL_BLOCK_BYTES;
        if required > config.pool_bytes {
            return Err(BusError::PoolExhausted {
                required,
                available: config.pool_bytes,
            });
        }

        let node_id = NodeId::new(config.node_id)
            .ok_or_else(|| BusError::InitFailed(format!("invalid node id {}", config.node_id)))?;

        let rx_event = Arc::new(
            DataEvent::new().map_err(|e| BusError::InitFailed(format!("eventfd: {e}")))?,
        );

        driver.init(config.bitrate, Arc::clone(&rx_event))?;

        info!(
            "Bus stack up: driver '{}', node id {}, bitrate {}, pool {}B ({}B used)",
            driver.name(),
            node_id.get(),
            config.bitrate,
            config.pool_bytes,
            required
        );

        Ok(Self {
            driver,
            node_id,
            tx_queue: Deque::new(),
            tx_depth: config.tx_queue_depth,
            rx_event,
            epoch: Instant::now(),
            stats: BusStats::default(),
        })
    }

    /// The RX-ready event for the multiplexed wait.
    pub fn rx_event(&self) -> Arc<DataEvent> {
        Arc::clone(&self.rx_event)
    }

    /// Microseconds since the stack was brought up.
    #[inline]
    pub fn timestamp_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    /// Transient-condition counters.
    #[inline]
    pub fn stats(&self) -> BusStats {
        self.stats
    }

    /// Enqueue one outbound message.
    ///
    /// Stamps the source node id and the enqueue timestamp. The message
    /// leaves the node on the next spin.
    ///
    /// # Errors
    /// Returns `BusError::TxQueueFull` when the queue is at its runtime
    /// depth; the caller drops that cycle's output rather than blocking.
    pub fn send(&mut self, mut msg: BusMessage) -> Result<(), BusError> {
        if self.tx_queue.len() >= self.tx_depth {
            return Err(BusError::TxQueueFull);
        }
        msg.source = Some(self.node_id);
        msg.timestamp_us = self.timestamp_us();
        // Depth check above guarantees capacity.
        let _ = self.tx_queue.push_back(msg);
        Ok(())
    }

    /// One housekeeping pass: flush outbound traffic, then drain inbound
    /// messages into `dispatch`.
    ///
    /// Transport-level transmit failures drop the affected message and
    /// are counted; they never abort the pass.
    pub fn spin_once(&mut self, dispatch: &mut dyn FnMut(BusMessage)) {
        while let Some(msg) = self.tx_queue.pop_front() {
            match self.driver.transmit(&msg) {
                Ok(()) => self.stats.tx_sent += 1,
                Err(e) => {
                    self.stats.tx_errors += 1;
                    warn!("TX dropped ({:?}): {e}", msg.type_id);
                }
            }
        }

        self.rx_event.drain();
        let now = self.timestamp_us();
        while let Some(mut msg) = self.driver.receive() {
            msg.timestamp_us = now;
            self.stats.rx_dispatched += 1;
            dispatch(msg);
        }
    }

    /// Release the transport. The stack is unusable afterwards.
    pub fn release(&mut self) {
        debug!(
            "Releasing bus stack (tx_sent={}, tx_errors={}, rx_dispatched={})",
            self.stats.tx_sent, self.stats.tx_errors, self.stats.rx_dispatched
        );
        if let Err(e) = self.driver.shutdown() {
            warn!("Driver shutdown failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBusDriver;
    use axon_common::bus::{MSG_ESC_RAW_COMMAND, MSG_ESC_STATUS};

    fn test_config() -> NodeConfig {
        NodeConfig {
            node_id: 42,
            ..Default::default()
        }
    }

    #[test]
    fn init_rejects_undersized_pool() {
        let driver = SimBusDriver::new();
        let config = NodeConfig {
            pool_bytes: 64,
            ..test_config()
        };
        let result = BusStack::init(Box::new(driver), &config);
        assert!(matches!(result, Err(BusError::PoolExhausted { .. })));
    }

    #[test]
    fn send_stamps_source_and_flushes_on_spin() {
        let driver = SimBusDriver::new();
        let handle = driver.handle();
        let mut stack = BusStack::init(Box::new(driver), &test_config()).expect("init");

        stack.send(BusMessage::new(MSG_ESC_RAW_COMMAND)).expect("send");
        assert!(handle.take_sent().is_empty(), "nothing leaves before spin");

        stack.spin_once(&mut |_| {});
        let sent = handle.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].source.map(NodeId::get), Some(42));
        assert_eq!(stack.stats().tx_sent, 1);
    }

    #[test]
    fn send_fails_when_queue_full() {
        let driver = SimBusDriver::new();
        let config = NodeConfig {
            tx_queue_depth: 2,
            ..test_config()
        };
        let mut stack = BusStack::init(Box::new(driver), &config).expect("init");

        stack.send(BusMessage::new(MSG_ESC_RAW_COMMAND)).expect("1st");
        stack.send(BusMessage::new(MSG_ESC_RAW_COMMAND)).expect("2nd");
        let result = stack.send(BusMessage::new(MSG_ESC_RAW_COMMAND));
        assert!(matches!(result, Err(BusError::TxQueueFull)));
    }

    #[test]
    fn spin_dispatches_injected_rx() {
        let driver = SimBusDriver::new();
        let handle = driver.handle();
        let mut stack = BusStack::init(Box::new(driver), &test_config()).expect("init");

        handle.inject_rx(BusMessage::with_payload(MSG_ESC_STATUS, &[1, 2, 3]).unwrap());

        let mut seen = Vec::new();
        stack.spin_once(&mut |msg| seen.push(msg));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].type_id, MSG_ESC_STATUS);
        assert_eq!(stack.stats().rx_dispatched, 1);
    }
}
