//! Node: the single owning instance of the bus stack.
//!
//! Created by `start`, destroyed by `teardown`; at most one instance
//! exists process-wide because the bus hardware resource is inherently
//! single-owner. Out-of-band callers reach the running node through
//! `instance()` and must never construct a second one.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use axon_bus::{BusStack, BusStats};
use axon_common::arming::ArmingStatus;
use axon_common::config::NodeConfig;
use axon_common::consts::MAX_ACTUATOR_OUTPUTS;
use axon_common::control::GroupMask;
use axon_common::driver::BusDriver;
use axon_common::error::NodeError;
use axon_common::event::DataEvent;

use crate::arming::ArmingGate;
use crate::bridge::BridgeRegistry;
use crate::cycle::run_loop;
use crate::esc::{EscController, EscTelemetry};
use crate::feed::{ControlHub, WatchReceiver};
use crate::lifecycle::{LifecycleCell, LifecycleState};
use crate::mixer::Mixer;

/// Process-wide singleton slot. The bus is single-owner; a second
/// `start` fails with `AlreadyRunning` for as long as this is occupied.
static INSTANCE: Mutex<Option<Arc<Node>>> = Mutex::new(None);

/// Extra quiesce margin on top of two multiplex-wait periods.
const TEARDOWN_MARGIN: Duration = Duration::from_millis(250);

/// Flag + condvar pair for the start/exit handshakes with the loop task.
struct SignalGate {
    flag: Mutex<bool>,
    cv: Condvar,
}

impl SignalGate {
    const fn new() -> Self {
        Self {
            flag: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn notify(&self) {
        *self.flag.lock().expect("gate lock") = true;
        self.cv.notify_all();
    }

    /// Wait until notified; `false` on timeout.
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flag = self.flag.lock().expect("gate lock");
        while !*flag {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cv
                .wait_timeout(flag, deadline - now)
                .expect("gate wait");
            flag = guard;
        }
        true
    }
}

/// Event-loop counters, readable lock-free from any context.
#[derive(Debug, Default)]
pub(crate) struct NodeStats {
    cycles: AtomicU64,
    sum_cycle_us: AtomicU64,
    max_cycle_us: AtomicU64,
    poll_timeouts: AtomicU64,
    mix_cycles: AtomicU64,
    subscribes: AtomicU64,
    unsubscribes: AtomicU64,
}

/// Plain snapshot of [`NodeStats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeStatsSnapshot {
    /// Loop iterations executed.
    pub cycles: u64,
    /// Average cycle duration [µs].
    pub avg_cycle_us: u64,
    /// Maximum cycle duration [µs].
    pub max_cycle_us: u64,
    /// Iterations that woke on timeout with no source ready.
    pub poll_timeouts: u64,
    /// Iterations that ran the mixing step.
    pub mix_cycles: u64,
    /// Control-group subscribe operations performed.
    pub subscribes: u64,
    /// Control-group unsubscribe operations performed.
    pub unsubscribes: u64,
}

impl NodeStats {
    /// Record one cycle; returns the new cycle count.
    pub(crate) fn record_cycle(&self, duration: Duration) -> u64 {
        let us = duration.as_micros() as u64;
        self.sum_cycle_us.fetch_add(us, Ordering::Relaxed);
        self.max_cycle_us.fetch_max(us, Ordering::Relaxed);
        self.cycles.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn bump_poll_timeouts(&self) {
        self.poll_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_mix_cycles(&self) {
        self.mix_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_subscribes(&self) {
        self.subscribes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_unsubscribes(&self) {
        self.unsubscribes.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> NodeStatsSnapshot {
        let cycles = self.cycles.load(Ordering::Relaxed);
        let sum = self.sum_cycle_us.load(Ordering::Relaxed);
        NodeStatsSnapshot {
            cycles,
            avg_cycle_us: if cycles > 0 { sum / cycles } else { 0 },
            max_cycle_us: self.max_cycle_us.load(Ordering::Relaxed),
            poll_timeouts: self.poll_timeouts.load(Ordering::Relaxed),
            mix_cycles: self.mix_cycles.load(Ordering::Relaxed),
            subscribes: self.subscribes.load(Ordering::Relaxed),
            unsubscribes: self.unsubscribes.load(Ordering::Relaxed),
        }
    }
}

/// Mutable node internals, guarded by the node mutex.
///
/// The event-loop task is the only writer during normal operation; it
/// acquires the mutex only around the mix/transmit/spin region, never
/// across the blocking multiplex wait.
struct NodeShared {
    /// Bus stack; `None` once released by teardown.
    bus: Option<BusStack>,
    /// ESC controller (output encode + status intake).
    esc: EscController,
    /// Registered sensor bridges, in dispatch order.
    bridges: BridgeRegistry,
    /// Current mixing configuration (non-owning of its semantics).
    mixer: Option<Arc<dyn Mixer>>,
    /// Number of actuator outputs currently configured.
    output_count: usize,
}

/// The field-bus node runtime.
pub struct Node {
    state: LifecycleCell,
    /// Cooperative shutdown flag, checked at the top of each iteration.
    shutdown: AtomicBool,
    arming_gate: ArmingGate,
    shared: Mutex<NodeShared>,
    stats: NodeStats,
    /// Groups currently subscribed (diagnostic mirror of loop state).
    groups_subscribed: AtomicU32,
    /// Set by `configure_mixer`; consumed by the loop's reconciliation.
    mixer_stale: AtomicBool,
    /// Bus RX readiness, cloned out of the stack for the poll set.
    rx_event: Arc<DataEvent>,
    poll_timeout_ms: u16,
    rt_priority: i32,
    started: SignalGate,
    exited: SignalGate,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Start the node: bring up the bus stack at the given identity and
    /// bitrate, register the sensor bridges' interest, and spawn the
    /// event-loop task.
    ///
    /// Returns once the task has begun executing (not once steady state
    /// is reached).
    ///
    /// # Errors
    /// - `NodeError::AlreadyRunning` if an instance exists
    /// - `NodeError::BusInit` if the transport cannot be brought up at
    ///   the given bitrate, or the memory pool is too small
    /// - `NodeError::Config` for invalid configuration
    pub fn start(
        config: &NodeConfig,
        driver: Box<dyn BusDriver>,
        mut bridges: BridgeRegistry,
        controls: Arc<ControlHub>,
        arming: WatchReceiver<ArmingStatus>,
    ) -> Result<Arc<Self>, NodeError> {
        let mut slot = INSTANCE.lock().expect("instance lock");
        if slot.is_some() {
            return Err(NodeError::AlreadyRunning);
        }

        config.validate()?;
        let bus = BusStack::init(driver, config)?;
        let rx_event = bus.rx_event();

        // One-time interest declaration, before any spin.
        bridges.subscribe();
        info!("{} sensor bridge(s) subscribed", bridges.len());

        let node = Arc::new(Node {
            state: LifecycleCell::new(),
            shutdown: AtomicBool::new(false),
            arming_gate: ArmingGate::new(),
            shared: Mutex::new(NodeShared {
                bus: Some(bus),
                esc: EscController::new(),
                bridges,
                mixer: None,
                output_count: 0,
            }),
            stats: NodeStats::default(),
            groups_subscribed: AtomicU32::new(0),
            mixer_stale: AtomicBool::new(false),
            rx_event,
            poll_timeout_ms: config.poll_timeout_ms,
            rt_priority: config.rt_priority,
            started: SignalGate::new(),
            exited: SignalGate::new(),
            task: Mutex::new(None),
        });

        node.state
            .transition(LifecycleState::Uninitialized, LifecycleState::Running);

        let task_node = Arc::clone(&node);
        let handle = std::thread::Builder::new()
            .name("axon_node".to_string())
            .spawn(move || run_loop(task_node, controls, arming))
            .map_err(|e| NodeError::Config(format!("Failed to spawn event-loop task: {e}")))?;
        *node.task.lock().expect("task lock") = Some(handle);

        if !node.started.wait_timeout(Duration::from_secs(1)) {
            warn!("Event-loop task slow to start");
        }

        *slot = Some(Arc::clone(&node));
        info!(
            "Node started (id {}, bitrate {}, driver '{}')",
            config.node_id, config.bitrate, config.driver
        );
        Ok(node)
    }

    /// The current singleton, or `None` when no node is running.
    pub fn instance() -> Option<Arc<Self>> {
        INSTANCE.lock().expect("instance lock").clone()
    }

    /// Stop the event loop, release the bus stack and clear the
    /// singleton.
    ///
    /// # Errors
    /// - `NodeError::NotRunning` if the node is not in `Running`
    /// - `NodeError::TeardownTimeout` if the task does not observe the
    ///   shutdown flag within the bound (stuck bus call — fatal, not
    ///   retried)
    pub fn teardown(&self) -> Result<(), NodeError> {
        if !self
            .state
            .transition(LifecycleState::Running, LifecycleState::Stopping)
        {
            return Err(NodeError::NotRunning);
        }

        self.shutdown.store(true, Ordering::SeqCst);

        let bound = Duration::from_millis(2 * self.poll_timeout_ms as u64) + TEARDOWN_MARGIN;
        if !self.exited.wait_timeout(bound) {
            return Err(NodeError::TeardownTimeout(bound));
        }

        if let Some(handle) = self.task.lock().expect("task lock").take()
            && handle.join().is_err()
        {
            warn!("Event-loop task panicked during shutdown");
        }

        if let Some(mut bus) = self.shared.lock().expect("node lock").bus.take() {
            bus.release();
        }

        self.state
            .transition(LifecycleState::Stopping, LifecycleState::Stopped);
        *INSTANCE.lock().expect("instance lock") = None;
        info!("Node stopped");
        Ok(())
    }

    /// Install a new mixing configuration and reconcile the control
    /// group subscriptions against it.
    ///
    /// The reconciliation itself runs on the event-loop task (the only
    /// writer of the subscription set) within one wait period; applying
    /// the same mixer twice produces no additional subscription churn.
    ///
    /// # Errors
    /// `NodeError::Config` if the mixer requires unsupported groups or
    /// the output count is out of range; `NodeError::NotRunning` if the
    /// node is not running.
    pub fn configure_mixer(
        &self,
        mixer: Arc<dyn Mixer>,
        output_count: usize,
    ) -> Result<(), NodeError> {
        if self.state.state() != LifecycleState::Running {
            return Err(NodeError::NotRunning);
        }

        let raw = mixer.groups_required();
        if GroupMask::from_bits(raw).is_none() {
            return Err(NodeError::Config(format!(
                "Mixer requires unsupported control groups (mask {raw:#06b})"
            )));
        }
        if output_count == 0 || output_count > MAX_ACTUATOR_OUTPUTS {
            return Err(NodeError::Config(format!(
                "output_count {output_count} out of range (1..={MAX_ACTUATOR_OUTPUTS})"
            )));
        }

        {
            let mut shared = self.shared.lock().expect("node lock");
            shared.mixer = Some(mixer);
            shared.output_count = output_count;
            shared.esc.set_output_count(output_count);
        }
        self.mixer_stale.store(true, Ordering::SeqCst);
        info!("Mixer configured (groups {raw:#06b}, {output_count} outputs)");
        Ok(())
    }

    /// Whether outputs may currently be transmitted.
    pub fn is_armed(&self) -> bool {
        self.arming_gate.is_armed()
    }

    /// Synchronous diagnostic snapshot: safe to call from any context at
    /// any time, including mid-teardown.
    pub fn info(&self) -> NodeInfo {
        let stats = self.stats.snapshot();
        let shared = self.shared.lock().expect("node lock");
        let (esc_commands_sent, esc_tx_dropped, esc_status_malformed) = shared.esc.counters();
        NodeInfo {
            state: self.state.state(),
            armed: self.arming_gate.is_armed(),
            output_count: shared.output_count,
            groups_subscribed: self.groups_subscribed.load(Ordering::SeqCst),
            stats,
            esc_commands_sent,
            esc_tx_dropped,
            esc_status_malformed,
            telemetry: shared.esc.telemetry().to_vec(),
            bridges: shared.bridges.error_counts(),
            bus: shared.bus.as_ref().map(BusStack::stats),
        }
    }

    // ── Event-loop side (crate-internal) ──

    pub(crate) fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub(crate) fn take_mixer_stale(&self) -> bool {
        self.mixer_stale.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn mixer_snapshot(&self) -> (Option<Arc<dyn Mixer>>, usize) {
        let shared = self.shared.lock().expect("node lock");
        (shared.mixer.clone(), shared.output_count)
    }

    pub(crate) fn arming_gate(&self) -> &ArmingGate {
        &self.arming_gate
    }

    pub(crate) fn rx_event(&self) -> Arc<DataEvent> {
        Arc::clone(&self.rx_event)
    }

    pub(crate) fn poll_timeout_ms(&self) -> u16 {
        self.poll_timeout_ms
    }

    pub(crate) fn rt_priority(&self) -> i32 {
        self.rt_priority
    }

    pub(crate) fn stats(&self) -> &NodeStats {
        &self.stats
    }

    pub(crate) fn set_groups_subscribed(&self, mask: GroupMask) {
        self.groups_subscribed.store(mask.bits(), Ordering::SeqCst);
    }

    /// One mutex-guarded bus region per iteration: transmit the mixed
    /// outputs (armed-gated inside the ESC controller), then run one
    /// housekeeping spin dispatching inbound traffic.
    pub(crate) fn transmit_and_spin(&self, outputs: &[f32], transmit: bool) {
        let mut guard = self.shared.lock().expect("node lock");
        let NodeShared {
            bus, esc, bridges, ..
        } = &mut *guard;
        let Some(bus) = bus.as_mut() else {
            return;
        };

        if transmit {
            esc.publish(bus, outputs, &self.arming_gate);
        }
        bus.spin_once(&mut |msg| {
            if msg.type_id == axon_common::bus::MSG_ESC_STATUS {
                esc.handle_status(&msg);
            } else {
                bridges.dispatch(&msg);
            }
        });
    }

    pub(crate) fn signal_started(&self) {
        self.started.notify();
    }

    pub(crate) fn signal_exited(&self) {
        self.exited.notify();
    }
}

/// Human-readable node health snapshot.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    /// Lifecycle state.
    pub state: LifecycleState,
    /// Armed flag at snapshot time.
    pub armed: bool,
    /// Configured actuator outputs.
    pub output_count: usize,
    /// Bitmask of subscribed control groups.
    pub groups_subscribed: u32,
    /// Event-loop counters.
    pub stats: NodeStatsSnapshot,
    /// ESC command messages handed to the bus stack.
    pub esc_commands_sent: u64,
    /// ESC cycles dropped on a full transmit queue.
    pub esc_tx_dropped: u64,
    /// Malformed ESC status messages discarded.
    pub esc_status_malformed: u64,
    /// Per-actuator telemetry for the configured outputs.
    pub telemetry: Vec<EscTelemetry>,
    /// Per-bridge (name, decode-error count), in registration order.
    pub bridges: Vec<(&'static str, u64)>,
    /// Bus stack counters, absent once the stack is released.
    pub bus: Option<BusStats>,
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "state:        {:?}", self.state)?;
        writeln!(f, "armed:        {}", self.armed)?;
        writeln!(f, "outputs:      {}", self.output_count)?;
        writeln!(f, "groups:       {:#06b}", self.groups_subscribed)?;
        writeln!(
            f,
            "loop:         {} cycles, avg {}µs, max {}µs, {} timeouts, {} mixed",
            self.stats.cycles,
            self.stats.avg_cycle_us,
            self.stats.max_cycle_us,
            self.stats.poll_timeouts,
            self.stats.mix_cycles
        )?;
        writeln!(
            f,
            "esc:          {} sent, {} dropped, {} malformed",
            self.esc_commands_sent, self.esc_tx_dropped, self.esc_status_malformed
        )?;
        for (index, t) in self.telemetry.iter().enumerate() {
            writeln!(
                f,
                "  esc[{index}]:    {:.1}V {:.1}A {:.0}°C {:.0}rpm (errors {})",
                t.voltage_v, t.current_a, t.temperature_c, t.rpm, t.error_count
            )?;
        }
        if let Some(bus) = &self.bus {
            writeln!(
                f,
                "bus:          {} tx, {} tx errors, {} rx",
                bus.tx_sent, bus.tx_errors, bus.rx_dispatched
            )?;
        }
        for (name, errors) in &self.bridges {
            writeln!(f, "  bridge {name}: {errors} decode errors")?;
        }
        Ok(())
    }
}
