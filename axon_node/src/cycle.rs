//! The real-time event loop.
//!
//! One dedicated task owns this loop and is the only writer of bus-stack
//! state during normal operation. Each iteration: rebuild the poll set
//! if the subscription set is stale, block on the bounded multiplexed
//! wait, copy out fresh control setpoints, consume arming updates, run
//! the mixing step, hand outputs to the ESC controller (armed-gated at
//! the transmit call), and drive one bus housekeeping spin. The bounded
//! timeout is the only point the task voluntarily yields; it also bounds
//! the latency of arming changes and shutdown observation.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use axon_common::arming::ArmingStatus;
use axon_common::consts::{MAX_ACTUATOR_OUTPUTS, MAX_CONTROL_GROUPS};
use axon_common::control::GroupMask;

use crate::feed::{ControlHub, ControlSubscription, WatchReceiver};
use crate::mixer::{LoopControls, reconcile};
use crate::node::Node;
use crate::poll::PollSet;

/// Perform real-time setup for the event-loop task.
///
/// Locks all pages and switches to SCHED_FIFO at the configured
/// priority. No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_setup(priority: i32) -> Result<(), String> {
    use nix::sys::mman::{MlockallFlags, mlockall};

    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| format!("mlockall failed: {e}"))?;

    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        ));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_setup(_priority: i32) -> Result<(), String> {
    Ok(()) // No-op in development mode
}

/// Loop-task-local state: the subscription set, the cached setpoints and
/// the poll set over them. Only this task touches it.
struct LoopState {
    subs: [Option<ControlSubscription>; MAX_CONTROL_GROUPS],
    controls: LoopControls,
    subscribed: GroupMask,
    poll_set: PollSet,
    /// Poll-source index → group, in ascending group order.
    source_groups: heapless::Vec<u8, MAX_CONTROL_GROUPS>,
    /// Poll-source index of the arming feed.
    arming_source: usize,
    /// The poll set no longer matches the subscription set.
    poll_stale: bool,
}

impl LoopState {
    fn new() -> Self {
        Self {
            subs: Default::default(),
            controls: LoopControls::new(),
            subscribed: GroupMask::empty(),
            poll_set: PollSet::new(),
            source_groups: heapless::Vec::new(),
            arming_source: 0,
            poll_stale: true,
        }
    }

    /// Reconcile the subscription set against the groups the current
    /// mixer requires. Idempotent: reapplying the same requirement
    /// performs zero subscribe/unsubscribe operations.
    fn reconcile_subscriptions(&mut self, node: &Node, hub: &Arc<ControlHub>, required: GroupMask) {
        let (to_sub, to_unsub) = reconcile(self.subscribed, required);

        for group in to_unsub.groups() {
            self.subs[group as usize] = None;
            self.controls.clear(group);
            node.stats().bump_unsubscribes();
            debug!("Unsubscribed control group {group}");
        }
        for group in to_sub.groups() {
            match hub.subscribe(group) {
                Ok(sub) => {
                    self.subs[group as usize] = Some(sub);
                    node.stats().bump_subscribes();
                    debug!("Subscribed control group {group}");
                }
                Err(e) => warn!("Failed to subscribe control group {group}: {e}"),
            }
        }

        let mut now = GroupMask::empty();
        for group in 0..MAX_CONTROL_GROUPS as u8 {
            if self.subs[group as usize].is_some() {
                now |= GroupMask::from_group(group).expect("group in range");
            }
        }
        self.subscribed = now;
        node.set_groups_subscribed(now);
        self.poll_stale = true;
    }

    /// Rebuild the poll set: one source per subscribed group (ascending
    /// group order), then the arming feed, then bus RX readiness.
    fn rebuild_poll_set(&mut self, node: &Node, arming: &WatchReceiver<ArmingStatus>) {
        self.poll_set.clear();
        self.source_groups.clear();
        for group in 0..MAX_CONTROL_GROUPS as u8 {
            if let Some(sub) = self.subs[group as usize].as_ref() {
                self.poll_set.push(sub.event());
                let _ = self.source_groups.push(group);
            }
        }
        self.arming_source = self.poll_set.push(arming.event());
        self.poll_set.push(node.rx_event());
        self.poll_stale = false;
    }
}

/// Event-loop body, executed on the dedicated node task.
pub(crate) fn run_loop(
    node: Arc<Node>,
    hub: Arc<ControlHub>,
    mut arming: WatchReceiver<ArmingStatus>,
) {
    if let Err(e) = rt_setup(node.rt_priority()) {
        warn!("RT setup failed, continuing without RT scheduling: {e}");
    }

    let mut state = LoopState::new();
    let mut outputs = [0.0f32; MAX_ACTUATOR_OUTPUTS];

    node.signal_started();
    info!("Event loop running");

    loop {
        // Shutdown is cooperative: observed here, once per iteration.
        if node.shutdown_requested() {
            break;
        }

        if node.take_mixer_stale() {
            let (mixer, _) = node.mixer_snapshot();
            let required = mixer
                .map(|m| GroupMask::from_bits_truncate(m.groups_required()))
                .unwrap_or_else(GroupMask::empty);
            state.reconcile_subscriptions(&node, &hub, required);
        }
        if state.poll_stale {
            state.rebuild_poll_set(&node, &arming);
        }

        let ready = match state.poll_set.wait(node.poll_timeout_ms()) {
            Ok(ready) => ready,
            Err(e) => {
                error!("Multiplexed wait failed: {e}; stopping event loop");
                break;
            }
        };
        let cycle_start = Instant::now();

        // Copy out freshly arrived setpoints, ascending group order.
        let mut fresh = false;
        for (source, &group) in state.source_groups.iter().enumerate() {
            if !ready.is_ready(source) {
                continue;
            }
            if let Some(sub) = state.subs[group as usize].as_mut()
                && let Some(setpoints) = sub.take_latest()
            {
                state.controls.set(group, setpoints);
                fresh = true;
            }
        }

        // Consume arming updates before the transmit decision so a
        // disarm observed this iteration suppresses this cycle.
        if ready.is_ready(state.arming_source)
            && let Some(status) = arming.latest_if_new()
        {
            node.arming_gate().consume(status);
        }

        // Mixing step: one output value per configured actuator slot.
        let mut mixed = 0usize;
        if fresh {
            let (mixer, output_count) = node.mixer_snapshot();
            if let Some(mixer) = mixer {
                outputs[..output_count].fill(0.0);
                mixer.mix(&state.controls, &mut outputs[..output_count]);
                mixed = output_count;
                node.stats().bump_mix_cycles();
            }
        }

        // Transmit (armed-gated) and run one housekeeping spin. Bus RX
        // readiness needs no separate handling: the spin drains it.
        node.transmit_and_spin(&outputs[..mixed], mixed > 0);

        if !ready.any() {
            node.stats().bump_poll_timeouts();
        }
        let cycles = node.stats().record_cycle(cycle_start.elapsed());
        if cycles % 1000 == 0 {
            debug!("Event loop: {cycles} cycles");
        }
    }

    info!("Event loop exiting");
    node.signal_exited();
}
