//! ESC controller: mixed outputs → bus commands, status → telemetry.
//!
//! Transmission is re-gated on the arming state at the call, so a disarm
//! observed earlier in the same iteration suppresses the cycle's output.
//! Enqueue failures and malformed status frames are counted, never
//! propagated — the affected cycle or message is dropped and the loop
//! continues.

use tracing::debug;

use axon_bus::BusStack;
use axon_common::bus::{BusMessage, MSG_ESC_RAW_COMMAND, MSG_ESC_STATUS};
use axon_common::consts::MAX_ACTUATOR_OUTPUTS;
use axon_common::error::BusError;

use crate::arming::ArmingGate;

/// Raw command scale: setpoint [-1, +1] → i16 command.
const COMMAND_SCALE: f32 = 8191.0;

/// Wire size of one ESC status payload:
/// index u8 | voltage f32 | current f32 | temperature f32 | rpm f32 | error_count u16.
const STATUS_PAYLOAD_LEN: usize = 19;

/// Per-actuator telemetry decoded from status feedback.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EscTelemetry {
    /// Supply voltage [V].
    pub voltage_v: f32,
    /// Phase current [A].
    pub current_a: f32,
    /// Controller temperature [°C].
    pub temperature_c: f32,
    /// Rotor speed [rpm].
    pub rpm: f32,
    /// ESC-side error counter.
    pub error_count: u16,
    /// Timestamp of the last update [µs, bus clock].
    pub timestamp_us: u64,
}

/// Translates mixed outputs into bus commands and tracks ESC feedback.
pub struct EscController {
    /// Number of actuators currently configured.
    output_count: usize,
    /// Per-actuator telemetry state.
    telemetry: [EscTelemetry; MAX_ACTUATOR_OUTPUTS],
    /// Command messages handed to the bus stack.
    commands_sent: u64,
    /// Cycles dropped because the transmit queue was full.
    tx_dropped: u64,
    /// Malformed or out-of-range status messages discarded.
    status_malformed: u64,
}

impl EscController {
    /// New controller with no configured outputs.
    pub fn new() -> Self {
        Self {
            output_count: 0,
            telemetry: [EscTelemetry::default(); MAX_ACTUATOR_OUTPUTS],
            commands_sent: 0,
            tx_dropped: 0,
            status_malformed: 0,
        }
    }

    /// Set the configured actuator count (at mixer configuration time).
    pub fn set_output_count(&mut self, count: usize) {
        self.output_count = count.min(MAX_ACTUATOR_OUTPUTS);
    }

    /// Number of actuators currently configured.
    #[inline]
    pub fn output_count(&self) -> usize {
        self.output_count
    }

    /// Telemetry for the configured actuators.
    pub fn telemetry(&self) -> &[EscTelemetry] {
        &self.telemetry[..self.output_count]
    }

    /// Counters: (commands sent, cycles dropped on TX full, malformed status).
    pub fn counters(&self) -> (u64, u64, u64) {
        (self.commands_sent, self.tx_dropped, self.status_malformed)
    }

    /// Transmit one cycle's mixed output vector, if armed.
    ///
    /// Disarmed state silently suppresses transmission — designed
    /// behavior, not an error. A full transmit queue drops this cycle's
    /// output and counts it rather than blocking the event loop.
    pub fn publish(&mut self, bus: &mut BusStack, outputs: &[f32], gate: &ArmingGate) {
        if self.output_count == 0 {
            return;
        }
        // Re-check at the point of transmission, not at mix time.
        if !gate.is_armed() {
            return;
        }

        let msg = encode_raw_command(&outputs[..outputs.len().min(self.output_count)]);
        match bus.send(msg) {
            Ok(()) => self.commands_sent += 1,
            Err(BusError::TxQueueFull) => {
                self.tx_dropped += 1;
                debug!("ESC command dropped: transmit queue full");
            }
            Err(e) => {
                self.tx_dropped += 1;
                debug!("ESC command dropped: {e}");
            }
        }
    }

    /// Intake one inbound status/feedback message.
    ///
    /// Malformed or out-of-range messages are discarded and counted.
    pub fn handle_status(&mut self, msg: &BusMessage) {
        if msg.type_id != MSG_ESC_STATUS {
            return;
        }
        match decode_status(&msg.payload) {
            Some((index, mut telemetry)) if index < self.output_count => {
                telemetry.timestamp_us = msg.timestamp_us;
                self.telemetry[index] = telemetry;
            }
            _ => {
                self.status_malformed += 1;
                debug!("Discarded malformed ESC status ({} bytes)", msg.payload.len());
            }
        }
    }
}

impl Default for EscController {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode one batched raw command message (i16 per actuator, LE).
pub fn encode_raw_command(outputs: &[f32]) -> BusMessage {
    let mut msg = BusMessage::new(MSG_ESC_RAW_COMMAND);
    for &value in outputs {
        let cmd = (value.clamp(-1.0, 1.0) * COMMAND_SCALE) as i16;
        // Payload capacity covers MAX_ACTUATOR_OUTPUTS i16 values.
        let _ = msg.payload.extend_from_slice(&cmd.to_le_bytes());
    }
    msg
}

/// Decode one batched raw command payload back into setpoint values.
pub fn decode_raw_command(payload: &[u8]) -> Vec<f32> {
    payload
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / COMMAND_SCALE)
        .collect()
}

/// Decode one status payload. `None` on malformed or out-of-range data.
fn decode_status(payload: &[u8]) -> Option<(usize, EscTelemetry)> {
    if payload.len() != STATUS_PAYLOAD_LEN {
        return None;
    }
    let index = payload[0] as usize;
    if index >= MAX_ACTUATOR_OUTPUTS {
        return None;
    }

    let f32_at = |offset: usize| {
        f32::from_le_bytes([
            payload[offset],
            payload[offset + 1],
            payload[offset + 2],
            payload[offset + 3],
        ])
    };
    let voltage_v = f32_at(1);
    let current_a = f32_at(5);
    let temperature_c = f32_at(9);
    let rpm = f32_at(13);
    if !(voltage_v.is_finite() && current_a.is_finite() && temperature_c.is_finite() && rpm.is_finite())
    {
        return None;
    }

    Some((
        index,
        EscTelemetry {
            voltage_v,
            current_a,
            temperature_c,
            rpm,
            error_count: u16::from_le_bytes([payload[17], payload[18]]),
            timestamp_us: 0,
        },
    ))
}

/// Build a status payload (test/simulation helper).
pub fn encode_status(index: u8, telemetry: &EscTelemetry) -> BusMessage {
    let mut msg = BusMessage::new(MSG_ESC_STATUS);
    let _ = msg.payload.extend_from_slice(&[index]);
    let _ = msg.payload.extend_from_slice(&telemetry.voltage_v.to_le_bytes());
    let _ = msg.payload.extend_from_slice(&telemetry.current_a.to_le_bytes());
    let _ = msg
        .payload
        .extend_from_slice(&telemetry.temperature_c.to_le_bytes());
    let _ = msg.payload.extend_from_slice(&telemetry.rpm.to_le_bytes());
    let _ = msg
        .payload
        .extend_from_slice(&telemetry.error_count.to_le_bytes());
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_bus::SimBusDriver;
    use axon_common::arming::ArmingStatus;
    use axon_common::config::NodeConfig;

    fn armed_gate() -> ArmingGate {
        let gate = ArmingGate::new();
        gate.consume(ArmingStatus {
            armed: true,
            ready_to_arm: true,
            ..Default::default()
        });
        gate
    }

    fn test_stack() -> (BusStack, axon_bus::SimBusHandle) {
        let driver = SimBusDriver::new();
        let handle = driver.handle();
        let config = NodeConfig {
            node_id: 10,
            ..Default::default()
        };
        (BusStack::init(Box::new(driver), &config).expect("init"), handle)
    }

    #[test]
    fn command_roundtrip_scaling() {
        let msg = encode_raw_command(&[0.0, 1.0, -1.0, 0.5]);
        assert_eq!(msg.payload.len(), 8);

        let decoded = decode_raw_command(&msg.payload);
        assert_eq!(decoded.len(), 4);
        assert!(decoded[0].abs() < 1e-3);
        assert!((decoded[1] - 1.0).abs() < 1e-3);
        assert!((decoded[2] + 1.0).abs() < 1e-3);
        assert!((decoded[3] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn out_of_range_outputs_are_clamped() {
        let msg = encode_raw_command(&[5.0, -5.0]);
        let decoded = decode_raw_command(&msg.payload);
        assert!((decoded[0] - 1.0).abs() < 1e-3);
        assert!((decoded[1] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn publish_suppressed_when_disarmed() {
        let (mut bus, handle) = test_stack();
        let mut esc = EscController::new();
        esc.set_output_count(2);

        let gate = ArmingGate::new();
        esc.publish(&mut bus, &[0.5, 0.5], &gate);
        bus.spin_once(&mut |_| {});

        assert!(handle.take_sent().is_empty());
        assert_eq!(esc.counters().0, 0);
    }

    #[test]
    fn publish_transmits_when_armed() {
        let (mut bus, handle) = test_stack();
        let mut esc = EscController::new();
        esc.set_output_count(2);

        esc.publish(&mut bus, &[0.5, -0.5], &armed_gate());
        bus.spin_once(&mut |_| {});

        let sent = handle.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].type_id, MSG_ESC_RAW_COMMAND);
        assert_eq!(esc.counters().0, 1);
    }

    #[test]
    fn publish_with_no_outputs_is_a_no_op() {
        let (mut bus, handle) = test_stack();
        let mut esc = EscController::new();

        esc.publish(&mut bus, &[], &armed_gate());
        bus.spin_once(&mut |_| {});
        assert!(handle.take_sent().is_empty());
    }

    #[test]
    fn tx_queue_full_is_counted_not_fatal() {
        let driver = SimBusDriver::new();
        let config = NodeConfig {
            node_id: 10,
            tx_queue_depth: 1,
            ..Default::default()
        };
        let mut bus = BusStack::init(Box::new(driver), &config).expect("init");
        let mut esc = EscController::new();
        esc.set_output_count(1);
        let gate = armed_gate();

        // No spin between publishes: the second hits a full queue.
        esc.publish(&mut bus, &[0.1], &gate);
        esc.publish(&mut bus, &[0.2], &gate);

        let (sent, dropped, _) = esc.counters();
        assert_eq!(sent, 1);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn status_updates_telemetry() {
        let mut esc = EscController::new();
        esc.set_output_count(4);

        let telemetry = EscTelemetry {
            voltage_v: 12.6,
            current_a: 3.2,
            temperature_c: 41.0,
            rpm: 5400.0,
            error_count: 2,
            timestamp_us: 0,
        };
        let mut msg = encode_status(2, &telemetry);
        msg.timestamp_us = 1234;
        esc.handle_status(&msg);

        assert_eq!(esc.telemetry()[2].voltage_v, 12.6);
        assert_eq!(esc.telemetry()[2].error_count, 2);
        assert_eq!(esc.telemetry()[2].timestamp_us, 1234);
        assert_eq!(esc.counters().2, 0);
    }

    #[test]
    fn malformed_status_is_discarded_and_counted() {
        let mut esc = EscController::new();
        esc.set_output_count(2);

        // Short payload.
        let msg = BusMessage::with_payload(MSG_ESC_STATUS, &[0, 1, 2]).unwrap();
        esc.handle_status(&msg);
        assert_eq!(esc.counters().2, 1);

        // Index beyond the configured outputs.
        let msg = encode_status(5, &EscTelemetry::default());
        esc.handle_status(&msg);
        assert_eq!(esc.counters().2, 2);

        // Non-finite value.
        let bad = EscTelemetry {
            voltage_v: f32::NAN,
            ..Default::default()
        };
        let msg = encode_status(0, &bad);
        esc.handle_status(&msg);
        assert_eq!(esc.counters().2, 3);

        // Telemetry untouched throughout.
        assert_eq!(esc.telemetry()[0], EscTelemetry::default());
    }
}
