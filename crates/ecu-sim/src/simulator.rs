//! Simulated ECU poll loop
//!
//! Each [`EcuSimulator::poll`] handles at most one received frame. Requests
//! must arrive as single frames on the functional request identifier;
//! anything else is dropped without an answer. Negative responses are never
//! sent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use obd_can::clock::{Clock, MonotonicClock, Ticks};
use obd_can::isotp::{segment, single_frame, IsoTpPci, FLOW_CONTINUE, MAX_SINGLE_FRAME_LEN};
use obd_can::obd::supported::{encode_bitmap, is_bitmap_pid};
use obd_can::obd::{PID_VIN, SERVICE_CURRENT_DATA, SERVICE_READ_DTC, SERVICE_VEHICLE_INFO};
use obd_can::{AddressingConfig, CanDriver, CanFrame, DtcCode, Vin};
use tracing::{debug, error, info, warn};

use crate::config::EcuConfig;
use crate::values::ValueGenerator;

/// Filler for unused response bytes
pub const RESPONSE_PADDING: u8 = 0xAA;
/// Offset of the primary response identifier from the bottom of the range
pub const PRIMARY_RESPONSE_OFFSET: u32 = 0x01;
/// Offset of the secondary response identifier
pub const SECONDARY_RESPONSE_OFFSET: u32 = 0x0D;

const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Result of one poll cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing was queued
    Idle,
    /// A frame was received and discarded
    Dropped,
    /// A single-frame answer went out on both response identifiers
    Responded { service: u8, pid: Option<u8> },
    /// First frame sent; the rest waits for flow control
    AwaitingFlowControl { total_len: usize },
    /// Remaining consecutive frames sent after flow control
    TransferComplete,
    /// A response frame could not be sent; the cycle was abandoned
    SendFailed,
}

/// Multi-frame answer waiting for the tester's flow-control frame
struct PendingTransfer {
    frames: Vec<Vec<u8>>,
    deadline: Ticks,
}

/// OBD-II ECU answering requests on a CAN driver
pub struct EcuSimulator<D> {
    driver: D,
    addressing: AddressingConfig,
    supported_pids: Vec<u8>,
    values: ValueGenerator,
    vin: Option<Vin>,
    dtcs: Option<Vec<DtcCode>>,
    flow_control_timeout: Duration,
    clock: Arc<dyn Clock>,
    pending: Option<PendingTransfer>,
}

impl<D: CanDriver> EcuSimulator<D> {
    pub fn new(driver: D, config: &EcuConfig) -> Self {
        Self {
            driver,
            addressing: AddressingConfig::for_mode(config.addressing),
            supported_pids: config.supported_pids.clone(),
            values: ValueGenerator::new(config.seed),
            vin: config.vin,
            dtcs: config.dtcs.clone(),
            flow_control_timeout: config.flow_control_timeout(),
            clock: Arc::new(MonotonicClock::new()),
            pending: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn addressing(&self) -> &AddressingConfig {
        &self.addressing
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Identifiers every answer is sent from: primary, then secondary
    pub fn response_ids(&self) -> [u32; 2] {
        [
            self.addressing.response_id_low + PRIMARY_RESPONSE_OFFSET,
            self.addressing.response_id_low + SECONDARY_RESPONSE_OFFSET,
        ]
    }

    /// Poll until `running` is cleared
    pub async fn run(&mut self, running: Arc<AtomicBool>) {
        info!(
            request_id = format!("0x{:X}", self.addressing.request_id),
            extended = self.addressing.extended,
            "ECU simulator running"
        );
        while running.load(Ordering::SeqCst) {
            if self.poll() == PollOutcome::Idle {
                tokio::time::sleep(IDLE_SLEEP).await;
            }
        }
        info!("ECU simulator stopped");
    }

    /// Handle at most one received frame
    pub fn poll(&mut self) -> PollOutcome {
        if let Some(pending) = &self.pending {
            if self.clock.now().reached(pending.deadline) {
                warn!("No flow control from tester, dropping multi-frame answer");
                self.pending = None;
            }
        }

        if !self.driver.any() {
            return PollOutcome::Idle;
        }
        let frame = match self.driver.recv() {
            Ok(Some(frame)) => frame,
            Ok(None) => return PollOutcome::Idle,
            Err(e) => {
                warn!(error = %e, "CAN receive failed");
                return PollOutcome::Idle;
            }
        };

        if !self.addressing.is_request(&frame) {
            return PollOutcome::Dropped;
        }

        match IsoTpPci::parse(&frame.data) {
            Some(IsoTpPci::FlowControl { flow_status, .. }) if self.pending.is_some() => {
                if flow_status != FLOW_CONTINUE {
                    debug!(flow_status, "Ignoring flow control that is not continue-to-send");
                    return PollOutcome::Dropped;
                }
                self.finish_transfer()
            }
            Some(IsoTpPci::SingleFrame { len }) => {
                let len = usize::from(len);
                if len == 0 || len > MAX_SINGLE_FRAME_LEN || frame.data.len() < 1 + len {
                    return PollOutcome::Dropped;
                }
                debug!(data = %hex::encode_upper(&frame.data), "REQUEST  |");
                let payload = frame.data[1..1 + len].to_vec();
                self.dispatch(&payload)
            }
            _ => PollOutcome::Dropped,
        }
    }

    fn dispatch(&mut self, payload: &[u8]) -> PollOutcome {
        let (service, pid, message) = match *payload {
            [SERVICE_CURRENT_DATA, pid, ..] => {
                let value = if is_bitmap_pid(pid) {
                    Some(encode_bitmap(pid, &self.supported_pids).to_be_bytes().to_vec())
                } else {
                    self.values.value(pid)
                };
                let Some(value) = value else {
                    debug!(pid = format!("0x{:02X}", pid), "Unsupported PID, no answer");
                    return PollOutcome::Dropped;
                };
                let mut message = vec![SERVICE_CURRENT_DATA + 0x40, pid];
                message.extend(value);
                (SERVICE_CURRENT_DATA, Some(pid), message)
            }
            [SERVICE_READ_DTC] => {
                let Some(dtcs) = &self.dtcs else {
                    return PollOutcome::Dropped;
                };
                let mut message = vec![SERVICE_READ_DTC + 0x40, dtcs.len().min(0xFF) as u8];
                message.extend(dtcs.iter().flat_map(|c| c.bytes()));
                (SERVICE_READ_DTC, None, message)
            }
            [SERVICE_VEHICLE_INFO, PID_VIN] => {
                let Some(vin) = &self.vin else {
                    return PollOutcome::Dropped;
                };
                let mut message = vec![SERVICE_VEHICLE_INFO + 0x40, PID_VIN, 0x01];
                message.extend_from_slice(vin.as_bytes());
                (SERVICE_VEHICLE_INFO, Some(PID_VIN), message)
            }
            _ => return PollOutcome::Dropped,
        };

        if message.len() <= MAX_SINGLE_FRAME_LEN {
            self.respond_single(service, pid, &message)
        } else {
            self.start_transfer(&message)
        }
    }

    fn respond_single(&mut self, service: u8, pid: Option<u8>, message: &[u8]) -> PollOutcome {
        let data = single_frame(message, RESPONSE_PADDING);
        for id in self.response_ids() {
            let frame = CanFrame::new(id, self.addressing.extended, &data);
            if let Err(e) = self.driver.send(&frame) {
                error!(
                    id = format!("0x{:X}", id),
                    data = %hex::encode_upper(&data),
                    error = %e,
                    "Failed to send response"
                );
                return PollOutcome::SendFailed;
            }
        }
        debug!(data = %hex::encode_upper(&data), "RESPONSE |");
        PollOutcome::Responded { service, pid }
    }

    fn start_transfer(&mut self, message: &[u8]) -> PollOutcome {
        let mut frames = match segment(message, RESPONSE_PADDING) {
            Ok(frames) => frames,
            Err(e) => {
                error!(error = %e, "Answer cannot be segmented");
                return PollOutcome::Dropped;
            }
        };
        let first = frames.remove(0);
        let [primary, _] = self.response_ids();

        if let Err(e) = self.driver.send(&CanFrame::new(primary, self.addressing.extended, &first)) {
            error!(data = %hex::encode_upper(&first), error = %e, "Failed to send first frame");
            return PollOutcome::SendFailed;
        }
        debug!(data = %hex::encode_upper(&first), total_len = message.len(), "RESPONSE | first frame");

        self.pending = Some(PendingTransfer {
            frames,
            deadline: self.clock.now().add(self.flow_control_timeout),
        });
        PollOutcome::AwaitingFlowControl {
            total_len: message.len(),
        }
    }

    fn finish_transfer(&mut self) -> PollOutcome {
        let Some(transfer) = self.pending.take() else {
            return PollOutcome::Dropped;
        };
        let [primary, _] = self.response_ids();

        for data in &transfer.frames {
            let frame = CanFrame::new(primary, self.addressing.extended, data);
            if let Err(e) = self.driver.send(&frame) {
                error!(data = %hex::encode_upper(data), error = %e, "Failed to send consecutive frame");
                return PollOutcome::SendFailed;
            }
        }
        debug!(frames = transfer.frames.len(), "RESPONSE | consecutive frames");
        PollOutcome::TransferComplete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_can::obd::supported::decode_bitmap;
    use obd_can::{AddressingMode, VirtualBus};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn setup(config: EcuConfig) -> (EcuSimulator<obd_can::driver::VirtualCanDriver>, obd_can::driver::VirtualCanDriver) {
        let bus = VirtualBus::new();
        let tester = bus.endpoint();
        let sim = EcuSimulator::new(bus.endpoint(), &config);
        (sim, tester)
    }

    fn request(tester: &mut impl CanDriver, addressing: &AddressingConfig, payload: &[u8]) {
        let frame = CanFrame::new(addressing.request_id, addressing.extended, &single_frame(payload, 0xCC));
        tester.send(&frame).unwrap();
    }

    fn drain(tester: &mut impl CanDriver) -> Vec<CanFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = tester.recv().unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_idle_without_traffic() {
        let (mut sim, _tester) = setup(EcuConfig::default());
        assert_eq!(sim.poll(), PollOutcome::Idle);
    }

    #[rstest]
    #[case(AddressingMode::Standard, [0x7E9, 0x7F5])]
    #[case(AddressingMode::Extended, [0x18DAF111, 0x18DAF11D])]
    fn test_answers_on_both_response_ids(#[case] mode: AddressingMode, #[case] ids: [u32; 2]) {
        let config = EcuConfig {
            addressing: mode,
            seed: Some(1),
            ..Default::default()
        };
        let (mut sim, mut tester) = setup(config);
        let addressing = *sim.addressing();

        request(&mut tester, &addressing, &[0x01, 0x0D]);
        assert_eq!(
            sim.poll(),
            PollOutcome::Responded {
                service: 0x01,
                pid: Some(0x0D)
            }
        );

        let frames = drain(&mut tester);
        assert_eq!(frames.iter().map(|f| f.id).collect::<Vec<_>>(), ids.to_vec());
        for frame in &frames {
            assert_eq!(frame.extended, addressing.extended);
            assert_eq!(frame.data.len(), 8);
            assert_eq!(&frame.data[..3], &[0x03, 0x41, 0x0D]);
            assert!((50..=60).contains(&frame.data[3]));
            assert_eq!(&frame.data[4..], &[0xAA; 4]);
        }
    }

    #[test]
    fn test_two_byte_value_layout() {
        let (mut sim, mut tester) = setup(EcuConfig::default());
        let addressing = *sim.addressing();

        request(&mut tester, &addressing, &[0x01, 0x0C]);
        sim.poll();

        let frame = &drain(&mut tester)[0];
        assert_eq!(&frame.data[..3], &[0x04, 0x41, 0x0C]);
        let raw = u16::from_be_bytes([frame.data[3], frame.data[4]]);
        assert_eq!(raw % 4, 0);
        assert!((770 * 4..=880 * 4).contains(&raw));
        assert_eq!(&frame.data[5..], &[0xAA; 3]);
    }

    #[test]
    fn test_bitmap_agrees_with_decoder() {
        let config = EcuConfig::default();
        let supported = config.supported_pids.clone();
        let (mut sim, mut tester) = setup(config);
        let addressing = *sim.addressing();

        let mut advertised = Vec::new();
        for base in [0x00u8, 0x20, 0x40] {
            request(&mut tester, &addressing, &[0x01, base]);
            assert!(matches!(sim.poll(), PollOutcome::Responded { .. }));
            let frame = &drain(&mut tester)[0];
            assert_eq!(&frame.data[..3], &[0x06, 0x41, base]);
            let mask = u32::from_be_bytes([frame.data[3], frame.data[4], frame.data[5], frame.data[6]]);
            advertised.extend(decode_bitmap(base, mask));
        }

        // continuation bits show up as the next bitmap PID
        advertised.retain(|pid| pid % 0x20 != 0);
        assert_eq!(advertised, supported);
    }

    #[rstest]
    #[case(&[0x01, 0x0B])]
    #[case(&[0x01, 0xC0])]
    #[case(&[0x03])]
    #[case(&[0x09, 0x02])]
    #[case(&[0x22, 0xF1, 0x90])]
    fn test_unanswered_requests_are_dropped(#[case] payload: &[u8]) {
        let (mut sim, mut tester) = setup(EcuConfig::default());
        let addressing = *sim.addressing();

        request(&mut tester, &addressing, payload);
        assert_eq!(sim.poll(), PollOutcome::Dropped);
        assert!(drain(&mut tester).is_empty());
    }

    #[test]
    fn test_invalid_frames_are_dropped() {
        let (mut sim, mut tester) = setup(EcuConfig::default());

        let frames = [
            // wrong identifier
            CanFrame::new(0x7E0, false, &[0x02, 0x01, 0x0D]),
            // extended flag mismatch
            CanFrame::new(0x7DF, true, &[0x02, 0x01, 0x0D]),
            // remote frame
            CanFrame {
                id: 0x7DF,
                extended: false,
                remote: true,
                data: vec![],
            },
            // first frame
            CanFrame::new(0x7DF, false, &[0x10, 0x08, 0x01, 0x0D, 0, 0, 0, 0]),
            // declared length longer than the frame
            CanFrame::new(0x7DF, false, &[0x05, 0x01, 0x0D]),
            // flow control with nothing pending
            CanFrame::new(0x7DF, false, &[0x30, 0x00, 0x00]),
        ];
        for frame in &frames {
            tester.send(frame).unwrap();
            assert_eq!(sim.poll(), PollOutcome::Dropped, "{:?}", frame);
        }
        assert!(drain(&mut tester).is_empty());
    }

    #[test]
    fn test_send_failure_aborts_cycle() {
        let (mut sim, mut tester) = setup(EcuConfig::default());
        let addressing = *sim.addressing();

        sim.driver().fail_next_sends(1);
        request(&mut tester, &addressing, &[0x01, 0x0D]);
        assert_eq!(sim.poll(), PollOutcome::SendFailed);
        assert!(drain(&mut tester).is_empty());

        // no retry, and the next request is answered normally
        assert_eq!(sim.poll(), PollOutcome::Idle);
        request(&mut tester, &addressing, &[0x01, 0x0D]);
        assert!(matches!(sim.poll(), PollOutcome::Responded { .. }));
    }

    fn vin_config() -> EcuConfig {
        EcuConfig {
            vin: Some("WVWZZZ1KZAW000001".parse().unwrap()),
            dtcs: Some(vec![DtcCode::from_bytes(0x01, 0x43)]),
            ..Default::default()
        }
    }

    #[test]
    fn test_vin_waits_for_flow_control() {
        let (mut sim, mut tester) = setup(vin_config());
        let addressing = *sim.addressing();

        request(&mut tester, &addressing, &[0x09, 0x02]);
        assert_eq!(sim.poll(), PollOutcome::AwaitingFlowControl { total_len: 20 });

        let first = drain(&mut tester);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, 0x7E9);
        assert_eq!(first[0].data, vec![0x10, 0x14, 0x49, 0x02, 0x01, b'W', b'V', b'W']);

        tester
            .send(&CanFrame::new(0x7DF, false, &[0x30, 0x00, 0x00, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC]))
            .unwrap();
        assert_eq!(sim.poll(), PollOutcome::TransferComplete);

        let rest = drain(&mut tester);
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].data, [&[0x21u8][..], b"ZZZ1KZA"].concat());
        assert_eq!(rest[1].data, [&[0x22u8][..], b"W000001"].concat());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_transfer_is_dropped() {
        let (mut sim, mut tester) = setup(vin_config());
        let addressing = *sim.addressing();

        request(&mut tester, &addressing, &[0x09, 0x02]);
        sim.poll();
        drain(&mut tester);

        tokio::time::advance(Duration::from_millis(1001)).await;
        tester.send(&CanFrame::new(0x7DF, false, &[0x30, 0x00, 0x00])).unwrap();
        assert_eq!(sim.poll(), PollOutcome::Dropped);
        assert!(drain(&mut tester).is_empty());
    }

    #[test]
    fn test_short_dtc_list_is_a_single_frame() {
        let (mut sim, mut tester) = setup(vin_config());
        let addressing = *sim.addressing();

        request(&mut tester, &addressing, &[0x03]);
        assert_eq!(sim.poll(), PollOutcome::Responded { service: 0x03, pid: None });
        let frames = drain(&mut tester);
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].data[..5], &[0x04, 0x43, 0x01, 0x01, 0x43]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_flag_clears() {
        let (mut sim, _tester) = setup(EcuConfig::default());
        let running = Arc::new(AtomicBool::new(true));

        let flag = running.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(false, Ordering::SeqCst);
        });
        tokio::time::timeout(Duration::from_secs(1), sim.run(running))
            .await
            .unwrap();
    }
}
