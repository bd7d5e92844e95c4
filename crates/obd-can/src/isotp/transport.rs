//! ISO-TP request/response state machine
//!
//! One request is in flight at a time. The response is collected by polling
//! the driver until a deadline; frames that do not belong to the exchange
//! are dropped without ending it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::{
    flow_control_frame, next_sequence, single_frame, IsoTpPci, SequenceErrorPolicy,
    TransportError, MAX_SINGLE_FRAME_LEN,
};
use crate::addressing::AddressingConfig;
use crate::clock::{Clock, MonotonicClock};
use crate::config::TransportOptions;
use crate::driver::{CanDriver, CanFrame};

/// Positive responses carry the request service id plus this offset
pub const RESPONSE_SID_OFFSET: u8 = 0x40;

/// Multi-frame reassembly, owned by a single `request` call
struct Reassembly {
    buffer: Vec<u8>,
    expected_len: usize,
    next_seq: u8,
}

/// Outcome of feeding one accepted frame into the exchange
enum Step {
    Ignore,
    FirstFrame(Reassembly),
    Progress,
    Complete(Vec<u8>),
}

/// ISO-TP client transport on top of a raw CAN driver
pub struct IsoTpTransport<D> {
    driver: D,
    addressing: AddressingConfig,
    options: TransportOptions,
    clock: Arc<dyn Clock>,
    cancel: Arc<AtomicBool>,
}

impl<D: CanDriver> IsoTpTransport<D> {
    pub fn new(driver: D, addressing: AddressingConfig, options: TransportOptions) -> Self {
        Self {
            driver,
            addressing,
            options,
            clock: Arc::new(MonotonicClock::new()),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the tick source used for deadlines
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an external cancellation flag
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Flag that, once set, makes the in-flight and all later requests
    /// return [`TransportError::Cancelled`]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn addressing(&self) -> &AddressingConfig {
        &self.addressing
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Send `payload` as a padded single frame to the request identifier.
    ///
    /// The receive queue is cleared before every attempt so a stale frame
    /// cannot answer the new request. A rejected transmit is retried up to
    /// `retries` more times, `retry_backoff` apart.
    pub async fn send_request(&mut self, payload: &[u8], retries: u8) -> Result<(), TransportError> {
        if payload.is_empty() || payload.len() > MAX_SINGLE_FRAME_LEN {
            return Err(TransportError::InvalidRequest(format!(
                "request payload must be 1..={} bytes, got {}",
                MAX_SINGLE_FRAME_LEN,
                payload.len()
            )));
        }
        let data = single_frame(payload, self.options.padding);
        self.transmit(&data, retries, true).await
    }

    async fn transmit(&mut self, data: &[u8], retries: u8, clear_rx: bool) -> Result<(), TransportError> {
        let frame = CanFrame::new(self.addressing.request_id(), self.addressing.extended, data);
        let mut attempts = 0usize;

        loop {
            attempts += 1;
            if clear_rx {
                self.driver.clear_rx_queue();
            }
            match self.driver.send(&frame) {
                Ok(()) => {
                    debug!(
                        id = format!("0x{:X}", frame.id),
                        data = %hex::encode_upper(data),
                        "REQUEST  >>"
                    );
                    return Ok(());
                }
                Err(e) if attempts <= usize::from(retries) => {
                    warn!(attempt = attempts, error = %e, "Transmit rejected, retrying");
                    tokio::time::sleep(self.options.retry_backoff()).await;
                }
                Err(e) => {
                    error!(
                        attempts,
                        data = %hex::encode_upper(data),
                        error = %e,
                        "Failed to send request"
                    );
                    return Err(TransportError::SendFailed { attempts, source: e });
                }
            }
        }
    }

    /// Send a request and collect the matching response.
    ///
    /// `payload[0]` is the service id; `payload[1]`, when present, is the
    /// PID the response must echo. Returns the response starting at its
    /// service-id byte, exactly as long as the sender declared.
    pub async fn request(&mut self, payload: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.send_request(payload, self.options.retries).await?;

        let expected_sid = payload[0].wrapping_add(RESPONSE_SID_OFFSET);
        let pid = payload.get(1).copied();
        let poll_interval = self.options.poll_interval();

        let mut reassembly: Option<Reassembly> = None;
        let mut deadline = self.clock.now().add(timeout);

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                debug!("Request cancelled");
                return Err(TransportError::Cancelled);
            }
            if self.clock.now().reached(deadline) {
                debug!(timeout_ms = timeout.as_millis() as u64, "RESPONSE << TIMEOUT");
                return Err(TransportError::Timeout(timeout));
            }
            if !self.driver.any() {
                tokio::time::sleep(poll_interval).await;
                continue;
            }

            let frame = match self.driver.recv() {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "CAN receive failed");
                    tokio::time::sleep(poll_interval).await;
                    continue;
                }
            };
            if !self.addressing.accepts(&frame) {
                continue;
            }

            match self.step(&frame, expected_sid, pid, reassembly.as_mut())? {
                Step::Ignore => {}
                Step::Complete(response) => {
                    debug!(
                        id = format!("0x{:X}", frame.id),
                        data = %hex::encode_upper(&frame.data),
                        "RESPONSE <<"
                    );
                    return Ok(response);
                }
                Step::FirstFrame(state) => {
                    debug!(
                        id = format!("0x{:X}", frame.id),
                        data = %hex::encode_upper(&frame.data),
                        total_len = state.expected_len,
                        "RESPONSE <<"
                    );
                    reassembly = Some(state);
                    let fc = flow_control_frame(self.options.padding);
                    self.transmit(&fc, self.options.retries, false).await?;
                    deadline = self.clock.now().add(timeout);
                }
                Step::Progress => {
                    debug!(
                        id = format!("0x{:X}", frame.id),
                        data = %hex::encode_upper(&frame.data),
                        "RESPONSE <<"
                    );
                    deadline = self.clock.now().add(timeout);
                }
            }
        }
    }

    fn step(
        &self,
        frame: &CanFrame,
        expected_sid: u8,
        pid: Option<u8>,
        reassembly: Option<&mut Reassembly>,
    ) -> Result<Step, TransportError> {
        let Some(pci) = IsoTpPci::parse(&frame.data) else {
            return Ok(Step::Ignore);
        };

        // While reassembling, only consecutive frames are of interest.
        if let Some(state) = reassembly {
            let IsoTpPci::ConsecutiveFrame { seq } = pci else {
                return Ok(Step::Ignore);
            };
            if seq != state.next_seq {
                return match self.options.sequence_errors {
                    SequenceErrorPolicy::Ignore => {
                        debug!(expected = state.next_seq, got = seq, "Dropping out-of-sequence frame");
                        Ok(Step::Ignore)
                    }
                    SequenceErrorPolicy::Abort => {
                        warn!(expected = state.next_seq, got = seq, "Consecutive frame out of sequence");
                        Err(TransportError::SequenceMismatch {
                            expected: state.next_seq,
                            got: seq,
                        })
                    }
                };
            }

            state.buffer.extend_from_slice(&frame.data[1..]);
            state.next_seq = next_sequence(state.next_seq);
            if state.buffer.len() >= state.expected_len {
                let mut message = std::mem::take(&mut state.buffer);
                message.truncate(state.expected_len);
                return Ok(Step::Complete(message));
            }
            return Ok(Step::Progress);
        }

        match pci {
            IsoTpPci::SingleFrame { len } => {
                let len = usize::from(len);
                if !(1..=MAX_SINGLE_FRAME_LEN).contains(&len) || frame.data.len() < 1 + len {
                    return Ok(Step::Ignore);
                }
                let body = &frame.data[1..1 + len];
                if !echo_matches(body, expected_sid, pid) {
                    return Ok(Step::Ignore);
                }
                Ok(Step::Complete(body.to_vec()))
            }
            IsoTpPci::FirstFrame { total_len } => {
                let total_len = usize::from(total_len);
                // A message that fits a single frame must not be segmented.
                if total_len <= MAX_SINGLE_FRAME_LEN {
                    return Ok(Step::Ignore);
                }
                let head = &frame.data[2..];
                if !echo_matches(head, expected_sid, pid) {
                    return Ok(Step::Ignore);
                }
                let mut buffer = Vec::with_capacity(total_len);
                buffer.extend_from_slice(head);
                Ok(Step::FirstFrame(Reassembly {
                    buffer,
                    expected_len: total_len,
                    next_seq: 1,
                }))
            }
            IsoTpPci::ConsecutiveFrame { .. } | IsoTpPci::FlowControl { .. } => Ok(Step::Ignore),
        }
    }
}

/// Response service id, and PID echo when the request carried one
fn echo_matches(body: &[u8], expected_sid: u8, pid: Option<u8>) -> bool {
    if body.first() != Some(&expected_sid) {
        return false;
    }
    match pid {
        Some(pid) => body.get(1) == Some(&pid),
        None => true,
    }
}
