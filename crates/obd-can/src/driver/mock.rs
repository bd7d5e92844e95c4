//! Mock CAN driver for testing

use std::collections::VecDeque;

use super::{CanDriver, CanFrame, DriverError};

type Responder = Box<dyn FnMut(&CanFrame) -> Vec<CanFrame> + Send>;

/// Mock driver with a scripted responder
///
/// Every successfully sent frame is recorded and passed to the responder;
/// the frames it returns are queued for reception, as if an ECU answered.
pub struct MockCanDriver {
    rx: VecDeque<CanFrame>,
    sent: Vec<CanFrame>,
    responder: Option<Responder>,
    fail_sends: usize,
    send_attempts: usize,
    clears: usize,
}

impl MockCanDriver {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            sent: Vec::new(),
            responder: None,
            fail_sends: 0,
            send_attempts: 0,
            clears: 0,
        }
    }

    /// Install a responder called for every sent frame
    pub fn on_send<F>(mut self, responder: F) -> Self
    where
        F: FnMut(&CanFrame) -> Vec<CanFrame> + Send + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Queue a frame for reception (simulates unsolicited bus traffic)
    pub fn inject(&mut self, frame: CanFrame) {
        self.rx.push_back(frame);
    }

    /// Make the next `count` sends fail
    pub fn fail_next_sends(&mut self, count: usize) {
        self.fail_sends = count;
    }

    /// Frames successfully sent so far
    pub fn sent(&self) -> &[CanFrame] {
        &self.sent
    }

    /// Send attempts including failed ones
    pub fn send_attempts(&self) -> usize {
        self.send_attempts
    }

    /// Number of times the receive queue was cleared
    pub fn clears(&self) -> usize {
        self.clears
    }
}

impl Default for MockCanDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl CanDriver for MockCanDriver {
    fn any(&mut self) -> bool {
        !self.rx.is_empty()
    }

    fn recv(&mut self) -> Result<Option<CanFrame>, DriverError> {
        Ok(self.rx.pop_front())
    }

    fn send(&mut self, frame: &CanFrame) -> Result<(), DriverError> {
        self.send_attempts += 1;
        if self.fail_sends > 0 {
            self.fail_sends -= 1;
            return Err(DriverError::Send("mock: transmit rejected".to_string()));
        }

        tracing::debug!(id = format!("0x{:X}", frame.id), data = %hex::encode_upper(&frame.data), "Mock driver: sent frame");
        self.sent.push(frame.clone());
        if let Some(responder) = self.responder.as_mut() {
            self.rx.extend(responder(frame));
        }
        Ok(())
    }

    fn clear_rx_queue(&mut self) {
        self.clears += 1;
        self.rx.clear();
    }
}
