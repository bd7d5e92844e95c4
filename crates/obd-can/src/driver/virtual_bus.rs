//! In-memory CAN bus shared by several endpoints in one process
//!
//! Every frame sent by an endpoint is queued on every other endpoint,
//! the way a physical bus delivers to all nodes except the sender.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{CanDriver, CanFrame, DriverError};

#[derive(Default)]
struct BusState {
    queues: Vec<VecDeque<CanFrame>>,
    fail_sends: Vec<usize>,
}

/// Handle to a virtual bus; cheap to clone
#[derive(Clone, Default)]
pub struct VirtualBus {
    state: Arc<Mutex<BusState>>,
}

impl VirtualBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint to the bus
    pub fn endpoint(&self) -> VirtualCanDriver {
        let mut state = self.state.lock();
        state.queues.push(VecDeque::new());
        state.fail_sends.push(0);
        VirtualCanDriver {
            bus: self.state.clone(),
            index: state.queues.len() - 1,
        }
    }
}

/// One node on a [`VirtualBus`]
pub struct VirtualCanDriver {
    bus: Arc<Mutex<BusState>>,
    index: usize,
}

impl VirtualCanDriver {
    /// Make the next `count` sends from this endpoint fail
    pub fn fail_next_sends(&self, count: usize) {
        self.bus.lock().fail_sends[self.index] = count;
    }

    /// Number of frames waiting on this endpoint
    pub fn pending(&self) -> usize {
        self.bus.lock().queues[self.index].len()
    }
}

impl CanDriver for VirtualCanDriver {
    fn any(&mut self) -> bool {
        !self.bus.lock().queues[self.index].is_empty()
    }

    fn recv(&mut self) -> Result<Option<CanFrame>, DriverError> {
        Ok(self.bus.lock().queues[self.index].pop_front())
    }

    fn send(&mut self, frame: &CanFrame) -> Result<(), DriverError> {
        let mut state = self.bus.lock();
        if state.fail_sends[self.index] > 0 {
            state.fail_sends[self.index] -= 1;
            return Err(DriverError::Send("injected bus failure".to_string()));
        }
        let sender = self.index;
        for (i, queue) in state.queues.iter_mut().enumerate() {
            if i != sender {
                queue.push_back(frame.clone());
            }
        }
        Ok(())
    }

    fn clear_rx_queue(&mut self) {
        self.bus.lock().queues[self.index].clear();
    }
}
