//! Raw SocketCAN driver (Linux only)

use ::socketcan::{
    CanFrame as RawFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Id, Socket, StandardId,
};

use super::{CanDriver, CanFrame, DriverError};

/// Raw CAN socket in non-blocking mode.
///
/// `any()` reads ahead by at most one frame and parks it, so checking for
/// traffic never loses or splits a frame.
pub struct SocketCanDriver {
    interface: String,
    socket: CanSocket,
    pending: Option<CanFrame>,
}

impl SocketCanDriver {
    pub fn open(interface: &str) -> Result<Self, DriverError> {
        let socket = CanSocket::open(interface)
            .map_err(|e| DriverError::Open(format!("{}: {}", interface, e)))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| DriverError::Open(format!("Failed to set non-blocking: {}", e)))?;

        tracing::info!(interface = %interface, "Raw CAN socket opened");

        Ok(Self {
            interface: interface.to_string(),
            socket,
            pending: None,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn read_one(&mut self) -> Result<Option<CanFrame>, DriverError> {
        loop {
            match self.socket.read_frame() {
                Ok(frame) if frame.is_error_frame() => {
                    tracing::debug!(id = format!("0x{:X}", frame.raw_id()), "Skipping CAN error frame");
                }
                Ok(frame) => {
                    return Ok(Some(CanFrame {
                        id: frame.raw_id(),
                        extended: frame.is_extended(),
                        remote: frame.is_remote_frame(),
                        data: frame.data().to_vec(),
                    }));
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(DriverError::Receive(e.to_string())),
            }
        }
    }
}

fn to_raw(frame: &CanFrame) -> Result<RawFrame, DriverError> {
    let id = if frame.extended {
        ExtendedId::new(frame.id).map(Id::Extended)
    } else {
        u16::try_from(frame.id)
            .ok()
            .and_then(StandardId::new)
            .map(Id::Standard)
    }
    .ok_or_else(|| DriverError::Send(format!("Invalid CAN ID: 0x{:X}", frame.id)))?;

    let raw = if frame.remote {
        RawFrame::new_remote(id, frame.data.len())
    } else {
        RawFrame::new(id, &frame.data)
    };
    raw.ok_or_else(|| DriverError::Send(format!("Invalid frame payload ({} bytes)", frame.data.len())))
}

impl CanDriver for SocketCanDriver {
    fn any(&mut self) -> bool {
        if self.pending.is_some() {
            return true;
        }
        match self.read_one() {
            Ok(frame) => {
                self.pending = frame;
                self.pending.is_some()
            }
            Err(e) => {
                tracing::error!(error = %e, "SocketCAN read error");
                false
            }
        }
    }

    fn recv(&mut self) -> Result<Option<CanFrame>, DriverError> {
        match self.pending.take() {
            Some(frame) => Ok(Some(frame)),
            None => self.read_one(),
        }
    }

    fn send(&mut self, frame: &CanFrame) -> Result<(), DriverError> {
        let raw = to_raw(frame)?;
        self.socket
            .write_frame(&raw)
            .map_err(|e| DriverError::Send(e.to_string()))
    }

    fn clear_rx_queue(&mut self) {
        self.pending = None;
        let mut drained = 0usize;
        while let Ok(Some(_)) = self.read_one() {
            drained += 1;
        }
        if drained > 0 {
            tracing::debug!(drained, "Drained stale frames from socket");
        }
    }
}
