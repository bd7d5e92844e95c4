//! OBD-II client
//!
//! Every operation comes in two forms: `read_*` returns the typed
//! [`ObdError`], `get_*` logs the failure and degrades to "no data".

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::supported::{decode_bitmap, has_next_block, parse_mask, BLOCK_SIZE};
use super::{
    DtcCode, ObdError, PidRegistry, PidValue, Vin, PID_VIN, SERVICE_CURRENT_DATA,
    SERVICE_FREEZE_FRAME, SERVICE_READ_DTC, SERVICE_VEHICLE_INFO, VIN_LEN,
};
use crate::addressing::AddressingConfig;
use crate::config::ObdConfig;
use crate::driver::CanDriver;
use crate::isotp::IsoTpTransport;

/// High-level OBD-II client over an ISO-TP transport
pub struct ObdClient<D> {
    transport: IsoTpTransport<D>,
    registry: PidRegistry,
    timeout: Duration,
}

impl<D: CanDriver> ObdClient<D> {
    pub fn new(transport: IsoTpTransport<D>, registry: PidRegistry) -> Self {
        let timeout = transport.options().timeout();
        Self {
            transport,
            registry,
            timeout,
        }
    }

    /// Client with addressing, transport options and PID table from `config`
    pub fn from_config(driver: D, config: &ObdConfig) -> Self {
        let transport = IsoTpTransport::new(
            driver,
            AddressingConfig::for_mode(config.addressing),
            config.transport.clone(),
        );
        Self::new(transport, PidRegistry::with_defs(&config.pids))
    }

    /// Override the per-request response timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &PidRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &IsoTpTransport<D> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut IsoTpTransport<D> {
        &mut self.transport
    }

    /// Raw service request. The response starts at the response service id.
    pub async fn query(&mut self, service: u8, pid: Option<u8>) -> Result<Vec<u8>, ObdError> {
        let response = match pid {
            Some(pid) => self.transport.request(&[service, pid], self.timeout).await?,
            None => self.transport.request(&[service], self.timeout).await?,
        };
        Ok(response)
    }

    // =========================================================================
    // Supported PIDs
    // =========================================================================

    /// Walk the supported-PID bitmaps starting at block 0x00.
    ///
    /// Fails only if the first block gets no usable answer; later failures
    /// end the walk with what was collected.
    pub async fn read_supported_pids(&mut self) -> Result<BTreeSet<u8>, ObdError> {
        let mut supported = BTreeSet::new();
        let mut base = 0u8;

        loop {
            let block = match self.query(SERVICE_CURRENT_DATA, Some(base)).await {
                Ok(response) => parse_mask(response.get(2..).unwrap_or_default()).ok_or_else(|| {
                    ObdError::MalformedResponse(format!(
                        "supported-PID block 0x{:02X}: {}",
                        base,
                        hex::encode_upper(&response)
                    ))
                }),
                Err(e) => Err(e),
            };

            let mask = match block {
                Ok(mask) => mask,
                Err(e) if base == 0 => return Err(e),
                Err(e) => {
                    warn!(block = format!("0x{:02X}", base), error = %e, "Supported-PID walk stopped early");
                    break;
                }
            };

            debug!(block = format!("0x{:02X}", base), mask = format!("0x{:08X}", mask), "Supported PIDs");
            supported.extend(decode_bitmap(base, mask));

            if !has_next_block(mask) {
                break;
            }
            match base.checked_add(BLOCK_SIZE) {
                Some(next) => base = next,
                None => break,
            }
        }

        Ok(supported)
    }

    pub async fn get_supported_pids(&mut self) -> BTreeSet<u8> {
        self.read_supported_pids().await.unwrap_or_else(|e| {
            error!(error = %e, "No supported-PID information");
            BTreeSet::new()
        })
    }

    // =========================================================================
    // Trouble codes
    // =========================================================================

    /// Stored trouble codes (service 0x03)
    pub async fn read_dtcs(&mut self) -> Result<Vec<DtcCode>, ObdError> {
        let response = self.query(SERVICE_READ_DTC, None).await?;
        let pairs = response.get(2..).unwrap_or_default();
        DtcCode::from_pairs(pairs).ok_or_else(|| {
            ObdError::MalformedResponse(format!(
                "DTC bytes are not in pairs: {}",
                hex::encode_upper(pairs)
            ))
        })
    }

    pub async fn get_dtcs(&mut self) -> Vec<DtcCode> {
        self.read_dtcs().await.unwrap_or_else(|e| {
            error!(error = %e, "Failed to read DTCs");
            Vec::new()
        })
    }

    // =========================================================================
    // VIN
    // =========================================================================

    /// Vehicle identification number (service 0x09, PID 0x02)
    pub async fn read_vin(&mut self) -> Result<Vin, ObdError> {
        let response = self.query(SERVICE_VEHICLE_INFO, Some(PID_VIN)).await?;
        // service id, PID, number of data items, VIN
        let vin = response.get(3..).unwrap_or_default();
        Vin::try_from(vin).map_err(|len| {
            ObdError::MalformedResponse(format!(
                "VIN length {} (expected {}): {}",
                len,
                VIN_LEN,
                hex::encode_upper(vin)
            ))
        })
    }

    pub async fn get_vin(&mut self) -> Option<Vin> {
        self.read_vin()
            .await
            .map_err(|e| error!(error = %e, "Failed to read VIN"))
            .ok()
    }

    // =========================================================================
    // Named PIDs
    // =========================================================================

    /// Read and decode a PID by registry name, live (0x01) or from the
    /// freeze frame (0x02)
    pub async fn read_pid(&mut self, name: &str, freeze_frame: bool) -> Result<PidValue, ObdError> {
        let entry = self
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| ObdError::UnsupportedPid(name.to_string()))?;

        let service = if freeze_frame {
            SERVICE_FREEZE_FRAME
        } else {
            SERVICE_CURRENT_DATA
        };
        let response = self.query(service, Some(entry.code)).await?;
        entry.decode(response.get(2..).unwrap_or_default())
    }

    pub async fn get_pid(&mut self, name: &str, freeze_frame: bool) -> Option<PidValue> {
        self.read_pid(name, freeze_frame)
            .await
            .map_err(|e| error!(pid = %name, error = %e, "Failed to read PID"))
            .ok()
    }
}
