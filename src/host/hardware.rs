use std::sync::{Arc, OnceLock};

use tracing::debug;

use super::HOST_ARCH;
use crate::dispatch::{Hardware, HardwareService};
use crate::error::DispatchError;

/// Reports the host CPU as the current device
#[derive(Debug, Default, Clone, Copy)]
pub struct HostHardware;

impl HostHardware {
    fn probe() -> Result<Hardware, DispatchError> {
        let parallelism = std::thread::available_parallelism().map_err(|e| {
            DispatchError::Hardware(format!("cannot query host parallelism: {e}"))
        })?;
        let hardware = Hardware {
            arch: HOST_ARCH.to_string(),
            name: format!("{} cpu", std::env::consts::ARCH),
            compute_units: u32::try_from(parallelism.get()).unwrap_or(u32::MAX),
        };
        debug!(%hardware, "probed host hardware");
        Ok(hardware)
    }
}

impl HardwareService for HostHardware {
    fn current_hardware(&self) -> Result<Arc<Hardware>, DispatchError> {
        static HARDWARE: OnceLock<Arc<Hardware>> = OnceLock::new();
        if let Some(hardware) = HARDWARE.get() {
            return Ok(hardware.clone());
        }
        // A failed probe is not cached, so a later call retries
        let probed = Arc::new(Self::probe()?);
        Ok(HARDWARE.get_or_init(|| probed).clone())
    }
}
