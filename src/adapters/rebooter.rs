use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::domain::{FirmwareError, HostEnvironment};
use crate::ports::CommandRunner;

pub const REBOOT_COMMAND: &str = "/sbin/reboot -f";

/// Delay between a successful install and the reboot.
pub const REBOOT_DELAY: Duration = Duration::from_millis(100);

/// Reboots the host through a [`CommandRunner`].
pub struct Rebooter {
    runner: Arc<dyn CommandRunner>,
    host: HostEnvironment,
}

impl Rebooter {
    pub fn new(runner: Arc<dyn CommandRunner>, host: HostEnvironment) -> Self {
        Self { runner, host }
    }

    /// Run the reboot command. Only a negative exit code counts as failure;
    /// a real reboot rarely returns at all.
    pub fn reboot(&self) -> Result<(), FirmwareError> {
        let output = self.runner.run(&self.host.wrap(REBOOT_COMMAND), None)?;
        if output.code < 0 {
            return Err(FirmwareError::Reboot(output.stderr.trim().to_string()));
        }
        Ok(())
    }

    /// Fire the reboot after `delay` on the current tokio runtime and return
    /// at once. The outcome of the reboot itself is only logged.
    pub fn schedule(self: &Arc<Self>, delay: Duration) -> Result<JoinHandle<()>, FirmwareError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| FirmwareError::Reboot(e.to_string()))?;
        let rebooter = Arc::clone(self);

        Ok(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            info!("reboot");
            match tokio::task::spawn_blocking(move || rebooter.reboot()).await {
                Ok(Ok(())) => info!("Reboot command issued"),
                Ok(Err(e)) => error!(error = %e, "Reboot failed"),
                Err(e) => error!(error = %e, "Reboot task panicked"),
            }
        }))
    }
}
