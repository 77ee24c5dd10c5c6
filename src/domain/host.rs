use super::error::FirmwareError;

/// Command prefix that escapes a privileged container into the host's root
/// filesystem. Firmware tools must act on the physical machine.
pub const DOCKER_CHROOT_PREFIX: &str = "/usr/bin/docker run -e DEBIAN_FRONTEND=noninteractive \
--privileged --rm --net=host --pid=host -v /:/host ubuntu:20.04 /usr/sbin/chroot /host ";

/// Environment variable whose non-empty value marks a containerized host.
pub const CONTAINER_ENV_VAR: &str = "container";

/// Supported host operating systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Linux,
}

impl HostOs {
    /// Detect the running OS; anything but Linux is unsupported.
    pub fn detect() -> Result<Self, FirmwareError> {
        Self::from_name(std::env::consts::OS)
    }

    fn from_name(name: &str) -> Result<Self, FirmwareError> {
        match name {
            "linux" => Ok(HostOs::Linux),
            other => Err(FirmwareError::UnsupportedOs(other.to_string())),
        }
    }
}

impl std::fmt::Display for HostOs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostOs::Linux => write!(f, "Linux"),
        }
    }
}

/// Where the pipeline is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostEnvironment {
    pub os: HostOs,
    /// Running inside a container; host commands need [`DOCKER_CHROOT_PREFIX`].
    pub containerized: bool,
}

impl HostEnvironment {
    pub fn detect() -> Result<Self, FirmwareError> {
        let containerized = std::env::var(CONTAINER_ENV_VAR)
            .map(|value| !value.trim().is_empty())
            .unwrap_or(false);
        Ok(Self {
            os: HostOs::detect()?,
            containerized,
        })
    }

    /// A bare-metal Linux host.
    pub fn native() -> Self {
        Self {
            os: HostOs::Linux,
            containerized: false,
        }
    }

    /// Prefix `command` with the host escape when containerized.
    pub fn wrap(&self, command: &str) -> String {
        if self.containerized {
            format!("{}{}", DOCKER_CHROOT_PREFIX, command)
        } else {
            command.to_string()
        }
    }
}
