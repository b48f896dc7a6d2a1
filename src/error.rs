/// Controller acknowledgement the bring-up and shutdown sequences wait on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stage {
    /// Module enabled with freeze requested, waiting for the freeze acknowledge
    FreezeEntry,
    /// Freeze released, waiting for the freeze acknowledge to drop
    FreezeExit,
    /// Waiting for the module to report it is synchronized to the bus
    Ready,
    /// Module disabled, waiting for the low-power acknowledge
    LowPowerEntry,
}

/// Errors surfaced by the CAN subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    #[error("Controller did not acknowledge {0:?} within the poll budget")]
    ConfigurationTimeout(Stage),
    #[error("Requested a payload of {0:?} bytes but a frame holds at most 8")]
    InvalidLength(usize),
    #[error("No bit timing reaches {bitrate:?} bit/s from a {clock:?} Hz reference")]
    UnreachableBitTiming { clock: u32, bitrate: u32 },
    #[cfg(all(feature = "socketcan", target_os = "linux"))]
    #[error("Host CAN socket failed: {0:?}")]
    Socket(#[cfg_attr(feature = "defmt", defmt(Debug2Format))] std::io::ErrorKind),
}
