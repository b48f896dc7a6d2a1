#![no_std]

#[cfg(all(feature = "socketcan", target_os = "linux"))]
extern crate std;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod codec;
mod error;
mod frame;
mod scheduler;
mod transport;
mod virtual_bus;

#[cfg(all(feature = "socketcan", target_os = "linux"))]
mod socket;

pub mod flexcan;
pub mod mailbox;
pub mod timing;

/// Classic CAN data field
pub const MAX_PAYLOAD: usize = 8;

pub use codec::*;
pub use error::*;
pub use frame::*;
pub use scheduler::*;
pub use transport::*;
pub use virtual_bus::*;

#[cfg(all(feature = "socketcan", target_os = "linux"))]
pub use socket::*;

pub use embedded_can::StandardId;
