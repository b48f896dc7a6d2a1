use embedded_can::StandardId;

use crate::{error::Error, frame::Frame};

/// Single-slot, non-blocking access to the bus.
///
/// Backends keep one transmit and one receive slot. A `send` issued while the
/// previous frame is still pending replaces it, and a frame arriving before
/// the previous one was drained replaces that one. Neither case is reported.
pub trait Transport {
    /// Arms the transmit slot with `payload`. Fails when the payload is longer
    /// than 8 bytes, or when a host socket refuses the frame.
    fn send(&mut self, id: StandardId, payload: &[u8]) -> Result<(), Error>;

    /// Drains the receive slot, re-arming it for the next frame
    fn receive(&mut self) -> Option<Frame>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, id: StandardId, payload: &[u8]) -> Result<(), Error> {
        (**self).send(id, payload)
    }

    fn receive(&mut self) -> Option<Frame> {
        (**self).receive()
    }
}
