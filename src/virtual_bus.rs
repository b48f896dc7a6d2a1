//! In-memory bus for host-side simulation.
//!
//! Every frame sent through a [`VirtualPort`] is delivered to the receive slot
//! of every other open port on the same [`VirtualBus`], so a wheel controller
//! and a simulated engine controller can run against each other in one
//! process. Each port keeps exactly one pending frame, like the hardware
//! receive mailbox.

use core::cell::RefCell;

use embedded_can::StandardId;
use heapless::Vec;

use crate::{error::Error, frame::Frame, transport::Transport};

#[derive(Debug, Default)]
struct Slot {
    open: bool,
    pending: Option<Frame>,
}

/// A broadcast bus with room for `N` ports
pub struct VirtualBus<const N: usize> {
    slots: RefCell<Vec<Slot, N>>,
}

impl<const N: usize> Default for VirtualBus<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> VirtualBus<N> {
    pub const fn new() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
        }
    }

    /// Opens a new port. Returns `None` once all `N` ports are taken.
    pub fn attach(&self) -> Option<VirtualPort<'_, N>> {
        let mut slots = self.slots.borrow_mut();
        let index = slots.len();
        slots
            .push(Slot {
                open: true,
                pending: None,
            })
            .ok()?;

        debug!("virtual bus: port {} attached", index);

        Some(VirtualPort { bus: self, index })
    }

    fn broadcast(&self, from: usize, frame: Frame) {
        let mut slots = self.slots.borrow_mut();

        for (index, slot) in slots.iter_mut().enumerate() {
            if index == from || !slot.open {
                continue;
            }

            if slot.pending.is_some() {
                trace!("virtual bus: port {} overran its receive slot", index);
            }

            slot.pending = Some(frame);
        }
    }

    fn take(&self, index: usize) -> Option<Frame> {
        self.slots
            .borrow_mut()
            .get_mut(index)
            .and_then(|slot| slot.pending.take())
    }

    fn close(&self, index: usize) {
        if let Some(slot) = self.slots.borrow_mut().get_mut(index) {
            slot.open = false;
            slot.pending = None;
        }
    }
}

/// One node's connection to a [`VirtualBus`]
pub struct VirtualPort<'a, const N: usize> {
    bus: &'a VirtualBus<N>,
    index: usize,
}

impl<const N: usize> VirtualPort<'_, N> {
    /// Detaches from the bus. Frames sent afterwards are no longer delivered here.
    pub fn shutdown(self) {
        self.bus.close(self.index);
        debug!("virtual bus: port {} closed", self.index);
    }
}

impl<const N: usize> Transport for VirtualPort<'_, N> {
    fn send(&mut self, id: StandardId, payload: &[u8]) -> Result<(), Error> {
        let frame = Frame::new_data(id, payload).ok_or(Error::InvalidLength(payload.len()))?;
        self.bus.broadcast(self.index, frame);
        Ok(())
    }

    fn receive(&mut self) -> Option<Frame> {
        self.bus.take(self.index)
    }
}

#[cfg(test)]
mod tests {
    use embedded_can::StandardId;

    use super::VirtualBus;
    use crate::{error::Error, transport::Transport};

    fn id(raw: u16) -> StandardId {
        StandardId::new(raw).unwrap()
    }

    #[test]
    fn frames_reach_other_ports_only() {
        let bus = VirtualBus::<3>::new();
        let mut a = bus.attach().unwrap();
        let mut b = bus.attach().unwrap();
        let mut c = bus.attach().unwrap();
        assert!(bus.attach().is_none());

        a.send(id(0x101), &[1, 2, 3]).unwrap();

        assert_eq!(a.receive(), None);
        assert_eq!(b.receive().unwrap().payload(), &[1, 2, 3]);
        assert_eq!(c.receive().unwrap().standard_id(), id(0x101));
        assert_eq!(b.receive(), None);
    }

    #[test]
    fn newest_frame_wins() {
        let bus = VirtualBus::<2>::new();
        let mut a = bus.attach().unwrap();
        let mut b = bus.attach().unwrap();

        a.send(id(0x201), &[1]).unwrap();
        a.send(id(0x201), &[2]).unwrap();

        assert_eq!(b.receive().unwrap().payload(), &[2]);
        assert_eq!(b.receive(), None);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let bus = VirtualBus::<2>::new();
        let mut a = bus.attach().unwrap();
        let mut b = bus.attach().unwrap();

        assert_eq!(a.send(id(0x101), &[0; 9]), Err(Error::InvalidLength(9)));
        assert_eq!(b.receive(), None);
    }

    #[test]
    fn closed_ports_stop_receiving() {
        let bus = VirtualBus::<2>::new();
        let mut a = bus.attach().unwrap();
        let b = bus.attach().unwrap();

        b.shutdown();
        a.send(id(0x101), &[0; 8]).unwrap();

        assert!(bus.slots.borrow().iter().all(|slot| slot.pending.is_none()));
    }
}
