use embedded_can::{Id, StandardId};

use crate::MAX_PAYLOAD;

/// Raw identifier flag marking a 29-bit identifier (SocketCAN layout)
pub const EXTENDED_FLAG: u32 = 0x8000_0000;
/// Raw identifier flag marking a remote transmission request (SocketCAN layout)
pub const REMOTE_FLAG: u32 = 0x4000_0000;
/// Raw identifier flag marking an error frame (SocketCAN layout)
pub const ERROR_FLAG: u32 = 0x2000_0000;

/// A classic CAN frame with a standard 11-bit identifier.
///
/// Holds up to 8 data bytes. Bytes past the DLC are kept zeroed so two frames
/// carrying the same payload compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    id: StandardId,
    remote: bool,
    dlc: u8,
    data: [u8; MAX_PAYLOAD],
}

impl Frame {
    /// Creates a new data frame. `data` must have a length in the range 0..=8
    /// or else `None` will be returned instead.
    pub fn new_data(id: StandardId, data: &[u8]) -> Option<Self> {
        if data.len() > MAX_PAYLOAD {
            return None;
        }

        let mut copy = [0u8; MAX_PAYLOAD];
        copy[..data.len()].copy_from_slice(data);

        Some(Self {
            id,
            remote: false,
            dlc: data.len() as u8,
            data: copy,
        })
    }

    /// Creates a new remote frame. `dlc` must be in the range 0..=8 or else
    /// `None` will be returned instead.
    pub fn new_remote_request(id: StandardId, dlc: usize) -> Option<Self> {
        if dlc > MAX_PAYLOAD {
            return None;
        }

        Some(Self {
            id,
            remote: true,
            dlc: dlc as u8,
            data: [0; MAX_PAYLOAD],
        })
    }

    /// Builds a frame from raw buffer contents, clamping the DLC to 8 and
    /// zeroing bytes past it
    pub(crate) fn from_parts(
        id: StandardId,
        remote: bool,
        dlc: usize,
        mut data: [u8; MAX_PAYLOAD],
    ) -> Self {
        let dlc = dlc.min(MAX_PAYLOAD);
        if remote {
            data = [0; MAX_PAYLOAD];
        } else {
            data[dlc..].fill(0);
        }

        Self {
            id,
            remote,
            dlc: dlc as u8,
            data,
        }
    }

    pub fn standard_id(&self) -> StandardId {
        self.id
    }

    /// Identifier in the SocketCAN layout: 11 identifier bits plus flag bits
    pub fn raw_id(&self) -> u32 {
        let mut raw = u32::from(self.id.as_raw());
        if self.remote {
            raw |= REMOTE_FLAG;
        }
        raw
    }

    pub fn len(&self) -> usize {
        usize::from(self.dlc)
    }

    pub fn is_empty(&self) -> bool {
        self.dlc == 0
    }

    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// Payload bytes up to the DLC (empty for remote frames)
    pub fn payload(&self) -> &[u8] {
        if self.remote {
            &[]
        } else {
            &self.data[..self.len()]
        }
    }
}

impl embedded_can::Frame for Frame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        match id.into() {
            Id::Standard(id) => Self::new_data(id, data),
            Id::Extended(_) => None,
        }
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        match id.into() {
            Id::Standard(id) => Self::new_remote_request(id, dlc),
            Id::Extended(_) => None,
        }
    }

    fn is_extended(&self) -> bool {
        false
    }

    fn is_remote_frame(&self) -> bool {
        self.remote
    }

    fn id(&self) -> Id {
        Id::Standard(self.id)
    }

    fn dlc(&self) -> usize {
        self.len()
    }

    fn data(&self) -> &[u8] {
        self.payload()
    }
}

#[cfg(test)]
mod tests {
    use embedded_can::{ExtendedId, Frame as _, Id, StandardId};

    use super::{Frame, REMOTE_FLAG};

    #[test]
    fn data_frames() {
        let frame = Frame::new_data(StandardId::MAX, &[1, 2, 3]).unwrap();

        assert_eq!(frame.standard_id(), StandardId::MAX);
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.payload(), &[1, 2, 3]);
        assert_eq!(frame.raw_id(), 0x7FF);
        assert!(!frame.is_remote());

        assert_eq!(Frame::new_data(StandardId::ZERO, &[0; 9]), None);
        assert!(Frame::new_data(StandardId::ZERO, &[]).unwrap().is_empty());
    }

    #[test]
    fn remote_frames() {
        let id = StandardId::new(0x201).unwrap();
        let frame = Frame::new_remote_request(id, 8).unwrap();

        assert!(frame.is_remote());
        assert_eq!(frame.len(), 8);
        assert_eq!(frame.payload(), &[] as &[u8]);
        assert_eq!(frame.raw_id(), 0x201 | REMOTE_FLAG);

        assert_eq!(Frame::new_remote_request(id, 9), None);
    }

    #[test]
    fn embedded_can_frame() {
        let frame = Frame::new(StandardId::new(0x101).unwrap(), &[0xAA; 8]).unwrap();

        assert_eq!(frame.id(), Id::Standard(StandardId::new(0x101).unwrap()));
        assert_eq!(frame.dlc(), 8);
        assert_eq!(frame.data(), &[0xAA; 8]);
        assert!(frame.is_standard());
        assert!(frame.is_data_frame());

        assert_eq!(Frame::new(ExtendedId::MAX, &[]), None);
        assert_eq!(Frame::new_remote(ExtendedId::MAX, 0), None);
    }
}
