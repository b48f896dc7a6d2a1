//! FlexCAN message buffer layout
//!
//! Each classic message buffer is four 32-bit words: control/status, identifier
//! and two data words holding the payload most significant byte first.

use embedded_can::StandardId;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{frame::Frame, MAX_PAYLOAD};

pub const WORDS_PER_MAILBOX: usize = 4;

const CODE_SHIFT: u32 = 24;
const CODE_MASK: u32 = 0xF << CODE_SHIFT;
const IDE_BIT: u32 = 1 << 21;
const RTR_BIT: u32 = 1 << 20;
const DLC_SHIFT: u32 = 16;
const DLC_MASK: u32 = 0xF << DLC_SHIFT;
const STD_ID_SHIFT: u32 = 18;
const STD_ID_MASK: u32 = 0x7FF << STD_ID_SHIFT;

/// Message buffer CODE field. Receive codes have bit 3 clear, transmit codes
/// have it set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Code {
    /// Not taking part in reception
    RxInactive = 0x0,
    /// Being updated by the controller
    RxBusy = 0x1,
    /// Holds a received frame
    RxFull = 0x2,
    /// Armed and waiting for a frame
    RxEmpty = 0x4,
    /// A second frame overwrote an unread one
    RxOverrun = 0x6,
    /// Not taking part in transmission
    TxInactive = 0x8,
    /// Transmission aborted
    TxAbort = 0x9,
    /// Armed to transmit once
    TxData = 0xC,
}

impl Code {
    pub fn is_transmit(self) -> bool {
        u8::from(self) & 0x8 != 0
    }
}

/// Contents of one message buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mailbox {
    pub control: u32,
    pub id: u32,
    pub data: [u32; 2],
}

impl Mailbox {
    /// An empty buffer parked with `code`
    pub fn parked(code: Code) -> Self {
        Self {
            control: control_word(code, 0),
            ..Self::default()
        }
    }

    /// A buffer armed to transmit `frame`
    pub fn transmit(frame: &Frame) -> Self {
        let mut control = control_word(Code::TxData, frame.len() as u8);
        if frame.is_remote() {
            control |= RTR_BIT;
        }

        let mut bytes = [0u8; MAX_PAYLOAD];
        bytes[..frame.payload().len()].copy_from_slice(frame.payload());

        Self {
            control,
            id: id_word(frame.standard_id()),
            data: pack_data(&bytes),
        }
    }

    pub fn words(&self) -> [u32; WORDS_PER_MAILBOX] {
        [self.control, self.id, self.data[0], self.data[1]]
    }

    pub fn from_words(words: [u32; WORDS_PER_MAILBOX]) -> Self {
        Self {
            control: words[0],
            id: words[1],
            data: [words[2], words[3]],
        }
    }

    /// `None` if the CODE field holds a value this driver never programs
    pub fn code(&self) -> Option<Code> {
        Code::try_from(((self.control & CODE_MASK) >> CODE_SHIFT) as u8).ok()
    }

    pub fn dlc(&self) -> usize {
        ((self.control & DLC_MASK) >> DLC_SHIFT) as usize
    }

    pub fn standard_id(&self) -> StandardId {
        let raw = ((self.id & STD_ID_MASK) >> STD_ID_SHIFT) as u16;
        // Masked to 11 bits, the fallback never applies
        StandardId::new(raw).unwrap_or(StandardId::ZERO)
    }

    pub fn is_extended(&self) -> bool {
        self.control & IDE_BIT != 0
    }

    /// Reconstructs the received frame. DLC values past 8 are clamped the way
    /// classic CAN treats them.
    pub fn frame(&self) -> Frame {
        Frame::from_parts(
            self.standard_id(),
            self.control & RTR_BIT != 0,
            self.dlc(),
            unpack_data(self.data),
        )
    }
}

pub fn control_word(code: Code, dlc: u8) -> u32 {
    (u32::from(u8::from(code)) << CODE_SHIFT) | ((u32::from(dlc) << DLC_SHIFT) & DLC_MASK)
}

pub fn id_word(id: StandardId) -> u32 {
    (u32::from(id.as_raw()) << STD_ID_SHIFT) & STD_ID_MASK
}

pub fn pack_data(bytes: &[u8; MAX_PAYLOAD]) -> [u32; 2] {
    [
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
    ]
}

pub fn unpack_data(words: [u32; 2]) -> [u8; MAX_PAYLOAD] {
    let mut bytes = [0u8; MAX_PAYLOAD];
    bytes[..4].copy_from_slice(&words[0].to_be_bytes());
    bytes[4..].copy_from_slice(&words[1].to_be_bytes());
    bytes
}

#[cfg(test)]
mod tests {
    use embedded_can::StandardId;

    use super::{control_word, id_word, pack_data, unpack_data, Code, Mailbox};
    use crate::frame::Frame;

    #[test]
    fn control_words() {
        assert_eq!(control_word(Code::RxEmpty, 0), 0x0400_0000);
        assert_eq!(control_word(Code::TxInactive, 0), 0x0800_0000);
        assert_eq!(control_word(Code::TxData, 8), 0x0C08_0000);

        assert!(Code::TxData.is_transmit());
        assert!(!Code::RxFull.is_transmit());
        assert_eq!(Mailbox::parked(Code::RxEmpty).code(), Some(Code::RxEmpty));
        assert_eq!(Mailbox { control: 0x0F00_0000, ..Default::default() }.code(), None);
    }

    #[test]
    fn identifier_words() {
        assert_eq!(id_word(StandardId::new(0x101).unwrap()), 0x101 << 18);
        assert_eq!(id_word(StandardId::MAX), 0x1FFC_0000);

        let mailbox = Mailbox { id: 0x201 << 18 | 0x3_FFFF, ..Default::default() };
        assert_eq!(mailbox.standard_id(), StandardId::new(0x201).unwrap());
    }

    #[test]
    fn data_words_are_big_endian() {
        let words = pack_data(&[1, 2, 3, 4, 5, 6, 7, 8]);

        assert_eq!(words, [0x0102_0304, 0x0506_0708]);
        assert_eq!(unpack_data(words), [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn transmit_buffer_holds_frame() {
        let id = StandardId::new(0x101).unwrap();
        let frame = Frame::new_data(id, &[0xAA, 0xBB, 0xCC]).unwrap();
        let mailbox = Mailbox::transmit(&frame);

        assert_eq!(mailbox.code(), Some(Code::TxData));
        assert_eq!(mailbox.dlc(), 3);
        assert_eq!(mailbox.data, [0xAABB_CC00, 0]);
        assert_eq!(Mailbox::from_words(mailbox.words()), mailbox);
        assert_eq!(mailbox.frame(), frame);
    }

    #[test]
    fn received_frames() {
        let mailbox = Mailbox {
            control: control_word(Code::RxFull, 15),
            id: id_word(StandardId::new(0x201).unwrap()),
            data: [0x0190_0168, 0xC304_3707],
        };

        let frame = mailbox.frame();
        assert_eq!(frame.len(), 8);
        assert_eq!(frame.payload(), &[0x01, 0x90, 0x01, 0x68, 0xC3, 4, 0x37, 7]);

        let remote = Mailbox {
            control: control_word(Code::RxFull, 2) | 1 << 20,
            ..mailbox
        };
        assert!(remote.frame().is_remote());
        assert_eq!(remote.frame().len(), 2);
    }
}
