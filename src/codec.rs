//! Payload layouts of the two status messages exchanged with the engine
//! controller. All functions are pure.

use embedded_can::StandardId;

use crate::{
    frame::{Frame, ERROR_FLAG, EXTENDED_FLAG, REMOTE_FLAG},
    MAX_PAYLOAD,
};

/// Steering wheel status, sent by this node
pub const OUTBOUND_ID: StandardId = standard_id(0x101);
/// Engine controller status, received by this node
pub const INBOUND_ID: StandardId = standard_id(0x201);

const ID_MASK: u32 = !(EXTENDED_FLAG | REMOTE_FLAG | ERROR_FLAG);

const PIT_LIMITER_BIT: u8 = 1 << 0;
const DRS_BIT: u8 = 1 << 1;
const LED_PIT_BIT: u8 = 1 << 6;
const LED_TEMP_BIT: u8 = 1 << 7;

const TEMP_OFFSET: f32 = 40.0;
const TEMP_SCALE: f32 = 10.0;

const fn standard_id(raw: u16) -> StandardId {
    match StandardId::new(raw) {
        Some(id) => id,
        None => panic!("identifier out of the 11-bit range"),
    }
}

/// Input state reported to the engine controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutboundStatus {
    /// One bit per button, bits 0..=3
    pub button_state: u8,
    /// Rotary switch position, 0..=15
    pub rotary_position: u8,
    /// Clutch paddle travel in percent, 0..=100
    pub clutch_value: u8,
}

/// Engine controller state shown on the wheel
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InboundStatus {
    /// Degrees Celsius
    pub temp1: f32,
    /// Degrees Celsius
    pub temp2: f32,
    pub pit_limiter_active: bool,
    pub drs_status: bool,
    pub led_pit: bool,
    pub led_temp: bool,
    /// 0 is neutral
    pub gear_actual: u8,
    pub clutch_feedback: u8,
    pub rotary_feedback: u8,
}

/// Bytes 3..8 are reserved and always zero
pub fn encode_outbound(status: &OutboundStatus) -> [u8; MAX_PAYLOAD] {
    let mut payload = [0u8; MAX_PAYLOAD];
    payload[0] = status.button_state & 0x0F;
    payload[1] = status.rotary_position & 0x0F;
    payload[2] = status.clutch_value;
    payload
}

/// Engine controller side of [`encode_outbound`]. `None` if fewer than 3 bytes.
pub fn decode_outbound(payload: &[u8]) -> Option<OutboundStatus> {
    let &[buttons, rotary, clutch, ..] = payload else {
        return None;
    };

    Some(OutboundStatus {
        button_state: buttons & 0x0F,
        rotary_position: rotary & 0x0F,
        clutch_value: clutch,
    })
}

/// Decodes an engine controller status frame.
///
/// `raw_id` may carry SocketCAN flag bits, they are masked off before the
/// identifier is compared. Returns `None` for any other identifier and for
/// payloads shorter than 8 bytes.
pub fn decode_inbound(raw_id: u32, payload: &[u8]) -> Option<InboundStatus> {
    if raw_id & ID_MASK != u32::from(INBOUND_ID.as_raw()) {
        return None;
    }

    let payload: &[u8; MAX_PAYLOAD] = payload.get(..MAX_PAYLOAD)?.try_into().ok()?;
    let flags = payload[4];

    Some(InboundStatus {
        temp1: temperature(i16::from_be_bytes([payload[0], payload[1]])),
        temp2: temperature(i16::from_be_bytes([payload[2], payload[3]])),
        pit_limiter_active: flags & PIT_LIMITER_BIT != 0,
        drs_status: flags & DRS_BIT != 0,
        led_pit: flags & LED_PIT_BIT != 0,
        led_temp: flags & LED_TEMP_BIT != 0,
        gear_actual: payload[5],
        clutch_feedback: payload[6],
        rotary_feedback: payload[7] & 0x0F,
    })
}

pub fn decode_inbound_frame(frame: &Frame) -> Option<InboundStatus> {
    decode_inbound(frame.raw_id(), frame.payload())
}

/// Engine controller side of [`decode_inbound`]. Temperatures are rounded to
/// the nearest 0.1 °C and saturate at the ends of the 16-bit range.
pub fn encode_inbound(status: &InboundStatus) -> [u8; MAX_PAYLOAD] {
    let mut flags = 0u8;
    for (set, bit) in [
        (status.pit_limiter_active, PIT_LIMITER_BIT),
        (status.drs_status, DRS_BIT),
        (status.led_pit, LED_PIT_BIT),
        (status.led_temp, LED_TEMP_BIT),
    ] {
        if set {
            flags |= bit;
        }
    }

    let [t1_hi, t1_lo] = temperature_raw(status.temp1).to_be_bytes();
    let [t2_hi, t2_lo] = temperature_raw(status.temp2).to_be_bytes();

    [
        t1_hi,
        t1_lo,
        t2_hi,
        t2_lo,
        flags,
        status.gear_actual,
        status.clutch_feedback,
        status.rotary_feedback & 0x0F,
    ]
}

fn temperature(raw: i16) -> f32 {
    f32::from(raw) / TEMP_SCALE - TEMP_OFFSET
}

fn temperature_raw(celsius: f32) -> i16 {
    let scaled = (celsius + TEMP_OFFSET) * TEMP_SCALE;
    let rounded = if scaled < 0.0 {
        scaled - 0.5
    } else {
        scaled + 0.5
    };
    // `as` saturates out-of-range floats
    rounded as i16
}

#[cfg(test)]
mod tests {
    use super::{
        decode_inbound, decode_inbound_frame, decode_outbound, encode_inbound, encode_outbound,
        InboundStatus, OutboundStatus, INBOUND_ID, OUTBOUND_ID,
    };
    use crate::frame::{Frame, REMOTE_FLAG};

    const ECU_PAYLOAD: [u8; 8] = [0x01, 0x90, 0x01, 0x68, 0xC3, 4, 55, 0x07];

    fn close(a: f32, b: f32) -> bool {
        a - b < 1e-4 && b - a < 1e-4
    }

    #[test]
    fn outbound_layout() {
        let status = OutboundStatus {
            button_state: 0xF5,
            rotary_position: 0x1A,
            clutch_value: 97,
        };

        assert_eq!(encode_outbound(&status), [0x05, 0x0A, 97, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn outbound_recovers_masked_fields() {
        for button_state in 0..=u8::MAX {
            for rotary_position in [0, 7, 15, 16, 0xFF] {
                for clutch_value in [0, 10, 100, 200, 255] {
                    let status = OutboundStatus {
                        button_state,
                        rotary_position,
                        clutch_value,
                    };
                    let decoded = decode_outbound(&encode_outbound(&status)).unwrap();

                    assert_eq!(decoded.button_state, button_state & 0x0F);
                    assert_eq!(decoded.rotary_position, rotary_position & 0x0F);
                    assert_eq!(decoded.clutch_value, clutch_value);
                }
            }
        }

        assert_eq!(decode_outbound(&[1, 2]), None);
    }

    #[test]
    fn inbound_layout() {
        let status = decode_inbound(0x201, &ECU_PAYLOAD).unwrap();

        assert!(close(status.temp1, 0.0));
        assert!(close(status.temp2, -4.0));
        assert!(status.pit_limiter_active);
        assert!(status.drs_status);
        assert!(status.led_pit);
        assert!(status.led_temp);
        assert_eq!(status.gear_actual, 4);
        assert_eq!(status.clutch_feedback, 55);
        assert_eq!(status.rotary_feedback, 7);
    }

    #[test]
    fn inbound_flags_are_independent() {
        let mut payload = ECU_PAYLOAD;
        payload[4] = 0b0100_0010;
        payload[7] = 0xF3;

        let status = decode_inbound(0x201, &payload).unwrap();
        assert!(!status.pit_limiter_active);
        assert!(status.drs_status);
        assert!(status.led_pit);
        assert!(!status.led_temp);
        assert_eq!(status.rotary_feedback, 3);
    }

    #[test]
    fn inbound_identifier_filter() {
        assert_eq!(decode_inbound(0x301, &ECU_PAYLOAD), None);
        assert_eq!(decode_inbound(u32::from(OUTBOUND_ID.as_raw()), &ECU_PAYLOAD), None);
        assert!(decode_inbound(0x201 | REMOTE_FLAG, &ECU_PAYLOAD).is_some());
        assert_eq!(decode_inbound(0x201, &ECU_PAYLOAD[..7]), None);

        let frame = Frame::new_data(INBOUND_ID, &ECU_PAYLOAD).unwrap();
        assert_eq!(decode_inbound_frame(&frame), decode_inbound(0x201, &ECU_PAYLOAD));

        let remote = Frame::new_remote_request(INBOUND_ID, 8).unwrap();
        assert_eq!(decode_inbound_frame(&remote), None);
    }

    #[test]
    fn inbound_decode_is_pure() {
        assert_eq!(
            decode_inbound(0x201, &ECU_PAYLOAD),
            decode_inbound(0x201, &ECU_PAYLOAD)
        );
    }

    #[test]
    fn negative_and_saturated_temperatures() {
        let status = decode_inbound(0x201, &[0xFF, 0x9C, 0, 0, 0, 0, 0, 0]).unwrap();
        // -100 raw
        assert!(close(status.temp1, -50.0));
        assert!(close(status.temp2, -40.0));

        let payload = encode_inbound(&InboundStatus {
            temp1: -50.0,
            temp2: 1.0e9,
            ..Default::default()
        });
        assert_eq!(&payload[..4], &[0xFF, 0x9C, 0x7F, 0xFF]);
    }

    #[test]
    fn counterpart_encoder_matches_decoder() {
        let status = InboundStatus {
            temp1: 0.0,
            temp2: -4.0,
            pit_limiter_active: true,
            drs_status: true,
            led_pit: true,
            led_temp: true,
            gear_actual: 4,
            clutch_feedback: 55,
            rotary_feedback: 7,
        };

        assert_eq!(encode_inbound(&status), ECU_PAYLOAD);
    }
}
