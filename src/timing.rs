//! Bit timing for the FlexCAN classic bit-rate register (CTRL1)
//!
//! A bit is split into time quanta (TQ) of `prescaler / reference_clock`
//! seconds each: one synchronization quantum, then the propagation segment and
//! phase segment 1, after which the bus is sampled, then phase segment 2.

use crate::error::Error;

const PRESCALER_MAX: u32 = 256;
const PROP_SEG_MAX: u8 = 8;
const PHASE_SEG1_MAX: u8 = 8;
const PHASE_SEG2_MIN: u8 = 2;
const PHASE_SEG2_MAX: u8 = 8;
const QUANTA_MIN: u32 = 8;
const QUANTA_MAX: u32 = 1 + PROP_SEG_MAX as u32 + PHASE_SEG1_MAX as u32 + PHASE_SEG2_MAX as u32;

/// Segment lengths in time quanta. All values are actual lengths, the
/// register encoding (value - 1) is applied by [`BitTiming::ctrl1_bits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitTiming {
    /// Reference clock divider. Valid range: 1 to 256.
    pub prescaler: u16,
    /// Propagation segment. Valid range: 1 to 8.
    pub prop_seg: u8,
    /// Phase segment 1. Valid range: 1 to 8.
    pub phase_seg1: u8,
    /// Phase segment 2. Valid range: 2 to 8.
    pub phase_seg2: u8,
    /// Resynchronization jump width. Valid range: 1 to 4.
    pub sync_jump_width: u8,
}

impl BitTiming {
    /// Searches every prescaler that divides the reference clock into a whole
    /// number of quanta per bit and keeps the split closest to the requested
    /// sample point. Ties go to the smaller prescaler (finer quanta).
    pub fn compute(
        reference_clock_hz: u32,
        bitrate: u32,
        sample_point_permille: u16,
    ) -> Result<Self, Error> {
        let unreachable = Error::UnreachableBitTiming {
            clock: reference_clock_hz,
            bitrate,
        };

        if bitrate == 0 {
            return Err(unreachable);
        }

        let target = u32::from(sample_point_permille);
        let mut best: Option<(u32, Self)> = None;

        for prescaler in 1..=PRESCALER_MAX {
            let Some(tq_rate) = prescaler.checked_mul(bitrate) else {
                break;
            };

            if reference_clock_hz % tq_rate != 0 {
                continue;
            }

            let quanta = reference_clock_hz / tq_rate;
            let Some(timing) = Self::split(prescaler as u16, quanta, target) else {
                continue;
            };

            let error = timing.sample_point_permille().abs_diff(target);
            if best.map_or(true, |(best_error, _)| error < best_error) {
                best = Some((error, timing));
            }
        }

        best.map(|(_, timing)| timing).ok_or(unreachable)
    }

    fn split(prescaler: u16, quanta: u32, target_permille: u32) -> Option<Self> {
        if !(QUANTA_MIN..=QUANTA_MAX).contains(&quanta) {
            return None;
        }

        // Quanta up to and including the sample point, rounded to nearest
        let sampled = (quanta * target_permille + 500) / 1000;
        let tseg1 = sampled.checked_sub(1)?;
        let phase_seg2 = quanta.checked_sub(1 + tseg1)?;

        if !(u32::from(PHASE_SEG2_MIN)..=u32::from(PHASE_SEG2_MAX)).contains(&phase_seg2) {
            return None;
        }

        let phase_seg1 = (tseg1 + 1) / 2;
        let prop_seg = tseg1 - phase_seg1;

        if !(1..=u32::from(PHASE_SEG1_MAX)).contains(&phase_seg1)
            || !(1..=u32::from(PROP_SEG_MAX)).contains(&prop_seg)
        {
            return None;
        }

        Some(Self {
            prescaler,
            prop_seg: prop_seg as u8,
            phase_seg1: phase_seg1 as u8,
            phase_seg2: phase_seg2 as u8,
            sync_jump_width: 1,
        })
    }

    /// Quanta per bit, including the synchronization quantum
    pub fn quanta_per_bit(&self) -> u32 {
        1 + u32::from(self.prop_seg) + u32::from(self.phase_seg1) + u32::from(self.phase_seg2)
    }

    pub fn sample_point_permille(&self) -> u32 {
        let sampled = 1 + u32::from(self.prop_seg) + u32::from(self.phase_seg1);
        sampled * 1000 / self.quanta_per_bit()
    }

    pub fn bitrate(&self, reference_clock_hz: u32) -> u32 {
        reference_clock_hz / (u32::from(self.prescaler) * self.quanta_per_bit())
    }

    /// PRESDIV, RJW, PSEG1, PSEG2 and PROPSEG fields of CTRL1
    pub fn ctrl1_bits(&self) -> u32 {
        (u32::from(self.prescaler - 1) & 0xFF) << 24
            | (u32::from(self.sync_jump_width - 1) & 0x3) << 22
            | (u32::from(self.phase_seg1 - 1) & 0x7) << 19
            | (u32::from(self.phase_seg2 - 1) & 0x7) << 16
            | (u32::from(self.prop_seg - 1) & 0x7)
    }
}
