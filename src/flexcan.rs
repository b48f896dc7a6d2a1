//! FlexCAN controller driver
//!
//! Uses one transmit and one receive message buffer out of the controller's
//! table; every other buffer is zeroed and left inactive. The receive buffer
//! accepts every standard identifier.
//!
//! Register access goes through [`Registers`] so the same driver runs on the
//! memory-mapped peripheral ([`Mmio`]) or on a simulated register file.
//!
//! Pin multiplexing and the clock tree are owned by board bring-up; this
//! driver only gates the peripheral clock on and off.

use core::ptr;

use embedded_can::StandardId;

use crate::{
    error::{Error, Stage},
    frame::Frame,
    mailbox::{Code, Mailbox, WORDS_PER_MAILBOX},
    timing::BitTiming,
    transport::Transport,
};

/// Message buffers enabled through MCR[MAXMB]
const ACTIVE_MAILBOXES: usize = 16;
/// Words of message buffer RAM, zeroed in full on bring-up
const RAM_WORDS: usize = 128;
/// Individual receive mask registers
const RX_MASKS: usize = 16;

const TX_MAILBOX: usize = 0;
const RX_MAILBOX: usize = 1;

const MCR_MDIS: u32 = 1 << 31;
const MCR_FRZ: u32 = 1 << 30;
const MCR_HALT: u32 = 1 << 28;
const MCR_NOTRDY: u32 = 1 << 27;
const MCR_FRZACK: u32 = 1 << 24;
const MCR_LPMACK: u32 = 1 << 20;
const MCR_MAXMB_MASK: u32 = 0x7F;

const CTRL1_CLKSRC: u32 = 1 << 13;

const PCC_CGC: u32 = 1 << 30;
const PCC_PCS_MASK: u32 = 0x7 << 24;

/// Registers the driver touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    /// Peripheral clock control (clock gate and source select)
    ClockControl,
    /// Module configuration
    Mcr,
    /// Control 1 (clock source and bit timing)
    Ctrl1,
    /// Free running timer, read to unlock a receive buffer
    Timer,
    /// Receive global mask
    RxMgMask,
    /// Receive mask of buffer 14
    Rx14Mask,
    /// Receive mask of buffer 15
    Rx15Mask,
    /// Interrupt flags 1, write one to clear
    Iflag1,
    /// Receive FIFO global mask
    RxFgMask,
    /// Message buffer RAM word
    Ram(usize),
    /// Receive individual mask
    RxImr(usize),
}

/// Raw 32-bit register access
pub trait Registers {
    fn read(&self, register: Register) -> u32;

    fn write(&mut self, register: Register, value: u32);

    fn modify(&mut self, register: Register, f: impl FnOnce(u32) -> u32) {
        let value = self.read(register);
        self.write(register, f(value));
    }
}

/// Memory-mapped FlexCAN instance
pub struct Mmio {
    base: usize,
    clock_control: usize,
}

impl Mmio {
    /// S32K118 FlexCAN0 register block
    pub const S32K118_FLEXCAN0: usize = 0x4002_4000;
    /// S32K118 PCC register for FlexCAN0
    pub const S32K118_PCC_FLEXCAN0: usize = 0x4006_5090;

    /// # Safety
    ///
    /// `base` must be the address of a FlexCAN register block and
    /// `clock_control` the address of its peripheral clock control register.
    /// Nothing else may access that peripheral while this value exists.
    pub const unsafe fn new(base: usize, clock_control: usize) -> Self {
        Self {
            base,
            clock_control,
        }
    }

    fn address(&self, register: Register) -> *mut u32 {
        let address = match register {
            Register::ClockControl => self.clock_control,
            Register::Mcr => self.base,
            Register::Ctrl1 => self.base + 0x04,
            Register::Timer => self.base + 0x08,
            Register::RxMgMask => self.base + 0x10,
            Register::Rx14Mask => self.base + 0x14,
            Register::Rx15Mask => self.base + 0x18,
            Register::Iflag1 => self.base + 0x30,
            Register::RxFgMask => self.base + 0x48,
            Register::Ram(word) => self.base + 0x80 + 4 * word,
            Register::RxImr(index) => self.base + 0x880 + 4 * index,
        };
        address as *mut u32
    }
}

impl Registers for Mmio {
    fn read(&self, register: Register) -> u32 {
        // SAFETY: the constructor contract guarantees a valid register block
        unsafe { ptr::read_volatile(self.address(register)) }
    }

    fn write(&mut self, register: Register, value: u32) {
        // SAFETY: the constructor contract guarantees a valid register block
        unsafe { ptr::write_volatile(self.address(register), value) }
    }
}

/// Controller bring-up parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerConfig {
    /// Protocol engine clock after CTRL1[CLKSRC] selects the bus clock
    pub reference_clock_hz: u32,
    pub bitrate: u32,
    /// Sample point in thousandths of a bit
    pub sample_point_permille: u16,
    /// MCR reads allowed per acknowledgement before giving up
    pub ack_poll_limit: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            reference_clock_hz: 48_000_000,
            bitrate: 500_000,
            sample_point_permille: 875,
            ack_poll_limit: 100_000,
        }
    }
}

/// An initialized controller. Dropping it leaves the controller running, use
/// [`FlexCan::shutdown`] to disable it.
pub struct FlexCan<R: Registers> {
    regs: R,
    timing: BitTiming,
    ack_poll_limit: u32,
}

impl<R: Registers> FlexCan<R> {
    /// Brings the controller from reset to bus-synchronized operation.
    ///
    /// Blocks while polling the controller's acknowledgements, each bounded by
    /// `config.ack_poll_limit` reads.
    pub fn initialize(regs: R, config: &ControllerConfig) -> Result<Self, Error> {
        let timing = BitTiming::compute(
            config.reference_clock_hz,
            config.bitrate,
            config.sample_point_permille,
        )?;

        let mut can = Self {
            regs,
            timing,
            ack_poll_limit: config.ack_poll_limit,
        };

        // Bus clock as peripheral clock source, then ungate it
        can.regs
            .modify(Register::ClockControl, |w| w & !PCC_PCS_MASK);
        can.regs.modify(Register::ClockControl, |w| w | PCC_CGC);

        // CLKSRC may only change while the module is disabled
        can.regs.modify(Register::Mcr, |w| w | MCR_MDIS);
        can.regs.modify(Register::Ctrl1, |w| w | CTRL1_CLKSRC);
        can.regs
            .modify(Register::Mcr, |w| (w & !MCR_MDIS) | MCR_FRZ | MCR_HALT);
        can.wait_for(Stage::FreezeEntry, MCR_FRZACK, true)?;
        debug!("flexcan: frozen");

        can.regs
            .write(Register::Ctrl1, CTRL1_CLKSRC | timing.ctrl1_bits());
        debug!(
            "flexcan: prescaler {} with {} quanta per bit, sample point {} permille",
            timing.prescaler,
            timing.quanta_per_bit(),
            timing.sample_point_permille()
        );

        can.regs.modify(Register::Mcr, |w| {
            (w & !MCR_MAXMB_MASK) | (ACTIVE_MAILBOXES as u32 - 1)
        });

        for word in 0..RAM_WORDS {
            can.regs.write(Register::Ram(word), 0);
        }
        for index in 0..RX_MASKS {
            can.regs.write(Register::RxImr(index), 0);
        }
        for mask in [
            Register::RxMgMask,
            Register::Rx14Mask,
            Register::Rx15Mask,
            Register::RxFgMask,
        ] {
            can.regs.write(mask, 0);
        }

        // Identifier zero under an all-don't-care mask accepts everything
        can.write_mailbox(RX_MAILBOX, Mailbox::parked(Code::RxEmpty));
        can.write_mailbox(TX_MAILBOX, Mailbox::parked(Code::TxInactive));

        can.regs
            .modify(Register::Mcr, |w| w & !(MCR_FRZ | MCR_HALT));
        can.wait_for(Stage::FreezeExit, MCR_FRZACK, false)?;
        can.wait_for(Stage::Ready, MCR_NOTRDY, false)?;

        info!(
            "flexcan: ready at {} bit/s",
            timing.bitrate(config.reference_clock_hz)
        );

        Ok(can)
    }

    pub fn bit_timing(&self) -> BitTiming {
        self.timing
    }

    /// Disables the module, gates its clock off and hands the registers back.
    /// A missing low-power acknowledge is logged, the clock is gated anyway.
    pub fn shutdown(mut self) -> R {
        self.regs.modify(Register::Mcr, |w| w | MCR_MDIS);

        if self.wait_for(Stage::LowPowerEntry, MCR_LPMACK, true).is_err() {
            warn!("flexcan: no low-power acknowledge, gating clock anyway");
        }

        self.regs.modify(Register::ClockControl, |w| w & !PCC_CGC);
        info!("flexcan: shut down");

        self.regs
    }

    fn wait_for(&self, stage: Stage, mask: u32, set: bool) -> Result<(), Error> {
        let mut polls = self.ack_poll_limit;

        loop {
            if (self.regs.read(Register::Mcr) & mask != 0) == set {
                return Ok(());
            }

            if polls == 0 {
                error!("flexcan: acknowledgement timed out");
                return Err(Error::ConfigurationTimeout(stage));
            }

            polls -= 1;
            core::hint::spin_loop();
        }
    }

    fn read_mailbox(&self, index: usize) -> Mailbox {
        let base = index * WORDS_PER_MAILBOX;
        let mut words = [0u32; WORDS_PER_MAILBOX];
        for (offset, word) in words.iter_mut().enumerate() {
            *word = self.regs.read(Register::Ram(base + offset));
        }
        Mailbox::from_words(words)
    }

    /// Writes the control word last so the buffer is only armed once the
    /// identifier and data are in place
    fn write_mailbox(&mut self, index: usize, mailbox: Mailbox) {
        let base = index * WORDS_PER_MAILBOX;
        let words = mailbox.words();
        for offset in (1..WORDS_PER_MAILBOX).chain(0..1) {
            self.regs.write(Register::Ram(base + offset), words[offset]);
        }
    }
}

impl<R: Registers> Transport for FlexCan<R> {
    fn send(&mut self, id: StandardId, payload: &[u8]) -> Result<(), Error> {
        let frame = Frame::new_data(id, payload).ok_or(Error::InvalidLength(payload.len()))?;

        if self.read_mailbox(TX_MAILBOX).code() == Some(Code::TxData) {
            debug!("flexcan: replacing a frame still waiting for the bus");
        }

        // Deactivate before rewriting so a half-written buffer never goes out
        self.regs.write(
            Register::Ram(TX_MAILBOX * WORDS_PER_MAILBOX),
            Mailbox::parked(Code::TxInactive).control,
        );
        self.write_mailbox(TX_MAILBOX, Mailbox::transmit(&frame));

        trace!("flexcan: armed {} with {} bytes", id.as_raw(), payload.len());
        Ok(())
    }

    fn receive(&mut self) -> Option<Frame> {
        let flag = 1 << RX_MAILBOX;
        if self.regs.read(Register::Iflag1) & flag == 0 {
            return None;
        }

        let mailbox = self.read_mailbox(RX_MAILBOX);

        self.regs.write(Register::Iflag1, flag);
        // Reading the timer releases the buffer lock taken by the control word read
        let _ = self.regs.read(Register::Timer);
        self.regs.write(
            Register::Ram(RX_MAILBOX * WORDS_PER_MAILBOX),
            Mailbox::parked(Code::RxEmpty).control,
        );

        if mailbox.is_extended() {
            trace!("flexcan: dropped extended frame");
            return None;
        }

        Some(mailbox.frame())
    }
}
