//! Transmission policy and reception pump
//!
//! [`Scheduler::tick`] is called once per frame period from the application
//! loop. It sends the wheel status when an input changed or the keep-alive
//! period ran out, drains at most one received frame and keeps track of
//! whether the engine controller is still talking.
//!
//! Times are milliseconds from a free-running wrapping counter.

use crate::{
    codec::{self, InboundStatus, OutboundStatus, OUTBOUND_ID},
    transport::Transport,
};

/// Scheduler tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SchedulerConfig {
    /// Longest gap between two transmissions
    pub keep_alive_ms: u32,
    /// Clutch movement, in percentage points, that triggers a transmission
    pub clutch_threshold: u8,
    /// Silence after which the engine controller is considered gone
    pub liveness_timeout_ms: u32,
    /// How long the TX/RX activity indicators stay on after a frame
    pub activity_pulse_ms: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            keep_alive_ms: 200,
            clutch_threshold: 10,
            liveness_timeout_ms: 1000,
            activity_pulse_ms: 50,
        }
    }
}

/// Why a tick transmitted. When several apply the first in declaration order
/// is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trigger {
    /// A button changed state since the previous tick
    Buttons,
    /// The rotary switch left the last transmitted position
    Rotary,
    /// The clutch moved past the threshold from the last transmitted value
    Clutch,
    /// Nothing changed for a whole keep-alive period
    KeepAlive,
}

/// What happened to the receive slot during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reception {
    /// No frame was waiting
    Idle,
    /// An engine controller status was decoded
    Matched,
    /// A frame was drained but not recognized. Carries its raw identifier.
    Ignored(u32),
}

/// Frame counters since the scheduler was created. All wrap on overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStats {
    /// Status frames handed to the transport
    pub transmitted: u32,
    /// Received frames decoded as an engine controller status
    pub matched: u32,
    /// Received frames drained but not recognized
    pub ignored: u32,
}

/// Result of one [`Scheduler::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Tick {
    pub sent: Option<Trigger>,
    pub reception: Reception,
    /// An engine controller status arrived within the liveness timeout
    pub live: bool,
    /// A frame was transmitted within the activity pulse
    pub tx_activity: bool,
    /// A status was matched within the activity pulse
    pub rx_activity: bool,
}

/// Scheduling state for one link. Independent instances do not share anything.
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: SchedulerConfig,
    previous_buttons: Option<u8>,
    sent_rotary: Option<u8>,
    sent_clutch: Option<u8>,
    last_transmit: Option<u32>,
    last_reception: Option<u32>,
    inbound: Option<InboundStatus>,
    live: bool,
    stats: LinkStats,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            previous_buttons: None,
            sent_rotary: None,
            sent_clutch: None,
            last_transmit: None,
            last_reception: None,
            inbound: None,
            live: false,
            stats: LinkStats::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Latest engine controller status, `None` until the first one arrives.
    /// Kept after the link goes silent, check [`Tick::live`] before trusting it.
    pub fn inbound(&self) -> Option<&InboundStatus> {
        self.inbound.as_ref()
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Runs one period: at most one transmission, then at most one reception.
    pub fn tick<T: Transport>(
        &mut self,
        transport: &mut T,
        now_ms: u32,
        status: &OutboundStatus,
    ) -> Tick {
        let sent = self.transmit(transport, now_ms, status);
        let reception = self.pump(transport, now_ms);

        let live = self
            .last_reception
            .is_some_and(|at| now_ms.wrapping_sub(at) < self.config.liveness_timeout_ms);
        if live != self.live {
            if live {
                info!("link: engine controller online");
            } else {
                warn!("link: engine controller silent");
            }
            self.live = live;
        }

        Tick {
            sent,
            reception,
            live,
            tx_activity: self.within_pulse(self.last_transmit, now_ms),
            rx_activity: self.within_pulse(self.last_reception, now_ms),
        }
    }

    fn transmit<T: Transport>(
        &mut self,
        transport: &mut T,
        now_ms: u32,
        status: &OutboundStatus,
    ) -> Option<Trigger> {
        let trigger = self.trigger(now_ms, status);
        self.previous_buttons = Some(status.button_state);

        let trigger = trigger?;
        if let Err(e) = transport.send(OUTBOUND_ID, &codec::encode_outbound(status)) {
            warn!("link: status frame rejected: {}", e);
            return None;
        }

        if trigger == Trigger::KeepAlive {
            trace!("link: keep-alive");
        }

        self.sent_rotary = Some(status.rotary_position);
        self.sent_clutch = Some(status.clutch_value);
        self.last_transmit = Some(now_ms);
        self.stats.transmitted = self.stats.transmitted.wrapping_add(1);

        Some(trigger)
    }

    fn trigger(&self, now_ms: u32, status: &OutboundStatus) -> Option<Trigger> {
        let buttons_changed = self
            .previous_buttons
            .is_some_and(|previous| previous != status.button_state);
        let rotary_changed = self.sent_rotary != Some(status.rotary_position);
        let clutch_moved = self
            .sent_clutch
            .map_or(true, |sent| sent.abs_diff(status.clutch_value) > self.config.clutch_threshold);
        let keep_alive_due = self
            .last_transmit
            .map_or(true, |at| now_ms.wrapping_sub(at) >= self.config.keep_alive_ms);

        if buttons_changed {
            Some(Trigger::Buttons)
        } else if rotary_changed {
            Some(Trigger::Rotary)
        } else if clutch_moved {
            Some(Trigger::Clutch)
        } else if keep_alive_due {
            Some(Trigger::KeepAlive)
        } else {
            None
        }
    }

    fn pump<T: Transport>(&mut self, transport: &mut T, now_ms: u32) -> Reception {
        let Some(frame) = transport.receive() else {
            return Reception::Idle;
        };

        match codec::decode_inbound_frame(&frame) {
            Some(inbound) => {
                self.inbound = Some(inbound);
                self.last_reception = Some(now_ms);
                self.stats.matched = self.stats.matched.wrapping_add(1);
                Reception::Matched
            }
            None => {
                trace!("link: ignored frame {}", frame.raw_id());
                self.stats.ignored = self.stats.ignored.wrapping_add(1);
                Reception::Ignored(frame.raw_id())
            }
        }
    }

    fn within_pulse(&self, at: Option<u32>, now_ms: u32) -> bool {
        at.is_some_and(|at| now_ms.wrapping_sub(at) <= self.config.activity_pulse_ms)
    }
}
