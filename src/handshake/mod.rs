//! Accessory handshake
//!
//! A timer-driven state machine that brings the accessory channel up and
//! notices when it goes away. The machine owns no timer: every call to
//! [`Handshake::tick`] performs exactly one transition and returns the wire
//! message to send, the delay until the next tick, and an optional link
//! event. The owner rearms its timer first and acts on the event second.
//!
//! ```text
//!            heard                          heard
//! Toggling ───────► Resetting1 ─► Resetting2 ─► MiniToggling ───────► Setting1 ─► Setting2 ─► Setting3
//!    ▲ │ active && !heard          ▲                 │ !heard                                     │
//!    │ └─► Disconnect              └─── retry <= 3 ──┤                                            │
//!    ├────────────────────────────────── retry > 3 ──┘                                            │
//!    └──────────────────────────────────────────────────────────────────── Connect ◄──────────────┘
//! ```

use crate::transport::{ControlRequest, REQUEST_TYPE_VENDOR_INTERFACE};
use std::time::Duration;
use tracing::debug;

/// Delay before the first tick after attach, and the steady polling period.
pub const INITIAL_DELAY: Duration = Duration::from_millis(1000);

const RESET_START_DELAY: Duration = Duration::from_millis(40);
const SECOND_RESET_DELAY: Duration = Duration::from_millis(35);
const SETTLE_DELAY: Duration = Duration::from_millis(150);
const SETUP_START_DELAY: Duration = Duration::from_millis(40);
const SETUP_STEP_DELAY: Duration = Duration::from_millis(10);
const CONNECTED_DELAY: Duration = Duration::from_millis(940);

/// Failed mini-toggle attempts tolerated before the sequence is abandoned.
pub const MAX_RESET_ATTEMPTS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    Toggling,
    Resetting1,
    Resetting2,
    MiniToggling,
    Setting1,
    Setting2,
    Setting3,
}

/// Wire messages of the handshake. All of them are bare vendor control
/// requests on the accessory interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessoryCommand {
    ToggleEven,
    ToggleOdd,
    Reset,
    SetupFirst,
    SetupSecond,
    SetupThird,
}

impl AccessoryCommand {
    pub fn value(&self) -> u16 {
        match self {
            AccessoryCommand::ToggleEven => 0x1E,
            AccessoryCommand::ToggleOdd => 0x1F,
            AccessoryCommand::Reset => 0x1B,
            AccessoryCommand::SetupFirst => 0x18,
            AccessoryCommand::SetupSecond => 0x10,
            AccessoryCommand::SetupThird => 0x03,
        }
    }

    pub fn to_control_request(self) -> ControlRequest {
        ControlRequest {
            request_type: REQUEST_TYPE_VENDOR_INTERFACE,
            request: 0x00,
            value: self.value(),
            index: 0x0002,
            data: Vec::new(),
        }
    }
}

/// Accessory link changes raised by a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Connect,
    Disconnect,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub command: AccessoryCommand,
    pub next_delay: Duration,
    pub event: Option<LinkEvent>,
}

#[derive(Debug, Clone)]
pub struct Handshake {
    state: HandshakeState,
    heard: bool,
    toggle_odd: bool,
    reset_attempts: u8,
    active: bool,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::Toggling,
            heard: false,
            toggle_odd: false,
            reset_attempts: 0,
            active: false,
        }
    }

    /// Back to the attach-time state. The accessory is considered absent.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn heard(&self) -> bool {
        self.heard
    }

    pub fn reset_attempts(&self) -> u8 {
        self.reset_attempts
    }

    /// Records accessory traffic since the last tick.
    pub fn mark_heard(&mut self) {
        self.heard = true;
    }

    fn toggle(&mut self) -> AccessoryCommand {
        let command = if self.toggle_odd {
            AccessoryCommand::ToggleOdd
        } else {
            AccessoryCommand::ToggleEven
        };
        self.toggle_odd = !self.toggle_odd;
        command
    }

    /// Runs one transition. The heard flag is consulted, then cleared.
    pub fn tick(&mut self) -> Tick {
        let heard = self.heard;
        let mut next_delay = INITIAL_DELAY;
        let mut event = None;

        let command = match self.state {
            HandshakeState::Toggling => {
                let command = self.toggle();
                if self.active {
                    if !heard {
                        self.active = false;
                        event = Some(LinkEvent::Disconnect);
                    }
                } else if heard {
                    self.state = HandshakeState::Resetting1;
                    self.reset_attempts = 0;
                    next_delay = RESET_START_DELAY;
                }
                command
            }
            HandshakeState::MiniToggling => {
                let command = self.toggle();
                if heard {
                    self.state = HandshakeState::Setting1;
                    next_delay = SETUP_START_DELAY;
                } else {
                    self.reset_attempts += 1;
                    if self.reset_attempts > MAX_RESET_ATTEMPTS {
                        debug!("Accessory did not answer, abandoning setup");
                        self.state = HandshakeState::Toggling;
                    } else {
                        self.state = HandshakeState::Resetting1;
                        next_delay = RESET_START_DELAY;
                    }
                }
                command
            }
            HandshakeState::Resetting1 => {
                self.state = HandshakeState::Resetting2;
                next_delay = SECOND_RESET_DELAY;
                AccessoryCommand::Reset
            }
            HandshakeState::Resetting2 => {
                self.state = HandshakeState::MiniToggling;
                next_delay = SETTLE_DELAY;
                AccessoryCommand::Reset
            }
            HandshakeState::Setting1 => {
                self.state = HandshakeState::Setting2;
                next_delay = SETUP_STEP_DELAY;
                AccessoryCommand::SetupFirst
            }
            HandshakeState::Setting2 => {
                self.state = HandshakeState::Setting3;
                next_delay = SETUP_STEP_DELAY;
                AccessoryCommand::SetupSecond
            }
            HandshakeState::Setting3 => {
                self.state = HandshakeState::Toggling;
                next_delay = CONNECTED_DELAY;
                self.active = true;
                event = Some(LinkEvent::Connect);
                AccessoryCommand::SetupThird
            }
        };

        self.heard = false;

        Tick {
            command,
            next_delay,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(handshake: &mut Handshake, ticks: usize, heard: bool) -> Vec<Tick> {
        (0..ticks)
            .map(|_| {
                if heard {
                    handshake.mark_heard();
                }
                handshake.tick()
            })
            .collect()
    }

    #[test]
    fn converges_in_285_ms_when_accessory_always_answers() {
        let mut handshake = Handshake::new();

        let first = run(&mut handshake, 1, true);
        assert_eq!(first[0].command, AccessoryCommand::ToggleEven);
        assert_eq!(handshake.state(), HandshakeState::Resetting1);

        let mut elapsed = first[0].next_delay;
        let ticks = run(&mut handshake, 6, true);
        for tick in &ticks[..5] {
            assert_eq!(tick.event, None);
            elapsed += tick.next_delay;
        }

        assert_eq!(elapsed, Duration::from_millis(285));
        assert_eq!(ticks[5].event, Some(LinkEvent::Connect));
        assert_eq!(ticks[5].next_delay, Duration::from_millis(940));
        assert!(handshake.is_active());
        assert_eq!(handshake.state(), HandshakeState::Toggling);
    }

    #[test]
    fn emits_the_expected_wire_sequence() {
        let mut handshake = Handshake::new();
        let commands: Vec<u16> = run(&mut handshake, 8, true)
            .iter()
            .map(|tick| tick.command.value())
            .collect();
        assert_eq!(
            commands,
            vec![0x1E, 0x1B, 0x1B, 0x1F, 0x18, 0x10, 0x03, 0x1E]
        );
    }

    #[test]
    fn silent_accessory_disconnects_after_one_tick() {
        let mut handshake = Handshake::new();
        run(&mut handshake, 7, true);
        assert!(handshake.is_active());

        let tick = handshake.tick();
        assert_eq!(tick.event, Some(LinkEvent::Disconnect));
        assert_eq!(tick.next_delay, INITIAL_DELAY);
        assert_eq!(handshake.state(), HandshakeState::Toggling);
        assert!(!handshake.is_active());

        // Nothing more happens while the accessory stays silent
        let quiet = run(&mut handshake, 5, false);
        assert!(quiet.iter().all(|tick| tick.event.is_none()));
    }

    #[test]
    fn active_link_survives_while_traffic_is_heard() {
        let mut handshake = Handshake::new();
        run(&mut handshake, 7, true);
        let ticks = run(&mut handshake, 10, true);
        assert!(ticks.iter().all(|tick| tick.event.is_none()));
        assert!(ticks.iter().all(|tick| tick.next_delay == INITIAL_DELAY));
        assert!(handshake.is_active());
    }

    #[test]
    fn retry_budget_returns_to_toggling() {
        let mut handshake = Handshake::new();
        handshake.mark_heard();
        handshake.tick();

        for attempt in 1..=4u8 {
            assert_eq!(handshake.tick().command, AccessoryCommand::Reset);
            assert_eq!(handshake.tick().command, AccessoryCommand::Reset);
            assert_eq!(handshake.state(), HandshakeState::MiniToggling);

            let tick = handshake.tick();
            assert_eq!(tick.event, None);
            assert_eq!(handshake.reset_attempts(), attempt);
            if attempt <= MAX_RESET_ATTEMPTS {
                assert_eq!(handshake.state(), HandshakeState::Resetting1);
                assert_eq!(tick.next_delay, Duration::from_millis(40));
            } else {
                assert_eq!(handshake.state(), HandshakeState::Toggling);
                assert_eq!(tick.next_delay, INITIAL_DELAY);
            }
        }
        assert!(!handshake.is_active());
    }

    #[test]
    fn heard_flag_only_covers_one_tick() {
        let mut handshake = Handshake::new();
        handshake.mark_heard();
        handshake.tick();
        assert!(!handshake.heard());

        // Resetting ticks ignore the flag, mini toggle sees it cleared
        handshake.tick();
        handshake.tick();
        handshake.tick();
        assert_eq!(handshake.state(), HandshakeState::Resetting1);
    }

    #[test]
    fn toggle_parity_alternates_across_states() {
        let mut handshake = Handshake::new();
        let first = handshake.tick().command;
        let second = handshake.tick().command;
        assert_eq!(first, AccessoryCommand::ToggleEven);
        assert_eq!(second, AccessoryCommand::ToggleOdd);
    }

    #[test]
    fn control_request_layout() {
        let request = AccessoryCommand::Reset.to_control_request();
        assert_eq!(request.request_type, 0x41);
        assert_eq!(request.request, 0x00);
        assert_eq!(request.value, 0x1B);
        assert_eq!(request.index, 0x0002);
        assert!(request.data.is_empty());
    }

    #[test]
    fn reset_clears_link_state() {
        let mut handshake = Handshake::new();
        run(&mut handshake, 7, true);
        handshake.mark_heard();
        handshake.reset();
        assert_eq!(handshake.state(), HandshakeState::Toggling);
        assert!(!handshake.is_active());
        assert!(!handshake.heard());
        assert_eq!(handshake.tick().command, AccessoryCommand::ToggleEven);
    }
}
