//! Connection lifecycle of the initiating side, free of I/O.
//!
//! The driver feeds transport outcomes and timer expiries in and acts on the
//! returned [`Transition`]s. Time is passed in so behaviour is deterministic.

use std::time::Duration;
use tokio::time::Instant;

use super::config::ClientConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Connecting,
    Open,
    /// Waiting out the backoff before `attempt`
    Reconnecting { attempt: u32 },
    ClosedManual,
    /// Attempt limit reached; only an explicit connect resumes
    Failed,
}

/// What the driver must do after a transport went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Arm a single timer; when it fires call [`Lifecycle::timer_fired`]
    Retry { attempt: u32, delay: Duration },
    /// Report reconnect failure; no further automatic attempts
    Failed { attempts: u32 },
    Nothing,
}

pub struct Lifecycle {
    config: ClientConfig,
    state: ClientState,
    attempts: u32,
    last_open: Instant,
    /// Set once an attempt streak starts, cleared on open
    recovering: bool,
}

impl Lifecycle {
    pub fn new(config: ClientConfig, now: Instant) -> Self {
        let state = if config.auto_connect {
            ClientState::Connecting
        } else {
            ClientState::Idle
        };
        Self {
            config,
            state,
            attempts: 0,
            last_open: now,
            recovering: false,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Explicit connect call. Returns true if a connection attempt should start now.
    ///
    /// Clears a manual close and any failure. A pending backoff is superseded.
    pub fn connect_requested(&mut self) -> bool {
        match self.state {
            ClientState::Open | ClientState::Connecting => false,
            _ => {
                self.state = ClientState::Connecting;
                true
            }
        }
    }

    /// Transport established. Returns true if this open ends a reconnection streak.
    pub fn on_open(&mut self, now: Instant) -> bool {
        let reconnected = self.recovering;
        self.state = ClientState::Open;
        self.attempts = 0;
        self.last_open = now;
        self.recovering = false;
        reconnected
    }

    /// The open transport went away without a manual close
    pub fn on_close(&mut self, now: Instant) -> Transition {
        match self.state {
            ClientState::ClosedManual | ClientState::Reconnecting { .. } => Transition::Nothing,
            _ => self.schedule_reconnect(now),
        }
    }

    /// Establishing the transport failed; handled like an unexpected close
    pub fn on_connect_failed(&mut self, now: Instant) -> Transition {
        self.on_close(now)
    }

    pub fn on_manual_close(&mut self) {
        self.state = ClientState::ClosedManual;
    }

    /// The backoff timer expired. Returns true if a connection attempt should start.
    pub fn timer_fired(&mut self) -> bool {
        match self.state {
            ClientState::Reconnecting { .. } => {
                self.state = ClientState::Connecting;
                true
            }
            _ => false,
        }
    }

    /// Connectivity came back. Returns true if an attempt should start immediately.
    ///
    /// Only applies when nothing is open or in progress and the client was
    /// not closed on purpose. The attempt counter is left alone.
    pub fn on_network_regained(&mut self) -> bool {
        match self.state {
            ClientState::Idle | ClientState::Failed => {
                self.state = ClientState::Connecting;
                true
            }
            _ => false,
        }
    }

    fn schedule_reconnect(&mut self, now: Instant) -> Transition {
        self.recovering = true;

        if let Some(cooldown) = self.config.cooldown {
            if now.duration_since(self.last_open) > cooldown {
                self.attempts = 0;
            }
        }

        if let Some(max) = self.config.max_attempts {
            if self.attempts >= max {
                self.state = ClientState::Failed;
                return Transition::Failed {
                    attempts: self.attempts,
                };
            }
        }

        self.attempts += 1;
        self.state = ClientState::Reconnecting {
            attempt: self.attempts,
        };
        Transition::Retry {
            attempt: self.attempts,
            delay: self.config.backoff(self.attempts),
        }
    }
}
