use std::io;

use tokio::time::Instant;

/// One direction of a connection as the reactor sees it.
///
/// Interest is level-triggered: an event that is `active` and already `ready`
/// keeps firing until interest is dropped.
#[derive(Debug, Default)]
pub struct Event {
    /// Interest is registered with the reactor.
    pub active: bool,
    pub ready: bool,
    /// The timer on this event fired and nobody has consumed that yet.
    pub timedout: bool,
    pub eof: bool,
    pub error: bool,
    timer: Option<Instant>,
}

/// How an idle-level registration changes the interest set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestChange {
    Add,
    Remove,
    Keep,
}

impl Event {
    /// Change needed to keep this event registered at the idle level.
    pub fn idle_interest(&self) -> InterestChange {
        if !self.active && !self.ready {
            InterestChange::Add
        } else if self.active && self.ready {
            InterestChange::Remove
        } else {
            InterestChange::Keep
        }
    }

    /// Arms the one-shot timer, replacing any timer already set.
    pub fn set_timer(&mut self, deadline: Instant) {
        self.timer = Some(deadline);
    }

    pub fn del_timer(&mut self) {
        self.timer = None;
    }

    pub fn timer_set(&self) -> bool {
        self.timer.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.timer
    }

    /// Marks the timer as fired.
    pub fn expire(&mut self) {
        self.timer = None;
        self.timedout = true;
    }
}

/// Notification delivered by the reactor for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorEvent {
    /// The write-side timer fired.
    TimerExpired,
    Writable,
    /// The peer sent data.
    Readable,
    /// The peer half-closed the connection.
    PeerClosed,
    Error(io::ErrorKind),
}
