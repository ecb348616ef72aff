//! Trailing-edge debounce as an explicit state machine.
//!
//! The machine has two states, `Idle` and `Pending(args, deadline)`.
//! Every [`call`](Debouncer::call) replaces the pending arguments and
//! pushes the deadline out to `now + delay`; [`poll`](Debouncer::poll)
//! releases the arguments once the deadline has passed. The host drives
//! it with whatever timer primitive it has.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub enum DebounceState<A> {
    Idle,
    Pending { args: A, deadline: Instant },
}

#[derive(Debug, Clone)]
pub struct Debouncer<A> {
    delay: Duration,
    state: DebounceState<A>,
}

impl<A> Debouncer<A> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: DebounceState::Idle,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn state(&self) -> &DebounceState<A> {
        &self.state
    }

    /// Record an invocation at `now`. Earlier pending arguments are dropped.
    pub fn call(&mut self, args: A, now: Instant) {
        self.state = DebounceState::Pending {
            args,
            deadline: now + self.delay,
        };
    }

    /// When the pending invocation becomes due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            DebounceState::Pending { deadline, .. } => Some(*deadline),
            DebounceState::Idle => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, DebounceState::Pending { .. })
    }

    /// Take the pending arguments if their deadline is at or before `now`.
    pub fn poll(&mut self, now: Instant) -> Option<A> {
        match self.deadline() {
            Some(deadline) if deadline <= now => {
                match std::mem::replace(&mut self.state, DebounceState::Idle) {
                    DebounceState::Pending { args, .. } => Some(args),
                    DebounceState::Idle => None,
                }
            }
            _ => None,
        }
    }

    /// Drop any pending invocation.
    pub fn cancel(&mut self) -> Option<A> {
        match std::mem::replace(&mut self.state, DebounceState::Idle) {
            DebounceState::Pending { args, .. } => Some(args),
            DebounceState::Idle => None,
        }
    }
}
