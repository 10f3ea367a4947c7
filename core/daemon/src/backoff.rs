//! Adaptive poll-interval policy.
//!
//! The loop polls fast while tabs are changing and slow once the session
//! goes quiet. The transition is a two-state timer: after `idle_threshold`
//! consecutive no-change cycles the interval jumps to the idle value, and
//! the first cycle that applies any change snaps it back to the active
//! value. Kept as a pure function so the schedule is testable without
//! running the loop.

use std::time::Duration;

use tint_core::config::BehaviorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub active: Duration,
    pub idle: Duration,
    pub idle_threshold: u32,
}

impl PollPolicy {
    pub fn from_config(behavior: &BehaviorConfig) -> Self {
        // A zero interval would spin; clamp to one second.
        let active = Duration::from_secs(behavior.active_poll_interval_secs.max(1));
        let idle = Duration::from_secs(behavior.idle_poll_interval_secs.max(1)).max(active);
        Self {
            active,
            idle,
            idle_threshold: behavior.idle_threshold.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollState {
    pub interval: Duration,
    pub idle_cycles: u32,
}

impl PollState {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            interval: policy.active,
            idle_cycles: 0,
        }
    }
}

/// Computes the schedule after one cycle. `changed` means at least one tab
/// write was actually applied this cycle.
pub fn next_interval(changed: bool, state: PollState, policy: PollPolicy) -> PollState {
    if changed {
        return PollState {
            interval: policy.active,
            idle_cycles: 0,
        };
    }
    let idle_cycles = state.idle_cycles.saturating_add(1);
    let interval = if idle_cycles >= policy.idle_threshold {
        policy.idle
    } else {
        policy.active
    };
    PollState {
        interval,
        idle_cycles,
    }
}
