//! Per-target debounce state machine.
//!
//! ```text
//!            event                      tick >= deadline
//!   Idle ──────────────► Pending ─────────────────────────► Idle  (emit once)
//!                        │    ▲
//!                        └────┘ event (absorbed, deadline unchanged)
//! ```
//!
//! The window opens at the first event and is not extended by later ones.
//! Both inputs are handled by the same actor loop, so an event landing at
//! the deadline is either absorbed into the window that fires or opens the
//! next one; it is never dropped.

use std::time::Duration;

use tokio::time::Instant;

use crate::core::{Target, Targets};

pub(super) const DEBOUNCE_MS: u64 = 500;

/// Sleep used when nothing is pending.
const IDLE_SLEEP: Duration = Duration::from_secs(86400);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Slot {
    Idle,
    Pending { deadline: Instant },
}

impl Slot {
    fn on_event(self, now: Instant, window: Duration) -> Self {
        match self {
            Self::Idle => Self::Pending {
                deadline: now + window,
            },
            pending @ Self::Pending { .. } => pending,
        }
    }

    /// New state, and whether a rebuild fires.
    fn on_tick(self, now: Instant) -> (Self, bool) {
        match self {
            Self::Pending { deadline } if now >= deadline => (Self::Idle, true),
            other => (other, false),
        }
    }

    fn deadline(self) -> Option<Instant> {
        match self {
            Self::Idle => None,
            Self::Pending { deadline } => Some(deadline),
        }
    }
}

/// Independent debounce slots for UI and Game.
pub(super) struct Debouncer {
    window: Duration,
    ui: Slot,
    game: Slot,
}

impl Debouncer {
    pub(super) fn new() -> Self {
        Self::with_window(Duration::from_millis(DEBOUNCE_MS))
    }

    pub(super) fn with_window(window: Duration) -> Self {
        Self {
            window,
            ui: Slot::Idle,
            game: Slot::Idle,
        }
    }

    pub(super) fn slot(&self, target: Target) -> Slot {
        match target {
            Target::Ui => self.ui,
            Target::Game => self.game,
        }
    }

    fn slot_mut(&mut self, target: Target) -> &mut Slot {
        match target {
            Target::Ui => &mut self.ui,
            Target::Game => &mut self.game,
        }
    }

    /// Feed a classified change.
    pub(super) fn on_change(&mut self, targets: Targets, now: Instant) {
        let window = self.window;
        for target in targets.targets() {
            let slot = self.slot_mut(target);
            *slot = slot.on_event(now, window);
        }
    }

    /// Targets whose window has closed; they return to idle.
    pub(super) fn take_due(&mut self, now: Instant) -> Targets {
        let mut due = Targets::empty();
        for target in Target::ALL {
            let slot = self.slot_mut(target);
            let (next, fire) = slot.on_tick(now);
            *slot = next;
            if fire {
                due |= target.into();
            }
        }
        due
    }

    /// Time until the earliest pending deadline.
    pub(super) fn sleep_duration(&self, now: Instant) -> Duration {
        Target::ALL
            .into_iter()
            .filter_map(|t| self.slot(t).deadline())
            .min()
            .map_or(IDLE_SLEEP, |deadline| {
                deadline
                    .saturating_duration_since(now)
                    .max(Duration::from_millis(1))
            })
    }
}
