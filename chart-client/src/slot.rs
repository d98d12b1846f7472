//! "Abort previous, start new" state machine for one fetch dependency.
//!
//! ```text
//!            begin(k)                 commit / fail
//!   Idle ───────────────▶ InFlight(k) ─────────────▶ Settled(k) / Idle
//!     ▲                    │  begin(k') cancels k
//!     └──── reset ─────────┘
//!   any ── teardown ──▶ TornDown   (terminal, cancels in-flight work)
//! ```
//!
//! Every transition that abandons a fetch bumps the generation, so a ticket
//! from an older fetch can never commit.

use std::sync::{Mutex, MutexGuard};

use crate::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotPhase<K> {
    Idle,
    InFlight(K),
    Settled(K),
    TornDown,
}

/// Handle of one started fetch.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    generation: u64,
    cancel: CancellationToken,
}

impl FetchTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Token to pass to the gateway call made for this fetch.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[derive(Debug)]
struct SlotState<K> {
    generation: u64,
    phase: SlotPhase<K>,
    cancel: Option<CancellationToken>,
}

#[derive(Debug)]
pub struct FetchSlot<K> {
    state: Mutex<SlotState<K>>,
}

impl<K> Default for FetchSlot<K> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState {
                generation: 0,
                phase: SlotPhase::Idle,
                cancel: None,
            }),
        }
    }
}

impl<K: Clone + PartialEq> FetchSlot<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<K>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a fetch for `key`.
    ///
    /// Returns `None` when the slot is torn down or `key` is already in
    /// flight or settled. Otherwise any fetch in flight for another key is
    /// cancelled first.
    pub fn begin(&self, key: K) -> Option<FetchTicket> {
        let mut state = self.lock();
        match &state.phase {
            SlotPhase::TornDown => return None,
            SlotPhase::InFlight(current) | SlotPhase::Settled(current) if *current == key => {
                return None
            }
            _ => {}
        }

        if let Some(previous) = state.cancel.take() {
            previous.cancel();
        }

        state.generation += 1;
        let cancel = CancellationToken::new();
        state.phase = SlotPhase::InFlight(key);
        state.cancel = Some(cancel.clone());

        Some(FetchTicket {
            generation: state.generation,
            cancel,
        })
    }

    fn is_current(state: &SlotState<K>, ticket: &FetchTicket) -> bool {
        state.generation == ticket.generation
            && matches!(state.phase, SlotPhase::InFlight(_))
            && !ticket.cancel.is_cancelled()
    }

    /// Settle a successful fetch. `false` means the result is stale and must
    /// be dropped.
    pub fn commit(&self, ticket: &FetchTicket) -> bool {
        let mut state = self.lock();
        if !Self::is_current(&state, ticket) {
            return false;
        }
        if let SlotPhase::InFlight(key) = std::mem::replace(&mut state.phase, SlotPhase::Idle) {
            state.phase = SlotPhase::Settled(key);
        }
        state.cancel = None;
        true
    }

    /// Settle a failed fetch. The slot returns to idle so the same key can be
    /// fetched again. `false` means the failure is stale.
    pub fn fail(&self, ticket: &FetchTicket) -> bool {
        let mut state = self.lock();
        if !Self::is_current(&state, ticket) {
            return false;
        }
        state.phase = SlotPhase::Idle;
        state.cancel = None;
        true
    }

    /// Cancel whatever is in flight and forget the settled key.
    pub fn reset(&self) {
        let mut state = self.lock();
        if state.phase == SlotPhase::TornDown {
            return;
        }
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        state.generation += 1;
        state.phase = SlotPhase::Idle;
    }

    /// Cancel pending work for good. Later `begin` calls return `None`.
    pub fn teardown(&self) {
        let mut state = self.lock();
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        state.generation += 1;
        state.phase = SlotPhase::TornDown;
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn phase(&self) -> SlotPhase<K> {
        self.lock().phase.clone()
    }
}
