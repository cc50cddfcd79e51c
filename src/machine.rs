//! The interaction state machine: cake state, presentation state and the
//! event queue the evaluators feed.

use log::{debug, info};
use serde::Serialize;
use std::collections::VecDeque;

use crate::stage::{CakeAsset, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum CakeState {
    Unlit,
    Lit,
    BlownOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PresentationState {
    Idle,
    Celebrating,
    ReelPlaying,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardEvent {
    Light,
    Blow,
}

#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<CardEvent>,
}

impl EventQueue {
    pub fn push(&mut self, ev: CardEvent) {
        self.events.push_back(ev);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = CardEvent> + '_ {
        self.events.drain(..)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Result of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Lit,
    BlownOut,
}

#[derive(Debug)]
pub struct InteractionMachine {
    cake: CakeState,
    presentation: PresentationState,
}

impl Default for InteractionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionMachine {
    pub fn new() -> Self {
        Self {
            cake: CakeState::Unlit,
            presentation: PresentationState::Idle,
        }
    }

    pub fn cake(&self) -> CakeState {
        self.cake
    }

    pub fn presentation(&self) -> PresentationState {
        self.presentation
    }

    /// Moves the presentation forward; never back.
    pub fn advance_presentation(&mut self, to: PresentationState) -> bool {
        if to <= self.presentation {
            debug!("machine: ignoring presentation {:?} -> {:?}", self.presentation, to);
            return false;
        }
        info!("presentation: {:?} -> {:?}", self.presentation, to);
        self.presentation = to;
        true
    }

    /// Applies every queued event in order, returning the transitions taken.
    pub fn drain(&mut self, queue: &mut EventQueue, stage: &mut dyn Stage) -> Vec<Transition> {
        let mut out = Vec::new();
        for ev in queue.drain() {
            if let Some(t) = self.apply(ev, stage) {
                out.push(t);
            }
        }
        out
    }

    pub fn apply(&mut self, ev: CardEvent, stage: &mut dyn Stage) -> Option<Transition> {
        match (self.cake, ev) {
            (CakeState::Unlit, CardEvent::Light) => {
                self.cake = CakeState::Lit;
                stage.set_cake(CakeAsset::Lit);
                stage.hide_match();
                info!("cake: lit");
                Some(Transition::Lit)
            }
            (CakeState::Lit, CardEvent::Blow) => {
                self.cake = CakeState::BlownOut;
                stage.set_cake(CakeAsset::Unlit);
                info!("cake: candles blown out");
                Some(Transition::BlownOut)
            }
            (state, ev) => {
                debug!("machine: {ev:?} ignored while {state:?}");
                None
            }
        }
    }
}
