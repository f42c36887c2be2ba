//! AI participants.
//!
//! A profile describes who the AI pretends to be (brain, skill, traits,
//! timing); the brain produces exactly one decision per alarm wake-up so a
//! watching human sees a plausible cadence of rolls and scores.

pub mod brain;
pub mod controller;
pub mod profile;

pub use brain::{decide, decision_ev_gap, Brain, DecisionContext};
pub use controller::{AiStepKind, AiTurnState, step_delay};
pub use profile::{builtin_profiles, find_profile, AiProfile, AiTiming, AiTraits};
