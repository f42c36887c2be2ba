use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::game::ROUNDS_PER_GAME;
use crate::protocol::UserId;

use super::brain::DecisionContext;
use super::profile::AiProfile;

/// What kind of decision the upcoming wake-up will make; each kind has its
/// own timing range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AiStepKind {
    Roll,
    Keep,
    Score,
}

/// Minimal persisted marker for an in-flight AI turn, stored under
/// `ai_turn_data`. Everything else is re-read from the game state when the
/// alarm fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AiTurnState {
    pub player_id: UserId,
    pub step: AiStepKind,
    pub scheduled_at: DateTime<Utc>,
}

/// Sample the delay before the next AI step.
///
/// The base range depends on the step kind; the result is scaled by the
/// winning/losing and final-round modifiers and padded with hesitation when
/// the expected-value gap of the upcoming decision exceeds the profile's
/// threshold.
pub fn step_delay<R: Rng + ?Sized>(
    profile: &AiProfile,
    step: AiStepKind,
    ctx: &DecisionContext,
    ev_gap: f64,
    rng: &mut R,
) -> Duration {
    let timing = &profile.timing;
    let (lo, hi) = match step {
        AiStepKind::Roll => timing.roll_decision_ms,
        AiStepKind::Keep => timing.keep_decision_ms,
        AiStepKind::Score => timing.score_decision_ms,
    };
    let mut millis = sample_range(lo, hi, rng) as f64;

    if ctx.is_winning() {
        millis *= timing.winning_modifier;
    }
    if ctx.round_number >= ROUNDS_PER_GAME - 2 {
        millis *= timing.final_rounds_modifier;
    }
    // A consequential decision gets a visible pause
    if ev_gap > timing.hesitation_ev_gap {
        let (hlo, hhi) = timing.hesitation_extra_ms;
        millis += sample_range(hlo, hhi, rng) as f64;
    }

    Duration::from_millis(millis.max(0.0) as u64)
}

fn sample_range<R: Rng + ?Sized>(lo: u64, hi: u64, rng: &mut R) -> u64 {
    if hi <= lo {
        lo
    } else {
        rng.gen_range(lo..=hi)
    }
}
