use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::game::{analyze_turn, score, Category, Dice, KeepMask, Scorecard, TurnDecision};

use super::profile::AiProfile;

/// Decision styles. A small sum type instead of subclassing: every brain
/// answers the same question through [`decide`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Brain {
    Optimal,
    Probabilistic,
    Personality,
    Random,
}

/// Everything a brain may look at when deciding. Built fresh from storage
/// on every alarm wake-up.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub dice: Dice,
    pub kept_mask: KeepMask,
    pub rolls_remaining: u8,
    pub scorecard: Scorecard,
    pub available: Vec<Category>,
    /// The AI's own running total.
    pub own_total: u32,
    /// Best total among opponents; drives the winning/losing modifier.
    pub best_opponent_total: u32,
    pub round_number: u32,
}

impl DecisionContext {
    pub fn is_winning(&self) -> bool {
        self.own_total > self.best_opponent_total
    }
}

/// Produce one decision for the current wake-up.
///
/// Never suspends; pure computation over the context plus the caller's RNG.
pub fn decide<R: Rng + ?Sized>(
    profile: &AiProfile,
    ctx: &DecisionContext,
    rng: &mut R,
) -> TurnDecision {
    let decision = match profile.brain {
        Brain::Optimal => optimal(ctx),
        Brain::Probabilistic => probabilistic(ctx, rng),
        Brain::Personality => personality(profile, ctx, rng),
        Brain::Random => random(ctx, rng),
    };
    clamp_to_valid(decision, ctx)
}

/// Expected-value gap behind the chosen action; feeds hesitation timing.
pub fn decision_ev_gap(ctx: &DecisionContext) -> f64 {
    let analysis = analyze_turn(ctx.dice, ctx.rolls_remaining, &ctx.available);
    crate::game::analysis::decision_gap(&analysis)
}

fn optimal(ctx: &DecisionContext) -> TurnDecision {
    analyze_turn(ctx.dice, ctx.rolls_remaining, &ctx.available).recommendation
}

fn probabilistic<R: Rng + ?Sized>(ctx: &DecisionContext, rng: &mut R) -> TurnDecision {
    let analysis = analyze_turn(ctx.dice, ctx.rolls_remaining, &ctx.available);

    // Candidate actions weighted by estimated value: each scorable category
    // plus (while rolls remain) continuing with the optimal keep.
    let mut actions: Vec<(TurnDecision, f64)> = analysis
        .category_values
        .iter()
        .map(|cv| {
            (
                TurnDecision::Score {
                    category: cv.category,
                },
                f64::from(cv.immediate_score).max(0.5),
            )
        })
        .collect();
    if ctx.rolls_remaining > 0 {
        actions.push((
            TurnDecision::Roll {
                keep: analysis.optimal_keep,
            },
            analysis.continue_value.max(0.5),
        ));
    }

    let total: f64 = actions.iter().map(|(_, w)| w).sum();
    let mut pick = rng.gen_range(0.0..total.max(f64::MIN_POSITIVE));
    for (action, weight) in &actions {
        if pick < *weight {
            return *action;
        }
        pick -= weight;
    }
    analysis.recommendation
}

fn personality<R: Rng + ?Sized>(
    profile: &AiProfile,
    ctx: &DecisionContext,
    rng: &mut R,
) -> TurnDecision {
    let analysis = analyze_turn(ctx.dice, ctx.rolls_remaining, &ctx.available);
    let traits = &profile.traits;
    let mut decision = analysis.recommendation;

    // A stubborn roller burns every roll unless the hand is already perfect
    if traits.always_uses_all_rolls && ctx.rolls_remaining > 0 && !ctx.dice.is_five_of_a_kind() {
        decision = TurnDecision::Roll {
            keep: analysis.optimal_keep,
        };
    }

    // Risk appetite: reroll instead of banking a modest score
    if let TurnDecision::Score { category } = decision {
        let banked = score(category, ctx.dice);
        if ctx.rolls_remaining > 0
            && traits.risk_tolerance > 0.6
            && f64::from(banked) < 25.0 * traits.risk_tolerance
            && rng.gen_bool(traits.risk_tolerance.clamp(0.0, 1.0))
        {
            decision = TurnDecision::Roll {
                keep: analysis.optimal_keep,
            };
        }
    }

    // Full-house devotees take the fixed score whenever it is on the table
    if traits.overvalues_full_house
        && ctx.available.contains(&Category::FullHouse)
        && score(Category::FullHouse, ctx.dice) > 0
    {
        decision = TurnDecision::Score {
            category: Category::FullHouse,
        };
    }

    // Upper-section focus: swap to a close-valued upper category
    if let TurnDecision::Score { category } = decision {
        if !category.is_upper() && traits.upper_section_focus > 0.6 {
            let chosen = f64::from(score(category, ctx.dice));
            let best_upper = ctx
                .available
                .iter()
                .filter(|c| c.is_upper())
                .map(|&c| (c, score(c, ctx.dice)))
                .max_by_key(|&(_, s)| s);
            if let Some((upper, upper_score)) = best_upper {
                if f64::from(upper_score) >= chosen * traits.upper_section_focus {
                    decision = TurnDecision::Score { category: upper };
                }
            }
        }
    }

    // Early-zero aversion: swap a zero for the best non-zero alternative
    if let TurnDecision::Score { category } = decision {
        if traits.avoids_early_zeros && ctx.round_number <= 5 && score(category, ctx.dice) == 0 {
            let best_nonzero = ctx
                .available
                .iter()
                .map(|&c| (c, score(c, ctx.dice)))
                .filter(|&(_, s)| s > 0)
                .max_by_key(|&(_, s)| s);
            if let Some((alt, _)) = best_nonzero {
                decision = TurnDecision::Score { category: alt };
            } else if ctx.rolls_remaining > 0 {
                decision = TurnDecision::Roll {
                    keep: analysis.optimal_keep,
                };
            }
        }
    }

    // Skill noise: each kept die may be flipped with probability scaled by
    // the skill gap
    if let TurnDecision::Roll { mut keep } = decision {
        let flip_chance = (1.0 - profile.skill_level).clamp(0.0, 1.0) * 0.25;
        for slot in &mut keep {
            if rng.gen_bool(flip_chance) {
                *slot = !*slot;
            }
        }
        decision = TurnDecision::Roll { keep };
    }

    decision
}

fn random<R: Rng + ?Sized>(ctx: &DecisionContext, rng: &mut R) -> TurnDecision {
    let can_roll = ctx.rolls_remaining > 0;
    let score_options = ctx.available.len();
    let choices = score_options + usize::from(can_roll);
    if choices == 0 {
        // Unreachable in a live game; scored turns always leave categories
        return TurnDecision::Roll { keep: [false; 5] };
    }
    let pick = rng.gen_range(0..choices);
    if pick < score_options {
        TurnDecision::Score {
            category: ctx.available[pick],
        }
    } else {
        let mut keep = [false; 5];
        for slot in &mut keep {
            *slot = rng.gen_bool(0.5);
        }
        TurnDecision::Roll { keep }
    }
}

/// Final guard: a brain can only score an available category and only roll
/// when rolls remain.
fn clamp_to_valid(decision: TurnDecision, ctx: &DecisionContext) -> TurnDecision {
    match decision {
        TurnDecision::Roll { .. } if ctx.rolls_remaining == 0 => fallback_score(ctx),
        TurnDecision::Score { category } if !ctx.available.contains(&category) => {
            fallback_score(ctx)
        }
        other => other,
    }
}

fn fallback_score(ctx: &DecisionContext) -> TurnDecision {
    let best = ctx
        .available
        .iter()
        .map(|&c| (c, score(c, ctx.dice)))
        .max_by_key(|&(_, s)| s);
    match best {
        Some((category, _)) => TurnDecision::Score { category },
        None => TurnDecision::Roll { keep: [true; 5] },
    }
}
