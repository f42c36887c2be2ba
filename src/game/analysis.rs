use serde::{Deserialize, Serialize};

use super::category::Category;
use super::dice::{Dice, KeepMask};
use super::scoring::score;

/// A turn decision: keep rolling with a mask, or commit to a category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnDecision {
    Roll { keep: KeepMask },
    Score { category: Category },
}

/// Expected-value estimate for a single available category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CategoryValue {
    pub category: Category,
    pub immediate_score: u32,
    /// Heuristic value of chasing this category with the rolls left.
    pub expected_value: f64,
}

/// Analysis of one turn state: per-category values, the best immediate
/// score, and a recommended action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnAnalysis {
    pub category_values: Vec<CategoryValue>,
    pub best_immediate: Option<(Category, u32)>,
    /// Value of rerolling with `optimal_keep` and scoring afterwards.
    pub continue_value: f64,
    pub optimal_keep: KeepMask,
    pub recommendation: TurnDecision,
    pub expected_value: f64,
}

/// Analyze a turn with a closed-form heuristic.
///
/// This is not an exact solver: expected values are estimated from face
/// counts and reroll opportunities, which is accurate enough to drive AI
/// play and hint quality ordering. Deterministic for identical inputs.
pub fn analyze_turn(dice: Dice, rolls_remaining: u8, available: &[Category]) -> TurnAnalysis {
    let counts = dice.counts();
    let rerolls = f64::from(rolls_remaining);

    let mut category_values: Vec<CategoryValue> = available
        .iter()
        .map(|&category| {
            let immediate = score(category, dice);
            CategoryValue {
                category,
                immediate_score: immediate,
                expected_value: chase_value(category, dice, &counts, rerolls, immediate),
            }
        })
        .collect();
    category_values.sort_by(|a, b| {
        b.expected_value
            .partial_cmp(&a.expected_value)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let best_immediate = available
        .iter()
        .map(|&c| (c, score(c, dice)))
        .max_by_key(|&(c, s)| (s, std::cmp::Reverse(category_rank(c))));

    let optimal_keep = best_keep_mask(dice, available);
    let continue_value = category_values
        .first()
        .map_or(0.0, |cv| cv.expected_value);

    let immediate_value = best_immediate.map_or(0, |(_, s)| s);
    let recommendation = if rolls_remaining == 0 || f64::from(immediate_value) >= continue_value {
        match best_immediate {
            Some((category, _)) => TurnDecision::Score { category },
            // No categories left; callers never reach this with a live game
            None => TurnDecision::Roll { keep: optimal_keep },
        }
    } else {
        TurnDecision::Roll { keep: optimal_keep }
    };

    let expected_value = match recommendation {
        TurnDecision::Score { .. } => f64::from(immediate_value),
        TurnDecision::Roll { .. } => continue_value,
    };

    TurnAnalysis {
        category_values,
        best_immediate,
        continue_value,
        optimal_keep,
        recommendation,
        expected_value,
    }
}

/// Gap between the best and second-best options; drives AI hesitation.
pub fn decision_gap(analysis: &TurnAnalysis) -> f64 {
    let mut values: Vec<f64> = analysis
        .category_values
        .iter()
        .map(|cv| cv.expected_value)
        .collect();
    values.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    match (values.first(), values.get(1)) {
        (Some(best), Some(second)) => best - second,
        _ => 0.0,
    }
}

/// Heuristic worth of still chasing `category` given the dice in hand.
fn chase_value(
    category: Category,
    dice: Dice,
    counts: &[u8; 6],
    rerolls: f64,
    immediate: u32,
) -> f64 {
    let imm = f64::from(immediate);
    if rerolls == 0.0 {
        return imm;
    }

    match category {
        c if c.is_upper() => {
            let face = f64::from(c.upper_face().unwrap_or(0));
            let have = f64::from(counts[c.upper_face().map_or(0, |f| usize::from(f - 1))]);
            // Each rerolled die lands on the face 1/6 of the time per roll
            let expected_new = (5.0 - have) * (1.0 - (5.0 / 6.0_f64).powf(rerolls));
            (have + expected_new) * face
        }
        Category::ThreeOfAKind | Category::FourOfAKind => {
            let need = if category == Category::ThreeOfAKind { 3 } else { 4 };
            let best = f64::from(dice.max_count());
            if dice.max_count() >= need {
                imm.max(f64::from(dice.sum()))
            } else {
                let deficit = f64::from(need) - best;
                let hit = (rerolls * (5.0 - best) / 6.0 / deficit).min(0.9);
                hit * f64::from(dice.sum() + 4)
            }
        }
        Category::FullHouse => {
            if immediate > 0 {
                imm
            } else {
                let mut sorted: Vec<u8> = counts.iter().copied().filter(|&c| c > 0).collect();
                sorted.sort_unstable_by(|a, b| b.cmp(a));
                let shape = (
                    sorted.first().copied().unwrap_or(0),
                    sorted.get(1).copied().unwrap_or(0),
                );
                let hit = match shape {
                    (3, 1) | (2, 2) => 0.35 * rerolls,
                    (4, 1) | (3, 2) => 0.45 * rerolls,
                    (2, 1) => 0.2 * rerolls,
                    _ => 0.1 * rerolls,
                }
                .min(0.85);
                hit * f64::from(super::scoring::FULL_HOUSE_SCORE)
            }
        }
        Category::SmallStraight | Category::LargeStraight => {
            if immediate > 0 {
                imm
            } else {
                let run = longest_run(counts);
                let target: u8 = if category == Category::SmallStraight { 4 } else { 5 };
                let deficit = f64::from(target.saturating_sub(run));
                let hit = (rerolls * 0.3 / deficit.max(1.0)).min(0.8);
                let reward = if category == Category::SmallStraight {
                    super::scoring::SMALL_STRAIGHT_SCORE
                } else {
                    super::scoring::LARGE_STRAIGHT_SCORE
                };
                hit * f64::from(reward)
            }
        }
        Category::FiveOfAKind => {
            if immediate > 0 {
                imm
            } else {
                let best = f64::from(dice.max_count());
                let hit = ((1.0 / 6.0_f64).powf(5.0 - best) * rerolls * 2.0).min(0.6);
                hit * f64::from(super::scorecard::FIVE_OF_A_KIND_SCORE)
            }
        }
        Category::Chance => {
            // Rerolling low dice pulls each toward 3.5
            let low: f64 = dice
                .0
                .iter()
                .filter(|&&d| d < 4)
                .map(|&d| 3.5 - f64::from(d))
                .sum();
            f64::from(dice.sum()) + low * (1.0 - (0.5_f64).powf(rerolls))
        }
        _ => imm,
    }
}

fn category_rank(c: Category) -> usize {
    super::category::CATEGORY_ORDER
        .iter()
        .position(|&x| x == c)
        .unwrap_or(usize::MAX)
}

fn longest_run(counts: &[u8; 6]) -> u8 {
    let mut best = 0u8;
    let mut streak = 0u8;
    for &count in counts {
        if count > 0 {
            streak += 1;
            best = best.max(streak);
        } else {
            streak = 0;
        }
    }
    best
}

/// Keep mask to pursue the most promising pattern: the current run when a
/// straight is still open and closest, otherwise the modal face.
fn best_keep_mask(dice: Dice, available: &[Category]) -> KeepMask {
    let counts = dice.counts();
    let straight_open = available
        .iter()
        .any(|c| matches!(c, Category::SmallStraight | Category::LargeStraight));

    if straight_open && longest_run(&counts) >= 3 && counts.iter().all(|&c| c <= 2) {
        return run_keep_mask(dice, &counts);
    }

    // Modal face, high face winning ties
    let mut modal_face = 1u8;
    let mut modal_count = 0u8;
    for (i, &count) in counts.iter().enumerate() {
        if count >= modal_count {
            modal_count = count;
            modal_face = u8::try_from(i + 1).unwrap_or(6);
        }
    }
    let mut mask = [false; 5];
    for (i, &die) in dice.0.iter().enumerate() {
        mask[i] = die == modal_face;
    }
    mask
}

/// Keep one die of each face that participates in the longest run.
fn run_keep_mask(dice: Dice, counts: &[u8; 6]) -> KeepMask {
    let mut mask = [false; 5];
    let mut kept_face = [false; 6];
    for (i, &die) in dice.0.iter().enumerate() {
        let idx = usize::from(die - 1);
        if counts[idx] > 0 && !kept_face[idx] {
            kept_face[idx] = true;
            mask[i] = true;
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::CATEGORY_ORDER;

    fn category_rank_of(c: Category) -> usize {
        CATEGORY_ORDER.iter().position(|&x| x == c).unwrap()
    }

    #[test]
    fn test_must_score_when_no_rolls_remain() {
        let analysis = analyze_turn(Dice([1, 2, 2, 3, 6]), 0, &CATEGORY_ORDER);
        assert!(matches!(analysis.recommendation, TurnDecision::Score { .. }));
    }

    #[test]
    fn test_five_of_a_kind_scored_immediately() {
        let analysis = analyze_turn(Dice([4, 4, 4, 4, 4]), 2, &CATEGORY_ORDER);
        match analysis.recommendation {
            TurnDecision::Score { category } => assert_eq!(category, Category::FiveOfAKind),
            TurnDecision::Roll { .. } => panic!("should score a rolled five of a kind"),
        }
    }

    #[test]
    fn test_weak_roll_keeps_rolling() {
        let analysis = analyze_turn(
            Dice([1, 2, 2, 4, 6]),
            2,
            &[Category::FiveOfAKind, Category::LargeStraight, Category::Sixes],
        );
        assert!(matches!(analysis.recommendation, TurnDecision::Roll { .. }));
    }

    #[test]
    fn test_keep_mask_tracks_modal_face() {
        let analysis = analyze_turn(Dice([5, 5, 5, 1, 2]), 2, &[Category::Fives]);
        assert_eq!(analysis.optimal_keep, [true, true, true, false, false]);
    }

    #[test]
    fn test_deterministic_for_identical_inputs() {
        let a = analyze_turn(Dice([1, 3, 3, 5, 6]), 1, &CATEGORY_ORDER);
        let b = analyze_turn(Dice([1, 3, 3, 5, 6]), 1, &CATEGORY_ORDER);
        assert_eq!(a.recommendation, b.recommendation);
        assert_eq!(a.optimal_keep, b.optimal_keep);
        assert!((a.expected_value - b.expected_value).abs() < f64::EPSILON);
    }

    #[test]
    fn test_best_immediate_prefers_earlier_category_on_ties() {
        // All-zero immediate scores: tie broken toward the earliest category
        let analysis = analyze_turn(
            Dice([1, 2, 2, 3, 3]),
            0,
            &[Category::FourOfAKind, Category::LargeStraight],
        );
        let (category, gained) = analysis.best_immediate.unwrap();
        assert_eq!(gained, 0);
        assert_eq!(category, Category::FourOfAKind);
        assert!(category_rank_of(Category::FourOfAKind) < category_rank_of(Category::LargeStraight));
    }
}
