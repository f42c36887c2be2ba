use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::category::{Category, CATEGORY_ORDER};
use super::dice::Dice;
use super::scoring::score;

/// Upper-section sum required to earn the upper bonus.
pub const UPPER_BONUS_THRESHOLD: u32 = 63;
/// Reward granted once when the upper sum crosses the threshold.
pub const UPPER_BONUS_REWARD: u32 = 35;
/// Fixed value of the five-of-a-kind category itself.
pub const FIVE_OF_A_KIND_SCORE: u32 = 50;
/// Reward for each additional five-of-a-kind after the first non-zero one.
pub const REPEAT_PATTERN_BONUS: u32 = 100;

/// Per-player record of scored categories plus the two bonuses.
///
/// Categories absent from `slots` are unscored. A slot is written at most
/// once; [`Scorecard::apply`] enforces the transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Scorecard {
    #[serde(default)]
    pub slots: BTreeMap<Category, u32>,
    #[serde(default)]
    pub upper_bonus: u32,
    #[serde(default)]
    pub repeat_pattern_bonus: u32,
}

/// What a single scoring write produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreOutcome {
    pub category: Category,
    /// Points written into the category slot.
    pub gained: u32,
    /// Repeat-pattern bonus granted by this write, if any.
    pub repeat_bonus_awarded: bool,
    /// Upper bonus granted by this write, if any.
    pub upper_bonus_awarded: bool,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("category `{0}` is already scored")]
pub struct CategoryAlreadyScoredError(pub Category);

impl Scorecard {
    pub fn is_scored(&self, category: Category) -> bool {
        self.slots.contains_key(&category)
    }

    /// Sum of the six upper category slots (bonus excluded).
    pub fn upper_sum(&self) -> u32 {
        self.slots
            .iter()
            .filter(|(c, _)| c.is_upper())
            .map(|(_, &v)| v)
            .sum()
    }

    /// Grand total: all slots plus both bonuses.
    pub fn total(&self) -> u32 {
        self.slots.values().sum::<u32>() + self.upper_bonus + self.repeat_pattern_bonus
    }

    /// All thirteen categories scored.
    pub fn is_complete(&self) -> bool {
        self.slots.len() == CATEGORY_ORDER.len()
    }

    /// Unscored categories in the fixed enumeration order.
    pub fn remaining(&self) -> Vec<Category> {
        CATEGORY_ORDER
            .iter()
            .copied()
            .filter(|c| !self.is_scored(*c))
            .collect()
    }

    /// First still-unscored category; the deterministic auto-score target
    /// for a skipped or forfeited turn.
    pub fn first_unscored(&self) -> Option<Category> {
        CATEGORY_ORDER.iter().copied().find(|c| !self.is_scored(*c))
    }

    /// Write `category` from the given dice, applying the repeat-pattern
    /// bonus and the upper bonus where they trigger.
    ///
    /// The repeat-pattern bonus is granted only when the dice show five of a
    /// kind and the five-of-a-kind category already holds a non-zero score.
    /// The target category remains the player's choice.
    pub fn apply(
        &mut self,
        category: Category,
        dice: Dice,
    ) -> Result<ScoreOutcome, CategoryAlreadyScoredError> {
        if self.is_scored(category) {
            return Err(CategoryAlreadyScoredError(category));
        }

        let repeat_eligible = dice.is_five_of_a_kind()
            && self
                .slots
                .get(&Category::FiveOfAKind)
                .is_some_and(|&v| v > 0);

        let upper_before = self.upper_sum();
        let gained = score(category, dice);
        self.slots.insert(category, gained);

        let mut repeat_bonus_awarded = false;
        if repeat_eligible {
            self.repeat_pattern_bonus += REPEAT_PATTERN_BONUS;
            repeat_bonus_awarded = true;
        }

        let mut upper_bonus_awarded = false;
        if category.is_upper()
            && self.upper_bonus == 0
            && upper_before < UPPER_BONUS_THRESHOLD
            && self.upper_sum() >= UPPER_BONUS_THRESHOLD
        {
            self.upper_bonus = UPPER_BONUS_REWARD;
            upper_bonus_awarded = true;
        }

        Ok(ScoreOutcome {
            category,
            gained,
            repeat_bonus_awarded,
            upper_bonus_awarded,
        })
    }

    /// Write a zero without bonus checks. Used for skipped and forfeited
    /// turns.
    pub fn apply_zero(
        &mut self,
        category: Category,
    ) -> Result<ScoreOutcome, CategoryAlreadyScoredError> {
        if self.is_scored(category) {
            return Err(CategoryAlreadyScoredError(category));
        }
        self.slots.insert(category, 0);
        Ok(ScoreOutcome {
            category,
            gained: 0,
            repeat_bonus_awarded: false,
            upper_bonus_awarded: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_written_once() {
        let mut card = Scorecard::default();
        card.apply(Category::Chance, Dice([1, 2, 3, 4, 5])).unwrap();
        let err = card.apply(Category::Chance, Dice([6, 6, 6, 6, 6]));
        assert_eq!(err, Err(CategoryAlreadyScoredError(Category::Chance)));
        // The original value survives
        assert_eq!(card.slots[&Category::Chance], 15);
    }

    #[test]
    fn test_upper_bonus_on_crossing() {
        let mut card = Scorecard::default();
        // Pre-load 60 upper points: three of each of 4s, 5s, 6s and 5x3
        card.apply(Category::Fours, Dice([4, 4, 4, 1, 2])).unwrap();
        card.apply(Category::Fives, Dice([5, 5, 5, 1, 2])).unwrap();
        card.apply(Category::Sixes, Dice([6, 6, 6, 1, 2])).unwrap();
        card.apply(Category::Threes, Dice([3, 3, 3, 3, 1])).unwrap();
        assert_eq!(card.upper_sum(), 57);
        assert_eq!(card.upper_bonus, 0);

        let outcome = card.apply(Category::Twos, Dice([2, 2, 2, 1, 5])).unwrap();
        assert_eq!(card.upper_sum(), 63);
        assert!(outcome.upper_bonus_awarded);
        assert_eq!(card.upper_bonus, UPPER_BONUS_REWARD);
        assert_eq!(card.total(), 63 + 35);

        // Scoring another upper category does not award it twice
        let outcome = card.apply(Category::Ones, Dice([1, 1, 1, 1, 2])).unwrap();
        assert!(!outcome.upper_bonus_awarded);
        assert_eq!(card.upper_bonus, UPPER_BONUS_REWARD);
    }

    #[test]
    fn test_repeat_bonus_requires_prior_nonzero_five_of_a_kind() {
        let mut card = Scorecard::default();
        card.apply(Category::FiveOfAKind, Dice([5, 5, 5, 5, 5]))
            .unwrap();
        assert_eq!(card.slots[&Category::FiveOfAKind], FIVE_OF_A_KIND_SCORE);

        // Second five of a kind scored into fives: 25 + repeat bonus
        let outcome = card.apply(Category::Fives, Dice([5, 5, 5, 5, 5])).unwrap();
        assert_eq!(outcome.gained, 25);
        assert!(outcome.repeat_bonus_awarded);
        assert_eq!(card.repeat_pattern_bonus, REPEAT_PATTERN_BONUS);
    }

    #[test]
    fn test_no_repeat_bonus_after_zeroed_five_of_a_kind() {
        let mut card = Scorecard::default();
        // Five-of-a-kind slot holds zero (scored from a non-matching roll)
        card.apply(Category::FiveOfAKind, Dice([1, 2, 3, 4, 5]))
            .unwrap();
        let outcome = card.apply(Category::Sixes, Dice([6, 6, 6, 6, 6])).unwrap();
        assert!(!outcome.repeat_bonus_awarded);
        assert_eq!(card.repeat_pattern_bonus, 0);
    }

    #[test]
    fn test_no_repeat_bonus_before_five_of_a_kind_scored() {
        let mut card = Scorecard::default();
        let outcome = card.apply(Category::Sixes, Dice([6, 6, 6, 6, 6])).unwrap();
        assert!(!outcome.repeat_bonus_awarded);
    }

    #[test]
    fn test_first_unscored_follows_fixed_order() {
        let mut card = Scorecard::default();
        assert_eq!(card.first_unscored(), Some(Category::Ones));
        card.apply_zero(Category::Ones).unwrap();
        card.apply_zero(Category::Twos).unwrap();
        assert_eq!(card.first_unscored(), Some(Category::Threes));
    }

    #[test]
    fn test_complete_after_thirteen_writes() {
        let mut card = Scorecard::default();
        for category in CATEGORY_ORDER {
            assert!(!card.is_complete());
            card.apply_zero(category).unwrap();
        }
        assert!(card.is_complete());
        assert_eq!(card.first_unscored(), None);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut card = Scorecard::default();
        card.apply(Category::FiveOfAKind, Dice([3, 3, 3, 3, 3]))
            .unwrap();
        card.apply(Category::Twos, Dice([2, 2, 1, 1, 1])).unwrap();
        let json = serde_json::to_string(&card).unwrap();
        let back: Scorecard = serde_json::from_str(&json).unwrap();
        assert_eq!(card, back);
        assert!(json.contains("fiveOfAKind"));
    }
}
