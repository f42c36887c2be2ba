use serde::{Deserialize, Serialize};

use super::brain::Brain;

/// Behavioral biases layered on top of a brain's base decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiTraits {
    /// 0..1; high values reroll instead of banking a modest score.
    pub risk_tolerance: f64,
    /// 0..1; high values prefer upper categories when close in value.
    pub upper_section_focus: f64,
    pub overvalues_full_house: bool,
    pub avoids_early_zeros: bool,
    pub always_uses_all_rolls: bool,
    /// 0..1; probability of a quick-chat line after a notable event.
    pub chat_frequency: f64,
}

impl Default for AiTraits {
    fn default() -> Self {
        Self {
            risk_tolerance: 0.5,
            upper_section_focus: 0.5,
            overvalues_full_house: false,
            avoids_early_zeros: true,
            always_uses_all_rolls: false,
            chat_frequency: 0.0,
        }
    }
}

/// Millisecond delay ranges for each decision kind plus modifiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiTiming {
    pub roll_decision_ms: (u64, u64),
    pub keep_decision_ms: (u64, u64),
    pub score_decision_ms: (u64, u64),
    /// Multiplier applied when the AI leads the game (< 1 speeds it up).
    pub winning_modifier: f64,
    /// Multiplier applied in the last three rounds (> 1 slows it down).
    pub final_rounds_modifier: f64,
    /// Extra hesitation drawn when the decision is close.
    pub hesitation_extra_ms: (u64, u64),
    /// Expected-value gap below which the extra hesitation applies.
    pub hesitation_ev_gap: f64,
}

impl Default for AiTiming {
    fn default() -> Self {
        Self {
            roll_decision_ms: (900, 2200),
            keep_decision_ms: (1100, 2800),
            score_decision_ms: (1300, 3200),
            winning_modifier: 0.85,
            final_rounds_modifier: 1.25,
            hesitation_extra_ms: (800, 2400),
            hesitation_ev_gap: 4.0,
        }
    }
}

/// A complete AI persona.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiProfile {
    pub id: String,
    pub display_name: String,
    pub avatar_seed: String,
    pub brain: Brain,
    /// 0..1; lower skill injects more noise into keep decisions.
    pub skill_level: f64,
    pub traits: AiTraits,
    pub timing: AiTiming,
}

/// The built-in roster addressable from `QUICK_PLAY_START` and
/// `ADD_AI_PLAYER`.
pub fn builtin_profiles() -> Vec<AiProfile> {
    vec![
        AiProfile {
            id: "carmen".to_string(),
            display_name: "Carmen".to_string(),
            avatar_seed: "ai-carmen".to_string(),
            brain: Brain::Optimal,
            skill_level: 0.95,
            traits: AiTraits {
                chat_frequency: 0.15,
                ..AiTraits::default()
            },
            timing: AiTiming::default(),
        },
        AiProfile {
            id: "rusty".to_string(),
            display_name: "Rusty".to_string(),
            avatar_seed: "ai-rusty".to_string(),
            brain: Brain::Random,
            skill_level: 0.2,
            traits: AiTraits {
                risk_tolerance: 0.8,
                avoids_early_zeros: false,
                chat_frequency: 0.4,
                ..AiTraits::default()
            },
            timing: AiTiming {
                roll_decision_ms: (500, 1200),
                keep_decision_ms: (600, 1500),
                score_decision_ms: (700, 1600),
                ..AiTiming::default()
            },
        },
        AiProfile {
            id: "viv".to_string(),
            display_name: "Viv".to_string(),
            avatar_seed: "ai-viv".to_string(),
            brain: Brain::Probabilistic,
            skill_level: 0.7,
            traits: AiTraits {
                risk_tolerance: 0.6,
                chat_frequency: 0.25,
                ..AiTraits::default()
            },
            timing: AiTiming::default(),
        },
        AiProfile {
            id: "brick".to_string(),
            display_name: "Brick".to_string(),
            avatar_seed: "ai-brick".to_string(),
            brain: Brain::Personality,
            skill_level: 0.55,
            traits: AiTraits {
                risk_tolerance: 0.85,
                upper_section_focus: 0.2,
                overvalues_full_house: true,
                avoids_early_zeros: false,
                always_uses_all_rolls: true,
                chat_frequency: 0.5,
            },
            timing: AiTiming {
                roll_decision_ms: (700, 1600),
                keep_decision_ms: (900, 2000),
                score_decision_ms: (1000, 2400),
                winning_modifier: 0.75,
                ..AiTiming::default()
            },
        },
        AiProfile {
            id: "sage".to_string(),
            display_name: "Sage".to_string(),
            avatar_seed: "ai-sage".to_string(),
            brain: Brain::Personality,
            skill_level: 0.9,
            traits: AiTraits {
                risk_tolerance: 0.3,
                upper_section_focus: 0.8,
                avoids_early_zeros: true,
                chat_frequency: 0.1,
                ..AiTraits::default()
            },
            timing: AiTiming {
                roll_decision_ms: (1400, 3000),
                keep_decision_ms: (1800, 3600),
                score_decision_ms: (2000, 4200),
                final_rounds_modifier: 1.4,
                ..AiTiming::default()
            },
        },
    ]
}

/// Look up a built-in profile by id.
pub fn find_profile(id: &str) -> Option<AiProfile> {
    builtin_profiles().into_iter().find(|p| p.id == id)
}
