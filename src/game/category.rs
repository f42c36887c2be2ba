use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The thirteen scoring categories.
///
/// The six upper categories score the sum of matching faces and feed the
/// upper-section bonus; the remaining seven are pattern categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Ones,
    Twos,
    Threes,
    Fours,
    Fives,
    Sixes,
    ThreeOfAKind,
    FourOfAKind,
    FullHouse,
    SmallStraight,
    LargeStraight,
    FiveOfAKind,
    Chance,
}

/// Fixed enumeration order. Auto-scoring a skipped turn always picks the
/// first still-unscored category in this order.
pub const CATEGORY_ORDER: [Category; 13] = [
    Category::Ones,
    Category::Twos,
    Category::Threes,
    Category::Fours,
    Category::Fives,
    Category::Sixes,
    Category::ThreeOfAKind,
    Category::FourOfAKind,
    Category::FullHouse,
    Category::SmallStraight,
    Category::LargeStraight,
    Category::FiveOfAKind,
    Category::Chance,
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown category `{0}`")]
pub struct UnknownCategoryError(pub String);

impl Category {
    /// True for the six upper-section categories.
    pub fn is_upper(self) -> bool {
        matches!(
            self,
            Self::Ones | Self::Twos | Self::Threes | Self::Fours | Self::Fives | Self::Sixes
        )
    }

    /// Die face counted by an upper category (1..=6), if any.
    pub fn upper_face(self) -> Option<u8> {
        match self {
            Self::Ones => Some(1),
            Self::Twos => Some(2),
            Self::Threes => Some(3),
            Self::Fours => Some(4),
            Self::Fives => Some(5),
            Self::Sixes => Some(6),
            _ => None,
        }
    }

    /// Wire name, matching the serde representation.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Ones => "ones",
            Self::Twos => "twos",
            Self::Threes => "threes",
            Self::Fours => "fours",
            Self::Fives => "fives",
            Self::Sixes => "sixes",
            Self::ThreeOfAKind => "threeOfAKind",
            Self::FourOfAKind => "fourOfAKind",
            Self::FullHouse => "fullHouse",
            Self::SmallStraight => "smallStraight",
            Self::LargeStraight => "largeStraight",
            Self::FiveOfAKind => "fiveOfAKind",
            Self::Chance => "chance",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for Category {
    type Err = UnknownCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CATEGORY_ORDER
            .iter()
            .copied()
            .find(|c| c.wire_name() == s)
            .ok_or_else(|| UnknownCategoryError(s.to_string()))
    }
}
