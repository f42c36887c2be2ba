use rand::Rng;
use serde::{Deserialize, Serialize};

/// Five six-sided dice. Each face is always within 1..=6.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dice(pub [u8; 5]);

/// Which dice positions survive a reroll. `true` keeps the die.
pub type KeepMask = [bool; 5];

impl Dice {
    /// Roll five fresh dice.
    pub fn roll<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut faces = [0u8; 5];
        for face in &mut faces {
            *face = rng.gen_range(1..=6);
        }
        Self(faces)
    }

    /// Reroll the positions not covered by the keep mask, preserving kept
    /// values in place.
    pub fn reroll<R: Rng + ?Sized>(&self, keep: KeepMask, rng: &mut R) -> Self {
        let mut faces = self.0;
        for (i, face) in faces.iter_mut().enumerate() {
            if !keep[i] {
                *face = rng.gen_range(1..=6);
            }
        }
        Self(faces)
    }

    pub fn sum(&self) -> u32 {
        self.0.iter().map(|&d| u32::from(d)).sum()
    }

    /// Count of each face, indexed by `face - 1`.
    pub fn counts(&self) -> [u8; 6] {
        let mut counts = [0u8; 6];
        for &die in &self.0 {
            counts[usize::from(die - 1)] += 1;
        }
        counts
    }

    /// Highest multiplicity of any single face.
    pub fn max_count(&self) -> u8 {
        self.counts().into_iter().max().unwrap_or(0)
    }

    pub fn is_five_of_a_kind(&self) -> bool {
        self.max_count() == 5
    }

    /// True when the dice contain a run of at least `len` consecutive faces.
    pub fn has_run(&self, len: u8) -> bool {
        let counts = self.counts();
        let mut streak = 0u8;
        for count in counts {
            if count > 0 {
                streak += 1;
                if streak >= len {
                    return true;
                }
            } else {
                streak = 0;
            }
        }
        false
    }

    /// True when all faces are in range; used to reject tampered persisted
    /// state on load.
    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|&d| (1..=6).contains(&d))
    }
}

/// Translate a list of die indices into a keep mask.
///
/// Out-of-range indices are ignored rather than rejected; the validator has
/// already bounded the command, so a stray index only means "keep nothing
/// extra".
pub fn mask_from_indices(indices: &[u8]) -> KeepMask {
    let mut mask = [false; 5];
    for &i in indices {
        if let Some(slot) = mask.get_mut(usize::from(i)) {
            *slot = true;
        }
    }
    mask
}
