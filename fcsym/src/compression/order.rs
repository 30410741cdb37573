use serde::{Serialize, Deserialize};
use schemars::JsonSchema;

/// Order of the force constants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FcOrder {
    /// Second order force constants, `Φ_{ia,jb}`
    Second,
    /// Third order force constants, `Φ_{ia,jb,kc}`
    Third,
}

const SECOND_ORDER_PERMUTATIONS: [[usize; 3]; 2] = [
    [0, 1, 2], [1, 0, 2],
];

const THIRD_ORDER_PERMUTATIONS: [[usize; 3]; 6] = [
    [0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0],
];

impl FcOrder {
    /// Number of atomic indexes (and Cartesian indexes) of the tensor
    pub fn rank(self) -> usize {
        match self {
            FcOrder::Second => 2,
            FcOrder::Third => 3,
        }
    }

    /// Size of the Cartesian block, `3^rank`
    pub fn cartesian_size(self) -> usize {
        match self {
            FcOrder::Second => 9,
            FcOrder::Third => 27,
        }
    }

    /// All the permutations of the `rank` slots of the tensor. Only the first
    /// `rank` entries of each permutation are meaningful.
    pub fn slot_permutations(self) -> &'static [[usize; 3]] {
        match self {
            FcOrder::Second => &SECOND_ORDER_PERMUTATIONS,
            FcOrder::Third => &THIRD_ORDER_PERMUTATIONS,
        }
    }

    /// Split a flattened Cartesian index (`a·3 + b` or `a·9 + b·3 + c`) into
    /// its digits. Only the first `rank` entries are meaningful.
    pub fn cartesian_digits(self, mut index: usize) -> [usize; 3] {
        let rank = self.rank();
        let mut digits = [0; 3];
        for slot in (0..rank).rev() {
            digits[slot] = index % 3;
            index /= 3;
        }
        return digits;
    }

    /// Flatten Cartesian digits into a single index, inverse of
    /// `cartesian_digits`
    pub fn cartesian_index(self, digits: &[usize; 3]) -> usize {
        digits[..self.rank()].iter().fold(0, |acc, &digit| acc * 3 + digit)
    }
}

impl std::fmt::Display for FcOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FcOrder::Second => write!(f, "fc2"),
            FcOrder::Third => write!(f, "fc3"),
        }
    }
}
