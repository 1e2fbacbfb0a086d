use serde::{Deserialize, Serialize};

/// Block height as declared by a responder.
pub type BlockNumber = u64;

/// An inclusive range of block heights, `[start, end]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: BlockNumber,
    pub end: BlockNumber,
}

impl BlockRange {
    pub const fn new(start: BlockNumber, end: BlockNumber) -> Self {
        Self { start, end }
    }

    /// Returns `true` if `start <= end`.
    pub const fn is_well_formed(&self) -> bool {
        self.start <= self.end
    }

    /// Number of blocks between the two bounds, `end - start`.
    ///
    /// Returns `0` for malformed ranges.
    pub const fn width(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// The midpoint of the range, rounded towards `start`.
    pub const fn midpoint(&self) -> BlockNumber {
        self.start + self.width() / 2
    }

    /// Returns `true` if `other` lies completely within this range.
    pub const fn contains_range(&self, other: &BlockRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub const fn contains(&self, block: BlockNumber) -> bool {
        self.start <= block && block <= self.end
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
