//! Identity types for the pipeline system.
//!
//! `BlockId` and `BufferId` are newtypes over `u32` that serve as direct array
//! indices into their respective storage vectors, providing O(1) lookup.
//! `RequestId` is the monotonically increasing capture request number.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index into `BpsPipeline::blocks`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub const INVALID: BlockId = BlockId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "BlockId(INVALID)")
        } else {
            write!(f, "BlockId({})", self.0)
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Index into a block's `LutBufferPool` slots.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BufferId(pub u32);

impl BufferId {
    pub const INVALID: BufferId = BufferId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "BufferId(INVALID)")
        } else {
            write!(f, "BufferId({})", self.0)
        }
    }
}

/// Capture request number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    #[inline]
    pub fn next(self) -> RequestId {
        RequestId(self.0 + 1)
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Request({})", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id() {
        let id = BlockId(42);
        assert!(id.is_valid());
        assert_eq!(id.index(), 42);
        assert!(!BlockId::INVALID.is_valid());
        assert_eq!(format!("{:?}", BlockId::INVALID), "BlockId(INVALID)");
    }

    #[test]
    fn test_buffer_id() {
        let id = BufferId(0);
        assert!(id.is_valid());
        assert_eq!(id.index(), 0);
        assert!(!BufferId::INVALID.is_valid());
    }

    #[test]
    fn test_request_id_ordering() {
        let first = RequestId(1);
        assert!(first.next() > first);
        assert_eq!(first.to_string(), "Request(1)");
    }
}
