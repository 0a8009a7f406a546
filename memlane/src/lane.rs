//! Lane capability descriptors and transfer-mode selection.
//!
//! A lane advertises per-mode size limits and the thresholds at which the
//! engine switches between SHORT, BCOPY and ZCOPY. Selection is pure policy:
//! one tier per invocation, fragment length clamped to the tier's maximum.

use crate::request::OpKind;

/// Transfer mode for a single fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Inline/eager: payload travels with the operation descriptor.
    Short,
    /// Buffered copy: payload is packed into a lane-owned bounce buffer.
    Bcopy,
    /// Zero copy: the lane DMAs directly from/to the registered buffer.
    Zcopy,
}

/// Capability descriptor for a lane.
///
/// `short_thresh` splits SHORT from BCOPY for PUT; `put_zcopy_thresh` /
/// `get_zcopy_thresh` split BCOPY from ZCOPY. GET has no SHORT tier.
#[derive(Debug, Clone, Copy)]
pub struct LaneCaps {
    /// Maximum bytes in a single SHORT put.
    pub max_put_short: usize,
    /// Maximum bytes in a single BCOPY put fragment.
    pub max_put_bcopy: usize,
    /// Maximum bytes in a single ZCOPY put fragment.
    pub max_put_zcopy: usize,
    /// Maximum bytes in a single BCOPY get fragment.
    pub max_get_bcopy: usize,
    /// Maximum bytes in a single ZCOPY get fragment.
    pub max_get_zcopy: usize,
    /// Lengths at or below this use SHORT for PUT.
    pub short_thresh: usize,
    /// Lengths at or above this use ZCOPY for PUT.
    pub put_zcopy_thresh: usize,
    /// Lengths at or above this use ZCOPY for GET.
    pub get_zcopy_thresh: usize,
}

impl Default for LaneCaps {
    fn default() -> Self {
        Self {
            max_put_short: 256,
            max_put_bcopy: 8192,
            max_put_zcopy: 1 << 20,
            max_get_bcopy: 8192,
            max_get_zcopy: 1 << 20,
            short_thresh: 256,
            put_zcopy_thresh: 64 << 10,
            get_zcopy_thresh: 64 << 10,
        }
    }
}

impl LaneCaps {
    /// Select the mode and fragment length for the next PUT fragment.
    ///
    /// Selection re-evaluates on the remaining length each invocation, so a
    /// large transfer that started in ZCOPY may finish its tail in BCOPY or
    /// SHORT once few enough bytes remain.
    pub fn select_put(&self, remaining: usize) -> (TransferMode, usize) {
        debug_assert!(remaining > 0);
        if remaining <= self.short_thresh {
            (TransferMode::Short, remaining.min(self.max_put_short))
        } else if remaining < self.put_zcopy_thresh {
            (TransferMode::Bcopy, remaining.min(self.max_put_bcopy))
        } else {
            (TransferMode::Zcopy, remaining.min(self.max_put_zcopy))
        }
    }

    /// Select the mode and fragment length for the next GET fragment.
    pub fn select_get(&self, remaining: usize) -> (TransferMode, usize) {
        debug_assert!(remaining > 0);
        if remaining < self.get_zcopy_thresh {
            (TransferMode::Bcopy, remaining.min(self.max_get_bcopy))
        } else {
            (TransferMode::Zcopy, remaining.min(self.max_get_zcopy))
        }
    }

    /// Whether a transfer of `total_len` bytes can reach the ZCOPY tier and
    /// therefore needs its buffer registered up front.
    pub fn needs_registration(&self, kind: OpKind, total_len: usize) -> bool {
        match kind {
            OpKind::Put => total_len >= self.put_zcopy_thresh,
            OpKind::Get => total_len >= self.get_zcopy_thresh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> LaneCaps {
        LaneCaps {
            max_put_short: 64,
            max_put_bcopy: 4096,
            max_put_zcopy: 256 << 10,
            max_get_bcopy: 4096,
            max_get_zcopy: 256 << 10,
            short_thresh: 64,
            put_zcopy_thresh: 16 << 10,
            get_zcopy_thresh: 16 << 10,
        }
    }

    #[test]
    fn put_short_tier() {
        let (mode, len) = caps().select_put(64);
        assert_eq!(mode, TransferMode::Short);
        assert_eq!(len, 64);
    }

    #[test]
    fn put_bcopy_tier_clamps_to_max() {
        let (mode, len) = caps().select_put(10_000);
        assert_eq!(mode, TransferMode::Bcopy);
        assert_eq!(len, 4096);
    }

    #[test]
    fn put_zcopy_at_threshold() {
        let (mode, len) = caps().select_put(16 << 10);
        assert_eq!(mode, TransferMode::Zcopy);
        assert_eq!(len, 16 << 10);
    }

    #[test]
    fn put_zcopy_clamps_to_max() {
        let (mode, len) = caps().select_put(1 << 20);
        assert_eq!(mode, TransferMode::Zcopy);
        assert_eq!(len, 256 << 10);
    }

    #[test]
    fn get_has_no_short_tier() {
        let (mode, len) = caps().select_get(8);
        assert_eq!(mode, TransferMode::Bcopy);
        assert_eq!(len, 8);
    }

    #[test]
    fn tail_of_large_put_drops_back_to_short() {
        // After ZCOPY fragments drain a transfer down to a small tail,
        // the tail goes out in a cheaper tier.
        let (mode, _) = caps().select_put(32);
        assert_eq!(mode, TransferMode::Short);
    }

    #[test]
    fn registration_follows_total_length() {
        assert!(!caps().needs_registration(OpKind::Put, 4096));
        assert!(caps().needs_registration(OpKind::Put, 16 << 10));
        assert!(caps().needs_registration(OpKind::Get, 1 << 20));
    }
}
