/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 */

//! Kernel-memory capability object (spec §3 "Kernel-memory capability").
//!
//! Unlike the other object kinds this one has no arena entry: a `KOM`
//! capability slot directly encodes `[begin, end)` plus the creation-flag
//! mask in its three info words, the "descriptive immediate for ranged
//! caps" case the spec calls out for `CapSlot::object`/`info`. Grounded on
//! `nucleus/src/objects/untyped.rs`'s `MemoryKind`/`retype` sketch,
//! generalized from a single retype-to-T operation into the range-plus-flags
//! record the spec's kernel-memory capability describes.

use crate::caps::flags::KomFlags;

/// Decoded view of a `KOM` capability's range and creation rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KomRange {
    pub begin: usize,
    pub end: usize,
    pub flags: KomFlags,
}

impl KomRange {
    /// Encode into a `CapSlot`'s `info` words: `[begin, end, flags]`.
    pub fn encode(self) -> [u32; 3] {
        [self.begin as u32, self.end as u32, self.flags.bits()]
    }

    /// Decode from a `CapSlot`'s `info` words.
    pub fn decode(info: [u32; 3]) -> KomRange {
        KomRange {
            begin: info[0] as usize,
            end: info[1] as usize,
            flags: KomFlags::from_bits_truncate(info[2]),
        }
    }

    /// Number of bytes covered by this range.
    pub fn len(self) -> usize {
        self.end.saturating_sub(self.begin)
    }

    pub fn is_empty(self) -> bool {
        self.begin >= self.end
    }

    /// True iff `[addr, addr+size)` lies fully within this range.
    pub fn contains_range(self, addr: usize, size: usize) -> bool {
        match addr.checked_add(size) {
            Some(end) => addr >= self.begin && end <= self.end,
            None => false,
        }
    }

    /// Split this range at `raddr` (relative to `begin`), returning the
    /// sub-range `[begin+raddr, begin+raddr+size)` if it fits.
    pub fn sub_range(self, raddr: usize, size: usize) -> Option<KomRange> {
        let addr = self.begin.checked_add(raddr)?;
        if self.contains_range(addr, size) {
            Some(KomRange {
                begin: addr,
                end: addr + size,
                flags: self.flags,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let r = KomRange {
            begin: 0x1000,
            end: 0x2000,
            flags: KomFlags::CPT | KomFlags::THD,
        };
        assert_eq!(KomRange::decode(r.encode()), r);
    }

    #[test]
    fn sub_range_rejects_overflow_past_end() {
        let r = KomRange { begin: 0x1000, end: 0x1100, flags: KomFlags::ALL };
        assert!(r.sub_range(0x80, 0x100).is_none());
        assert!(r.sub_range(0x80, 0x80).is_some());
    }
}
