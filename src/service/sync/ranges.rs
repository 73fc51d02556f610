// =============================================================================
// Slidesync Matrix Sliding Sync Server - Slice Ranges Module
// =============================================================================
//
// Project: Slidesync - Ultra High Performance Matrix Sliding Sync Server
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.2.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Window geometry for tracked slices of the sorted room list. A SliceRanges
//   is a set of non-overlapping inclusive [lo, hi] ranges of absolute
//   positions. Provides containment, canonicalised segment deltas, clamping
//   toward a boundary and subsequence extraction.
//
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A set of non-overlapping inclusive ranges of absolute positions in the
/// sorted room list. Serialises as `[[lo, hi], ...]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SliceRanges(pub Vec<[u64; 2]>);

/// The split of two range sets into canonicalised segments.
///
/// `added` and `same` follow the next request's range structure, `removed` the
/// previous one's, so op emission order stays reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeDelta {
    /// Segments tracked now but not before
    pub added: SliceRanges,

    /// Segments tracked before but not any more
    pub removed: SliceRanges,

    /// Segments tracked in both request generations
    pub same: SliceRanges,
}

impl SliceRanges {
    /// Reject malformed range sets: inverted bounds or overlapping ranges.
    pub fn validate(&self) -> Result<()> {
        for r in &self.0 {
            if r[0] > r[1] {
                return Err(Error::BadRequest(format!(
                    "invalid range [{},{}]: lo > hi",
                    r[0], r[1]
                )));
            }
        }
        let mut sorted = self.0.clone();
        sorted.sort_unstable();
        for pair in sorted.windows(2) {
            if pair[1][0] <= pair[0][1] {
                return Err(Error::BadRequest(format!(
                    "overlapping ranges [{},{}] and [{},{}]",
                    pair[0][0], pair[0][1], pair[1][0], pair[1][1]
                )));
            }
        }
        Ok(())
    }

    /// Returns the covering range if `i` falls inside one. Negative positions
    /// are never inside.
    pub fn inside(&self, i: i64) -> Option<[u64; 2]> {
        if i < 0 {
            return None;
        }
        let i = i as u64;
        self.0.iter().copied().find(|r| r[0] <= i && i <= r[1])
    }

    /// The largest range end strictly below `i`, or -1 if there is none. This
    /// is the edge of the nearest window through which a room below all
    /// tracked ranges departed.
    pub fn lower_clamp(&self, i: i64) -> i64 {
        let mut clamp = -1i64;
        for r in &self.0 {
            let hi = r[1] as i64;
            if hi < i && hi > clamp {
                clamp = hi;
            }
        }
        clamp
    }

    /// The smallest range start strictly above `i`, or -1 if there is none.
    pub fn upper_clamp(&self, i: i64) -> i64 {
        let mut clamp = -1i64;
        for r in &self.0 {
            let lo = r[0] as i64;
            if lo > i && (clamp == -1 || lo < clamp) {
                clamp = lo;
            }
        }
        clamp
    }

    /// The closest range boundary to `i` in the direction of travel: the
    /// largest boundary `<= i` when heading towards zero, else the smallest
    /// boundary `>= i`. Returns -1 when no boundary lies in that direction.
    pub fn closest_in_direction(&self, i: i64, towards_zero: bool) -> i64 {
        let mut closest = -1i64;
        for r in &self.0 {
            for boundary in [r[0] as i64, r[1] as i64] {
                if towards_zero {
                    if boundary <= i && boundary > closest {
                        closest = boundary;
                    }
                } else if boundary >= i && (closest == -1 || boundary < closest) {
                    closest = boundary;
                }
            }
        }
        closest
    }

    /// Yields the subsequence of `seq` covered by each range, preserving
    /// range order. Ranges beyond the sequence produce empty slices so
    /// callers can index the result positionally.
    pub fn slice_into<'a, T>(&self, seq: &'a [T]) -> Vec<&'a [T]> {
        self.0
            .iter()
            .map(|r| {
                let lo = r[0] as usize;
                let hi = r[1] as usize;
                if lo >= seq.len() {
                    &seq[0..0]
                } else {
                    let end = (hi + 1).min(seq.len());
                    &seq[lo..end]
                }
            })
            .collect()
    }

    /// Splits this range set against `next` into canonicalised segments:
    /// positions tracked only by `next` are `added`, only by `self` are
    /// `removed`, by both are `same`. Partial overlaps are reported as
    /// separate segments rather than whole-range identity matches.
    pub fn delta(&self, next: &SliceRanges) -> RangeDelta {
        let mut delta = RangeDelta::default();
        for r in &next.0 {
            let (covered, uncovered) = split_against(*r, &self.0);
            delta.same.0.extend(covered);
            delta.added.0.extend(uncovered);
        }
        for r in &self.0 {
            let (_, uncovered) = split_against(*r, &next.0);
            delta.removed.0.extend(uncovered);
        }
        delta
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, [u64; 2]> {
        self.0.iter()
    }
}

fn intersect(a: [u64; 2], b: [u64; 2]) -> Option<[u64; 2]> {
    let lo = a[0].max(b[0]);
    let hi = a[1].min(b[1]);
    (lo <= hi).then_some([lo, hi])
}

/// Split `r` into the segments covered by `others` and the segments left
/// uncovered, in ascending order.
fn split_against(r: [u64; 2], others: &[[u64; 2]]) -> (Vec<[u64; 2]>, Vec<[u64; 2]>) {
    let mut overlaps: Vec<[u64; 2]> = others.iter().filter_map(|o| intersect(r, *o)).collect();
    overlaps.sort_unstable();

    let mut covered = Vec::new();
    let mut uncovered = Vec::new();
    let mut cursor = r[0];
    for o in overlaps {
        if o[0] > cursor {
            uncovered.push([cursor, o[0] - 1]);
        }
        covered.push(o);
        cursor = o[1] + 1;
        if cursor > r[1] {
            break;
        }
    }
    if cursor <= r[1] {
        uncovered.push([cursor, r[1]]);
    }
    (covered, uncovered)
}
