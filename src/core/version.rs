use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open `[start, end)` interval of lookup versions.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct VersionRange {
    start: i64,
    end: i64,
}

impl VersionRange {
    /// Panics when `end <= start`: an inverted range indicates a broken
    /// invariant upstream, not a recoverable condition.
    pub fn new(start: i64, end: i64) -> Self {
        assert!(start < end, "invalid version range [{}, {})", start, end);
        VersionRange { start, end }
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn contains(&self, version: i64) -> bool {
        self.start <= version && version < self.end
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Ordered set of committed versions, kept as strictly increasing,
/// non-overlapping, non-adjacent half-open ranges.
///
/// Persistence attempts can fail independently while later versions
/// succeed, so the committed set has holes that a flat counter cannot
/// represent. This structure is the "what do you already know" unit
/// exchanged between producer and consumer.
///
/// Not internally thread-safe: mutation happens under the owning
/// authority's lock, readers take a clone.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Default)]
pub struct VersionRangeCollection {
    ranges: Vec<VersionRange>,
    initial_version: i64,
}

impl VersionRangeCollection {
    pub fn new(initial_version: i64) -> Self {
        VersionRangeCollection {
            ranges: Vec::new(),
            initial_version,
        }
    }

    pub fn with_range(start: i64, end: i64) -> Self {
        VersionRangeCollection {
            ranges: vec![VersionRange::new(start, end)],
            initial_version: start,
        }
    }

    pub fn ranges(&self) -> &[VersionRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// First committed version, or the baseline when empty.
    pub fn start_version(&self) -> i64 {
        self.ranges
            .first()
            .map_or(self.initial_version, VersionRange::start)
    }

    /// One past the last committed version, or the baseline when empty.
    pub fn end_version(&self) -> i64 {
        self.ranges
            .last()
            .map_or(self.initial_version, VersionRange::end)
    }

    pub fn add_range(&mut self, start: i64, end: i64) -> bool {
        self.add(VersionRange::new(start, end))
    }

    /// Inserts a range, coalescing with every overlapping or adjacent
    /// neighbor. Returns whether the collection changed.
    pub fn add(&mut self, range: VersionRange) -> bool {
        // First existing range that could touch `range`: the one whose
        // end reaches range.start (adjacency counts as touching).
        let first = self.ranges.partition_point(|r| r.end < range.start());
        // One past the last range that touches `range`.
        let last = self.ranges.partition_point(|r| r.start <= range.end());

        if first == last {
            self.ranges.insert(first, range);
            return true;
        }

        let start = self.ranges[first].start().min(range.start());
        let end = self.ranges[last - 1].end().max(range.end());

        if first + 1 == last && self.ranges[first] == VersionRange::new(start, end) {
            return false;
        }

        self.ranges
            .splice(first..last, [VersionRange::new(start, end)]);
        true
    }

    /// Merges a sorted collection in via a two-pointer sweep, O(n + m).
    pub fn merge(&mut self, other: &VersionRangeCollection) {
        if other.ranges.is_empty() {
            return;
        }

        if self.ranges.is_empty() {
            self.ranges = other.ranges.clone();
            return;
        }

        let mut merged = Vec::with_capacity(self.ranges.len() + other.ranges.len());
        let mut left = self.ranges.iter().copied().peekable();
        let mut right = other.ranges.iter().copied().peekable();

        let push = |merged: &mut Vec<VersionRange>, next: VersionRange| {
            match merged.last_mut() {
                // Overlapping or adjacent with the accumulated tail.
                Some(tail) if next.start() <= tail.end() => {
                    if next.end() > tail.end() {
                        *tail = VersionRange::new(tail.start(), next.end());
                    }
                }
                _ => merged.push(next),
            }
        };

        loop {
            let take_left = match (left.peek(), right.peek()) {
                (Some(l), Some(r)) => l.start() <= r.start(),
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };

            let next = if take_left {
                left.next().unwrap()
            } else {
                right.next().unwrap()
            };

            push(&mut merged, next);
        }

        self.ranges = merged;
    }

    pub fn remove_version(&mut self, version: i64) -> bool {
        self.remove(VersionRange::new(version, version + 1))
    }

    /// Removes a sub-range, splitting a containing range into up to two
    /// remainders.
    pub fn remove(&mut self, range: VersionRange) -> bool {
        let first = self.ranges.partition_point(|r| r.end <= range.start());
        let last = self.ranges.partition_point(|r| r.start < range.end());

        if first == last {
            return false;
        }

        let mut replacement = Vec::with_capacity(2);
        if self.ranges[first].start() < range.start() {
            replacement.push(VersionRange::new(self.ranges[first].start(), range.start()));
        }
        if self.ranges[last - 1].end() > range.end() {
            replacement.push(VersionRange::new(range.end(), self.ranges[last - 1].end()));
        }

        self.ranges.splice(first..last, replacement);
        true
    }

    /// Removes every version present in a sorted collection, using the
    /// same two-pointer technique as `merge`.
    pub fn remove_collection(&mut self, other: &VersionRangeCollection) {
        if self.ranges.is_empty() || other.ranges.is_empty() {
            return;
        }

        let mut result = Vec::with_capacity(self.ranges.len() + other.ranges.len());
        let mut holes = other.ranges.iter().copied().peekable();

        for kept in self.ranges.iter().copied() {
            let mut start = kept.start();

            loop {
                // Skip holes entirely before the surviving prefix.
                while holes.peek().is_some_and(|h| h.end <= start) {
                    holes.next();
                }

                match holes.peek() {
                    Some(hole) if hole.start < kept.end() => {
                        if hole.start > start {
                            result.push(VersionRange::new(start, hole.start));
                        }
                        start = hole.end;
                        if start >= kept.end() {
                            break;
                        }
                    }
                    _ => {
                        if start < kept.end() {
                            result.push(VersionRange::new(start, kept.end()));
                        }
                        break;
                    }
                }
            }
        }

        self.ranges = result;
    }

    /// Truncates the collection at a version boundary: `self` keeps
    /// everything below `end_version`, the suffix is returned.
    pub fn split(&mut self, end_version: i64) -> VersionRangeCollection {
        let mut remainder = VersionRangeCollection::new(end_version);

        let boundary = self.ranges.partition_point(|r| r.end <= end_version);
        let mut suffix: Vec<VersionRange> = self.ranges.split_off(boundary);

        if let Some(straddling) = suffix.first_mut().filter(|r| r.start < end_version) {
            self.ranges
                .push(VersionRange::new(straddling.start(), end_version));
            *straddling = VersionRange::new(end_version, straddling.end());
        }

        remainder.ranges = suffix;
        remainder
    }

    pub fn contains(&self, version: i64) -> bool {
        self.contains_with_end(version).is_some()
    }

    /// Binary-search membership test; on a hit returns the end of the
    /// containing range.
    pub fn contains_with_end(&self, version: i64) -> Option<i64> {
        let idx = self.ranges.partition_point(|r| r.end <= version);
        self.ranges
            .get(idx)
            .filter(|r| r.contains(version))
            .map(VersionRange::end)
    }
}

impl fmt::Display for VersionRangeCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for range in &self.ranges {
            write!(f, "{}", range)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{VersionRange, VersionRangeCollection};

    /// Naive quadratic merge used only as a cross-check oracle.
    fn naive_merge(
        base: &VersionRangeCollection,
        other: &VersionRangeCollection,
    ) -> VersionRangeCollection {
        let mut result = base.clone();
        for range in other.ranges() {
            result.add(*range);
        }
        result
    }

    fn collect(ranges: &[(i64, i64)]) -> VersionRangeCollection {
        let mut vrc = VersionRangeCollection::default();
        for (start, end) in ranges {
            vrc.add_range(*start, *end);
        }
        vrc
    }

    fn assert_ranges(vrc: &VersionRangeCollection, expected: &[(i64, i64)]) {
        let actual: Vec<(i64, i64)> = vrc
            .ranges()
            .iter()
            .map(|r| (r.start(), r.end()))
            .collect();
        assert_eq!(actual, expected, "{}", vrc);
    }

    #[test]
    #[should_panic]
    fn test_inverted_range() {
        VersionRange::new(5, 5);
    }

    #[test]
    fn test_add_coalesces() {
        let mut vrc = VersionRangeCollection::default();

        assert!(vrc.add_range(10, 15));
        assert!(vrc.add_range(0, 5));
        assert!(vrc.add_range(3, 12));
        assert!(vrc.add_range(20, 50));

        assert_ranges(&vrc, &[(0, 15), (20, 50)]);

        // Fully covered insert does not change the collection.
        assert!(!vrc.add_range(21, 30));

        // Adjacent ranges must fuse.
        assert!(vrc.add_range(15, 20));
        assert_ranges(&vrc, &[(0, 50)]);
    }

    #[test]
    fn test_start_end_version() {
        let mut vrc = VersionRangeCollection::new(7);
        assert_eq!(vrc.start_version(), 7);
        assert_eq!(vrc.end_version(), 7);

        vrc.add_range(10, 15);
        vrc.add_range(20, 25);
        assert_eq!(vrc.start_version(), 10);
        assert_eq!(vrc.end_version(), 25);
    }

    #[test]
    fn test_merge_closes_gap() {
        let mut vrc = VersionRangeCollection::new(1);
        vrc.add_range(1, 5);
        vrc.add_range(10, 15);

        vrc.merge(&VersionRangeCollection::with_range(5, 10));

        assert_ranges(&vrc, &[(1, 15)]);
    }

    #[test]
    fn test_merge_matches_naive_oracle() {
        let cases: &[(&[(i64, i64)], &[(i64, i64)])] = &[
            (&[(0, 5), (10, 15)], &[(5, 10)]),
            (&[(0, 1), (4, 6)], &[(2, 3), (7, 9)]),
            (&[(-5, -2), (0, 3)], &[(-2, 0), (3, 4), (10, 11)]),
            (&[(0, 100)], &[(5, 10), (50, 60)]),
            (&[], &[(1, 2)]),
            (&[(1, 2)], &[]),
            (&[(0, 2), (4, 6), (8, 10)], &[(1, 9)]),
        ];

        for (left, right) in cases {
            let mut merged = collect(left);
            let other = collect(right);
            let expected = naive_merge(&merged, &other);

            merged.merge(&other);

            assert_eq!(merged, expected);

            // No two ranges overlapping or adjacent.
            for pair in merged.ranges().windows(2) {
                assert!(pair[0].end() < pair[1].start(), "{}", merged);
            }

            // Membership is the union of both inputs.
            for v in -10..110 {
                let in_union = collect(left).contains(v) || collect(right).contains(v);
                assert_eq!(merged.contains(v), in_union, "version {}", v);
            }
        }
    }

    #[test]
    fn test_remove_splits() {
        let mut vrc = collect(&[(0, 5)]);
        vrc.remove(VersionRange::new(1, 4));
        assert_ranges(&vrc, &[(0, 1), (4, 5)]);

        let mut vrc = collect(&[(0, 5), (6, 11)]);
        vrc.remove(VersionRange::new(4, 7));
        assert_ranges(&vrc, &[(0, 4), (7, 11)]);

        let mut vrc = collect(&[(0, 5), (6, 11)]);
        vrc.remove(VersionRange::new(2, 9));
        assert_ranges(&vrc, &[(0, 2), (9, 11)]);

        let mut vrc = collect(&[(0, 1)]);
        assert!(!vrc.remove(VersionRange::new(1, 2)));
        assert!(!vrc.remove(VersionRange::new(-1, 0)));
        assert_ranges(&vrc, &[(0, 1)]);

        assert!(vrc.remove_version(0));
        assert!(vrc.is_empty());
    }

    #[test]
    fn test_remove_collection() {
        let mut vrc = collect(&[(0, 7)]);
        vrc.remove_collection(&collect(&[(1, 2), (3, 4), (5, 6)]));
        assert_ranges(&vrc, &[(0, 1), (2, 3), (4, 5), (6, 7)]);

        let mut vrc = collect(&[(40, 80)]);
        vrc.remove_collection(&collect(&[(0, 15), (20, 50)]));
        assert_ranges(&vrc, &[(50, 80)]);

        let mut vrc = collect(&[(0, 5), (6, 11)]);
        vrc.remove_collection(&collect(&[(0, 5), (6, 11)]));
        assert!(vrc.is_empty());

        let mut vrc = collect(&[(0, 1)]);
        vrc.remove_collection(&VersionRangeCollection::default());
        assert_ranges(&vrc, &[(0, 1)]);
    }

    #[test]
    fn test_remove_then_readd_restores_membership() {
        let original = collect(&[(0, 10), (15, 20)]);
        let mut vrc = original.clone();

        vrc.remove(VersionRange::new(5, 17));
        vrc.add_range(5, 17);

        for v in -5..25 {
            assert_eq!(vrc.contains(v), original.contains(v), "version {}", v);
        }
    }

    #[test]
    fn test_split() {
        let mut vrc = collect(&[(0, 5), (10, 20)]);

        let remainder = vrc.split(15);

        assert_ranges(&vrc, &[(0, 5), (10, 15)]);
        assert_ranges(&remainder, &[(15, 20)]);

        // Boundary not inside any range.
        let mut vrc = collect(&[(0, 5), (10, 20)]);
        let remainder = vrc.split(7);

        assert_ranges(&vrc, &[(0, 5)]);
        assert_ranges(&remainder, &[(10, 20)]);

        // Boundary past the end leaves nothing behind.
        let mut vrc = collect(&[(0, 5)]);
        let remainder = vrc.split(100);
        assert_ranges(&vrc, &[(0, 5)]);
        assert!(remainder.is_empty());
        assert_eq!(remainder.end_version(), 100);
    }

    #[test]
    fn test_contains_with_end() {
        let vrc = collect(&[(-5, -4), (-3, -1), (0, 3)]);

        assert_eq!(vrc.contains_with_end(-5), Some(-4));
        assert_eq!(vrc.contains_with_end(-2), Some(-1));
        assert_eq!(vrc.contains_with_end(2), Some(3));
        assert_eq!(vrc.contains_with_end(-4), None);
        assert_eq!(vrc.contains_with_end(3), None);
        assert!(!vrc.contains(-6));
    }
}
