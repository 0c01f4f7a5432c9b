//! Range-plan computation and the chunk emission discipline.
//!
//! Kept free of I/O so the scenarios in the specification's testable
//! properties can be checked without a running backend.

/// The derived parameters that translate an arbitrary inclusive byte range
/// into a sequence of aligned chunk fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePlan {
    /// Aligned chunk start; always a multiple of `chunk_size`.
    pub offset: i64,
    /// Bytes to drop from the head chunk.
    pub first_cut: i64,
    /// Bytes to keep from the tail chunk.
    pub last_cut: i64,
    /// Total number of chunk fetches this plan issues.
    pub part_count: u64,
    pub chunk_size: i64,
}

impl RangePlan {
    /// Computes the plan for inclusive byte range `[range_start, range_end]`
    /// given a fixed `chunk_size`.
    ///
    /// Panics if `range_start > range_end` or `chunk_size <= 0` — both are
    /// caller preconditions (spec §6: "caller is responsible for HTTP range
    /// parsing").
    pub fn compute(range_start: i64, range_end: i64, chunk_size: i64) -> Self {
        assert!(chunk_size > 0, "chunk_size must be positive");
        assert!(
            range_start <= range_end,
            "range_start must not exceed range_end"
        );

        let offset = range_start - (range_start % chunk_size);
        let first_cut = range_start % chunk_size;
        let last_cut = (range_end % chunk_size) + 1;

        // Widen to i128: a caller streaming "whole file, size unknown" (e.g.
        // no `Range` header) passes `range_end = i64::MAX`, and `range_end +
        // 1` would overflow `i64`. `part_count` itself is clamped back into
        // `u64` since no real file has more parts than that.
        let part_count_128 = div_ceil_i128(
            range_end as i128 + 1,
            chunk_size as i128,
        ) - (range_start as i128 / chunk_size as i128);
        let part_count = part_count_128.clamp(1, u64::MAX as i128) as u64;

        Self {
            offset,
            first_cut,
            last_cut,
            part_count,
            chunk_size,
        }
    }

    /// The offset to fetch for the `current`-th part (1-indexed).
    pub fn offset_for_part(&self, current: u64) -> i64 {
        let offset = self.offset as i128 + (current as i128 - 1) * self.chunk_size as i128;
        offset.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// Trims a raw fetched chunk according to its position in the plan.
    ///
    /// `current` is 1-indexed. Returns the slice of `chunk` that should be
    /// emitted for this part.
    pub fn trim<'a>(&self, current: u64, chunk: &'a [u8]) -> &'a [u8] {
        if self.part_count == 1 {
            let first = self.first_cut as usize;
            let last = (self.last_cut as usize).min(chunk.len());
            &chunk[first.min(chunk.len())..last]
        } else if current == 1 {
            let first = (self.first_cut as usize).min(chunk.len());
            &chunk[first..]
        } else if current == self.part_count {
            let last = (self.last_cut as usize).min(chunk.len());
            &chunk[..last]
        } else {
            chunk
        }
    }
}

fn div_ceil_i128(a: i128, b: i128) -> i128 {
    (a + b - 1) / b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_aligned_single_chunk_range() {
        let plan = RangePlan::compute(0, 1_048_575, 1_048_576);
        assert_eq!(plan.part_count, 1);
        assert_eq!(plan.first_cut, 0);
        assert_eq!(plan.last_cut, 1_048_576);
        assert_eq!(plan.offset_for_part(1), 0);

        let chunk = vec![7u8; 1_048_576];
        assert_eq!(plan.trim(1, &chunk).len(), 1_048_576);
    }

    #[test]
    fn s2_unaligned_multi_chunk_range() {
        let plan = RangePlan::compute(500, 3_145_727, 1_048_576);
        assert_eq!(plan.offset, 0);
        assert_eq!(plan.first_cut, 500);
        assert_eq!(plan.last_cut, 1_048_576);
        assert_eq!(plan.part_count, 3);

        assert_eq!(plan.offset_for_part(1), 0);
        assert_eq!(plan.offset_for_part(2), 1_048_576);
        assert_eq!(plan.offset_for_part(3), 2_097_152);

        let chunk = vec![1u8; 1_048_576];
        let emitted: Vec<usize> = (1..=plan.part_count)
            .map(|part| plan.trim(part, &chunk).len())
            .collect();
        assert_eq!(emitted, vec![1_048_076, 1_048_576, 1_048_576]);
        assert_eq!(
            emitted.iter().sum::<usize>(),
            (3_145_727 - 500 + 1) as usize
        );
    }

    #[test]
    fn s3_tail_trim_unaligned_end() {
        let plan = RangePlan::compute(1_048_576, 1_600_000, 1_048_576);
        assert_eq!(plan.part_count, 1);
        assert_eq!(plan.first_cut, 0);
        assert_eq!(plan.last_cut, 551_425);
        assert_eq!(plan.offset_for_part(1), 1_048_576);

        let chunk = vec![9u8; 1_048_576];
        assert_eq!(plan.trim(1, &chunk).len(), 551_425);
    }

    #[test]
    fn trim_identities_hold_for_multi_part_plan() {
        let plan = RangePlan::compute(500, 3_145_727, 1_048_576);
        let chunk = vec![3u8; 1_048_576];

        assert_eq!(
            plan.first_cut as usize + plan.trim(1, &chunk).len(),
            plan.chunk_size as usize
        );
        assert_eq!(
            plan.trim(plan.part_count, &chunk).len(),
            plan.last_cut as usize
        );
    }

    #[test]
    fn trim_identity_holds_for_single_part_plan() {
        let plan = RangePlan::compute(1_048_576, 1_600_000, 1_048_576);
        let chunk = vec![3u8; 1_048_576];
        assert_eq!(
            plan.trim(1, &chunk).len(),
            (plan.last_cut - plan.first_cut) as usize
        );
    }

    #[test]
    fn range_end_of_i64_max_does_not_overflow() {
        // `http.rs` uses `i64::MAX` as the range end for a request with no
        // `Range` header (whole file, size unknown to the gateway).
        let plan = RangePlan::compute(0, i64::MAX, 1_048_576);
        assert_eq!(plan.offset, 0);
        assert_eq!(plan.first_cut, 0);
        assert_eq!(plan.offset_for_part(1), 0);
        assert_eq!(plan.offset_for_part(2), 1_048_576);
    }

    #[test]
    fn every_offset_is_chunk_aligned() {
        let plan = RangePlan::compute(12_345, 5_000_000, 1_048_576);
        for part in 1..=plan.part_count {
            assert_eq!(plan.offset_for_part(part) % plan.chunk_size, 0);
        }
    }

    #[test]
    fn byte_exactness_over_many_ranges() {
        let file_size: i64 = 4_500_000;
        let chunk_size: i64 = 1_048_576;
        let file: Vec<u8> = (0..file_size).map(|i| (i % 256) as u8).collect();

        for (start, end) in [
            (0i64, 0i64),
            (0, file_size - 1),
            (500, 3_145_727),
            (1_048_576, 1_600_000),
            (17, 4_499_999),
            (4_499_999, 4_499_999),
        ] {
            let plan = RangePlan::compute(start, end, chunk_size);
            let mut emitted = Vec::new();
            for part in 1..=plan.part_count {
                let offset = plan.offset_for_part(part) as usize;
                let limit = chunk_size as usize;
                let raw = &file[offset..(offset + limit).min(file.len())];
                emitted.extend_from_slice(plan.trim(part, raw));
            }
            assert_eq!(emitted, file[start as usize..=end as usize]);
        }
    }
}
