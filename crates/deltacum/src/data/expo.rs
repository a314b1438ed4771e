//! Exponential-histogram bucket arithmetic: offset-aligned merging and
//! zero-bucket widening.
//!
//! Buckets are addressed by a signed exponent index. At `scale`, bucket `k`
//! covers `(base^k, base^(k+1)]` with `base = 2^(2^-scale)`, so the lower
//! boundary of bucket `k` is `2^(k·2^-scale)`. The positive and negative
//! sides of a histogram are symmetric and use the same layout.

use super::ExpHistogram;

/// One side of an exponential histogram: a dense run of counts starting at
/// bucket index `offset`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Buckets {
    offset: i32,
    counts: Vec<u64>,
}

impl Buckets {
    pub fn new(offset: i32, counts: Vec<u64>) -> Self {
        Self { offset, counts }
    }

    /// Index of the first bucket.
    pub fn offset(&self) -> i32 {
        self.offset
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all bucket counts.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// One past the index of the last bucket.
    fn end(&self) -> i32 {
        self.offset + self.counts.len() as i32
    }

    /// Removes every bucket with index below `limit`, returning the sum of
    /// the removed counts.
    fn absorb_below(&mut self, limit: i32) -> u64 {
        if self.counts.is_empty() || limit <= self.offset {
            return 0;
        }
        let cut = ((limit - self.offset) as usize).min(self.counts.len());
        let absorbed = self.counts.drain(..cut).sum();
        self.offset = limit;
        absorbed
    }
}

/// Aligns `from` onto `into` and sums counts elementwise. The result covers
/// the union of both index ranges.
pub fn merge(into: &mut Buckets, from: &Buckets) {
    if from.counts.is_empty() {
        return;
    }
    if into.counts.is_empty() {
        into.clone_from(from);
        return;
    }

    let offset = into.offset.min(from.offset);
    let end = into.end().max(from.end());
    let mut counts = vec![0u64; (end - offset) as usize];
    for (i, count) in into.counts.iter().enumerate() {
        counts[(into.offset - offset) as usize + i] += count;
    }
    for (i, count) in from.counts.iter().enumerate() {
        counts[(from.offset - offset) as usize + i] += count;
    }
    into.offset = offset;
    into.counts = counts;
}

/// Lower boundary of bucket `index`: `2^(index·2^-scale)`.
fn lower_boundary(index: i32, scale: i32) -> f64 {
    (f64::from(index) * (-f64::from(scale)).exp2()).exp2()
}

/// The smallest bucket index whose lower boundary is at or above
/// `threshold`. Every bucket below it lies wholly inside the zero region.
fn zero_limit_index(scale: i32, threshold: f64) -> i32 {
    let step = (-f64::from(scale)).exp2();
    let mut index = (threshold.log2() / step).ceil() as i32;
    // float error guard: pin the index to the boundary conditions
    while lower_boundary(index - 1, scale) >= threshold {
        index -= 1;
    }
    while lower_boundary(index, scale) < threshold {
        index += 1;
    }
    index
}

impl ExpHistogram {
    /// Raises the zero threshold to at least `threshold`, absorbing every
    /// bucket that falls below it into the zero bucket.
    ///
    /// The zero region must end on a bucket boundary, so the final
    /// threshold is rounded up to the upper boundary of the last absorbed
    /// bucket. Total count is preserved: whatever leaves the buckets enters
    /// `zero_count`.
    pub fn widen_zero(&mut self, threshold: f64) {
        if threshold <= self.zero_threshold {
            return;
        }
        let limit = zero_limit_index(self.scale, threshold);
        self.zero_count += self.positive.absorb_below(limit);
        self.zero_count += self.negative.absorb_below(limit);
        self.zero_threshold = lower_boundary(limit, self.scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Histogram with identical positive and negative sides, the layout the
    /// widening cases below are written against:
    ///
    /// ```text
    /// -3            -2          -1       0      1      2      3       4
    /// (0.125,0.25], (0.25,0.5], (0.5,1], (1,2], (2,4], (4,8], (8,16], (16,32]
    /// ```
    fn hist(offset: i32, counts: &[u64], zt: f64, zc: u64) -> ExpHistogram {
        let buckets = Buckets::new(offset, counts.to_vec());
        ExpHistogram {
            start: 100,
            time: 110,
            scale: 0,
            count: zc + 2 * buckets.total(),
            zero_count: zc,
            zero_threshold: zt,
            sum: None,
            min: None,
            max: None,
            positive: buckets.clone(),
            negative: buckets,
        }
    }

    fn total(h: &ExpHistogram) -> u64 {
        h.zero_count + h.positive.total() + h.negative.total()
    }

    #[test]
    fn test_widen_zero_noop_on_empty() {
        let mut h = hist(0, &[], 0.0, 0);
        h.widen_zero(0.0);
        assert_eq!(h, hist(0, &[], 0.0, 0));
    }

    #[test]
    fn test_widen_zero_to_bucket_boundary() {
        // zt=2 is the upper boundary of bucket 0: buckets -1 and 0 are
        // absorbed, buckets 1.. survive
        let mut h = hist(-1, &[1, 2, 3, 4, 5], 0.0, 2);
        let before = total(&h);
        h.widen_zero(2.0);

        assert_eq!(h.zero_threshold, 2.0);
        assert_eq!(h.zero_count, 2 + 2 * (1 + 2));
        assert_eq!(h.positive, Buckets::new(1, vec![3, 4, 5]));
        assert_eq!(h.negative, Buckets::new(1, vec![3, 4, 5]));
        assert_eq!(total(&h), before);
    }

    #[test]
    fn test_widen_zero_rounds_up_to_full_bucket() {
        // zt=3 lies inside bucket 1 (2,4]; the threshold must cover full
        // buckets, so it rounds up to 4 and bucket 1 is absorbed as well
        let mut h = hist(-1, &[1, 2, 3, 4, 5], 0.0, 2);
        let before = total(&h);
        h.widen_zero(3.0);

        assert_eq!(h.zero_threshold, 4.0);
        assert_eq!(h.zero_count, 2 + 2 * (1 + 2 + 3));
        assert_eq!(h.positive, Buckets::new(2, vec![4, 5]));
        assert_eq!(h.negative, Buckets::new(2, vec![4, 5]));
        assert_eq!(total(&h), before);
    }

    #[test]
    fn test_widen_zero_absorbs_everything() {
        let mut h = hist(-1, &[1, 2, 3], 0.0, 1);
        h.widen_zero(100.0);
        assert!(h.positive.is_empty());
        assert!(h.negative.is_empty());
        assert_eq!(h.zero_count, 1 + 2 * 6);
        // rounded up to the next boundary ≥ 100: 2^7
        assert_eq!(h.zero_threshold, 128.0);
    }

    #[test]
    fn test_widen_zero_never_narrows() {
        let mut h = hist(0, &[1, 1], 4.0, 3);
        h.widen_zero(2.0);
        assert_eq!(h.zero_threshold, 4.0);
        assert_eq!(h.zero_count, 3);
    }

    #[test]
    fn test_widen_zero_fractional_scale() {
        // scale 1: boundaries at powers of sqrt(2); bucket 2 starts at 2.0
        let mut h = hist(0, &[1, 1, 1], 0.0, 0);
        h.scale = 1;
        h.widen_zero(1.9);
        // the threshold lands exactly on the bucket-2 lower boundary
        assert_eq!(h.zero_threshold, 2.0);
        assert_eq!(h.positive.offset(), 2);
        assert_eq!(h.positive.counts(), &[1]);
        assert_eq!(h.zero_count, 2 * (1 + 1));
    }

    #[test]
    fn test_zero_limit_index_exact_boundary() {
        assert_eq!(zero_limit_index(0, 2.0), 1);
        assert_eq!(zero_limit_index(0, 3.0), 2);
        assert_eq!(zero_limit_index(0, 4.0), 2);
        assert_eq!(zero_limit_index(0, 0.5), -1);
        assert_eq!(zero_limit_index(1, 2.0), 2);
    }

    #[test]
    fn test_merge_overlapping() {
        let mut a = Buckets::new(-1, vec![1, 2, 3]);
        merge(&mut a, &Buckets::new(1, vec![10, 20]));
        assert_eq!(a, Buckets::new(-1, vec![1, 2, 13, 20]));
    }

    #[test]
    fn test_merge_disjoint() {
        let mut a = Buckets::new(0, vec![1]);
        merge(&mut a, &Buckets::new(3, vec![7]));
        assert_eq!(a, Buckets::new(0, vec![1, 0, 0, 7]));
    }

    #[test]
    fn test_merge_into_empty() {
        let mut a = Buckets::default();
        merge(&mut a, &Buckets::new(2, vec![5, 5]));
        assert_eq!(a, Buckets::new(2, vec![5, 5]));
    }

    #[test]
    fn test_merge_from_empty() {
        let mut a = Buckets::new(2, vec![5, 5]);
        merge(&mut a, &Buckets::default());
        assert_eq!(a, Buckets::new(2, vec![5, 5]));
    }
}
