//! Severity timeline bucketing
//!
//! `[begin, end)` is split into `num_buckets` buckets of width
//! `(end - begin) / num_buckets` (integer division). An event lands in bucket
//! `floor((timestamp - begin) / width)`.
//!
//! Events whose index falls outside `0..num_buckets` are left out. This
//! includes `timestamp == end`, which computes to index `num_buckets`, and
//! the tail `[begin + width * num_buckets, end)` left over by the integer
//! division. Skipped events are reported in a debug log.

use crate::error::{EventError, Result};
use crate::model::{EventPoint, Severity};

/// Fixed-width partition of a time range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketGrid {
    begin: i64,
    width: i64,
    count: usize,
}

impl BucketGrid {
    pub fn new(begin: i64, end: i64, num_buckets: usize) -> Result<Self> {
        if num_buckets == 0 {
            return Err(EventError::InvalidArgument(
                "number of buckets must be at least 1".to_string(),
            ));
        }
        if end <= begin {
            return Err(EventError::InvalidArgument(format!(
                "end ({}) must be after begin ({})",
                end, begin
            )));
        }

        // i128 so that spans wider than i64::MAX do not overflow
        let span = end as i128 - begin as i128;
        let width = i64::try_from(span / num_buckets as i128).map_err(|_| {
            EventError::InvalidArgument(format!(
                "range of {}ms is too wide for {} buckets",
                span, num_buckets
            ))
        })?;
        if width == 0 {
            return Err(EventError::InvalidArgument(format!(
                "range of {}ms is too short for {} buckets",
                span, num_buckets
            )));
        }

        Ok(Self {
            begin,
            width,
            count: num_buckets,
        })
    }

    pub fn width(&self) -> i64 {
        self.width
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bucket of `timestamp`, or `None` when it falls outside the grid
    pub fn index_of(&self, timestamp: i64) -> Option<usize> {
        let index = (timestamp as i128 - self.begin as i128).div_euclid(self.width as i128);
        if (0..self.count as i128).contains(&index) {
            Some(index as usize)
        } else {
            None
        }
    }

    /// Start of bucket `index`, saturating past the representable range
    pub fn bucket_start(&self, index: usize) -> i64 {
        let start = self.begin as i128 + self.width as i128 * index as i128;
        start.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

/// Number of events per bucket
pub fn count_buckets(points: &[EventPoint], grid: &BucketGrid) -> Vec<u64> {
    let mut buckets = vec![0u64; grid.len()];
    let mut skipped = 0usize;

    for point in points {
        match grid.index_of(point.timestamp) {
            Some(i) => buckets[i] += 1,
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::debug!(skipped = skipped, buckets = grid.len(), "Events outside bucket grid skipped");
    }

    buckets
}

/// Most severe event per bucket; `None` where no event landed
pub fn severity_buckets(points: &[EventPoint], grid: &BucketGrid) -> Vec<Option<Severity>> {
    let mut buckets: Vec<Option<Severity>> = vec![None; grid.len()];
    let mut skipped = 0usize;

    for point in points {
        match grid.index_of(point.timestamp) {
            Some(i) => {
                if point.severity.is_more_severe_than(buckets[i]) {
                    buckets[i] = Some(point.severity);
                }
            }
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::debug!(skipped = skipped, buckets = grid.len(), "Events outside bucket grid skipped");
    }

    buckets
}
