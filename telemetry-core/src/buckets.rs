//! Fixed-width ten-minute time buckets, grounded in the reference resolver's
//! `findOverTimeID`: bucket starts are a multiple of 600s, holes between the
//! last known bucket and a new timestamp are filled with empty buckets, and
//! the per-client column of every bucket tracks the client table 1:1.

use crate::model::QUERY_TYPE_COUNT;

pub const BUCKET_WIDTH_SECS: i64 = 600;

#[derive(Clone, Debug)]
pub struct TimeBucket {
    /// Always a multiple of `BUCKET_WIDTH_SECS`. The bucket's nominal center
    /// (for display) is `start + BUCKET_WIDTH_SECS / 2`.
    pub start: i64,
    pub total: u32,
    pub blocked: u32,
    pub cached: u32,
    pub per_type: [u32; QUERY_TYPE_COUNT],
    pub per_client: Vec<u32>,
}

impl TimeBucket {
    fn empty(start: i64, client_count: usize) -> Self {
        Self {
            start,
            total: 0,
            blocked: 0,
            cached: 0,
            per_type: [0; QUERY_TYPE_COUNT],
            per_client: vec![0; client_count],
        }
    }
}

fn floor_to_bucket(ts: i64) -> i64 {
    ts - ts.rem_euclid(BUCKET_WIDTH_SECS)
}

#[derive(Default)]
pub struct BucketAccumulator {
    buckets: Vec<TimeBucket>,
}

impl BucketAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buckets(&self) -> &[TimeBucket] {
        &self.buckets
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut TimeBucket {
        &mut self.buckets[idx]
    }

    pub fn get(&self, idx: usize) -> &TimeBucket {
        &self.buckets[idx]
    }

    /// Returns the index of the bucket covering `ts`, creating and
    /// zero-filling any intermediate buckets so bucket starts always form an
    /// arithmetic progression with common difference `BUCKET_WIDTH_SECS`.
    /// A timestamp exactly on a bucket boundary belongs to the *new* bucket
    /// that boundary starts (spec.md §8 boundary case).
    pub fn bucket_for(&mut self, ts: i64, client_count: usize) -> usize {
        let target_start = floor_to_bucket(ts);

        if let Some(last) = self.buckets.last() {
            if target_start <= last.start {
                // Look up an existing bucket; system clocks can jump
                // backwards, in which case we fall back to the first bucket
                // whose start matches (or the earliest bucket, never a
                // negative index).
                return self
                    .buckets
                    .iter()
                    .position(|b| b.start == target_start)
                    .unwrap_or(0);
            }
            let mut next_start = last.start + BUCKET_WIDTH_SECS;
            while next_start <= target_start {
                self.buckets.push(TimeBucket::empty(next_start, client_count));
                next_start += BUCKET_WIDTH_SECS;
            }
            return self.buckets.len() - 1;
        }

        self.buckets.push(TimeBucket::empty(target_start, client_count));
        0
    }

    /// Extends every existing bucket's per-client column by one zeroed slot.
    /// Called exactly once, when the entity table gains a new client.
    pub fn extend_clients(&mut self) {
        for bucket in &mut self.buckets {
            bucket.per_client.push(0);
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
