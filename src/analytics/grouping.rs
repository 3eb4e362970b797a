//! Dimensional grouping of viewer records

use std::collections::{HashMap, HashSet};

use crate::analytics::models::{Metric, RankedSeries, ViewerRecord};

/// Ordered map from dimension key to the records sharing it.
///
/// Buckets iterate in first-seen order of their key and records within a
/// bucket keep input order, so tie order after ranking is deterministic.
#[derive(Debug, Default)]
pub struct GroupedBucket<'a> {
    buckets: Vec<(String, Vec<&'a ViewerRecord>)>,
    index: HashMap<String, usize>,
}

impl<'a> GroupedBucket<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the bucket for `key`, creating it on first use
    pub fn push(&mut self, key: String, record: &'a ViewerRecord) {
        match self.index.get(&key) {
            Some(&slot) => self.buckets[slot].1.push(record),
            None => {
                self.index.insert(key.clone(), self.buckets.len());
                self.buckets.push((key, vec![record]));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&[&'a ViewerRecord]> {
        self.index
            .get(key)
            .map(|&slot| self.buckets[slot].1.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[&'a ViewerRecord])> {
        self.buckets
            .iter()
            .map(|(key, records)| (key.as_str(), records.as_slice()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.buckets.iter().map(|(key, _)| key.as_str())
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total records across all buckets
    pub fn record_count(&self) -> usize {
        self.buckets.iter().map(|(_, records)| records.len()).sum()
    }
}

impl<'a> FromIterator<(String, &'a ViewerRecord)> for GroupedBucket<'a> {
    fn from_iter<I: IntoIterator<Item = (String, &'a ViewerRecord)>>(iter: I) -> Self {
        let mut bucket = GroupedBucket::new();
        for (key, record) in iter {
            bucket.push(key, record);
        }
        bucket
    }
}

/// Group records by `key_fn`; records it maps to `None` are left out.
/// `key_fn` is called exactly once per record, in input order.
pub fn group<'a, F>(records: &'a [ViewerRecord], mut key_fn: F) -> GroupedBucket<'a>
where
    F: FnMut(&ViewerRecord) -> Option<String>,
{
    records
        .iter()
        .filter_map(|record| key_fn(record).map(|key| (key, record)))
        .collect()
}

/// Count distinct identities per bucket, in bucket order (unranked)
pub fn summarize(bucket: &GroupedBucket<'_>, metric: Metric) -> RankedSeries {
    let entries = bucket
        .iter()
        .map(|(key, records)| (key.to_string(), distinct(records.iter().copied(), metric)))
        .collect();

    RankedSeries::new(entries)
}

/// Cardinality of the identity set selected by `metric`
pub fn distinct<'r, I>(records: I, metric: Metric) -> usize
where
    I: IntoIterator<Item = &'r ViewerRecord>,
{
    records
        .into_iter()
        .map(|record| metric.identity(record))
        .collect::<HashSet<&str>>()
        .len()
}
