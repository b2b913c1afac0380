//! Path partitions: concurrency buckets selected by longest path-prefix match.
//!
//! Configuration string: `"<global>:<prefix>,<count>;<prefix>,<count>;..."`, e.g.
//! `"4:/mnt/hdd,1;/mnt/nas,2"`. A bare `"4"` declares only the global limit. Every set has an
//! implicit catch-all partition (empty prefix) capped at the global limit.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One declared partition: paths starting with `prefix` share `concurrency_limit` streams.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathPartition {
    pub prefix: String,
    pub concurrency_limit: usize,
}

impl PathPartition {
    /// The limit is checked when the partition joins a [`PartitionSet`].
    pub fn new(prefix: impl Into<String>, concurrency_limit: usize) -> Self {
        Self {
            prefix: prefix.into(),
            concurrency_limit,
        }
    }
}

/// Global limit plus declared partitions, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionSet {
    pub global_limit: usize,
    pub partitions: Vec<PathPartition>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionParseError {
    #[error("invalid global concurrency count {0:?}")]
    InvalidGlobal(String),
    #[error("partition {0:?} is not in <path>,<count> form")]
    MalformedPartition(String),
    #[error("invalid concurrency count {count:?} for partition {prefix:?}")]
    InvalidCount { prefix: String, count: String },
    #[error("concurrency counts must be at least 1")]
    ZeroLimit,
}

impl PartitionSet {
    /// Fails with [`PartitionParseError::ZeroLimit`] if the global limit or any partition limit
    /// is 0, since such a partition could never admit a stream.
    pub fn new(
        global_limit: usize,
        partitions: Vec<PathPartition>,
    ) -> Result<Self, PartitionParseError> {
        if global_limit == 0 || partitions.iter().any(|p| p.concurrency_limit == 0) {
            return Err(PartitionParseError::ZeroLimit);
        }
        Ok(Self {
            global_limit,
            partitions,
        })
    }

    /// Only the catch-all partition.
    pub fn global_only(global_limit: usize) -> Result<Self, PartitionParseError> {
        Self::new(global_limit, Vec::new())
    }

    /// Index of the partition owning `path`: the longest declared prefix that matches, or
    /// `self.partitions.len()` for the catch-all. Ordinal (byte-exact) comparison.
    pub fn partition_index(&self, path: &str) -> usize {
        self.partitions
            .iter()
            .enumerate()
            .filter(|(_, p)| path.starts_with(p.prefix.as_str()))
            .max_by_key(|(i, p)| (p.prefix.len(), std::cmp::Reverse(*i)))
            .map(|(i, _)| i)
            .unwrap_or(self.partitions.len())
    }

    /// Prefix and limit for a partition index, including the catch-all.
    pub fn describe(&self, index: usize) -> (&str, usize) {
        match self.partitions.get(index) {
            Some(p) => (p.prefix.as_str(), p.concurrency_limit),
            None => ("", self.global_limit),
        }
    }

    /// Number of partitions including the catch-all.
    pub fn len_with_catch_all(&self) -> usize {
        self.partitions.len() + 1
    }
}

fn parse_count(s: &str) -> Option<usize> {
    s.trim().parse::<usize>().ok()
}

impl FromStr for PartitionSet {
    type Err = PartitionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (global, rest) = match s.split_once(':') {
            Some((g, r)) => (g, Some(r)),
            None => (s, None),
        };
        let global_limit =
            parse_count(global).ok_or_else(|| PartitionParseError::InvalidGlobal(global.into()))?;
        if global_limit == 0 {
            return Err(PartitionParseError::ZeroLimit);
        }

        let mut partitions = Vec::new();
        for item in rest.into_iter().flat_map(|r| r.split(';')) {
            if item.trim().is_empty() {
                continue;
            }
            // Split on the last comma so prefixes may contain commas.
            let (prefix, count) = item
                .rsplit_once(',')
                .ok_or_else(|| PartitionParseError::MalformedPartition(item.into()))?;
            let limit = parse_count(count).ok_or_else(|| PartitionParseError::InvalidCount {
                prefix: prefix.into(),
                count: count.into(),
            })?;
            if limit == 0 {
                return Err(PartitionParseError::ZeroLimit);
            }
            partitions.push(PathPartition::new(prefix, limit));
        }
        Self::new(global_limit, partitions)
    }
}

impl fmt::Display for PartitionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.global_limit)?;
        if !self.partitions.is_empty() {
            let items: Vec<String> = self
                .partitions
                .iter()
                .map(|p| format!("{},{}", p.prefix, p.concurrency_limit))
                .collect();
            write!(f, ":{}", items.join(";"))?;
        }
        Ok(())
    }
}
