//! Key → partition mapping.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::types::{Error, Result, TransportConfig};

/// Pure key-to-partition function.
///
/// Known categories are pinned to fixed partitions; any other key falls back
/// to a hash of the key modulo the partition count.
#[derive(Debug, Clone)]
pub struct PartitionRouter {
    num_partitions: u32,
    pinned: BTreeMap<String, u32>,
}

impl PartitionRouter {
    pub fn new(num_partitions: u32, pinned: BTreeMap<String, u32>) -> Result<Self> {
        if num_partitions == 0 {
            return Err(Error::validation("num_partitions must be at least 1"));
        }
        if let Some((key, partition)) = pinned.iter().find(|(_, p)| **p >= num_partitions) {
            return Err(Error::validation(format!(
                "partition {} for '{}' is out of range (num_partitions={})",
                partition, key, num_partitions
            )));
        }
        Ok(Self {
            num_partitions,
            pinned,
        })
    }

    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        Self::new(config.num_partitions, config.partition_map.clone())
    }

    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    pub fn is_pinned(&self, key: &str) -> bool {
        self.pinned.contains_key(key)
    }

    pub fn partition_for(&self, key: &str) -> u32 {
        if let Some(partition) = self.pinned.get(key) {
            return *partition;
        }
        // DefaultHasher::new() uses fixed keys, so this is stable for a given build.
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % u64::from(self.num_partitions)) as u32
    }
}

impl Default for PartitionRouter {
    fn default() -> Self {
        let config = TransportConfig::default();
        Self {
            num_partitions: config.num_partitions,
            pinned: config.partition_map,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_sectors_are_pinned() {
        let router = PartitionRouter::default();
        assert_eq!(router.partition_for("XLK"), 0);
        assert_eq!(router.partition_for("XLE"), 6);
        assert_eq!(router.partition_for("XLRE"), 10);
        assert!(router.is_pinned("XLF"));
    }

    #[test]
    fn test_unknown_key_hashes_in_range_and_is_deterministic() {
        let router = PartitionRouter::default();
        for key in ["AAPL", "MSFT", "a-random-key", ""] {
            let p = router.partition_for(key);
            assert!(p < router.num_partitions());
            assert_eq!(p, router.partition_for(key));
        }
        assert!(!router.is_pinned("AAPL"));
    }

    #[test]
    fn test_rejects_invalid_tables() {
        assert!(PartitionRouter::new(0, BTreeMap::new()).is_err());

        let mut pinned = BTreeMap::new();
        pinned.insert("XLK".to_string(), 3);
        assert!(PartitionRouter::new(3, pinned).is_err());
    }
}
