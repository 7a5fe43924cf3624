//! Stratified, seeded train/validation/test splitting

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::debug;

use tsa_common::config::validate_fractions;
use tsa_common::models::{Sentiment, TrainingSample, NUM_CLASSES};

use crate::error::RetrainError;

/// The three partitions of a pool
#[derive(Debug, Clone, Default)]
pub struct DatasetSplit {
    pub train: Vec<TrainingSample>,
    pub val: Vec<TrainingSample>,
    pub test: Vec<TrainingSample>,
}

impl DatasetSplit {
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Label-stratified splitter
///
/// Each class is shuffled with one seeded RNG and cut with the same
/// fractions. Partition totals are `round(N * fraction)`, distributed over
/// the classes by largest remainder.
#[derive(Debug, Clone)]
pub struct DatasetSplitter {
    test_fraction: f64,
    val_fraction: f64,
    seed: u64,
}

impl DatasetSplitter {
    pub fn new(test_fraction: f64, val_fraction: f64, seed: u64) -> Result<Self, RetrainError> {
        validate_fractions(test_fraction, val_fraction)
            .map_err(|e| RetrainError::Config(e.to_string()))?;
        Ok(Self {
            test_fraction,
            val_fraction,
            seed,
        })
    }

    pub fn split(&self, samples: Vec<TrainingSample>) -> Result<DatasetSplit, RetrainError> {
        let total = samples.len();
        let mut strata: BTreeMap<Sentiment, Vec<TrainingSample>> = BTreeMap::new();
        for sample in samples {
            strata.entry(sample.label).or_default().push(sample);
        }

        for (label, members) in &strata {
            if members.len() < NUM_CLASSES {
                return Err(RetrainError::InsufficientData(format!(
                    "class '{}' has {} samples, need at least {}",
                    label,
                    members.len(),
                    NUM_CLASSES
                )));
            }
        }

        let sizes: Vec<usize> = strata.values().map(Vec::len).collect();
        let test_sizes = allocate(&sizes, self.test_fraction, total);
        let remaining: Vec<usize> = sizes.iter().zip(&test_sizes).map(|(n, t)| n - t).collect();
        let mut val_sizes = allocate(&sizes, self.val_fraction, total);
        for (val, room) in val_sizes.iter_mut().zip(&remaining) {
            *val = (*val).min(*room);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut split = DatasetSplit::default();

        for ((_, mut members), (n_test, n_val)) in strata
            .into_iter()
            .zip(test_sizes.into_iter().zip(val_sizes))
        {
            // Shuffle from a canonical order so storage order never matters
            members.sort_by_key(|s| s.id);
            members.shuffle(&mut rng);

            let mut rest = members.split_off(n_test);
            let train = rest.split_off(n_val);
            split.test.extend(members);
            split.val.extend(rest);
            split.train.extend(train);
        }

        for (name, part) in [("train", &split.train), ("val", &split.val), ("test", &split.test)] {
            if part.len() < NUM_CLASSES {
                return Err(RetrainError::InsufficientData(format!(
                    "{} split would have {} samples, need at least {}",
                    name,
                    part.len(),
                    NUM_CLASSES
                )));
            }
        }

        debug!(
            total,
            train = split.train.len(),
            val = split.val.len(),
            test = split.test.len(),
            "Split dataset"
        );
        Ok(split)
    }
}

/// Per-class share of `round(total * fraction)`, by largest remainder
fn allocate(sizes: &[usize], fraction: f64, total: usize) -> Vec<usize> {
    let target = (total as f64 * fraction).round() as usize;
    let exact: Vec<f64> = sizes.iter().map(|&n| n as f64 * fraction).collect();
    let mut alloc: Vec<usize> = exact.iter().map(|x| x.floor() as usize).collect();

    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });

    let mut missing = target.saturating_sub(alloc.iter().sum());
    for &i in order.iter().cycle().take(order.len() * 2) {
        if missing == 0 {
            break;
        }
        if alloc[i] < sizes[i] {
            alloc[i] += 1;
            missing -= 1;
        }
    }
    alloc
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn pool(counts: [usize; 3]) -> Vec<TrainingSample> {
        let mut id = 0;
        let mut samples = Vec::new();
        for (label, count) in Sentiment::ALL.iter().zip(counts) {
            for _ in 0..count {
                id += 1;
                samples.push(TrainingSample {
                    id,
                    text: format!("sample {}", id),
                    label: *label,
                    source: "test".to_string(),
                    used_for_training: false,
                    created_at: Utc::now(),
                    training_batch_id: None,
                });
            }
        }
        samples
    }

    fn ids(samples: &[TrainingSample]) -> Vec<i64> {
        samples.iter().map(|s| s.id).collect()
    }

    #[test]
    fn sizes_follow_fractions() {
        let splitter = DatasetSplitter::new(0.2, 0.1, 42).unwrap();
        let split = splitter.split(pool([34, 33, 33])).unwrap();

        assert_eq!(split.len(), 100);
        assert_eq!(split.test.len(), 20);
        assert_eq!(split.val.len(), 10);
        assert_eq!(split.train.len(), 70);
    }

    #[test]
    fn total_preserved_for_odd_sizes() {
        let splitter = DatasetSplitter::new(0.2, 0.1, 7).unwrap();
        for n in [30usize, 31, 47, 101, 333] {
            let counts = [n / 3, n / 3, n - 2 * (n / 3)];
            let split = splitter.split(pool(counts)).unwrap();
            assert_eq!(split.len(), n);
            assert!((split.test.len() as f64 - 0.2 * n as f64).abs() <= 1.0);
            assert!((split.val.len() as f64 - 0.1 * n as f64).abs() <= 1.0);
        }
    }

    #[test]
    fn every_class_appears_in_every_partition() {
        let splitter = DatasetSplitter::new(0.2, 0.1, 42).unwrap();
        let split = splitter.split(pool([40, 40, 40])).unwrap();
        for part in [&split.train, &split.val, &split.test] {
            for label in Sentiment::ALL {
                assert!(part.iter().any(|s| s.label == label), "{label} missing");
            }
        }
    }

    #[test]
    fn deterministic_for_seed() {
        let a = DatasetSplitter::new(0.2, 0.1, 42).unwrap().split(pool([20, 20, 20])).unwrap();
        let mut shuffled = pool([20, 20, 20]);
        shuffled.reverse();
        let b = DatasetSplitter::new(0.2, 0.1, 42).unwrap().split(shuffled).unwrap();

        assert_eq!(ids(&a.train), ids(&b.train));
        assert_eq!(ids(&a.val), ids(&b.val));
        assert_eq!(ids(&a.test), ids(&b.test));
    }

    #[test]
    fn different_seed_changes_assignment() {
        let a = DatasetSplitter::new(0.2, 0.1, 1).unwrap().split(pool([50, 50, 50])).unwrap();
        let b = DatasetSplitter::new(0.2, 0.1, 2).unwrap().split(pool([50, 50, 50])).unwrap();
        assert_ne!(ids(&a.test), ids(&b.test));
    }

    #[test]
    fn small_stratum_is_insufficient() {
        let splitter = DatasetSplitter::new(0.2, 0.1, 42).unwrap();
        let err = splitter.split(pool([30, 30, 2])).unwrap_err();
        assert!(matches!(err, RetrainError::InsufficientData(_)));
    }

    #[test]
    fn tiny_partition_is_insufficient() {
        let splitter = DatasetSplitter::new(0.2, 0.1, 42).unwrap();
        // val would be round(9 * 0.1) = 1 sample
        let err = splitter.split(pool([3, 3, 3])).unwrap_err();
        assert!(matches!(err, RetrainError::InsufficientData(_)));
    }

    #[test]
    fn rejects_invalid_fractions() {
        for (t, v) in [(0.0, 0.1), (0.2, 0.0), (0.6, 0.4), (1.2, 0.1), (-0.1, 0.1)] {
            let err = DatasetSplitter::new(t, v, 42).unwrap_err();
            assert!(matches!(err, RetrainError::Config(_)), "({t}, {v})");
        }
    }
}
