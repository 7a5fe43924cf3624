//! Classification metrics
//!
//! Accuracy plus macro-averaged precision, recall and F1 over the classes
//! that occur in either the truth or the predictions.

use tsa_common::models::{ModelMetrics, Sentiment, NUM_CLASSES};

/// `K x K` confusion counts, row = truth, column = predicted
#[derive(Debug, Clone, Default)]
pub struct ConfusionMatrix {
    counts: [[u64; NUM_CLASSES]; NUM_CLASSES],
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (Sentiment, Sentiment)>) -> Self {
        let mut cm = Self::new();
        for (truth, predicted) in pairs {
            cm.add(truth, predicted);
        }
        cm
    }

    pub fn add(&mut self, truth: Sentiment, predicted: Sentiment) {
        self.counts[truth.index()][predicted.index()] += 1;
    }

    pub fn get(&self, truth: Sentiment, predicted: Sentiment) -> u64 {
        self.counts[truth.index()][predicted.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: u64 = (0..NUM_CLASSES).map(|i| self.counts[i][i]).sum();
        correct as f64 / total as f64
    }

    /// Macro precision, recall and F1
    pub fn macro_scores(&self) -> (f64, f64, f64) {
        let mut precision_sum = 0.0;
        let mut recall_sum = 0.0;
        let mut f1_sum = 0.0;
        let mut present = 0usize;

        for c in 0..NUM_CLASSES {
            let tp = self.counts[c][c] as f64;
            let support: u64 = self.counts[c].iter().sum();
            let predicted: u64 = (0..NUM_CLASSES).map(|r| self.counts[r][c]).sum();
            if support == 0 && predicted == 0 {
                continue;
            }
            present += 1;

            let precision = if predicted == 0 { 0.0 } else { tp / predicted as f64 };
            let recall = if support == 0 { 0.0 } else { tp / support as f64 };
            let f1 = if precision + recall == 0.0 {
                0.0
            } else {
                2.0 * precision * recall / (precision + recall)
            };
            precision_sum += precision;
            recall_sum += recall;
            f1_sum += f1;
        }

        if present == 0 {
            return (0.0, 0.0, 0.0);
        }
        let n = present as f64;
        (precision_sum / n, recall_sum / n, f1_sum / n)
    }

    pub fn metrics(&self) -> ModelMetrics {
        let (precision, recall, f1) = self.macro_scores();
        ModelMetrics {
            accuracy: self.accuracy(),
            f1,
            precision,
            recall,
            sample_count: self.total(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Sentiment::*;

    #[test]
    fn perfect_predictions() {
        let cm = ConfusionMatrix::from_pairs([
            (Negative, Negative),
            (Neutral, Neutral),
            (Positive, Positive),
        ]);
        let m = cm.metrics();
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.f1, 1.0);
        assert_eq!(m.sample_count, 3);
    }

    #[test]
    fn mixed_predictions() {
        // truth: N N P P, predicted: N P P P
        let cm = ConfusionMatrix::from_pairs([
            (Negative, Negative),
            (Negative, Positive),
            (Positive, Positive),
            (Positive, Positive),
        ]);
        let m = cm.metrics();
        assert!((m.accuracy - 0.75).abs() < 1e-9);
        // negative: p=1, r=0.5 ; positive: p=2/3, r=1
        assert!((m.precision - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-9);
        assert!((m.recall - 0.75).abs() < 1e-9);
        assert_eq!(cm.get(Negative, Positive), 1);
    }

    #[test]
    fn empty_matrix_is_zero() {
        let m = ConfusionMatrix::new().metrics();
        assert_eq!(m, ModelMetrics::default());
    }
}
