//! Hashed bag-of-words softmax logistic regression
//!
//! Mini-batch SGD with L2 regularization over the features produced by
//! [`super::tokenize::featurize`]. The fitted model is stored as JSON.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use tsa_common::config::TrainerConfig;
use tsa_common::models::{Sentiment, TrainingSample, NUM_CLASSES};

use super::tokenize::{featurize, SparseVector};
use super::{check_metrics, evaluate, Prediction, SentimentModel, TrainReport, TrainedModel, Trainer};
use crate::error::RetrainError;

const FORMAT_VERSION: u32 = 1;

/// Fitted model, serialized as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BowLogRegModel {
    pub format_version: u32,
    pub feature_dim: usize,
    pub max_length: usize,
    /// Row-major `NUM_CLASSES x feature_dim`
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

impl BowLogRegModel {
    fn validate(&self) -> Result<(), String> {
        if self.format_version != FORMAT_VERSION {
            return Err(format!("unsupported model format {}", self.format_version));
        }
        if self.weights.len() != NUM_CLASSES * self.feature_dim || self.bias.len() != NUM_CLASSES {
            return Err("model dimensions do not match".to_string());
        }
        if self.weights.iter().chain(&self.bias).any(|w| !w.is_finite()) {
            return Err("model has non-finite parameters".to_string());
        }
        Ok(())
    }

    fn probabilities(&self, features: &SparseVector) -> [f32; NUM_CLASSES] {
        class_probabilities(&self.weights, &self.bias, self.feature_dim, features)
    }

    pub fn save(&self, path: &Path) -> Result<(), RetrainError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RetrainError::TrainingFailure(format!("create {}: {}", parent.display(), e))
            })?;
        }
        let json = serde_json::to_vec(self)
            .map_err(|e| RetrainError::TrainingFailure(format!("serialize model: {}", e)))?;
        std::fs::write(path, json).map_err(|e| {
            RetrainError::TrainingFailure(format!("write {}: {}", path.display(), e))
        })
    }

    pub fn load(path: &Path) -> Result<Self, RetrainError> {
        let bytes =
            std::fs::read(path).map_err(|e| RetrainError::Storage(tsa_common::Error::Io(e)))?;
        let model: Self = serde_json::from_slice(&bytes).map_err(|e| {
            RetrainError::TrainingFailure(format!("parse {}: {}", path.display(), e))
        })?;
        model
            .validate()
            .map_err(|e| RetrainError::TrainingFailure(format!("{}: {}", path.display(), e)))?;
        Ok(model)
    }
}

impl SentimentModel for BowLogRegModel {
    fn predict(&self, texts: &[String]) -> Vec<Prediction> {
        texts
            .iter()
            .map(|text| {
                let probs = self.probabilities(&featurize(text, self.max_length, self.feature_dim));
                let (best, confidence) = probs
                    .iter()
                    .enumerate()
                    .fold((0usize, f32::MIN), |acc, (i, p)| if *p > acc.1 { (i, *p) } else { acc });
                Prediction {
                    label: Sentiment::from_index(best).unwrap_or(Sentiment::Neutral),
                    confidence: f64::from(confidence),
                }
            })
            .collect()
    }
}

fn class_probabilities(
    weights: &[f32],
    bias: &[f32],
    dim: usize,
    features: &SparseVector,
) -> [f32; NUM_CLASSES] {
    let mut logits = [0.0f32; NUM_CLASSES];
    for (c, logit) in logits.iter_mut().enumerate() {
        let base = c * dim;
        *logit = bias[c] + features.iter().map(|(i, x)| weights[base + i] * x).sum::<f32>();
    }
    softmax(&logits)
}

fn softmax(logits: &[f32; NUM_CLASSES]) -> [f32; NUM_CLASSES] {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut out = [0.0f32; NUM_CLASSES];
    let mut sum = 0.0f32;
    for (o, l) in out.iter_mut().zip(logits) {
        *o = (l - max).exp();
        sum += *o;
    }
    for o in &mut out {
        *o /= sum;
    }
    out
}

fn distinct_labels(samples: &[TrainingSample]) -> usize {
    samples.iter().map(|s| s.label).collect::<BTreeSet<_>>().len()
}

/// Default [`Trainer`]
#[derive(Debug, Clone)]
pub struct BowTrainer {
    config: TrainerConfig,
    seed: u64,
}

impl BowTrainer {
    pub fn new(config: TrainerConfig, seed: u64) -> Self {
        Self { config, seed }
    }

    /// Fit the model without persisting it
    pub fn fit(&self, train: &[TrainingSample]) -> Result<(BowLogRegModel, f64), RetrainError> {
        if train.is_empty() {
            return Err(RetrainError::TrainingFailure("empty training split".to_string()));
        }
        if distinct_labels(train) < 2 {
            return Err(RetrainError::TrainingFailure(
                "training split contains a single class".to_string(),
            ));
        }
        let dim = self.config.feature_dim;
        if dim == 0 {
            return Err(RetrainError::Config("feature_dim must be > 0".to_string()));
        }

        let x: Vec<SparseVector> = train
            .iter()
            .map(|s| featurize(&s.text, self.config.max_length, dim))
            .collect();
        let y: Vec<usize> = train.iter().map(|s| s.label.index()).collect();

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut weights: Vec<f32> = (0..NUM_CLASSES * dim)
            .map(|_| (rng.gen::<f32>() - 0.5) * 0.01)
            .collect();
        let mut bias = vec![0.0f32; NUM_CLASSES];

        let lr = self.config.learning_rate;
        let l2 = self.config.l2.max(0.0);
        let batch_size = self.config.batch_size.max(1);
        let mut indices: Vec<usize> = (0..x.len()).collect();
        let mut final_loss = f64::NAN;

        for epoch in 0..self.config.num_epochs.max(1) {
            indices.shuffle(&mut rng);
            let mut epoch_loss = 0.0f64;

            for chunk in indices.chunks(batch_size) {
                let mut grad_w = vec![0.0f32; weights.len()];
                let mut grad_b = [0.0f32; NUM_CLASSES];

                for &idx in chunk {
                    let probs = class_probabilities(&weights, &bias, dim, &x[idx]);
                    epoch_loss -= f64::from(probs[y[idx]].max(f32::MIN_POSITIVE)).ln();
                    for c in 0..NUM_CLASSES {
                        let diff = probs[c] - if c == y[idx] { 1.0 } else { 0.0 };
                        let base = c * dim;
                        for (i, v) in &x[idx] {
                            grad_w[base + i] += diff * v;
                        }
                        grad_b[c] += diff;
                    }
                }

                let inv = 1.0 / chunk.len() as f32;
                for (w, g) in weights.iter_mut().zip(&grad_w) {
                    *w -= lr * (g * inv + l2 * *w);
                }
                for (b, g) in bias.iter_mut().zip(&grad_b) {
                    *b -= lr * g * inv;
                }
            }

            final_loss = epoch_loss / x.len() as f64;
            debug!(epoch, loss = final_loss, "Training epoch finished");
            if !final_loss.is_finite() || weights.iter().chain(&bias).any(|w| !w.is_finite()) {
                return Err(RetrainError::TrainingFailure(format!(
                    "fit diverged at epoch {} (loss {})",
                    epoch, final_loss
                )));
            }
        }

        let model = BowLogRegModel {
            format_version: FORMAT_VERSION,
            feature_dim: dim,
            max_length: self.config.max_length,
            weights,
            bias,
        };
        model.validate().map_err(RetrainError::TrainingFailure)?;
        Ok((model, final_loss))
    }
}

impl Trainer for BowTrainer {
    fn train(
        &self,
        train: &[TrainingSample],
        val: &[TrainingSample],
        model_path: &Path,
    ) -> Result<TrainedModel, RetrainError> {
        if val.is_empty() {
            return Err(RetrainError::TrainingFailure("empty validation split".to_string()));
        }
        if distinct_labels(val) < 2 {
            return Err(RetrainError::TrainingFailure(
                "validation split contains a single class".to_string(),
            ));
        }

        let (model, final_loss) = self.fit(train)?;
        let validation = evaluate(&model, val);
        check_metrics(&validation, "validation")?;

        model.save(model_path)?;
        info!(
            path = %model_path.display(),
            train_samples = train.len(),
            val_accuracy = validation.accuracy,
            val_f1 = validation.f1,
            final_loss,
            "Model trained"
        );

        Ok(TrainedModel {
            model: Arc::new(model),
            report: TrainReport {
                validation,
                final_loss,
                epochs: self.config.num_epochs.max(1),
                train_samples: train.len(),
            },
        })
    }

    fn load(&self, model_path: &Path) -> Result<Arc<dyn SentimentModel>, RetrainError> {
        Ok(Arc::new(BowLogRegModel::load(model_path)?))
    }
}
