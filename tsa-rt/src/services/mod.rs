//! Retraining services

pub mod model_cache;
pub mod orchestrator;
pub mod promotion;
pub mod registry;
pub mod scheduler;
pub mod splitter;
pub mod trainer;
pub mod trigger;

pub use model_cache::{LoadedModel, ModelCache};
pub use orchestrator::RetrainingOrchestrator;
pub use promotion::{AlwaysPromote, PromoteIfImproved, PromotionPolicy, PromotionVerdict};
pub use registry::ModelRegistry;
pub use scheduler::{RetrainRequest, RetrainScheduler, SchedulerHandle};
pub use splitter::{DatasetSplit, DatasetSplitter};
pub use trainer::{BowTrainer, Prediction, SentimentModel, TrainReport, TrainedModel, Trainer};
