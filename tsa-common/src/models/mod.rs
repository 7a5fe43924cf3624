//! Domain models shared by the retraining and ingestion services

mod model_version;
mod samples;
pub mod sentiment;

pub use model_version::{ModelMetrics, ModelVersion};
pub use samples::{NewSample, RawPost, TrainingSample};
pub use sentiment::{index_to_sentiment, sentiment_to_index, Sentiment, NUM_CLASSES, UNKNOWN_LABEL};
