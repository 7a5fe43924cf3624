//! HTTP API handlers for tsa-rt

pub mod health;
pub mod model_info;
pub mod predict;
pub mod retrain;
pub mod sse;

pub use health::health_routes;
pub use model_info::model_info_routes;
pub use predict::predict_routes;
pub use retrain::retrain_routes;
pub use sse::retrain_event_stream;
