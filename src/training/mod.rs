//! Guided training walks

mod service;
mod types;

pub use service::TrainingService;
pub use types::{
    TrainingApplyResult, TrainingConfig, TrainingLandmarkMark, TrainingState, TrainingStats,
    TrainingStatus, TrainingVisit,
};
