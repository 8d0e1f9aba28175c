pub mod config;
pub mod models;
pub mod image;
pub mod inference;
pub mod web;
pub mod utils;

// 重新导出主要类型
pub use config::Config;
pub use inference::{ClassificationResponse, DetectionResponse};
pub use utils::error::InferenceError;

pub type Result<T> = std::result::Result<T, InferenceError>;
