pub mod pipeline;
pub mod types;

pub use pipeline::InferencePipeline;
pub use types::{ClassificationResponse, DetectionResponse, ResultFormatter};
