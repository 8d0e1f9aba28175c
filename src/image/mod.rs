pub mod loader;
pub mod transforms;

pub use loader::ImageLoader;
pub use transforms::{ImageTransforms, LetterboxParams};
