pub mod config;
pub mod docx;

pub use docx::image::Image;
pub use docx::merge::{FieldValue, Merge, OpenOptions};
