pub mod image;

pub use self::image::{format_from_extension, ImageOptimizer, ImageTarget};
