pub mod image_folder;

pub use image_folder::{CategoryMap, ImageFolder};
