pub mod image_ops;

pub use image_ops::{encode_png, load_rgb, paste};
