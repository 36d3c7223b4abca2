pub mod format;

pub use format::{format_file_size, media_type_for};
