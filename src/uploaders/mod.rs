pub mod http;
pub mod progress_stream;

pub use http::HttpRemote;
pub use progress_stream::{chunked, ProgressStream};
