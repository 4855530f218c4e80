pub mod chunked;
pub mod simple;

pub use chunked::{ChunkedUploader, ProgressCallback};
pub use simple::SimpleUploader;
