pub mod format;

pub use format::{format_bytes, shorten_file_name, NOTIFICATION_FILE_NAME_MAX_LENGTH};
