/// Longest file name shown in a notification before it gets shortened.
pub const NOTIFICATION_FILE_NAME_MAX_LENGTH: usize = 20;

const THREE_DOTS: &str = "…";

/// Human readable byte count
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const UNIT_SIZE: f64 = 1024.0;

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= UNIT_SIZE && unit_index < UNITS.len() - 1 {
        size /= UNIT_SIZE;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Keeps the tail of long file names, where the extension is.
pub fn shorten_file_name(file_name: &str) -> String {
    let count = file_name.chars().count();
    if count > NOTIFICATION_FILE_NAME_MAX_LENGTH {
        let tail: String = file_name
            .chars()
            .skip(count - NOTIFICATION_FILE_NAME_MAX_LENGTH)
            .collect();
        format!("{}{}", THREE_DOTS, tail)
    } else {
        file_name.to_string()
    }
}
