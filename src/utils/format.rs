/// Human readable file size: `0 Bytes`, `512 Bytes`, `1.5 KB`, `10 MB`.
///
/// Base 1024, at most two decimals, trailing zeros trimmed.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["Bytes", "KB", "MB", "GB"];
    const UNIT_SIZE: f64 = 1024.0;

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= UNIT_SIZE && unit_index < UNITS.len() - 1 {
        size /= UNIT_SIZE;
        unit_index += 1;
    }

    let formatted = format!("{:.2}", size);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit_index])
}

/// Media type from a file extension, `application/octet-stream` when unknown
pub fn media_type_for(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(2_000_000), "1.91 MB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024 * 1024), "5120 GB");
    }

    #[test]
    fn test_media_type_for() {
        assert_eq!(media_type_for("photo.PNG"), "image/png");
        assert_eq!(media_type_for("report.pdf"), "application/pdf");
        assert_eq!(media_type_for("clip.mp4"), "video/mp4");
        assert_eq!(media_type_for("song.mp3"), "audio/mpeg");
        assert_eq!(media_type_for("data.csv"), "text/csv");
        assert_eq!(media_type_for("logo.svg"), "image/svg+xml");
        assert_eq!(media_type_for("page.html"), "text/html");
        assert_eq!(
            media_type_for("doc.docx"),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(media_type_for("README"), "application/octet-stream");
    }
}
