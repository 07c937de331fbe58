/// Filesystems cap one path component at 255 bytes, not characters.
pub const MAX_FILENAME_BYTES: usize = 255;

const RESERVED_CHARS: &[char] = &[':', '*', '?', '"', '<', '>', '|'];

/// Reduces an untrusted filename to a key that is safe inside one namespace.
///
/// Only the last path component survives (both `/` and `\` count as
/// separators), reserved and control characters are dropped, and leading
/// dots are stripped so the result can never be `.`, `..` or a hidden file.
/// An empty string means nothing usable was left.
pub fn sanitize_filename(filename: &str) -> String {
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    let name = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or("");

    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && !RESERVED_CHARS.contains(c))
        .collect();

    let cleaned = cleaned
        .trim()
        .trim_start_matches('.')
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace());

    truncate_preserving_extension(cleaned, MAX_FILENAME_BYTES)
}

/// Lowercased substring after the last `.`, if there is a non-empty one.
pub fn file_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

fn truncate_preserving_extension(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }

    match name.rsplit_once('.') {
        // Leave room for at least one full UTF-8 character of stem.
        Some((stem, ext)) if !stem.is_empty() && ext.len() + 5 <= max_bytes => {
            let stem = truncate_at_char_boundary(stem, max_bytes - ext.len() - 1);
            format!("{}.{}", stem, ext)
        }
        _ => truncate_at_char_boundary(name, max_bytes)
            .trim_end_matches(|c: char| c == '.' || c.is_whitespace())
            .to_string(),
    }
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    let mut end = max_bytes.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

pub fn content_type_for(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_traversal() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("..\\..\\windows\\win.ini"), "win.ini");
        assert_eq!(sanitize_filename("/abs/path/report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename(".."), "");
        assert_eq!(sanitize_filename("dir/"), "");
    }

    #[test]
    fn test_sanitize_drops_reserved_and_hidden() {
        assert_eq!(sanitize_filename("a:b*c?.txt"), "abc.txt");
        assert_eq!(sanitize_filename(".bashrc.txt"), "bashrc.txt");
        assert_eq!(sanitize_filename("  notes.txt  "), "notes.txt");
        assert_eq!(sanitize_filename("tab\tname\n.png"), "tabname.png");
        assert_eq!(sanitize_filename("trailing.txt..."), "trailing.txt");
        assert_eq!(sanitize_filename("   "), "");
    }

    #[test]
    fn test_sanitize_keeps_unicode() {
        assert_eq!(sanitize_filename("résumé 2024.docx"), "résumé 2024.docx");
    }

    #[test]
    fn test_sanitize_truncates_long_names() {
        let long = format!("{}.txt", "a".repeat(400));
        let sanitized = sanitize_filename(&long);
        assert_eq!(sanitized.len(), MAX_FILENAME_BYTES);
        assert!(sanitized.ends_with(".txt"));
    }

    #[test]
    fn test_sanitize_truncates_multibyte_names_by_bytes() {
        let long = format!("{}.txt", "字".repeat(100));
        assert_eq!(long.len(), 304);

        let sanitized = sanitize_filename(&long);
        assert!(sanitized.len() <= MAX_FILENAME_BYTES);
        assert!(sanitized.starts_with("字"));
        assert!(sanitized.ends_with(".txt"));
        assert_eq!(sanitized, format!("{}.txt", "字".repeat(83)));

        let no_ext = "é".repeat(200);
        let sanitized = sanitize_filename(&no_ext);
        assert!(sanitized.len() <= MAX_FILENAME_BYTES);
        assert_eq!(sanitized.chars().count(), 127);
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("photo.JPG"), Some("jpg".to_string()));
        assert_eq!(file_extension("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(file_extension("README"), None);
        assert_eq!(file_extension("trailing."), None);
        assert_eq!(file_extension(".txt"), None);
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a.pdf"), "application/pdf");
        assert_eq!(content_type_for("a.unknownext"), "application/octet-stream");
    }
}
