//! Filename sanitizing for stored artifacts.

/// Reserved device names that must not be used as a bare filename on Windows.
const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "AUX", "COM1", "COM2", "COM3", "COM4", "LPT1", "LPT2", "LPT3", "PRN", "NUL",
];

/// Reduce an untrusted filename to a flat, ASCII-only name safe to join onto
/// the upload directory.
///
/// Path separators become word breaks, runs of whitespace collapse to `_`,
/// anything outside `[A-Za-z0-9_.-]` is dropped and leading/trailing `.`
/// and `_` are trimmed. Returns `None` when nothing is left.
pub fn secure_filename(raw: &str) -> Option<String> {
    let ascii: String = raw.chars().filter(char::is_ascii).collect();
    let spaced = ascii.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        return None;
    }

    let stem = trimmed
        .split('.')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    if WINDOWS_DEVICE_NAMES.contains(&stem.as_str()) {
        return Some(format!("_{}", trimmed));
    }
    Some(trimmed.to_string())
}
