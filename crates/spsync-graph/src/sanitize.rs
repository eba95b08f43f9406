//! SharePoint name rules
//!
//! SharePoint rejects some characters and names outright. Every folder and
//! file name is passed through [`sanitize_name`] before it is used in an API
//! path, so a local tree with awkward names still maps onto a valid remote
//! tree. The mapping is deterministic and idempotent.

use spsync_core::domain::RemotePath;

/// Maximum length of a single name, in characters
pub const MAX_NAME_LEN: usize = 255;

const INVALID_CHARS: &[char] = &['"', '*', ':', '<', '>', '?', '/', '\\', '|', '#', '%'];

/// Device names, reserved with or without an extension
const RESERVED_STEMS: &[&str] = &[
    "con", "prn", "aux", "nul", "com0", "com1", "com2", "com3", "com4", "com5", "com6", "com7",
    "com8", "com9", "lpt0", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8",
    "lpt9",
];

/// Names reserved as a whole
const RESERVED_NAMES: &[&str] = &[".lock", "desktop.ini", "forms"];

const RESERVED_PREFIX: &str = "_vti_";

fn trim_edges(name: &str) -> &str {
    name.trim_matches(|c: char| c == '.' || c.is_whitespace())
}

fn is_reserved(name: &str) -> bool {
    let lower = name.to_lowercase();
    let stem = lower.split('.').next().unwrap_or_default();
    RESERVED_NAMES.contains(&lower.as_str())
        || RESERVED_STEMS.contains(&stem)
        || lower.starts_with(RESERVED_PREFIX)
}

/// Truncates to [`MAX_NAME_LEN`] characters, keeping the extension
fn truncate(name: &str) -> String {
    let len = name.chars().count();
    if len <= MAX_NAME_LEN {
        return name.to_string();
    }

    let ext = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[idx..],
        _ => "",
    };
    let ext_len = ext.chars().count();
    if ext.is_empty() || ext_len >= MAX_NAME_LEN {
        return name.chars().take(MAX_NAME_LEN).collect();
    }

    let stem: String = name.chars().take(MAX_NAME_LEN - ext_len).collect();
    format!("{stem}{ext}")
}

/// Makes `name` acceptable to SharePoint
///
/// 1. Each of `" * : < > ? / \ | # %` becomes `_`.
/// 2. Leading and trailing dots and whitespace are removed.
/// 3. Reserved names (`CON`, `PRN`, `AUX`, `NUL`, `COM0`-`COM9`, `LPT0`-`LPT9`
///    with any extension, `.lock`, `desktop.ini`, `forms`, and anything
///    starting with `_vti_`) get a `_` prefix.
/// 4. The result is truncated to 255 characters, preserving the extension.
/// 5. An empty result becomes `_`.
pub fn sanitize_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if INVALID_CHARS.contains(&c) { '_' } else { c })
        .collect();

    let trimmed = trim_edges(&replaced);
    let prefixed = if is_reserved(trimmed) {
        format!("_{trimmed}")
    } else {
        trimmed.to_string()
    };

    let truncated = truncate(&prefixed);
    let cleaned = truncated.trim_end_matches(|c: char| c == '.' || c.is_whitespace());

    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Sanitizes every segment of a drive-relative path
pub fn sanitize_path(path: &RemotePath) -> RemotePath {
    let mut out = RemotePath::root();
    for segment in path.segments() {
        let name = sanitize_name(segment);
        // A sanitized name never contains '/' and is never ".."
        if let Ok(joined) = out.join(&name) {
            out = joined;
        }
    }
    out
}
