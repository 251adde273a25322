//! Resource name normalisation.
//!
//! Cloud providers accept a narrow alphabet for instance names. Preview
//! environments are usually named after branches or pull request titles, so
//! the raw input is folded into a lowercase, hyphen-separated identifier that
//! every API call can use as the instance key.

/// Maximum length of a normalised resource name.
pub const MAX_NAME_LENGTH: usize = 61;

/// Folds `raw` into a valid resource identifier.
///
/// Every character outside `[A-Za-z0-9]` becomes `-`, runs of `-` collapse
/// into one, the result is truncated to [`MAX_NAME_LENGTH`] characters and a
/// leading or trailing `-` is stripped. ASCII letters are lowercased.
///
/// The function is total and idempotent; an input without any alphanumeric
/// character yields an empty string.
///
/// # Examples
///
/// ```
/// use vista::naming::normalize_name;
///
/// assert_eq!(normalize_name("Feature/Login_Page!"), "feature-login-page");
/// assert_eq!(normalize_name(&normalize_name("a//b")), "a-b");
/// ```
#[must_use]
pub fn normalize_name(raw: &str) -> String {
    let mut collapsed = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            collapsed.push(ch.to_ascii_lowercase());
        } else if !collapsed.ends_with('-') {
            collapsed.push('-');
        }
    }

    let truncated: String = collapsed.chars().take(MAX_NAME_LENGTH).collect();
    let without_leading = truncated.strip_prefix('-').unwrap_or(&truncated);
    without_leading
        .strip_suffix('-')
        .unwrap_or(without_leading)
        .to_owned()
}
