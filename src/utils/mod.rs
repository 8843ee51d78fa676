//! Small helpers shared by the ebook service and its routes.

/// Trimmed value, or `None` when the input is absent, empty or whitespace.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
