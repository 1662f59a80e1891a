/// Lowercase `value` and drop every character outside `[a-z0-9]`.
pub fn normalize(value: &str) -> String {
    value
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// True if one normalized identifier contains the other.
///
/// Symmetric. Identifiers that normalize to the empty string never match anything.
pub fn fuzzy_contains(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}
