use std::env;

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn u64_env(key: &str) -> Option<u64> {
    non_empty_env(key)
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
}

/// Comma or whitespace separated list, blanks dropped.
pub fn list_env(key: &str) -> Option<Vec<String>> {
    let raw = non_empty_env(key)?;
    let items = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}
