//! Wildcard matching for source filters and dataset paths.

use std::path::{Path, PathBuf};

use crate::array::ArrayError;

/// Match `text` against a pattern where `*` matches any run of characters
/// and `?` matches exactly one. Case-sensitive.
pub fn matches_glob(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                // Let the last `*` swallow one more character.
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

/// Name filter: case-insensitive glob when the pattern has wildcards,
/// substring match otherwise.
pub fn matches_filter(text: &str, pattern: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();

    if pattern.contains(['*', '?']) {
        matches_glob(&text, &pattern)
    } else {
        text.contains(&pattern)
    }
}

/// Expand a path whose file name may contain wildcards into the sorted list
/// of matching files. Paths without wildcards are returned as-is.
pub fn expand_paths(pattern: &str) -> Result<Vec<PathBuf>, ArrayError> {
    let path = Path::new(pattern);
    let Some(file_pattern) = path.file_name().and_then(|f| f.to_str()) else {
        return Err(ArrayError::NoFiles(pattern.to_string()));
    };
    if !file_pattern.contains(['*', '?']) {
        return Ok(vec![path.to_path_buf()]);
    }

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if matches_glob(name, file_pattern) {
                files.push(path);
            }
        }
    }

    if files.is_empty() {
        return Err(ArrayError::NoFiles(pattern.to_string()));
    }
    // Sort for deterministic ordering
    files.sort();
    Ok(files)
}
