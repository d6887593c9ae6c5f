//! Edit-distance similarity
//!
//! Levenshtein distance over `char`s with a rolling two-row table, so scoring a
//! query against the whole catalog allocates two rows per worker at most.

/// Levenshtein distance between two strings
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let mut prev = Vec::new();
    let mut curr = Vec::new();
    levenshtein_with_rows(&a_chars, b, &mut prev, &mut curr)
}

/// Levenshtein distance reusing caller-owned DP rows
pub(crate) fn levenshtein_with_rows(
    a: &[char],
    b: &str,
    prev: &mut Vec<usize>,
    curr: &mut Vec<usize>,
) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.len();
    }

    prev.clear();
    prev.extend(0..=b_len);
    curr.clear();
    curr.resize(b_len + 1, 0);

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(prev, curr);
    }

    prev[b_len]
}

/// Case-insensitive normalized similarity in [0, 1]
///
/// `1 - distance / max(len(a), len(b))`; equal strings score 1.0 and a
/// comparison against an empty string scores 0.0.
pub fn similarity(a: &str, b: &str) -> f32 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let a_chars: Vec<char> = a.chars().collect();
    let mut prev = Vec::new();
    let mut curr = Vec::new();
    similarity_with_rows(&a_chars, &b, b.chars().count(), &mut prev, &mut curr)
}

/// Similarity of an already lower-cased query against an already lower-cased key
pub(crate) fn similarity_with_rows(
    query: &[char],
    key: &str,
    key_len: usize,
    prev: &mut Vec<usize>,
    curr: &mut Vec<usize>,
) -> f32 {
    if query.len() == key_len && query.iter().copied().eq(key.chars()) {
        return 1.0;
    }
    if query.is_empty() || key_len == 0 {
        return 0.0;
    }

    let distance = levenshtein_with_rows(query, key, prev, curr);
    let max_len = query.len().max(key_len) as f32;
    (1.0 - distance as f32 / max_len).clamp(0.0, 1.0)
}

/// Best similarity two strings of these lengths could reach
pub(crate) fn similarity_upper_bound(a_len: usize, b_len: usize) -> f32 {
    let max_len = a_len.max(b_len);
    if max_len == 0 {
        return 1.0;
    }
    1.0 - a_len.abs_diff(b_len) as f32 / max_len as f32
}
