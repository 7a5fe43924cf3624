//! Text featurization: lowercase word tokens hashed into a fixed space

use std::collections::BTreeMap;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Sparse feature vector, sorted by index
pub type SparseVector = Vec<(usize, f32)>;

/// Lowercase word tokens, at most `max_length` of them
pub fn tokenize(text: &str, max_length: usize) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .take(max_length)
        .map(str::to_lowercase)
        .collect()
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

/// Unigram and bigram counts hashed into `dim` buckets, L2-normalized
pub fn featurize(text: &str, max_length: usize, dim: usize) -> SparseVector {
    if dim == 0 {
        return Vec::new();
    }
    let tokens = tokenize(text, max_length);
    let mut counts: BTreeMap<usize, f32> = BTreeMap::new();

    for token in &tokens {
        *counts.entry((fnv1a(token.as_bytes()) % dim as u64) as usize).or_default() += 1.0;
    }
    for pair in tokens.windows(2) {
        let bigram = format!("{} {}", pair[0], pair[1]);
        *counts.entry((fnv1a(bigram.as_bytes()) % dim as u64) as usize).or_default() += 1.0;
    }

    let norm = counts.values().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return Vec::new();
    }
    counts.into_iter().map(|(i, v)| (i, v / norm)).collect()
}
