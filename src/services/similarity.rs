//! Vector and fingerprint helpers shared by the analyzer and the dedup loop.

use sha2::{Digest, Sha256};

use crate::models::category::ContentCategory;
use crate::models::item::Item;

/// Hex characters kept from the SHA-256 digest.
pub const SEMANTIC_HASH_LEN: usize = 16;

pub trait Embedded {
    fn vector(&self) -> Option<&[f32]>;
}

impl Embedded for Item {
    fn vector(&self) -> Option<&[f32]> {
        self.embedding_vector.as_deref()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SimilarMatch<'a, T> {
    pub candidate: &'a T,
    pub score: f32,
}

/// Cosine similarity in [-1, 1]. Missing, empty, zero-norm or mismatched
/// vectors score 0 instead of failing.
pub fn cosine_similarity(a: Option<&[f32]>, b: Option<&[f32]>) -> f32 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.0;
    };
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0f32;
    let mut na = 0f32;
    let mut nb = 0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        (dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0)
    }
}

/// Highest-scoring candidate strictly above `threshold`; the first one wins ties.
pub fn find_most_similar<'a, T, I>(query: &[f32], candidates: I, threshold: f32) -> Option<SimilarMatch<'a, T>>
where
    T: Embedded + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut best: Option<SimilarMatch<'a, T>> = None;
    for candidate in candidates {
        let score = cosine_similarity(Some(query), candidate.vector());
        if score <= threshold {
            continue;
        }
        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(SimilarMatch { candidate, score });
        }
    }
    best
}

/// Lower-case, drop punctuation, collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let stripped: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Content fingerprint that does not depend on embeddings.
pub fn semantic_hash(text: &str, polarity: bool, source_reference: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(text).as_bytes());
    hasher.update(b"|");
    hasher.update(if polarity { b"true".as_slice() } else { b"false".as_slice() });
    hasher.update(b"|");
    hasher.update(normalize_text(source_reference).as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(SEMANTIC_HASH_LEN);
    digest
}

/// Topic tags for a piece of text. Single-word stems match word prefixes,
/// multi-word stems match anywhere in the normalized text.
pub fn derive_categories(text: &str) -> Vec<ContentCategory> {
    let normalized = normalize_text(text);
    let words: Vec<&str> = normalized.split(' ').collect();
    ContentCategory::ALL
        .into_iter()
        .filter(|category| {
            category.keywords().iter().any(|kw| {
                if kw.contains(' ') {
                    normalized.contains(kw)
                } else {
                    words.iter().any(|w| w.starts_with(kw))
                }
            })
        })
        .collect()
}
