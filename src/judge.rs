//! Fuzzy answer equivalence for the trivia flow.
//!
//! A cascaded comparator: exact match on normalized strings, then keyword
//! overlap, then whole-string edit distance. Contestants type fast and
//! loose; the judge is forgiving about articles, typos, and partial
//! phrasings while still rejecting unrelated answers.

use serde::Serialize;
use std::collections::HashSet;

const STOP_WORDS: [&str; 16] = [
    "the", "a", "an", "of", "and", "in", "on", "at", "to", "for", "is", "are", "was", "were",
    "what", "who",
];

/// Outcome of judging a submitted answer against the canonical one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Judgement {
    pub correct: bool,
    pub similarity: f64,
}

/// Lowercase, strip everything but alphanumerics and spaces, collapse
/// whitespace runs, trim.
pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = true;
    for ch in input.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_was_space = false;
        } else if ch.is_whitespace() && !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Standard two-row dynamic-programming Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn keyword_tokens(normalized: &str) -> Vec<&str> {
    normalized
        .split(' ')
        .filter(|w| w.len() > 1 && !STOP_WORDS.contains(w))
        .collect()
}

fn words_match(candidate: &str, reference: &str) -> bool {
    if candidate == reference {
        return true;
    }
    let (shorter, longer) = if candidate.len() <= reference.len() {
        (candidate, reference)
    } else {
        (reference, candidate)
    };
    if shorter.len() > 3 && longer.contains(shorter) {
        return true;
    }
    levenshtein(candidate, reference) <= candidate.chars().count() / 4
}

/// Judge a submitted answer against the canonical answer.
///
/// Cascade:
/// 1. empty input is wrong with similarity 0;
/// 2. normalized equality is right with similarity 1;
/// 3. any keyword pair matching across the two sides is right at 0.8;
/// 4. whole-string edit distance within `max(2, |ref|/5)` is right,
///    scored by how much of the reference survived;
/// 5. otherwise wrong, scored by residual similarity.
pub fn check_answer(candidate: &str, reference: &str) -> Judgement {
    let cand = normalize(candidate);
    let refr = normalize(reference);

    if cand.is_empty() {
        return Judgement {
            correct: false,
            similarity: 0.0,
        };
    }

    if cand == refr {
        return Judgement {
            correct: true,
            similarity: 1.0,
        };
    }

    let cand_words = keyword_tokens(&cand);
    let ref_words: HashSet<&str> = keyword_tokens(&refr).into_iter().collect();
    for cw in &cand_words {
        for rw in &ref_words {
            if words_match(cw, rw) {
                return Judgement {
                    correct: true,
                    similarity: 0.8,
                };
            }
        }
    }

    let distance = levenshtein(&cand, &refr);
    let ref_len = refr.chars().count();
    let tolerance = 2usize.max(ref_len / 5);
    if ref_len > 0 && distance <= tolerance {
        return Judgement {
            correct: true,
            similarity: 1.0 - distance as f64 / ref_len as f64,
        };
    }

    let longest = ref_len.max(cand.chars().count());
    let similarity = if longest == 0 {
        0.0
    } else {
        (1.0 - distance as f64 / longest as f64).max(0.0)
    };
    Judgement {
        correct: false,
        similarity,
    }
}
