//! Offline, deterministic baseline model.
//!
//! Candidates for position `i` come from what followed token `i-1` earlier in the same text
//! (most frequent first, then first-seen order), backed off to a fixed list of frequent English
//! tokens. Only positions `< i` are ever consulted.

use regularity_core::{Candidate, PredictiveModel, Result, TokenPrediction};
use std::collections::HashMap;

const FREQUENT_TOKENS: &[&str] = &[
    "the", ",", ".", "of", "and", "to", "a", "in", "is", "that", "for", "it", "as", "was", "with",
    "be", "by", "on", "not", "he", "I", "this", "are", "or", "his", "from", "at", "which", "but",
    "have", "an", "had", "they", "you", "were", "their", "one", "all", "we", "can", "her", "has",
    "there", "been", "if", "more", "when", "will", "would", "who",
];

/// Split into word runs and single punctuation characters; whitespace separates and is dropped.
///
/// Apostrophes inside a word stay with it (`don't`).
pub fn tokenize(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut word = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() || (ch == '\'' && !word.is_empty()) {
            word.push(ch);
            continue;
        }
        if !word.is_empty() {
            out.push(std::mem::take(&mut word));
        }
        if !ch.is_whitespace() {
            out.push(ch.to_string());
        }
    }
    if !word.is_empty() {
        out.push(word);
    }
    out
}

#[derive(Debug, Clone)]
pub struct BigramModel {
    name: String,
}

impl BigramModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Default)]
struct Followers<'a> {
    // token -> (count, first seen at)
    seen: HashMap<&'a str, (usize, usize)>,
}

impl<'a> Followers<'a> {
    fn observe(&mut self, token: &'a str, at: usize) {
        self.seen.entry(token).or_insert((0, at)).0 += 1;
    }

    fn ranked(&self) -> Vec<(&'a str, usize)> {
        let mut v: Vec<(&'a str, usize, usize)> =
            self.seen.iter().map(|(t, (n, at))| (*t, *n, *at)).collect();
        v.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        v.into_iter().map(|(t, n, _)| (t, n)).collect()
    }
}

fn candidates_after<'a>(
    prev: &str,
    table: &HashMap<&'a str, Followers<'a>>,
    top_k: usize,
) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = table
        .get(prev)
        .map(|f| f.ranked())
        .unwrap_or_default()
        .into_iter()
        .take(top_k)
        .map(|(t, n)| Candidate::new(t, n as f64))
        .collect();
    for t in FREQUENT_TOKENS {
        if out.len() >= top_k {
            break;
        }
        if !out.iter().any(|c| c.token == *t) {
            out.push(Candidate::new(*t, 0.0));
        }
    }
    out
}

pub fn predict_tokens(tokens: &[String], top_k: usize) -> Vec<TokenPrediction> {
    let mut table: HashMap<&str, Followers> = HashMap::new();
    let mut out = Vec::with_capacity(tokens.len());
    for (i, tok) in tokens.iter().enumerate() {
        if i == 0 {
            out.push(TokenPrediction::new(0, tok.as_str(), Vec::new()));
            continue;
        }
        let prev = tokens[i - 1].as_str();
        let candidates = candidates_after(prev, &table, top_k);
        out.push(TokenPrediction::new(i, tok.as_str(), candidates));
        // Learn only after predicting, so position i never sees itself.
        table.entry(prev).or_default().observe(tok.as_str(), i);
    }
    out
}

#[async_trait::async_trait]
impl PredictiveModel for BigramModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict(&self, text: &str, top_k: usize) -> Result<Vec<TokenPrediction>> {
        Ok(predict_tokens(&tokenize(text), top_k))
    }
}
