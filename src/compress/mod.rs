// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Context compression
//!
//! Shrinks the serialized retrieved context to a token budget before
//! generation while keeping the segments most relevant to the question.
//! Pure text transform with no side effects; the tokenizer and stop-list
//! are built once at construction and reused across calls, so one
//! compressor instance should be shared rather than rebuilt per query.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// How compressed context segments are ordered in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReorderPolicy {
    /// most relevant segments first
    Relevance,
    /// preserve retrieval order
    Original,
}

#[derive(Debug, Clone)]
pub struct CompressorConfig {
    /// token budget for the whole compressed prompt
    pub target_tokens: usize,
    /// aggressiveness of partial-segment truncation, 0.0 (keep whole
    /// segments only) to just under 1.0 (cut hard)
    pub ratio: f32,
    pub reorder: ReorderPolicy,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            target_tokens: 500,
            ratio: 0.4,
            reorder: ReorderPolicy::Relevance,
        }
    }
}

const STOPWORDS: [&str; 32] = [
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "i", "in",
    "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "what", "which",
    "who", "will", "with", "you", "your",
];

/// Token-budgeted context compressor.
pub struct ContextCompressor {
    config: CompressorConfig,
    word_re: Regex,
    sentence_re: Regex,
    stopwords: HashSet<&'static str>,
}

impl ContextCompressor {
    /// Construction compiles the tokenizer; amortize it by reusing the
    /// instance across calls.
    pub fn new(config: CompressorConfig) -> Self {
        Self {
            config,
            word_re: Regex::new(r"[A-Za-z0-9']+").expect("static pattern"),
            sentence_re: Regex::new(r"[^.!?]+(?:[.!?]+|$)").expect("static pattern"),
            stopwords: STOPWORDS.iter().copied().collect(),
        }
    }

    /// Compress `context_items` under `target_tokens`, keeping the
    /// segments that matter for answering `question`. The instruction and
    /// question are always carried whole; their token cost comes out of
    /// the budget.
    pub fn compress(
        &self,
        context_items: &[String],
        instruction: &str,
        question: &str,
        target_tokens: usize,
    ) -> String {
        let overhead = token_count(instruction) + token_count(question);
        let mut remaining = target_tokens.saturating_sub(overhead);

        let question_terms = self.content_terms(question);
        let mut scored: Vec<(usize, f64, &String)> = context_items
            .iter()
            .enumerate()
            .map(|(i, item)| (i, self.relevance(item, &question_terms), item))
            .collect();
        if self.config.reorder == ReorderPolicy::Relevance {
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        }

        let mut kept: Vec<String> = Vec::new();
        let mut dropped = 0usize;
        for (_, _, item) in &scored {
            if remaining == 0 {
                dropped += 1;
                continue;
            }
            let item_tokens = token_count(item);
            if item_tokens <= remaining {
                kept.push((*item).clone());
                remaining -= item_tokens;
                continue;
            }
            // partial keep: truncate at sentence boundaries within the
            // allowance the aggressiveness ratio grants
            let allowance = remaining.min(
                ((item_tokens as f32) * (1.0 - self.config.ratio)).ceil() as usize,
            );
            if let Some(trimmed) = self.truncate_sentences(item, allowance) {
                remaining -= token_count(&trimmed);
                kept.push(trimmed);
            } else {
                dropped += 1;
            }
        }

        debug!(
            kept = kept.len(),
            dropped,
            budget = target_tokens,
            "context compressed"
        );

        let mut out = String::new();
        if !instruction.is_empty() {
            out.push_str(instruction);
            out.push_str("\n\n");
        }
        out.push_str(&kept.join("\n"));
        if !question.is_empty() {
            out.push_str("\n\n");
            out.push_str(question);
        }
        out
    }

    /// Compress with the configured default budget.
    pub fn compress_default(
        &self,
        context_items: &[String],
        instruction: &str,
        question: &str,
    ) -> String {
        self.compress(
            context_items,
            instruction,
            question,
            self.config.target_tokens,
        )
    }

    fn content_terms(&self, text: &str) -> HashSet<String> {
        self.word_re
            .find_iter(&text.to_lowercase())
            .map(|m| m.as_str().to_string())
            .filter(|w| !self.stopwords.contains(w.as_str()))
            .collect()
    }

    /// Lexical overlap with the question, damped by segment length so
    /// short on-topic segments beat long rambling ones.
    fn relevance(&self, item: &str, question_terms: &HashSet<String>) -> f64 {
        if question_terms.is_empty() {
            return 0.0;
        }
        let item_terms = self.content_terms(item);
        if item_terms.is_empty() {
            return 0.0;
        }
        let overlap = item_terms.intersection(question_terms).count() as f64;
        overlap / (item_terms.len() as f64).sqrt()
    }

    fn truncate_sentences(&self, item: &str, allowance: usize) -> Option<String> {
        let mut used = 0usize;
        let mut out = String::new();
        for sentence in self.sentence_re.find_iter(item) {
            let sentence = sentence.as_str().trim();
            if sentence.is_empty() {
                continue;
            }
            let cost = token_count(sentence);
            if used + cost > allowance {
                break;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(sentence);
            used += cost;
        }
        (!out.is_empty()).then_some(out)
    }
}

/// Whitespace-token estimate used for budgeting.
pub fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}
