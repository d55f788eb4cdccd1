// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::types::SearchHit;

pub const DEFAULT_WRAP_WIDTH: usize = 80;
pub const NO_RESULTS: &str = "No results found.";

pub fn format_results(hits: &[SearchHit]) -> String {
    format_results_with_width(hits, DEFAULT_WRAP_WIDTH)
}

/// Renders ranked hits as numbered blocks separated by blank lines.
pub fn format_results_with_width(hits: &[SearchHit], width: usize) -> String {
    if hits.is_empty() {
        return NO_RESULTS.to_string();
    }

    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "--- Result {} (Relevance: {:.2}) ---\n{}",
                i + 1,
                hit.score,
                wrap_text(&hit.chunk.text, width).join("\n")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Greedy word wrap. Runs of whitespace (newlines included) collapse to a
/// single space; words wider than `width` are split across lines.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();

        while chars.len() > width {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            lines.push(chars.drain(..width).collect());
        }

        let word_len = chars.len();
        if current_len == 0 {
            current.extend(chars);
            current_len = word_len;
        } else if current_len + 1 + word_len <= width {
            current.push(' ');
            current.extend(chars);
            current_len += 1 + word_len;
        } else {
            lines.push(std::mem::take(&mut current));
            current.extend(chars);
            current_len = word_len;
        }
    }

    if current_len > 0 {
        lines.push(current);
    }
    lines
}
