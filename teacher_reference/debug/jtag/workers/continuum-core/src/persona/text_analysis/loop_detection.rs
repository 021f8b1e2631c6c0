//! Loop Detection
//!
//! Per-persona response loop state in DashMap.
//! Replaces static TypeScript Map in PersonaResponseGenerator.
//!
//! Also includes truncated tool call detection.

use std::time::Instant;

use dashmap::DashMap;
use uuid::Uuid;

use super::similarity::jaccard_char_bigram_similarity;

/// Per-persona loop detection state
pub struct LoopDetector {
    /// Map of persona_id → recent response hashes with timestamps
    states: DashMap<Uuid, Vec<ResponseEntry>>,
}

struct ResponseEntry {
    hash: String,
    timestamp: Instant,
}

/// Constants matching the TypeScript originals exactly
const RESPONSE_LOOP_WINDOW_MS: u128 = 600_000; // 10 minutes
const RESPONSE_LOOP_THRESHOLD: usize = 3; // Block after 3 similar responses
const RESPONSE_HASH_LENGTH: usize = 200; // First 200 chars for comparison

impl LoopDetector {
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
        }
    }

    /// Check if a response is a loop (repeating similar content).
    /// Also records the response in the history.
    /// Returns (is_loop, duplicate_count)
    pub fn check_response_loop(
        &self,
        persona_id: Uuid,
        response_text: &str,
    ) -> (bool, usize) {
        let hash = hash_response(response_text);
        let now = Instant::now();

        let mut entries = self.states.entry(persona_id).or_default();

        // Clean old entries outside window
        entries.retain(|e| now.duration_since(e.timestamp).as_millis() < RESPONSE_LOOP_WINDOW_MS);

        // Count similar responses
        let mut duplicate_count = 0;
        for entry in entries.iter() {
            let similarity = jaccard_char_bigram_similarity(&entry.hash, &hash);
            if similarity > 0.8 {
                duplicate_count += 1;
            }
        }

        // Record this response
        entries.push(ResponseEntry {
            hash,
            timestamp: now,
        });

        let is_loop = duplicate_count >= RESPONSE_LOOP_THRESHOLD;
        (is_loop, duplicate_count)
    }

    /// Clear loop history for a persona
    pub fn clear_history(&self, persona_id: Uuid) {
        self.states.remove(&persona_id);
    }
}

/// Normalize and truncate response text for comparison.
/// Matches TypeScript hashResponse() exactly.
fn hash_response(text: &str) -> String {
    text.to_lowercase()
        .trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(RESPONSE_HASH_LENGTH)
        .collect()
}

/// Check for truncated tool calls (open XML tags without closing).
/// DeepSeek's issue: response cut off mid-tool-call.
pub fn has_truncated_tool_call(text: &str) -> bool {
    let has_start = text.contains("<tool_use>") || text.contains("<tool ");
    let has_end = text.contains("</tool_use>") || text.contains("</tool>");
    has_start && !has_end
}
