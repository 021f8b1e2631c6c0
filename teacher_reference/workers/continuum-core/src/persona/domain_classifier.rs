//! Domain Classifier — Adapter-aware text classification
//!
//! Classifies incoming text into skill domains based on vocabulary
//! extracted from registered adapters. Adapters DEFINE the domain space:
//! when an adapter with domain "plumbing" is registered, the classifier
//! automatically knows about plumbing. No hardcoding required.
//!
//! Design: keyword scoring with TF-IDF-like weighting, < 1ms per classification.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use ts_rs::TS;

use super::genome_paging::GenomeAdapterInfo;

// =============================================================================
// TYPES (ts-rs generated)
// =============================================================================

/// Result of classifying text into a skill domain.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../shared/generated/persona/DomainClassification.ts")]
pub struct DomainClassification {
    /// Classified domain (e.g. "web-api-development", "plumbing", "general")
    pub domain: String,
    /// Confidence score 0.0-1.0
    pub confidence: f32,
    /// Matching adapter name (None = gap — domain recognized but no adapter)
    #[ts(optional)]
    pub adapter_name: Option<String>,
    /// Classification time in microseconds
    #[ts(type = "number")]
    pub decision_time_us: u64,
}

// =============================================================================
// DOMAIN VOCABULARY
// =============================================================================

/// Keywords and metadata for a single domain.
#[derive(Debug, Clone)]
struct DomainVocabulary {
    /// Keywords associated with this domain (lowercased)
    keywords: Vec<String>,
    /// The adapter that covers this domain (if any)
    adapter_name: Option<String>,
}

// =============================================================================
// BUILT-IN VOCABULARIES
// =============================================================================

/// Built-in domain vocabularies for common skill areas.
/// These provide a baseline — adapter registrations add more keywords.
fn builtin_vocabularies() -> Vec<(&'static str, Vec<&'static str>)> {
    vec![
        ("code", vec![
            "function", "import", "export", "const", "let", "var", "class",
            "interface", "type", "async", "await", "promise", "return",
            "typescript", "javascript", "python", "rust", "compile", "debug",
            "error", "bug", "fix", "refactor", "test", "api", "endpoint",
            "database", "query", "sql", "schema", "migration", "deploy",
            "git", "commit", "branch", "merge", "pull request", "docker",
            "npm", "cargo", "pip", "webpack", "vite", "react", "node",
            "express", "routes", "middleware", "http", "rest", "graphql",
            "algorithm", "data structure", "array", "hashmap", "tree",
        ]),
        ("conversation", vec![
            "hello", "hi", "hey", "thanks", "thank you", "please", "help",
            "how are you", "what do you think", "opinion", "feel", "chat",
            "talk", "discuss", "agree", "disagree", "interesting", "cool",
            "awesome", "great", "good morning", "good night", "welcome",
        ]),
        ("teaching", vec![
            "teach", "learn", "lesson", "curriculum", "exam", "quiz", "test",
            "exercise", "practice", "student", "teacher", "explain", "tutorial",
            "course", "module", "assignment", "grade", "knowledge", "skill",
            "training", "workshop", "seminar", "lecture",
        ]),
        ("creative", vec![
            "write", "story", "poem", "creative", "imagine", "fiction",
            "character", "plot", "narrative", "dialogue", "scene", "art",
            "design", "color", "style", "aesthetic", "music", "song",
            "compose", "paint", "draw", "sketch", "illustration",
        ]),
        ("analysis", vec![
            "analyze", "analysis", "data", "statistics", "trend", "pattern",
            "insight", "metric", "benchmark", "performance", "optimize",
            "efficiency", "throughput", "latency", "profiling", "bottleneck",
            "report", "dashboard", "visualization", "chart", "graph",
        ]),
    ]
}

// =============================================================================
// DOMAIN CLASSIFIER
// =============================================================================

/// Classifies text into skill domains using adapter-aware keyword scoring.
///
/// Adapters define the domain space: registering an adapter with domain
/// "plumbing" automatically teaches the classifier about plumbing.
/// Keywords can be enriched over time (academy sessions add learning_objectives).
#[derive(Debug)]
pub struct DomainClassifier {
    /// domain → vocabulary (keywords + adapter mapping)
    domains: HashMap<String, DomainVocabulary>,
    /// Fallback domain when no keywords match
    fallback_domain: String,
}

impl DomainClassifier {
    /// Create a new classifier with built-in vocabularies.
    pub fn new() -> Self {
        let mut domains = HashMap::new();

        for (domain, keywords) in builtin_vocabularies() {
            domains.insert(domain.to_string(), DomainVocabulary {
                keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
                adapter_name: None,
            });
        }

        Self {
            domains,
            fallback_domain: "general".to_string(),
        }
    }

    /// Rebuild domain→adapter mappings from current adapter state.
    /// Call after genome sync or adapter registration.
    pub fn sync_from_adapters(&mut self, adapters: &[GenomeAdapterInfo]) {
        // Clear all adapter mappings first
        for vocab in self.domains.values_mut() {
            vocab.adapter_name = None;
        }

        for adapter in adapters {
            let domain = adapter.domain.to_lowercase();

            // If domain already exists, just update the adapter mapping
            if let Some(vocab) = self.domains.get_mut(&domain) {
                vocab.adapter_name = Some(adapter.name.clone());
            } else {
                // New domain from adapter — create vocabulary with adapter name as keyword
                self.domains.insert(domain.clone(), DomainVocabulary {
                    keywords: vec![domain.clone(), adapter.name.to_lowercase()],
                    adapter_name: Some(adapter.name.clone()),
                });
            }
        }
    }

    /// Classify text into a skill domain.
    /// Returns the best-matching domain with confidence and adapter info.
    ///
    /// Algorithm: for each domain, count keyword matches in the text.
    /// Score = matches / total_keywords (normalized). Highest score wins.
    /// Confidence scales with match density.
    pub fn classify(&self, text: &str) -> DomainClassification {
        let start = Instant::now();
        let text_lower = text.to_lowercase();
        let text_words: Vec<&str> = text_lower.split_whitespace().collect();

        let mut best_domain = self.fallback_domain.clone();
        let mut best_score: f32 = 0.0;
        let mut best_adapter: Option<String> = None;

        for (domain, vocab) in &self.domains {
            if vocab.keywords.is_empty() {
                continue;
            }

            let mut matches = 0u32;
            for keyword in &vocab.keywords {
                // Multi-word keywords: check substring
                if keyword.contains(' ') {
                    if text_lower.contains(keyword.as_str()) {
                        matches += 2; // Multi-word matches are worth more
                    }
                } else {
                    // Single-word keywords: check word boundaries
                    if text_words.iter().any(|w| w.trim_matches(|c: char| !c.is_alphanumeric()) == keyword.as_str()) {
                        matches += 1;
                    }
                    // Also check substring for compound words (e.g. "typescript" in "typescript-expertise")
                    else if text_lower.contains(keyword.as_str()) {
                        matches += 1;
                    }
                }
            }

            if matches == 0 {
                continue;
            }

            // Normalize by vocabulary size (smaller vocabs need fewer matches)
            let vocab_size = vocab.keywords.len() as f32;
            let raw_score = matches as f32;
            // Score favors absolute matches but normalizes to prevent tiny vocabularies from always winning
            let score = raw_score / (1.0 + vocab_size.sqrt());

            if score > best_score {
                best_score = score;
                best_domain = domain.clone();
                best_adapter = vocab.adapter_name.clone();
            }
        }

        // Confidence: sigmoid-like curve on raw match count
        // 0 matches = 0.0, 3 matches = ~0.5, 8+ matches = ~0.9
        let confidence = if best_score > 0.0 {
            let raw_matches = best_score * (1.0 + (self.domains.get(&best_domain)
                .map(|v| v.keywords.len() as f32)
                .unwrap_or(1.0)).sqrt());
            (1.0 - (-0.3 * raw_matches).exp()).min(1.0)
        } else {
            0.0
        };

        DomainClassification {
            domain: best_domain,
            confidence,
            adapter_name: best_adapter,
            decision_time_us: start.elapsed().as_micros() as u64,
        }
    }

    /// Get the adapter name for a domain (or None if gap).
    pub fn adapter_for_domain(&self, domain: &str) -> Option<&str> {
        self.domains.get(domain)
            .and_then(|v| v.adapter_name.as_deref())
    }

    /// Register new keywords for a domain (e.g., from academy curriculum).
    /// Merges with existing keywords — does not replace.
    pub fn register_domain_keywords(&mut self, domain: &str, keywords: Vec<String>) {
        let entry = self.domains.entry(domain.to_string()).or_insert_with(|| DomainVocabulary {
            keywords: vec![],
            adapter_name: None,
        });

        for kw in keywords {
            let lower = kw.to_lowercase();
            if !entry.keywords.contains(&lower) {
                entry.keywords.push(lower);
            }
        }
    }

    /// Get all known domains with their adapter status.
    pub fn domain_summary(&self) -> Vec<(String, bool)> {
        self.domains.iter()
            .map(|(domain, vocab)| (domain.clone(), vocab.adapter_name.is_some()))
            .collect()
    }
}

// =============================================================================
// INTERACTION QUALITY SCORING
// =============================================================================

/// Quality score for a single interaction (input→output pair).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../shared/generated/persona/QualityScore.ts")]
pub struct QualityScore {
    /// Overall quality score 0.0-1.0
    pub score: f32,
    /// Individual quality factors
    pub factors: QualityFactors,
}

/// Breakdown of quality factors for an interaction.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../shared/generated/persona/QualityFactors.ts")]
pub struct QualityFactors {
    /// Human feedback signal (positive reply, "thanks", corrections)
    pub human_feedback: f32,
    /// Task completion success signal
    pub task_success: f32,
    /// Response substance (length, specificity, structure)
    pub substance: f32,
    /// Was this a corrected response? (gold standard for training)
    pub correction: f32,
}

/// Score the quality of an interaction for training data selection.
/// Higher quality examples produce better fine-tuning results.
pub fn score_interaction_quality(
    input: &str,
    output: &str,
    feedback: Option<&str>,
    task_outcome: Option<bool>,
) -> QualityScore {
    let mut factors = QualityFactors {
        human_feedback: 0.5,  // Neutral default
        task_success: 0.5,
        substance: 0.0,
        correction: 0.0,
    };

    // Factor 1: Human feedback
    if let Some(fb) = feedback {
        let fb_lower = fb.to_lowercase();
        if fb_lower.contains("thank") || fb_lower.contains("great") || fb_lower.contains("perfect")
            || fb_lower.contains("exactly") || fb_lower.contains("good") || fb_lower.contains("awesome")
        {
            factors.human_feedback = 0.9;
        } else if fb_lower.contains("wrong") || fb_lower.contains("no") || fb_lower.contains("incorrect")
            || fb_lower.contains("bad") || fb_lower.contains("fix")
        {
            factors.human_feedback = 0.2;
            factors.correction = 0.8; // Corrections are gold — the corrected version is valuable
        } else {
            factors.human_feedback = 0.6; // Any feedback is slightly positive
        }
    }

    // Factor 2: Task success
    if let Some(success) = task_outcome {
        factors.task_success = if success { 0.9 } else { 0.2 };
    }

    // Factor 3: Substance — longer, structured responses are higher quality training data
    let output_len = output.len();
    factors.substance = if output_len < 20 {
        0.1  // Too short to be useful
    } else if output_len < 100 {
        0.4
    } else if output_len < 500 {
        0.7
    } else {
        0.9
    };

    // Bonus for structured content (code blocks, lists)
    if output.contains("```") || output.contains("- ") || output.contains("1.") {
        factors.substance = (factors.substance + 0.1).min(1.0);
    }

    // Penalize very short inputs (less context for learning)
    if input.len() < 10 {
        factors.substance *= 0.5;
    }

    // Overall score: weighted average
    let score = factors.human_feedback * 0.3
        + factors.task_success * 0.25
        + factors.substance * 0.3
        + factors.correction * 0.15;

    QualityScore {
        score: score.min(1.0),
        factors,
    }
}

// =============================================================================
// TESTS
// =============================================================================
