// src/pipeline/feedback.rs

//! Rules for feeding OCR'd customer names back into discovery.

use crate::models::FeedbackConfig;

/// Decides which names read from logos re-enter the search stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackPolicy {
    enabled: bool,
    max_name_chars: usize,
    max_generation: u32,
}

impl FeedbackPolicy {
    pub fn new(config: &FeedbackConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_name_chars: config.max_name_chars,
            max_generation: config.max_generation,
        }
    }

    /// Plausible company name: non-empty and short enough.
    pub fn is_name(&self, name: &str) -> bool {
        let name = name.trim();
        !name.is_empty() && name.chars().count() <= self.max_name_chars
    }

    /// May `name`, discovered at `generation`, be queued for search?
    pub fn admits(&self, name: &str, generation: u32) -> bool {
        self.enabled && generation <= self.max_generation && self.is_name(name)
    }

    /// Can work at `generation` still produce admissible names?
    pub fn can_feed_back(&self, generation: u32) -> bool {
        self.enabled && generation < self.max_generation
    }
}
