//! Input guard: content-quality validation of raw research text.
//!
//! Runs before the first generation call so that inputs with no real
//! consumer-intent data never produce a hallucinated strategy. A guard
//! failure is a content-quality rejection (the run ends `rejected`), not
//! a system fault.

use regex::Regex;

use crate::config::GuardConfig;

/// Patterns that strongly indicate non-research content.
const GARBAGE_PATTERNS: &[&str] = &[
    // Pure reaction text
    r"(?i)^\s*(?:lol|555|haha|xd|wtf|omg)\s*$",
    // Greetings / test messages
    r"(?i)^(?:test|hello|hi|สวัสดี|ทดสอบ)\s*$",
    // Recipes
    r"(?i)(?:flour|butter|sugar|bake|tbsp|cup of|preheat)",
    // Source code
    r"(?:def |import |class |function |var |const |let )",
    // Mostly URLs
    r"(?:https?://\S+\s*){3,}",
];

/// Consumer-experience markers; at least one must be present.
const EXPERIENCE_SIGNALS: &[&str] = &[
    // Purchase intent
    r"(?i)(?:ซื้อ|bought|ordered|purchase|spend|เสีย|paid|จ่าย)",
    // Physical symptoms
    r"(?i)(?:ปวด|pain|hurt|ache|discomfort|เจ็บ|ไม่สบาย)",
    // Problems / emotions
    r"(?i)(?:ปัญหา|problem|issue|struggle|frustrat|เบื่อ|กังวล|กลัว)",
    // Reviews / experience
    r"(?i)(?:รีวิว|review|recommend|แนะนำ|ประสบการณ์|experience|ใช้งาน)",
    // Desire / need
    r"(?i)(?:อยากได้|want|need|looking for|หา|ต้องการ)",
    // Comparisons
    r"(?i)(?:เปรียบ|compare|vs\.|versus|ดีกว่า|better|worse)",
    // Concrete measurements
    r"(?i)(?:cm|ซม|กิโล|kg|บาท|thb|฿|\$|usd|baht)",
];

/// Validates that raw input contains researchable consumer content.
pub struct InputGuard {
    config: GuardConfig,
    word_pattern: Regex,
    garbage: Vec<Regex>,
    signals: Vec<Regex>,
}

impl InputGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            word_pattern: Regex::new(r"\w+").expect("static pattern"),
            garbage: GARBAGE_PATTERNS
                .iter()
                .map(|p| Regex::new(p).expect("static pattern"))
                .collect(),
            signals: EXPERIENCE_SIGNALS
                .iter()
                .map(|p| Regex::new(p).expect("static pattern"))
                .collect(),
        }
    }

    /// Check the input. Returns a user-remediable reason on rejection.
    ///
    /// Checks, in order: length, word count, non-research blacklist,
    /// experience-signal whitelist, word diversity (spam).
    pub fn check(&self, text: &str) -> Result<(), String> {
        let stripped = text.trim();

        let char_count = stripped.chars().count();
        if char_count < self.config.min_chars {
            return Err(format!(
                "Input too short ({} chars, min {}). Please paste user comments, reviews, or research notes.",
                char_count, self.config.min_chars
            ));
        }

        let words: Vec<String> = self
            .word_pattern
            .find_iter(&stripped.to_lowercase())
            .map(|m| m.as_str().to_string())
            .collect();
        if words.len() < self.config.min_words {
            return Err(format!(
                "Too few words ({}, min {})",
                words.len(),
                self.config.min_words
            ));
        }

        if self.garbage.iter().any(|p| p.is_match(stripped)) {
            return Err(
                "Input does not look like consumer research (reaction text, code, recipes, or link dumps)."
                    .to_string(),
            );
        }

        if !self.signals.iter().any(|p| p.is_match(stripped)) {
            return Err(
                "No consumer experience signals found (no purchase, pain, emotion, or measurement markers). \
                 Please paste user comments, reviews, or research notes."
                    .to_string(),
            );
        }

        if words.len() >= 10 {
            let unique: std::collections::HashSet<&String> = words.iter().collect();
            let ratio = unique.len() as f64 / words.len() as f64;
            if ratio < self.config.min_unique_ratio {
                return Err(format!(
                    "Input appears to be spam (word diversity {ratio:.2})"
                ));
            }
        }

        Ok(())
    }
}

impl Default for InputGuard {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_INPUT: &str = "I bought an ergonomic chair for 4500 baht because of chronic back pain \
        after long office hours, but the lumbar support is a problem and I want a better option.";

    const VALID_THAI_INPUT: &str = "ซื้อเก้าอี้ทำงานมาใช้ได้สามเดือน ปวดหลังมากตอนนั่งนานๆ \
        อยากได้รุ่นที่รองรับหลังดีกว่านี้ งบประมาณไม่เกิน 5000 บาท มีปัญหาเรื่องเบาะนั่งแข็งเกินไป \
        เคยอ่านรีวิวหลายรุ่นแต่ยังตัดสินใจไม่ได้ กังวลว่าจะเสียเงินเปล่าอีกรอบ";

    #[test]
    fn test_valid_input_passes() {
        let guard = InputGuard::default();
        guard.check(VALID_INPUT).unwrap();
    }

    #[test]
    fn test_valid_thai_input_passes() {
        let guard = InputGuard::default();
        guard.check(VALID_THAI_INPUT).unwrap();
    }

    #[test]
    fn test_short_input_rejected() {
        let guard = InputGuard::default();
        let reason = guard.check("shor").unwrap_err();
        assert!(reason.contains("too short"), "{reason}");
    }

    #[test]
    fn test_reaction_text_rejected() {
        let guard = InputGuard::default();
        // Long enough to pass the length check, still pure reaction.
        let config = GuardConfig {
            min_chars: 3,
            min_words: 1,
            ..GuardConfig::default()
        };
        let guard_short = InputGuard::new(config);
        assert!(guard_short.check("lol").is_err());
        assert!(guard.check("haha ".repeat(10).as_str()).is_err());
    }

    #[test]
    fn test_recipe_rejected() {
        let guard = InputGuard::default();
        let reason = guard
            .check("Preheat the oven, mix two cups of flour with butter and sugar, then bake for thirty minutes")
            .unwrap_err();
        assert!(reason.contains("consumer research"), "{reason}");
    }

    #[test]
    fn test_no_experience_signals_rejected() {
        let guard = InputGuard::default();
        let reason = guard
            .check("The weather today is cloudy with gentle wind and the sky looks grey over the mountains")
            .unwrap_err();
        assert!(reason.contains("experience signals"), "{reason}");
    }

    #[test]
    fn test_spam_rejected() {
        let guard = InputGuard::default();
        let spam = "bought bought bought bought bought bought bought bought bought bought bought bought";
        let reason = guard.check(spam).unwrap_err();
        assert!(reason.contains("spam"), "{reason}");
    }
}
