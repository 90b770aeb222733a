//! Built-in prompt-injection detector.
//!
//! A fixed set of English and Russian phrasings matched against the
//! lowercased, whitespace-normalised question. Used when no detector
//! service is deployed (`safety.detector = "builtin"`).

use async_trait::async_trait;
use askgate_core::error::CollaboratorError;
use askgate_core::safety::{DetectOutcome, Detector};
use regex_lite::Regex;
use tracing::debug;

// regex-lite's `\b` is ASCII-only, so Cyrillic phrases anchor on
// whitespace instead.
const INJECTION_PATTERNS: &[&str] = &[
    r"\byour instructions\b",
    r"\byour prompt\b",
    r"\bsystem prompt\b",
    r"\bsystem\s*[:=]\s*",
    r"\byou are\b.*?\b(an?|the)\b.*?\b(assistant|ai|bot|llm|model|hacker|friend|god|master)\b",
    r"\bignore\s+previous\s+instructions?\b",
    r"\bdisregard\s+all\s+prior\s+prompts?\b",
    r"\bas\s+a\s+(friend|developer|admin|god|expert|hacker)\b",
    r"\bact\s+as\s+(if\s+you\s+are|a)\s+",
    r"\boverride\s+system\s+rules\b",
    r"\bpretend\s+to\s+be\b",
    r"\bfrom\s+now\s+on\b",
    r"\breset\s+your\s+identity\b",
    r"\bnew\s+instructions?\b.*?\b(from|given|are)\b",
    r"\boutput\s+only\b",
    r"\bdo\s+not\s+say\b",
    r"\bsecret\s+word\b",
    r"\bshow\s+me\s+the\s+system\s+prompt\b",
    r"(^|\s)не\s+следуй\s+предыдущим\s+инструкциям",
    r"(^|\s)забудь\s+все\s+инструкции",
    r"(^|\s)ты\s+должен\s.*?(игнорировать|забыть|сменить)",
    r"(^|\s)не\s+говори\s.*?(это|что|никому)",
    r"(^|\s)раскрой\s+секрет",
    r"(^|\s)выведи\s+весь\s+промпт",
];

pub struct PatternDetector {
    patterns: Vec<Regex>,
}

impl PatternDetector {
    /// Compile the built-in pattern set.
    pub fn new() -> Result<Self, regex_lite::Error> {
        Self::with_patterns(INJECTION_PATTERNS)
    }

    pub fn with_patterns(patterns: &[&str]) -> Result<Self, regex_lite::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Collapse whitespace runs and lowercase.
    fn normalize(text: &str) -> String {
        text.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    pub fn is_injection(&self, text: &str) -> bool {
        let normalized = Self::normalize(text);
        self.patterns.iter().any(|p| p.is_match(&normalized))
    }
}

#[async_trait]
impl Detector for PatternDetector {
    fn name(&self) -> &str {
        "builtin"
    }

    async fn detect(&self, text: &str) -> Result<DetectOutcome, CollaboratorError> {
        let is_injection = self.is_injection(text);
        debug!(is_injection, "Pattern detector answered");
        Ok(DetectOutcome { is_injection })
    }
}
