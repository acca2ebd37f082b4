//! Lexical-search languages and the workspace language allowlist.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::RetrievalSettings;
use crate::error::{Error, Result};

/// Languages the lexical indexes know how to analyze.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LexicalLanguage {
    English,
    German,
    French,
}

impl LexicalLanguage {
    pub const SUPPORTED: [LexicalLanguage; 3] =
        [LexicalLanguage::English, LexicalLanguage::German, LexicalLanguage::French];

    pub fn tag(&self) -> &'static str {
        match self {
            LexicalLanguage::English => "english",
            LexicalLanguage::German => "german",
            LexicalLanguage::French => "french",
        }
    }

    /// Case-insensitive parse of a stored tag. Unknown tags yield `None`.
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        Self::SUPPORTED.into_iter().find(|l| l.tag().eq_ignore_ascii_case(tag))
    }

    /// Words dropped before lexical matching.
    pub fn stop_words(&self) -> &'static [&'static str] {
        match self {
            LexicalLanguage::English => &[
                "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in",
                "is", "it", "its", "of", "on", "that", "the", "to", "was", "will", "with", "or",
                "but", "not", "this", "these", "they", "them", "their", "there", "then", "than",
                "so", "if", "when", "where", "why", "how", "what", "which", "who", "whom", "whose",
                "can", "could", "should", "would", "may", "might", "must", "shall", "do", "does",
                "did", "have", "had", "having",
            ],
            LexicalLanguage::German => &[
                "der", "die", "das", "den", "dem", "des", "ein", "eine", "einer", "eines", "einem",
                "einen", "und", "oder", "aber", "ist", "sind", "war", "waren", "zu", "im", "in",
                "mit", "von", "auf", "für", "an", "als", "auch", "es", "sich", "nicht", "wie",
                "dass", "bei", "nach", "aus", "wird", "werden", "hat", "haben",
            ],
            LexicalLanguage::French => &[
                "le", "la", "les", "un", "une", "des", "du", "de", "et", "ou", "mais", "est",
                "sont", "à", "au", "aux", "en", "dans", "par", "pour", "sur", "avec", "ce", "cette",
                "ces", "il", "elle", "ils", "elles", "ne", "pas", "que", "qui", "se", "son", "sa",
                "ses",
            ],
        }
    }
}

impl fmt::Display for LexicalLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Validated allowlist plus the language used when a tag falls outside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePolicy {
    allowed: Vec<LexicalLanguage>,
    fallback: LexicalLanguage,
}

impl LanguagePolicy {
    pub fn new(allowed: Vec<LexicalLanguage>, fallback: LexicalLanguage) -> Result<Self> {
        if allowed.is_empty() {
            return Err(Error::InvalidConfig("lexical language allowlist is empty".into()));
        }
        if !allowed.contains(&fallback) {
            return Err(Error::InvalidConfig(format!(
                "default language '{fallback}' is not in the allowlist"
            )));
        }
        Ok(Self { allowed, fallback })
    }

    pub fn from_settings(settings: &RetrievalSettings) -> Result<Self> {
        let mut allowed = Vec::with_capacity(settings.lexical_languages.len());
        for tag in &settings.lexical_languages {
            let lang = LexicalLanguage::parse(tag).ok_or_else(|| {
                Error::InvalidConfig(format!("unsupported lexical language '{tag}'"))
            })?;
            if !allowed.contains(&lang) {
                allowed.push(lang);
            }
        }
        let fallback = LexicalLanguage::parse(&settings.default_language).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "unsupported default language '{}'",
                settings.default_language
            ))
        })?;
        Self::new(allowed, fallback)
    }

    pub fn allowed(&self) -> &[LexicalLanguage] {
        &self.allowed
    }

    pub fn fallback(&self) -> LexicalLanguage {
        self.fallback
    }

    /// Maps a stored tag onto an allowlisted language, never failing.
    pub fn resolve(&self, tag: Option<&str>) -> LexicalLanguage {
        let Some(tag) = tag else { return self.fallback };
        match LexicalLanguage::parse(tag) {
            Some(lang) if self.allowed.contains(&lang) => lang,
            _ => {
                tracing::warn!(tag, fallback = %self.fallback, "lexical language outside allowlist, using default");
                self.fallback
            }
        }
    }
}
