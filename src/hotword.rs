//! Hotword matching on transcribed text
//!
//! Every interaction must contain a configured trigger phrase somewhere in the
//! utterance. Matching is case-insensitive substring search in a canonical
//! language; utterances detected in another language are translated first (best
//! effort) by [`HotwordSet::normalize`].

use crate::translate::Translator;

/// One configured trigger phrase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotwordEntry {
    /// Canonical phrase (e.g. "hey llama")
    pub phrase: String,

    /// Spoken variants that also trigger this entry
    pub variants: Vec<String>,

    /// Model this phrase routes to; `None` means the configured default
    pub model: Option<String>,
}

/// A successful hotword match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotwordMatch {
    /// Canonical phrase of the entry that matched
    pub phrase: String,

    /// Command text following the trigger, trimmed of leading separators
    pub command: String,

    /// Model the entry routes to, if any
    pub model: Option<String>,
}

/// Immutable, ordered set of trigger phrases
///
/// Entries are checked in configuration order and the first match wins, so
/// overlapping phrases resolve the same way every time.
pub struct HotwordSet {
    entries: Vec<HotwordEntry>,
    language: String,
}

impl HotwordSet {
    /// Build a set from configured entries
    ///
    /// Phrases and variants are lowercased and trimmed once here; empty
    /// variants are dropped.
    #[must_use]
    pub fn new(entries: Vec<HotwordEntry>, language: impl Into<String>) -> Self {
        let entries: Vec<HotwordEntry> = entries
            .into_iter()
            .map(|entry| HotwordEntry {
                phrase: entry.phrase.trim().to_lowercase(),
                variants: entry
                    .variants
                    .into_iter()
                    .map(|v| v.trim().to_lowercase())
                    .filter(|v| !v.is_empty())
                    .collect(),
                model: entry.model,
            })
            .collect();

        let language = language.into().to_lowercase();

        tracing::debug!(
            phrases = ?entries.iter().map(|e| e.phrase.as_str()).collect::<Vec<_>>(),
            language = %language,
            "hotword set initialized"
        );

        Self { entries, language }
    }

    /// Normalize an utterance into the canonical matching language
    ///
    /// Lowercases and trims the text. When the detected language differs from
    /// the canonical one, the utterance is translated first; translation
    /// failure degrades to matching the text as heard.
    pub async fn normalize(
        &self,
        utterance: &str,
        detected_language: Option<&str>,
        translator: &dyn Translator,
    ) -> String {
        // Whisper-style servers report "en", "en-US", or "english"; a prefix
        // check on the lowercased tag covers all three.
        let canonical = detected_language.is_none_or(|lang| {
            lang.to_ascii_lowercase().starts_with(self.language.as_str())
        });

        if canonical {
            return utterance.trim().to_lowercase();
        }

        match translator.translate(utterance, &self.language).await {
            Ok(translated) => {
                tracing::debug!(
                    language = detected_language.unwrap_or("unknown"),
                    "utterance translated for matching"
                );
                translated.trim().to_lowercase()
            }
            Err(e) => {
                tracing::warn!(error = %e, "translation failed, matching the utterance as heard");
                utterance.trim().to_lowercase()
            }
        }
    }

    /// Find the first entry whose phrase or variant occurs in the text
    ///
    /// The returned command is everything after the trigger, with leading
    /// whitespace, commas, and periods stripped. Returns `None` when no entry
    /// matches; the caller treats that as "not addressed to us".
    #[must_use]
    pub fn match_text(&self, text: &str) -> Option<HotwordMatch> {
        let lower = text.to_lowercase();

        for entry in &self.entries {
            for trigger in std::iter::once(&entry.phrase).chain(entry.variants.iter()) {
                if let Some(pos) = lower.find(trigger.as_str()) {
                    let command = lower[pos + trigger.len()..]
                        .trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == '.')
                        .trim_end()
                        .to_string();

                    tracing::info!(hotword = %entry.phrase, trigger = %trigger, "hotword matched");

                    return Some(HotwordMatch {
                        phrase: entry.phrase.clone(),
                        command,
                        model: entry.model.clone(),
                    });
                }
            }
        }

        None
    }

    /// Canonical phrases, in matching order
    #[must_use]
    pub fn phrases(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.phrase.as_str()).collect()
    }

    /// Canonical matching language
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the set has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
