//! The boundary to an external text-generation service, and the local
//! rule-based fallback used when it is unavailable.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::prompt::{CorrectionStore, PHRASE_PAIRS, PromptBuilder, PromptContext};

/// Whole-word patterns for the phrase catalog, in catalog order.
static PHRASE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    PHRASE_PAIRS
        .iter()
        .filter_map(|phrase| {
            Regex::new(&format!(r"\b{}\b", regex::escape(phrase.forbidden)))
                .ok()
                .map(|pattern| (pattern, phrase.approved))
        })
        .collect()
});

static REPEATED_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid spaces pattern"));

static SPACE_BEFORE_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+([.,;:!?])").expect("valid punctuation pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RewriteError {
    /// The service could not be reached.
    Unavailable { reason: String },
    /// The service answered with a non-success status.
    Status { code: u16 },
    RateLimited,
    /// The response could not be understood.
    Malformed { reason: String },
    /// The response held no text.
    EmptyResponse,
}

impl std::fmt::Display for RewriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "Rewrite service unavailable: {}", reason),
            Self::Status { code } => write!(f, "Rewrite service returned status {}", code),
            Self::RateLimited => write!(f, "Rewrite service rate limit exceeded"),
            Self::Malformed { reason } => {
                write!(f, "Malformed rewrite service response: {}", reason)
            }
            Self::EmptyResponse => write!(f, "Rewrite service returned no text"),
        }
    }
}

impl std::error::Error for RewriteError {}

/// A text-generation service, implemented by the caller's client.
///
/// Closures of the right shape implement it, which is handy in tests.
pub trait RewriteService {
    /// Sends `prompt` and returns the single text block of the response.
    ///
    /// # Errors
    /// Any transport or response failure, as a [`RewriteError`].
    fn complete(&self, prompt: &str) -> Result<String, RewriteError>;
}

impl<F> RewriteService for F
where
    F: Fn(&str) -> Result<String, RewriteError>,
{
    fn complete(&self, prompt: &str) -> Result<String, RewriteError> {
        self(prompt)
    }
}

/// Where the text of a [`Rewritten`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteSource {
    Service,
    LocalFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rewritten {
    pub text: String,
    pub source: RewriteSource,
}

/// Trims whitespace and a pair of surrounding quotes from a response.
fn clean_response(response: &str) -> &str {
    let trimmed = response.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map_or(trimmed, str::trim)
}

/// Rewrites `text` through `service`, with a prompt built from `context` and
/// the corrections in `store`.
///
/// # Errors
/// Whatever the service fails with, or [`RewriteError::EmptyResponse`] if it
/// answers with blank text.
pub fn rewrite<S, C>(
    service: &S,
    builder: &PromptBuilder,
    text: &str,
    context: &PromptContext,
    store: &C,
) -> Result<String, RewriteError>
where
    S: RewriteService + ?Sized,
    C: CorrectionStore + ?Sized,
{
    let prompt = builder.build_from_store(text, context, store);
    debug!(prompt_len = prompt.len(), "sending rewrite prompt");

    let response = service.complete(&prompt)?;
    let cleaned = clean_response(&response);
    if cleaned.is_empty() {
        return Err(RewriteError::EmptyResponse);
    }
    Ok(cleaned.to_string())
}

/// Like [`rewrite`], but never fails: service errors are logged and the text
/// is improved locally instead.
pub fn rewrite_or_fallback<S, C>(
    service: &S,
    builder: &PromptBuilder,
    text: &str,
    context: &PromptContext,
    store: &C,
) -> Rewritten
where
    S: RewriteService + ?Sized,
    C: CorrectionStore + ?Sized,
{
    match rewrite(service, builder, text, context, store) {
        Ok(text) => Rewritten {
            text,
            source: RewriteSource::Service,
        },
        Err(error) => {
            warn!(%error, "rewrite service failed, using local fallback");
            Rewritten {
                text: improve_text_locally(text),
                source: RewriteSource::LocalFallback,
            }
        }
    }
}

/// Rule-based rewrite: replaces catalog phrases (whole words only), collapses
/// repeated spaces, and removes spaces before punctuation.
pub fn improve_text_locally(text: &str) -> String {
    let mut improved = text.to_string();
    for (pattern, approved) in PHRASE_PATTERNS.iter() {
        improved = pattern.replace_all(&improved, *approved).into_owned();
    }

    let improved = REPEATED_SPACES.replace_all(&improved, " ");
    SPACE_BEFORE_PUNCTUATION
        .replace_all(&improved, "$1")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DocumentType;
    use crate::prompt::{Correction, FormalityLevel, InMemoryCorrectionStore};

    fn context() -> PromptContext {
        PromptContext::new(DocumentType::PowerOfAttorney.as_str(), FormalityLevel::Standard)
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_local_phrases_whole_words() {
        assert_eq!(
            improve_text_locally("אני רוצה לחתום אבל צריך עד"),
            "הנני מבקש לחתום אולם נדרש עד"
        );
        // "אבלה" is a different word
        assert_eq!(improve_text_locally("אבלה"), "אבלה");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_local_spacing() {
        assert_eq!(improve_text_locally("שלום   עולם ,  וכן ."), "שלום עולם, וכן.");
        assert_eq!(improve_text_locally("ללא שינוי."), "ללא שינוי.");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_rewrite_sends_prompt_and_cleans_response() {
        let service = |prompt: &str| -> Result<String, RewriteError> {
            assert!(prompt.contains("טקסט מקורי"));
            assert!(prompt.contains("ייפוי כוח"));
            Ok("  \"נוסח משופר\"\n".to_string())
        };

        let result = rewrite(
            &service,
            &PromptBuilder::default(),
            "טקסט מקורי",
            &context(),
            &InMemoryCorrectionStore::new(),
        );
        assert_eq!(result, Ok("נוסח משופר".to_string()));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_rewrite_uses_store_examples() {
        let mut store = InMemoryCorrectionStore::new();
        store
            .record(Correction {
                original: "מקור".to_string(),
                ai_suggestion: "הצעה".to_string(),
                user_correction: "תיקון המשתמש".to_string(),
                rating: 5,
            })
            .unwrap();

        let service = |prompt: &str| -> Result<String, RewriteError> {
            Ok(if prompt.contains("תיקון המשתמש") {
                "with examples".to_string()
            } else {
                "without examples".to_string()
            })
        };
        assert_eq!(
            rewrite(&service, &PromptBuilder::default(), "x", &context(), &store),
            Ok("with examples".to_string())
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_rewrite_errors() {
        let empty = |_: &str| -> Result<String, RewriteError> { Ok("  ".to_string()) };
        let limited = |_: &str| -> Result<String, RewriteError> { Err(RewriteError::RateLimited) };
        let store = InMemoryCorrectionStore::new();
        let builder = PromptBuilder::default();

        assert_eq!(
            rewrite(&empty, &builder, "x", &context(), &store),
            Err(RewriteError::EmptyResponse)
        );
        assert_eq!(
            rewrite(&limited, &builder, "x", &context(), &store),
            Err(RewriteError::RateLimited)
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_fallback() {
        let down = |_: &str| -> Result<String, RewriteError> {
            Err(RewriteError::Status { code: 503 })
        };
        let rewritten = rewrite_or_fallback(
            &down,
            &PromptBuilder::default(),
            "אבל  צריך .",
            &context(),
            &InMemoryCorrectionStore::new(),
        );
        assert_eq!(
            rewritten,
            Rewritten {
                text: "אולם נדרש.".to_string(),
                source: RewriteSource::LocalFallback,
            }
        );

        let up = |_: &str| -> Result<String, RewriteError> { Ok("ok".to_string()) };
        let rewritten = rewrite_or_fallback(
            &up,
            &PromptBuilder::default(),
            "x",
            &context(),
            &InMemoryCorrectionStore::new(),
        );
        assert_eq!(rewritten.source, RewriteSource::Service);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_error_display() {
        assert_eq!(
            RewriteError::Status { code: 429 }.to_string(),
            "Rewrite service returned status 429"
        );
    }
}
