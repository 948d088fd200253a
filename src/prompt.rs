//! Prompt assembly for rewriting clause text into formal legal Hebrew.
//!
//! The builder performs no I/O. Past corrections are passed in explicitly or
//! read from an injected [`CorrectionStore`].

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::engine::DocumentType;
use crate::error::{KetavError, KetavResult};

/// The rule every prompt opens with.
pub const CONTENT_RULE: &str = "אין להוסיף תוכן. יש לשנות את הניסוח בלבד, ללא שינוי במשמעות, בעובדות, בשמות, בסכומים ובתאריכים.";

/// A colloquial phrase and the formal phrase that replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhrasePair {
    pub forbidden: &'static str,
    pub approved: &'static str,
}

const fn pair(forbidden: &'static str, approved: &'static str) -> PhrasePair {
    PhrasePair {
        forbidden,
        approved,
    }
}

/// The fixed phrase catalog embedded in every prompt and applied by
/// [`improve_text_locally`](crate::improve_text_locally).
pub const PHRASE_PAIRS: &[PhrasePair] = &[
    pair("אני רוצה", "הנני מבקש"),
    pair("אני מבקש", "הנני מבקש"),
    pair("בגלל זה", "לפיכך"),
    pair("בגלל", "עקב"),
    pair("אבל", "אולם"),
    pair("צריך", "נדרש"),
    pair("תכף", "בהקדם"),
    pair("בערך", "בקירוב"),
    pair("לפי", "על פי"),
    pair("ביחד עם", "בצירוף"),
    pair("כדי", "על מנת"),
];

/// How formal the rewritten text should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormalityLevel {
    #[default]
    Standard,
    Formal,
    Court,
}

impl FormalityLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Formal => "formal",
            Self::Court => "court",
        }
    }

    const fn instruction(self) -> &'static str {
        match self {
            Self::Standard => "עברית משפטית תקנית וברורה",
            Self::Formal => "עברית משפטית רשמית, בגוף שלישי ככל האפשר",
            Self::Court => "לשון כתבי בי-דין, כמקובל בהגשה לבית המשפט",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromptContext {
    /// The name the skeleton is registered under, built-in or not.
    pub document_type: String,
    #[serde(default)]
    pub formality: FormalityLevel,
}

impl PromptContext {
    pub fn new<T: Into<String>>(document_type: T, formality: FormalityLevel) -> Self {
        Self {
            document_type: document_type.into(),
            formality,
        }
    }

    /// The Hebrew name of a built-in document type, otherwise the registered
    /// name as given.
    pub fn document_name(&self) -> &str {
        DocumentType::parse(&self.document_type)
            .map_or(self.document_type.as_str(), |known| known.hebrew_name())
    }
}

/// A user's correction of an earlier AI suggestion, rated 1 to 5.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub original: String,
    pub ai_suggestion: String,
    pub user_correction: String,
    pub rating: u8,
}

impl Correction {
    pub const MIN_RATING: u8 = 1;
    pub const MAX_RATING: u8 = 5;

    pub const fn has_valid_rating(&self) -> bool {
        self.rating >= Self::MIN_RATING && self.rating <= Self::MAX_RATING
    }
}

/// An append-only log of corrections, owned by whoever persists them.
pub trait CorrectionStore {
    /// Appends a correction.
    ///
    /// # Errors
    /// Returns [`KetavError::InvalidRating`] if the rating is outside 1 to 5.
    fn record(&mut self, correction: Correction) -> KetavResult<()>;

    /// Every correction, oldest first.
    fn corrections(&self) -> &[Correction];
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InMemoryCorrectionStore {
    corrections: Vec<Correction>,
}

impl InMemoryCorrectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.corrections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty()
    }
}

impl CorrectionStore for InMemoryCorrectionStore {
    fn record(&mut self, correction: Correction) -> KetavResult<()> {
        if !correction.has_valid_rating() {
            return Err(KetavError::InvalidRating {
                rating: correction.rating,
            });
        }
        self.corrections.push(correction);
        Ok(())
    }

    fn corrections(&self) -> &[Correction] {
        &self.corrections
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptOptions {
    /// How many past corrections to include as examples.
    pub max_examples: usize,
    /// Corrections rated below this are ignored.
    pub min_rating: u8,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            max_examples: 3,
            min_rating: 4,
        }
    }
}

/// Builds the instruction string sent to the rewrite service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromptBuilder {
    options: PromptOptions,
}

impl PromptBuilder {
    pub const fn new(options: PromptOptions) -> Self {
        Self { options }
    }

    pub const fn options(&self) -> &PromptOptions {
        &self.options
    }

    /// The corrections used as examples: the most recent high-rated ones,
    /// newest first. `corrections` is ordered oldest first.
    pub fn select_examples<'c>(&self, corrections: &'c [Correction]) -> Vec<&'c Correction> {
        corrections
            .iter()
            .rev()
            .filter(|correction| {
                correction.has_valid_rating() && correction.rating >= self.options.min_rating
            })
            .take(self.options.max_examples)
            .collect()
    }

    /// Assembles the prompt for rewriting `original`.
    ///
    /// The output depends only on the arguments.
    pub fn build(
        &self,
        original: &str,
        context: &PromptContext,
        corrections: &[Correction],
    ) -> String {
        let mut prompt = String::new();
        // Formatting into a String cannot fail
        self.write_prompt(&mut prompt, original, context, corrections)
            .map_or_else(|_| String::new(), |()| prompt)
    }

    /// Writes the prompt for rewriting `original` into `out`.
    ///
    /// # Errors
    /// Only if `out` fails to accept the text.
    pub fn write_prompt<W: Write>(
        &self,
        out: &mut W,
        original: &str,
        context: &PromptContext,
        corrections: &[Correction],
    ) -> std::fmt::Result {
        writeln!(out, "# כלל מחייב")?;
        writeln!(out, "{}", CONTENT_RULE)?;
        writeln!(out)?;

        writeln!(out, "# הקשר")?;
        writeln!(out, "סוג המסמך: {}", context.document_name())?;
        writeln!(
            out,
            "רמת רשמיות: {} ({})",
            context.formality.as_str(),
            context.formality.instruction()
        )?;
        writeln!(out)?;

        writeln!(out, "# ביטויים אסורים וחלופותיהם")?;
        for phrase in PHRASE_PAIRS {
            writeln!(
                out,
                "- במקום \"{}\" יש לכתוב \"{}\"",
                phrase.forbidden, phrase.approved
            )?;
        }

        let examples = self.select_examples(corrections);
        if !examples.is_empty() {
            writeln!(out)?;
            writeln!(out, "# דוגמאות מתיקונים קודמים")?;
            for (number, example) in (1..).zip(examples) {
                writeln!(out, "{}. מקור: {}", number, example.original)?;
                writeln!(out, "   נוסח מתוקן: {}", example.user_correction)?;
            }
        }

        writeln!(out)?;
        writeln!(out, "# הטקסט לעיבוד")?;
        writeln!(out, "{}", original)?;
        writeln!(out)?;
        write!(out, "החזר את הנוסח המתוקן בלבד, ללא הסברים וללא מרכאות.")
    }

    /// Like [`PromptBuilder::build`], reading corrections from `store`.
    pub fn build_from_store<S: CorrectionStore + ?Sized>(
        &self,
        original: &str,
        context: &PromptContext,
        store: &S,
    ) -> String {
        self.build(original, context, store.corrections())
    }
}
