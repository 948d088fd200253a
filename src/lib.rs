//! Gender-aware template rendering and clause assembly for Hebrew legal
//! documents.
mod ast;
mod catalog;
mod engine;
mod error;
mod interface;
mod options;
mod parser;
mod prompt;
mod rewrite;
mod template;

// Public exports.
pub use catalog::{ClauseCatalog, ClauseTemplate, GenderVariables};
pub use engine::{DocumentEngine, DocumentType};
pub use error::{KetavError, KetavResult, ParseError, ParseErrorKind};
pub use interface::{
    DocumentAssembler, DocumentRequest, FieldKind, FillData, Gender, Genders, RenderedDocument,
    Value,
};
pub use options::{Passes, RenderOptions, TokenPolicy};
pub use prompt::{
    CONTENT_RULE, Correction, CorrectionStore, FormalityLevel, InMemoryCorrectionStore,
    PHRASE_PAIRS, PhrasePair, PromptBuilder, PromptContext, PromptOptions,
};
pub use rewrite::{
    RewriteError, RewriteService, RewriteSource, Rewritten, improve_text_locally, rewrite,
    rewrite_or_fallback,
};
pub use template::{
    RenderSettings, Template, expand_collections, expand_conditionals, render,
    resolve_placeholders, select_gender_variants,
};
