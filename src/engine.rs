use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::ClauseCatalog;
use crate::error::{KetavError, KetavResult};
use crate::interface::{DocumentAssembler, DocumentRequest, FieldKind, FillData, RenderedDocument};
use crate::options::{RenderOptions, TokenPolicy};
use crate::template::{RenderSettings, Template};

/// The document types that ship with a built-in skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Will,
    PowerOfAttorney,
    FeeAgreement,
    CourtFiling,
}

impl DocumentType {
    pub const ALL: [Self; 4] = [
        Self::Will,
        Self::PowerOfAttorney,
        Self::FeeAgreement,
        Self::CourtFiling,
    ];

    /// The name skeletons are registered under.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Will => "will",
            Self::PowerOfAttorney => "power_of_attorney",
            Self::FeeAgreement => "fee_agreement",
            Self::CourtFiling => "court_filing",
        }
    }

    pub const fn hebrew_name(self) -> &'static str {
        match self {
            Self::Will => "צוואה",
            Self::PowerOfAttorney => "ייפוי כוח",
            Self::FeeAgreement => "הסכם שכר טרחה",
            Self::CourtFiling => "כתב בי-דין",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|document_type| document_type.as_str() == value.trim())
    }

    const fn builtin_skeleton(self) -> &'static str {
        match self {
            Self::Will => include_str!("../data/skeletons/will.tmpl"),
            Self::PowerOfAttorney => include_str!("../data/skeletons/power_of_attorney.tmpl"),
            Self::FeeAgreement => include_str!("../data/skeletons/fee_agreement.tmpl"),
            Self::CourtFiling => include_str!("../data/skeletons/court_filing.tmpl"),
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `DocumentEngine` is the primary implementation of the `DocumentAssembler`
/// trait.
///
/// It owns a clause catalog and a set of named skeletons. Skeletons are kept
/// as text and parsed on every render, so the engine holds no borrowed state.
///
/// # Examples
///
/// ```
/// use ketav::{ClauseCatalog, DocumentAssembler, DocumentEngine, DocumentRequest, FillData};
///
/// let mut engine = DocumentEngine::new(ClauseCatalog::default());
/// engine.add_skeleton("note", "לכבוד {{recipient}}").unwrap();
///
/// let mut data = FillData::new();
/// data.insert("recipient", "עו\"ד לוי");
///
/// let document = engine
///     .render(&DocumentRequest::new("note").with_data(data))
///     .unwrap();
/// assert_eq!(document.text(), "לכבוד עו\"ד לוי");
/// ```
#[derive(Debug, Clone, Default)]
pub struct DocumentEngine {
    catalog: ClauseCatalog,
    skeletons: HashMap<String, String>,
    options: RenderOptions,
}

impl DocumentEngine {
    /// Creates an engine with no skeletons.
    pub fn new(catalog: ClauseCatalog) -> Self {
        Self {
            catalog,
            skeletons: HashMap::new(),
            options: RenderOptions::default(),
        }
    }

    /// Creates an engine over the built-in catalog with a skeleton registered
    /// for every [`DocumentType`].
    ///
    /// # Errors
    /// Only if the embedded catalog or skeletons are invalid.
    pub fn with_builtin_skeletons() -> KetavResult<Self> {
        let mut engine = Self::new(ClauseCatalog::builtin()?);
        for document_type in DocumentType::ALL {
            engine.add_skeleton(document_type.as_str(), document_type.builtin_skeleton())?;
        }
        Ok(engine)
    }

    #[must_use]
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub const fn catalog(&self) -> &ClauseCatalog {
        &self.catalog
    }

    pub const fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Names of the registered skeletons, sorted.
    pub fn document_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.skeletons.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn settings(&self) -> RenderSettings<'_> {
        RenderSettings::new(&self.catalog).with_options(self.options)
    }
}

impl DocumentAssembler for DocumentEngine {
    /// Registers a skeleton under `document_type`.
    ///
    /// Malformed skeletons are accepted with a warning unless the
    /// malformed-token policy is `Error`.
    fn add_skeleton<N: AsRef<str>, C: Into<String>>(
        &mut self,
        document_type: N,
        content: C,
    ) -> KetavResult<()> {
        let document_type = document_type.as_ref();

        if self.skeletons.contains_key(document_type) {
            return Err(KetavError::SkeletonExists {
                document_type: document_type.to_string(),
            });
        }

        let content = content.into();
        let first_error = {
            let template = Template::new(&content);
            for diagnostic in template.diagnostics() {
                warn!(document_type, %diagnostic, "malformed skeleton");
            }
            template.diagnostics().first().cloned()
        };
        if self.options.on_malformed == TokenPolicy::Error {
            if let Some(error) = first_error {
                return Err(KetavError::Parse(error));
            }
        }

        self.skeletons.insert(document_type.to_string(), content);
        Ok(())
    }

    fn render(&self, request: &DocumentRequest) -> KetavResult<RenderedDocument> {
        let skeleton = self
            .skeletons
            .get(&request.document_type)
            .ok_or_else(|| KetavError::MissingSkeleton {
                document_type: request.document_type.clone(),
            })?;

        let rendered = Template::new(skeleton).render_with_clauses(
            &request.data,
            &request.genders,
            &self.settings(),
            &request.clauses,
        )?;
        debug!(
            document_type = %request.document_type,
            unresolved = rendered.unresolved().len(),
            "rendered document"
        );
        Ok(rendered)
    }

    fn missing_fields<T: AsRef<str>>(
        &self,
        document_type: T,
        data: &FillData,
    ) -> Vec<(String, FieldKind)> {
        // If the skeleton doesn't exist, nothing is missing
        let Some(skeleton) = self.skeletons.get(document_type.as_ref()) else {
            return vec![];
        };

        let mut fields = Vec::new();
        Template::new(skeleton).collect_fields(&mut fields, data, Some(&self.catalog));

        fields.sort_by(|(a, _), (b, _)| a.cmp(b));
        fields.dedup_by(|(a, _), (b, _)| a == b);
        fields
    }
}
