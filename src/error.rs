pub type KetavResult<T> = std::result::Result<T, KetavError>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ParseErrorKind {
    /// A block opener with no matching closer, e.g. `{{#if x}}` without `{{/if}}`.
    Unterminated {
        /// The closer that was never found, e.g. "{{/if}}".
        expected: String,
    },
    /// A closer or `{{else}}` with no open block to attach to.
    StrayCloser {
        found: String,
    },
    UnexpectedEOF {
        /// Describes what was expected, e.g., "(expected '}}')"
        expected_what: String,
    },
    UnknownKeyword {
        keyword: String,
    },
    /// A gender token with more options than male/female/plural.
    TooManyGenderOptions {
        count: usize,
    },
    Expected {
        description: String,
    },
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unterminated { expected } => {
                write!(f, "Unterminated block (expected '{}')", expected)
            }
            Self::StrayCloser { found } => {
                write!(f, "'{}' does not close any open block", found)
            }
            Self::UnexpectedEOF { expected_what } => {
                write!(f, "Unexpected EOF{}", expected_what)
            }
            Self::UnknownKeyword { keyword } => {
                write!(f, "Unknown keyword '{}'", keyword)
            }
            Self::TooManyGenderOptions { count } => {
                write!(f, "Gender token has {} options, at most 3 allowed", count)
            }
            Self::Expected { description } => {
                write!(f, "Expected {}", description)
            }
        }
    }
}

impl std::error::Error for ParseErrorKind {}

impl ParseErrorKind {
    pub fn unexpected_eof(expected: Option<&str>) -> Self {
        Self::UnexpectedEOF {
            expected_what: expected.map_or_else(String::new, |e| format!(" (expected '{}')", e)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub kind: ParseErrorKind,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse error at line {}, column {}: {}",
            self.line, self.column, self.kind
        )
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum KetavError {
    SkeletonExists {
        document_type: String,
    },
    MissingSkeleton {
        document_type: String,
    },
    /// A token could not be resolved and the policy is [`TokenPolicy::Error`].
    ///
    /// [`TokenPolicy::Error`]: crate::TokenPolicy::Error
    Unresolved {
        token: String,
    },
    DuplicateClause {
        id: String,
    },
    Catalog {
        message: String,
    },
    InvalidRating {
        rating: u8,
    },
    Parse(ParseError),
}

impl std::fmt::Display for KetavError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SkeletonExists { document_type } => {
                write!(f, "Skeleton already registered: {}", document_type)
            }
            Self::MissingSkeleton { document_type } => {
                write!(f, "No skeleton registered for document type: {}", document_type)
            }
            Self::Unresolved { token } => {
                write!(f, "Unresolved token: {}", token)
            }
            Self::DuplicateClause { id } => {
                write!(f, "Duplicate clause id in catalog: {}", id)
            }
            Self::Catalog { message } => {
                write!(f, "Clause catalog error: {}", message)
            }
            Self::InvalidRating { rating } => {
                write!(f, "Correction rating must be between 1 and 5, got {}", rating)
            }
            Self::Parse(parse_error) => {
                write!(f, "{}", parse_error)
            }
        }
    }
}

impl std::error::Error for KetavError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(parse_error) => Some(parse_error),
            Self::SkeletonExists { .. }
            | Self::MissingSkeleton { .. }
            | Self::Unresolved { .. }
            | Self::DuplicateClause { .. }
            | Self::Catalog { .. }
            | Self::InvalidRating { .. } => None,
        }
    }
}

impl From<ParseError> for KetavError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<serde_json::Error> for KetavError {
    fn from(error: serde_json::Error) -> Self {
        Self::Catalog {
            message: error.to_string(),
        }
    }
}
