use serde::{Deserialize, Serialize};

/// What to do with a token that cannot be resolved or parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPolicy {
    /// Keep the token's literal text in the output.
    #[default]
    Leave,
    /// Drop the token from the output.
    Blank,
    /// Fail the render.
    Error,
}

/// Rendering configuration.
///
/// ```
/// use ketav::{RenderOptions, TokenPolicy};
///
/// let options: RenderOptions = serde_json::from_str(r#"{"on_unresolved": "blank"}"#).unwrap();
/// assert_eq!(options.on_unresolved, TokenPolicy::Blank);
/// assert_eq!(options.on_malformed, TokenPolicy::Leave);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Missing variables, unknown clause ids, `this`/`@index` outside a collection.
    pub on_unresolved: TokenPolicy,
    /// Unterminated blocks, stray closers, unknown keywords.
    pub on_malformed: TokenPolicy,
    /// How deep `{{standard:..}}` clauses may include other clauses.
    pub max_clause_depth: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            on_unresolved: TokenPolicy::Leave,
            on_malformed: TokenPolicy::Leave,
            max_clause_depth: 8,
        }
    }
}

impl RenderOptions {
    /// Fails on anything unresolved or malformed.
    pub const fn strict() -> Self {
        Self {
            on_unresolved: TokenPolicy::Error,
            on_malformed: TokenPolicy::Error,
            max_clause_depth: 8,
        }
    }
}

/// Which expansions a render performs. Tokens belonging to a disabled pass are
/// copied to the output verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Passes {
    pub clauses: bool,
    pub variables: bool,
    pub genders: bool,
    pub collections: bool,
    pub conditionals: bool,
}

impl Passes {
    pub const ALL: Self = Self {
        clauses: true,
        variables: true,
        genders: true,
        collections: true,
        conditionals: true,
    };

    pub const NONE: Self = Self {
        clauses: false,
        variables: false,
        genders: false,
        collections: false,
        conditionals: false,
    };

    pub const fn variables() -> Self {
        Self {
            variables: true,
            ..Self::NONE
        }
    }

    pub const fn genders() -> Self {
        Self {
            genders: true,
            ..Self::NONE
        }
    }

    pub const fn collections() -> Self {
        Self {
            collections: true,
            ..Self::NONE
        }
    }

    pub const fn conditionals() -> Self {
        Self {
            conditionals: true,
            ..Self::NONE
        }
    }
}

impl Default for Passes {
    fn default() -> Self {
        Self::ALL
    }
}
