use std::borrow::Cow;

use crate::error::ParseError;

/// The raw source of a block's delimiting tags, re-emitted verbatim when the
/// block's pass is disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlockTags<'a> {
    pub(crate) open: &'a str,
    pub(crate) otherwise: Option<&'a str>,
    pub(crate) close: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AstNode<'a> {
    Root(Vec<AstNode<'a>>),
    /// A constant block of text from the template, with all escapes processed.
    ///
    /// If there were no escapes in the given text this will be Borrowed -
    /// otherwise we are forced to allocate.
    Constant { data: Cow<'a, str> },
    /// `{{path}}`, `{{this}}` or `{{this.path}}`.
    Variable { path: &'a str, raw: &'a str },
    /// `{{@index}}`
    Index { raw: &'a str },
    /// `{{gender:...}}` or `{{gender.role:...}}`, options split on `|`.
    Gender {
        role: Option<&'a str>,
        options: Vec<&'a str>,
        raw: &'a str,
    },
    /// `{{standard:id}}`
    Clause { id: &'a str, raw: &'a str },
    If {
        condition: &'a str,
        body: Vec<AstNode<'a>>,
        else_branch: Option<Vec<AstNode<'a>>>,
        tags: BlockTags<'a>,
    },
    Each {
        iterable: &'a str,
        body: Vec<AstNode<'a>>,
        tags: BlockTags<'a>,
    },
    /// Marker text the parser could not make sense of.
    Malformed { raw: &'a str, error: ParseError },
}

/// Whether a path refers to the current collection item.
pub(crate) fn is_item_path(path: &str) -> bool {
    path == "this" || path.starts_with("this.")
}
