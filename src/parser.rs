use std::borrow::Cow;

use crate::{
    ast::{AstNode, BlockTags},
    error::{ParseError, ParseErrorKind},
};

/// The blocks a body can be nested in. `IfElse` is the else branch of an
/// `{{#if}}`, which no longer accepts `{{else}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    If,
    IfElse,
    Each,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    Else,
    CloseIf,
    CloseEach,
}

impl BlockKind {
    const fn accepts(self, terminator: Terminator) -> bool {
        matches!(
            (self, terminator),
            (Self::If, Terminator::Else | Terminator::CloseIf)
                | (Self::IfElse, Terminator::CloseIf)
                | (Self::Each, Terminator::CloseEach)
        )
    }

    const fn closer(self) -> &'static str {
        match self {
            Self::If | Self::IfElse => "{{/if}}",
            Self::Each => "{{/each}}",
        }
    }
}

/// A classified `{{ ... }}` tag.
#[derive(Debug)]
enum Tag<'a> {
    Variable(&'a str),
    Index,
    Gender {
        role: Option<&'a str>,
        options: Vec<&'a str>,
    },
    Clause(&'a str),
    OpenIf(&'a str),
    OpenEach(&'a str),
    End(Terminator),
    Invalid(ParseErrorKind),
}

/// A position in the input, used to place diagnostics.
#[derive(Debug, Clone, Copy)]
struct Mark {
    pos: usize,
    line: usize,
    line_start_pos: usize,
}

/// A block whose closer has not been seen yet.
struct OpenBlock<'a> {
    kind: BlockKind,
    argument: &'a str,
    open_raw: &'a str,
    at: Mark,
    /// Nodes of the branch currently being parsed.
    nodes: Vec<AstNode<'a>>,
    /// The `{{#if}}` branch and the raw `{{else}}`, once `{{else}}` is seen.
    then_branch: Option<(Vec<AstNode<'a>>, &'a str, Mark)>,
}

impl<'a> OpenBlock<'a> {
    const fn new(kind: BlockKind, argument: &'a str, open_raw: &'a str, at: Mark) -> Self {
        Self {
            kind,
            argument,
            open_raw,
            at,
            nodes: Vec::new(),
            then_branch: None,
        }
    }

    fn close(self, close: &'a str) -> AstNode<'a> {
        match self.kind {
            BlockKind::Each => AstNode::Each {
                iterable: self.argument,
                body: self.nodes,
                tags: BlockTags {
                    open: self.open_raw,
                    otherwise: None,
                    close,
                },
            },
            BlockKind::If | BlockKind::IfElse => match self.then_branch {
                Some((body, otherwise, _)) => AstNode::If {
                    condition: self.argument,
                    body,
                    else_branch: Some(self.nodes),
                    tags: BlockTags {
                        open: self.open_raw,
                        otherwise: Some(otherwise),
                        close,
                    },
                },
                None => AstNode::If {
                    condition: self.argument,
                    body: self.nodes,
                    else_branch: None,
                    tags: BlockTags {
                        open: self.open_raw,
                        otherwise: None,
                        close,
                    },
                },
            },
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// The starting location of the current line
    line_start_pos: usize,
    diagnostics: Vec<ParseError>,
    /// Top-level nodes.
    root: Vec<AstNode<'a>>,
    /// Blocks still waiting for their closer, innermost last.
    open: Vec<OpenBlock<'a>>,
}

impl<'a> Parser<'a> {
    const fn new(input: &'a str) -> Self {
        Parser {
            input,
            pos: 0,
            line: 1,
            line_start_pos: 0,
            diagnostics: Vec::new(),
            root: Vec::new(),
            open: Vec::new(),
        }
    }

    #[inline]
    const fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
            line_start_pos: self.line_start_pos,
        }
    }

    /// Records a diagnostic positioned at `mark` and returns it.
    fn diagnose(&mut self, mark: Mark, kind: ParseErrorKind) -> ParseError {
        let error = ParseError {
            line: mark.line,
            column: mark.pos.saturating_sub(mark.line_start_pos).saturating_add(1),
            kind,
        };
        self.diagnostics.push(error.clone());
        error
    }

    /// The node list new nodes are appended to.
    fn nodes(&mut self) -> &mut Vec<AstNode<'a>> {
        match self.open.last_mut() {
            Some(block) => &mut block.nodes,
            None => &mut self.root,
        }
    }

    /// Advances the parser position by char_len bytes, correctly handling
    /// multi-byte characters. Updates line and column numbers if a newline is
    /// encountered.
    #[inline]
    fn advance_by_char(&mut self, current_char: char, char_len: usize) {
        if current_char == '\n' {
            self.line = self.line.saturating_add(1);
            self.line_start_pos = self.pos.saturating_add(char_len);
        }
        self.pos = self.pos.saturating_add(char_len);
    }

    /// Advances the parser position by `len` bytes.
    /// This method assumes that the consumed bytes do NOT contain newlines.
    #[inline]
    fn advance_bytes_no_newline(&mut self, len: usize) {
        self.pos = self.pos.saturating_add(len);
    }

    /// Advances over `text`, which must be the input at the current position.
    fn advance_over(&mut self, text: &str) {
        for current_char in text.chars() {
            self.advance_by_char(current_char, current_char.len_utf8());
        }
    }

    fn remaining(&self) -> &'a str {
        self.input.get(self.pos..).unwrap_or_default()
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        self.input.get(start..end).unwrap_or_default()
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Peek if the remaining input starts with `s`
    fn peek(&self, s: &str) -> bool {
        self.remaining().starts_with(s)
    }

    /// Parses a block of constant text until the next `{{`, resolving `\{{`
    /// escapes.
    fn parse_constant(&mut self) -> AstNode<'a> {
        let start_pos = self.pos;
        let mut segment_start = start_pos;
        let mut owned: Option<String> = None;

        while !self.eof() {
            if self.peek("\\{{") {
                // Keep the {{ but drop the backslash
                let buffer = owned.get_or_insert_with(String::new);
                buffer.push_str(self.slice(segment_start, self.pos));
                self.advance_bytes_no_newline(1);
                segment_start = self.pos;
                self.advance_bytes_no_newline(2);
                continue;
            }

            if self.peek("{{") {
                break;
            }

            let Some(current_char) = self.remaining().chars().next() else {
                break;
            };
            self.advance_by_char(current_char, current_char.len_utf8());
        }

        let data = match owned {
            Some(mut buffer) => {
                buffer.push_str(self.slice(segment_start, self.pos));
                Cow::Owned(buffer)
            }
            None => Cow::Borrowed(self.slice(start_pos, self.pos)),
        };
        AstNode::Constant { data }
    }

    /// Scans the tag at the current `{{`, consuming it.
    ///
    /// Returns `None` (consuming nothing) if the text is not a marker at all.
    fn scan_tag(&mut self) -> Option<(Tag<'a>, &'a str)> {
        let rest = self.remaining();
        let after_open = rest.strip_prefix("{{")?;

        let Some(end) = after_open.find("}}") else {
            let raw = rest.get(..2).unwrap_or_default();
            self.advance_bytes_no_newline(2);
            return Some((
                Tag::Invalid(ParseErrorKind::unexpected_eof(Some("}}"))),
                raw,
            ));
        };

        let inner = after_open.get(..end).unwrap_or_default();
        if inner.contains("{{") {
            return None;
        }

        let tag = classify(inner)?;
        let raw = rest.get(..end.saturating_add(4)).unwrap_or_default();
        self.advance_over(raw);
        Some((tag, raw))
    }

    /// Parses the whole input in one pass.
    fn parse(&mut self) {
        while !self.eof() {
            if !self.peek("{{") {
                let constant = self.parse_constant();
                self.nodes().push(constant);
                continue;
            }

            let before_tag = self.mark();
            let Some((tag, raw)) = self.scan_tag() else {
                // Not a marker, so the braces are plain text.
                self.advance_bytes_no_newline(2);
                self.nodes().push(AstNode::Constant {
                    data: Cow::Borrowed("{{"),
                });
                continue;
            };

            let node = match tag {
                Tag::Variable(path) => AstNode::Variable { path, raw },
                Tag::Index => AstNode::Index { raw },
                Tag::Gender { role, options } => AstNode::Gender { role, options, raw },
                Tag::Clause(id) => AstNode::Clause { id, raw },
                Tag::OpenIf(condition) => {
                    let block = OpenBlock::new(BlockKind::If, condition, raw, before_tag);
                    self.open.push(block);
                    continue;
                }
                Tag::OpenEach(iterable) => {
                    let block = OpenBlock::new(BlockKind::Each, iterable, raw, before_tag);
                    self.open.push(block);
                    continue;
                }
                Tag::End(terminator) => {
                    self.end_block(terminator, raw, before_tag);
                    continue;
                }
                Tag::Invalid(kind) => {
                    let error = self.diagnose(before_tag, kind);
                    AstNode::Malformed { raw, error }
                }
            };
            self.nodes().push(node);
        }

        while let Some(block) = self.open.pop() {
            self.unterminated(block);
        }
        self.diagnostics
            .sort_by_key(|diagnostic| (diagnostic.line, diagnostic.column));
    }

    /// Handles `{{else}}`, `{{/if}}` and `{{/each}}`.
    ///
    /// The terminator goes to the innermost open block that accepts it. Blocks
    /// opened inside that one are unterminated.
    fn end_block(&mut self, terminator: Terminator, raw: &'a str, at: Mark) {
        let Some(depth) = self
            .open
            .iter()
            .rposition(|block| block.kind.accepts(terminator))
        else {
            let error = self.diagnose(
                at,
                ParseErrorKind::StrayCloser {
                    found: raw.to_string(),
                },
            );
            self.nodes().push(AstNode::Malformed { raw, error });
            return;
        };

        while self.open.len() > depth.saturating_add(1) {
            let Some(block) = self.open.pop() else {
                break;
            };
            self.unterminated(block);
        }

        if terminator == Terminator::Else {
            if let Some(block) = self.open.last_mut() {
                block.kind = BlockKind::IfElse;
                block.then_branch = Some((std::mem::take(&mut block.nodes), raw, at));
            }
            return;
        }

        if let Some(block) = self.open.pop() {
            let node = block.close(raw);
            self.nodes().push(node);
        }
    }

    /// Turns an unterminated opener into a malformed node and splices the
    /// would-be body into the enclosing node list.
    fn unterminated(&mut self, block: OpenBlock<'a>) {
        let error = self.diagnose(
            block.at,
            ParseErrorKind::Unterminated {
                expected: block.kind.closer().to_string(),
            },
        );
        let mut spliced = vec![AstNode::Malformed {
            raw: block.open_raw,
            error,
        }];

        if let Some((then_nodes, else_raw, else_at)) = block.then_branch {
            spliced.extend(then_nodes);
            let error = self.diagnose(
                else_at,
                ParseErrorKind::StrayCloser {
                    found: else_raw.to_string(),
                },
            );
            spliced.push(AstNode::Malformed {
                raw: else_raw,
                error,
            });
        }
        spliced.extend(block.nodes);
        self.nodes().extend(spliced);
    }
}

/// Classifies the text between `{{` and `}}`. Returns `None` if it is not a
/// marker.
fn classify(inner: &str) -> Option<Tag<'_>> {
    let trimmed = inner.trim();

    if let Some(block) = trimmed.strip_prefix('#') {
        let (keyword, argument) = block
            .split_once(char::is_whitespace)
            .map_or((block, ""), |(keyword, argument)| (keyword, argument.trim()));
        let tag = match keyword {
            "if" | "each" if !is_path(argument) => Tag::Invalid(ParseErrorKind::Expected {
                description: format!("a field name after '#{}'", keyword),
            }),
            "if" => Tag::OpenIf(argument),
            "each" => Tag::OpenEach(argument),
            _ => Tag::Invalid(ParseErrorKind::UnknownKeyword {
                keyword: format!("#{}", keyword),
            }),
        };
        return Some(tag);
    }

    if let Some(closer) = trimmed.strip_prefix('/') {
        let tag = match closer.trim() {
            "if" => Tag::End(Terminator::CloseIf),
            "each" => Tag::End(Terminator::CloseEach),
            keyword => Tag::Invalid(ParseErrorKind::UnknownKeyword {
                keyword: format!("/{}", keyword),
            }),
        };
        return Some(tag);
    }

    match trimmed {
        "else" => return Some(Tag::End(Terminator::Else)),
        "@index" => return Some(Tag::Index),
        _ => {}
    }

    if let Some(after) = inner.trim_start().strip_prefix("gender") {
        if let Some(options) = after.strip_prefix(':') {
            return Some(gender_tag(None, options));
        }
        if let Some((role, options)) = after.strip_prefix('.').and_then(|r| r.split_once(':')) {
            if is_path(role) {
                return Some(gender_tag(Some(role), options));
            }
        }
    }

    if let Some(id) = trimmed.strip_prefix("standard:") {
        let id = id.trim();
        if id.is_empty() {
            return Some(Tag::Invalid(ParseErrorKind::Expected {
                description: "a clause id after 'standard:'".to_string(),
            }));
        }
        return is_clause_id(id).then_some(Tag::Clause(id));
    }

    is_path(trimmed).then_some(Tag::Variable(trimmed))
}

fn gender_tag<'a>(role: Option<&'a str>, options: &'a str) -> Tag<'a> {
    let options: Vec<&str> = options.split('|').collect();
    if options.len() > 3 {
        return Tag::Invalid(ParseErrorKind::TooManyGenderOptions {
            count: options.len(),
        });
    }
    Tag::Gender { role, options }
}

/// A dotted field path. Segments may use any alphanumeric script, so Hebrew
/// field names are allowed.
fn is_path(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        })
}

fn is_clause_id(candidate: &str) -> bool {
    candidate
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

pub(crate) struct Parsed<'a> {
    pub(crate) ast: AstNode<'a>,
    pub(crate) diagnostics: Vec<ParseError>,
}

/// Parses a template. Never fails: malformed markers are kept as
/// [`AstNode::Malformed`] and reported in `diagnostics`.
pub(crate) fn tokenize(input: &str) -> Parsed<'_> {
    let mut parser = Parser::new(input);
    parser.parse();
    Parsed {
        ast: AstNode::Root(parser.root),
        diagnostics: parser.diagnostics,
    }
}

/// Tests for the parser module via tokenizer.
#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;

    // Helper macros for quick AST node creation in tests
    macro_rules! var {
        ($name:literal) => {
            AstNode::Variable {
                path: $name,
                raw: concat!("{{", $name, "}}"),
            }
        };
    }
    macro_rules! const_str {
        ($data:expr) => {
            AstNode::Constant {
                data: Cow::Borrowed($data),
            }
        };
    }

    fn nodes(input: &str) -> Vec<AstNode<'_>> {
        match tokenize(input).ast {
            AstNode::Root(nodes) => nodes,
            other => panic!("Expected Root node, got {:?}", other),
        }
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_empty_input() {
        assert_eq!(tokenize("").ast, AstNode::Root(vec![]));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_simple_constant() {
        assert_eq!(nodes("שלום עולם"), vec![const_str!("שלום עולם")]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_constant_and_variable() {
        assert_eq!(
            nodes("Hello {{name}}!"),
            vec![const_str!("Hello "), var!("name"), const_str!("!")]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_variable_with_whitespace_keeps_raw() {
        assert_eq!(
            nodes("{{ name }}"),
            vec![AstNode::Variable {
                path: "name",
                raw: "{{ name }}"
            }]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_hebrew_and_dotted_paths() {
        assert_eq!(nodes("{{שם}}"), vec![var!("שם")]);
        assert_eq!(nodes("{{principal.name}}"), vec![var!("principal.name")]);
        assert_eq!(nodes("{{this.title}}"), vec![var!("this.title")]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_no_spurious_empty_constants_between_tags() {
        assert_eq!(
            nodes("{{var1}}{{var2}}"),
            vec![var!("var1"), var!("var2")]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unrecognized_braces_are_text() {
        let parsed = tokenize("{{ two words }}");
        assert!(parsed.diagnostics.is_empty(), "not a marker, not an error");
        assert_eq!(
            parsed.ast,
            AstNode::Root(vec![const_str!("{{"), const_str!(" two words }}")])
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_escaped_braces() {
        assert_eq!(
            nodes("a \\{{name}} b"),
            vec![AstNode::Constant {
                data: Cow::Owned("a {{name}} b".to_string())
            }]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_gender_option_counts() {
        assert_eq!(
            nodes("{{gender:ה}}"),
            vec![AstNode::Gender {
                role: None,
                options: vec!["ה"],
                raw: "{{gender:ה}}"
            }]
        );
        assert_eq!(
            nodes("{{gender:אדון|גברת}}"),
            vec![AstNode::Gender {
                role: None,
                options: vec!["אדון", "גברת"],
                raw: "{{gender:אדון|גברת}}"
            }]
        );
        assert_eq!(
            nodes("{{gender.attorney:מיופה|מיופת|מיופי}}"),
            vec![AstNode::Gender {
                role: Some("attorney"),
                options: vec!["מיופה", "מיופת", "מיופי"],
                raw: "{{gender.attorney:מיופה|מיופת|מיופי}}"
            }]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_gender_options_are_not_trimmed() {
        assert_eq!(
            nodes("{{gender: הוא | היא }}"),
            vec![AstNode::Gender {
                role: None,
                options: vec![" הוא ", " היא "],
                raw: "{{gender: הוא | היא }}"
            }]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_too_many_gender_options() {
        let parsed = tokenize("{{gender:a|b|c|d}}");
        assert_eq!(parsed.diagnostics.len(), 1);
        assert!(matches!(
            parsed.diagnostics[0].kind,
            ParseErrorKind::TooManyGenderOptions { count: 4 }
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_variable_named_gender() {
        assert_eq!(nodes("{{gender}}"), vec![var!("gender")]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_clause_marker() {
        assert_eq!(
            nodes("{{standard:will-revocation}}"),
            vec![AstNode::Clause {
                id: "will-revocation",
                raw: "{{standard:will-revocation}}"
            }]
        );
        let parsed = tokenize("{{standard: }}");
        assert_eq!(parsed.diagnostics.len(), 1);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_simple_if() {
        assert_eq!(
            nodes("{{#if flag}}TEXT{{/if}}"),
            vec![AstNode::If {
                condition: "flag",
                body: vec![const_str!("TEXT")],
                else_branch: None,
                tags: BlockTags {
                    open: "{{#if flag}}",
                    otherwise: None,
                    close: "{{/if}}",
                },
            }]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_if_else() {
        assert_eq!(
            nodes("{{#if flag}}A{{else}}B{{/if}}"),
            vec![AstNode::If {
                condition: "flag",
                body: vec![const_str!("A")],
                else_branch: Some(vec![const_str!("B")]),
                tags: BlockTags {
                    open: "{{#if flag}}",
                    otherwise: Some("{{else}}"),
                    close: "{{/if}}",
                },
            }]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_simple_each() {
        assert_eq!(
            nodes("{{#each items}}{{@index}}:{{this.name}}{{/each}}"),
            vec![AstNode::Each {
                iterable: "items",
                body: vec![
                    AstNode::Index { raw: "{{@index}}" },
                    const_str!(":"),
                    var!("this.name"),
                ],
                tags: BlockTags {
                    open: "{{#each items}}",
                    otherwise: None,
                    close: "{{/each}}",
                },
            }]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_nested_if_in_each() {
        let parsed = nodes("{{#each heirs}}{{#if this.minor}}*{{/if}}{{/each}}");
        let [AstNode::Each { body, .. }] = parsed.as_slice() else {
            panic!("Expected a single each node, got {:?}", parsed);
        };
        assert!(matches!(
            body.as_slice(),
            [AstNode::If {
                condition: "this.minor",
                ..
            }]
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unterminated_if_becomes_malformed() {
        let parsed = tokenize("a{{#if flag}}b");
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.diagnostics[0].line, 1);
        assert_eq!(parsed.diagnostics[0].column, 2);
        let AstNode::Root(nodes) = parsed.ast else {
            panic!("Expected Root node");
        };
        assert!(matches!(
            nodes.as_slice(),
            [_, AstNode::Malformed { raw: "{{#if flag}}", .. }, _]
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_inner_unterminated_if_inside_each() {
        let parsed = tokenize("{{#each xs}}{{#if a}}X{{/each}}");
        assert_eq!(parsed.diagnostics.len(), 1);
        assert!(matches!(
            parsed.diagnostics[0].kind,
            ParseErrorKind::Unterminated { ref expected } if expected == "{{/if}}"
        ));
        let AstNode::Root(nodes) = parsed.ast else {
            panic!("Expected Root node");
        };
        let [AstNode::Each { body, .. }] = nodes.as_slice() else {
            panic!("Expected the each block to survive, got {:?}", nodes);
        };
        assert!(matches!(
            body.as_slice(),
            [AstNode::Malformed { raw: "{{#if a}}", .. }, _]
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_many_unterminated_openers() {
        let input = "{{#if a}}x".repeat(40);
        let parsed = tokenize(&input);
        assert_eq!(parsed.diagnostics.len(), 40);
        assert_eq!(parsed.diagnostics[1].column, 11);

        let AstNode::Root(nodes) = parsed.ast else {
            panic!("Expected Root node");
        };
        assert_eq!(nodes.len(), 80);
        assert!(matches!(
            nodes.as_slice(),
            [AstNode::Malformed { raw: "{{#if a}}", .. }, _, ..]
        ));
        assert_eq!(nodes.last(), Some(&const_str!("x")));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unterminated_if_with_else() {
        let parsed = tokenize("{{#if a}}1{{else}}2");
        assert_eq!(parsed.diagnostics.len(), 2);
        let AstNode::Root(nodes) = parsed.ast else {
            panic!("Expected Root node");
        };
        assert!(matches!(
            nodes.as_slice(),
            [
                AstNode::Malformed { raw: "{{#if a}}", .. },
                _,
                AstNode::Malformed { raw: "{{else}}", .. },
                _
            ]
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_else_closes_past_unterminated_each() {
        let parsed = tokenize("{{#if a}}{{#each xs}}1{{else}}2{{/if}}");
        assert_eq!(parsed.diagnostics.len(), 1);
        let AstNode::Root(nodes) = parsed.ast else {
            panic!("Expected Root node");
        };
        let [
            AstNode::If {
                body,
                else_branch: Some(else_branch),
                ..
            },
        ] = nodes.as_slice()
        else {
            panic!("Expected the if block to survive, got {:?}", nodes);
        };
        assert!(matches!(
            body.as_slice(),
            [AstNode::Malformed { raw: "{{#each xs}}", .. }, _]
        ));
        assert_eq!(else_branch, &vec![const_str!("2")]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_closer_past_several_unterminated_blocks() {
        let parsed = tokenize("{{#each xs}}{{#if a}}1{{#if b}}2{{/each}}");
        assert_eq!(parsed.diagnostics.len(), 2);
        let AstNode::Root(nodes) = parsed.ast else {
            panic!("Expected Root node");
        };
        let [AstNode::Each { body, .. }] = nodes.as_slice() else {
            panic!("Expected the each block to survive, got {:?}", nodes);
        };
        assert!(matches!(
            body.as_slice(),
            [
                AstNode::Malformed { raw: "{{#if a}}", .. },
                AstNode::Constant { .. },
                AstNode::Malformed { raw: "{{#if b}}", .. },
                AstNode::Constant { .. }
            ]
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_stray_closer() {
        let parsed = tokenize("text{{/each}}");
        assert_eq!(parsed.diagnostics.len(), 1);
        assert!(matches!(
            parsed.diagnostics[0].kind,
            ParseErrorKind::StrayCloser { .. }
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_second_else_is_stray() {
        let parsed = tokenize("{{#if a}}1{{else}}2{{else}}3{{/if}}");
        assert_eq!(parsed.diagnostics.len(), 1);
        assert!(matches!(
            parsed.diagnostics[0].kind,
            ParseErrorKind::StrayCloser { ref found } if found == "{{else}}"
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unknown_block_keyword() {
        let parsed = tokenize("{{#unless flag}}x{{/unless}}");
        assert_eq!(parsed.diagnostics.len(), 2);
        assert!(matches!(
            parsed.diagnostics[0].kind,
            ParseErrorKind::UnknownKeyword { ref keyword } if keyword == "#unless"
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unclosed_braces() {
        let parsed = tokenize("שלום {{name");
        assert_eq!(parsed.diagnostics.len(), 1);
        assert!(matches!(
            parsed.diagnostics[0].kind,
            ParseErrorKind::UnexpectedEOF { .. }
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_diagnostic_line_tracking() {
        let parsed = tokenize("line one\nline two {{/if}}");
        assert_eq!(parsed.diagnostics[0].line, 2);
        assert_eq!(parsed.diagnostics[0].column, 10);
    }
}
