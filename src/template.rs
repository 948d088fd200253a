use tracing::{debug, warn};

use crate::ast::{AstNode, BlockTags, is_item_path};
use crate::catalog::ClauseCatalog;
use crate::error::{KetavError, KetavResult, ParseError};
use crate::interface::{FieldKind, FillData, Gender, Genders, RenderedDocument, Value};
use crate::options::{Passes, RenderOptions, TokenPolicy};
use crate::parser::tokenize;

/// Everything a render needs besides the data: which passes run, the
/// unresolved/malformed policies, and the clause catalog for `{{standard:..}}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderSettings<'c> {
    pub passes: Passes,
    pub options: RenderOptions,
    pub catalog: Option<&'c ClauseCatalog>,
}

impl<'c> RenderSettings<'c> {
    pub fn new(catalog: &'c ClauseCatalog) -> Self {
        Self {
            catalog: Some(catalog),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub const fn with_passes(mut self, passes: Passes) -> Self {
        self.passes = passes;
        self
    }
}

/// A Template represents a parsed skeleton or clause that can be rendered.
///
/// Parsing never fails. Malformed markers are kept in the tree and reported by
/// [`Template::diagnostics`]; what happens to them at render time is decided by
/// [`RenderOptions::on_malformed`].
///
/// # Example
///
/// ```rust
/// use ketav::{FillData, Genders, RenderSettings, Template};
///
/// let template = Template::new("שלום {{gender:אדון|גברת}} {{name}}");
///
/// let mut data = FillData::new();
/// data.insert("name", "כהן").insert("gender", "female");
///
/// let rendered = template
///     .render(&data, &Genders::new(), &RenderSettings::default())
///     .unwrap();
/// assert_eq!(rendered.text(), "שלום גברת כהן");
/// ```
#[derive(Debug, Clone)]
pub struct Template<'a> {
    source: &'a str,
    ast: AstNode<'a>,
    diagnostics: Vec<ParseError>,
}

impl<'a> Template<'a> {
    pub fn new(source: &'a str) -> Self {
        let parsed = tokenize(source);
        Self {
            source,
            ast: parsed.ast,
            diagnostics: parsed.diagnostics,
        }
    }

    pub const fn source(&self) -> &'a str {
        self.source
    }

    /// Problems found while parsing, in source order.
    pub fn diagnostics(&self) -> &[ParseError] {
        &self.diagnostics
    }

    pub fn is_well_formed(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Renders the template.
    ///
    /// # Errors
    ///
    /// * `KetavError::Parse` - If the template is malformed and
    ///   `on_malformed` is `Error`
    /// * `KetavError::Unresolved` - If a token cannot be resolved and
    ///   `on_unresolved` is `Error`
    pub fn render(
        &self,
        data: &FillData,
        genders: &Genders,
        settings: &RenderSettings<'_>,
    ) -> KetavResult<RenderedDocument> {
        self.render_with_clauses::<&str>(data, genders, settings, &[])
    }

    /// Renders the template followed by the catalog clauses `clauses`, each
    /// in its own paragraph.
    ///
    /// Ids are looked up in the catalog directly rather than parsed as
    /// markers, so any id that is not in the catalog follows the unresolved
    /// policy as `{{standard:<id>}}`.
    ///
    /// # Errors
    ///
    /// The same as [`Template::render`].
    pub fn render_with_clauses<S: AsRef<str>>(
        &self,
        data: &FillData,
        genders: &Genders,
        settings: &RenderSettings<'_>,
        clauses: &[S],
    ) -> KetavResult<RenderedDocument> {
        if settings.options.on_malformed == TokenPolicy::Error {
            if let Some(error) = self.diagnostics.first() {
                return Err(KetavError::Parse(error.clone()));
            }
        }

        let mut renderer = Renderer::new(data, genders, settings);
        renderer.render_node(&self.ast)?;
        for id in clauses {
            let id = id.as_ref();
            renderer.output.push_str("\n\n");
            renderer.render_clause(id, &format!("{{{{standard:{}}}}}", id))?;
        }
        Ok(RenderedDocument {
            text: renderer.output,
            unresolved: renderer.unresolved,
        })
    }

    /// Collects the fields this template needs that `data` does not provide.
    ///
    /// Branches of `{{#if}}` blocks whose condition is already present in
    /// `data` are only followed on the side the condition selects. Clauses are
    /// followed through `catalog`.
    pub fn collect_fields(
        &self,
        fields: &mut Vec<(String, FieldKind)>,
        data: &FillData,
        catalog: Option<&ClauseCatalog>,
    ) {
        let mut visited = Vec::new();
        collect_fields_from_node(&self.ast, fields, data, catalog, &mut visited);
    }
}

fn push_field(fields: &mut Vec<(String, FieldKind)>, name: &str, kind: FieldKind) {
    if !fields.iter().any(|(existing, _)| existing == name) {
        fields.push((name.to_string(), kind));
    }
}

/// Internal implementation of field collection from AST nodes.
fn collect_fields_from_node(
    node: &AstNode<'_>,
    fields: &mut Vec<(String, FieldKind)>,
    data: &FillData,
    catalog: Option<&ClauseCatalog>,
    visited: &mut Vec<String>,
) {
    match node {
        AstNode::Root(children) => {
            for child in children {
                collect_fields_from_node(child, fields, data, catalog, visited);
            }
        }
        AstNode::Variable { path, .. } => {
            if !is_item_path(path) && !data.contains(path) {
                push_field(fields, path, FieldKind::Text);
            }
        }
        AstNode::If {
            condition,
            body,
            else_branch,
            ..
        } => {
            let decided = (!is_item_path(condition))
                .then(|| data.lookup(condition))
                .flatten()
                .map(Value::is_truthy);

            if decided.is_none() && !is_item_path(condition) {
                push_field(fields, condition, FieldKind::Flag);
            }
            if decided != Some(false) {
                for child in body {
                    collect_fields_from_node(child, fields, data, catalog, visited);
                }
            }
            if decided != Some(true) {
                for child in else_branch.iter().flatten() {
                    collect_fields_from_node(child, fields, data, catalog, visited);
                }
            }
        }
        AstNode::Each { iterable, body, .. } => {
            if !is_item_path(iterable) && !data.contains(iterable) {
                push_field(fields, iterable, FieldKind::List);
            }
            for child in body {
                collect_fields_from_node(child, fields, data, catalog, visited);
            }
        }
        AstNode::Clause { id, .. } => {
            if visited.iter().any(|seen| seen == id) {
                return;
            }
            visited.push((*id).to_string());

            if let Some(content) = catalog.and_then(|catalog| catalog.content(id)) {
                let parsed = tokenize(content);
                collect_fields_from_node(&parsed.ast, fields, data, catalog, visited);
            }
        }
        // Constants, genders and indices don't introduce fields
        AstNode::Constant { .. }
        | AstNode::Index { .. }
        | AstNode::Gender { .. }
        | AstNode::Malformed { .. } => {}
    }
}

/// The current item of an expanded `{{#each}}`.
struct Frame<'d> {
    item: &'d Value,
    index: usize,
}

enum Lookup<'d> {
    Found(&'d Value),
    Missing,
    /// A `this` path inside a collection that is being copied verbatim.
    Deferred,
}

struct Renderer<'r> {
    data: &'r FillData,
    genders: &'r Genders,
    settings: &'r RenderSettings<'r>,
    frames: Vec<Frame<'r>>,
    /// How many verbatim (unexpanded) collections we are inside.
    deferred_loops: usize,
    clause_depth: usize,
    output: String,
    unresolved: Vec<String>,
}

impl<'r> Renderer<'r> {
    fn new(data: &'r FillData, genders: &'r Genders, settings: &'r RenderSettings<'r>) -> Self {
        Self {
            data,
            genders,
            settings,
            frames: Vec::new(),
            deferred_loops: 0,
            clause_depth: 0,
            output: String::new(),
            unresolved: Vec::new(),
        }
    }

    fn lookup(&self, path: &str) -> Lookup<'r> {
        if !is_item_path(path) {
            return self.data.lookup(path).map_or(Lookup::Missing, Lookup::Found);
        }
        if self.deferred_loops > 0 {
            return Lookup::Deferred;
        }
        let Some(frame) = self.frames.last() else {
            return Lookup::Missing;
        };

        let field = path.strip_prefix("this").unwrap_or(path).trim_start_matches('.');
        if field.is_empty() {
            return Lookup::Found(frame.item);
        }
        frame
            .item
            .lookup_path(field)
            .map_or(Lookup::Missing, Lookup::Found)
    }

    /// Applies the unresolved-token policy to `raw`.
    fn unresolved(&mut self, raw: &str) -> KetavResult<()> {
        debug!(token = raw, "unresolved token");
        match self.settings.options.on_unresolved {
            TokenPolicy::Leave => {
                self.output.push_str(raw);
                self.unresolved.push(raw.to_string());
            }
            TokenPolicy::Blank => self.unresolved.push(raw.to_string()),
            TokenPolicy::Error => {
                return Err(KetavError::Unresolved {
                    token: raw.to_string(),
                });
            }
        }
        Ok(())
    }

    /// The gender for a `{{gender..}}` token, or `None` if it depends on an
    /// item that is not being expanded.
    fn gender_for(&self, role: Option<&str>) -> Option<Gender> {
        let from_role = match role {
            Some(role) => match self.genders.role(role) {
                Some(gender) => Some(gender),
                None => match self.lookup(&format!("{}.gender", role)) {
                    Lookup::Deferred => return None,
                    Lookup::Found(value) => gender_of(value),
                    Lookup::Missing => None,
                },
            },
            None => None,
        };

        Some(
            from_role
                .or_else(|| self.genders.default_gender())
                .or_else(|| self.data.lookup("gender").and_then(gender_of))
                .unwrap_or_default(),
        )
    }

    fn render_nodes(&mut self, nodes: &[AstNode<'_>]) -> KetavResult<()> {
        for node in nodes {
            self.render_node(node)?;
        }
        Ok(())
    }

    /// Copies a block's tags verbatim while rendering its contents.
    fn render_verbatim_block(
        &mut self,
        body: &[AstNode<'_>],
        else_branch: Option<&[AstNode<'_>]>,
        tags: &BlockTags<'_>,
    ) -> KetavResult<()> {
        self.output.push_str(tags.open);
        self.render_nodes(body)?;
        if let Some(else_branch) = else_branch {
            self.output.push_str(tags.otherwise.unwrap_or("{{else}}"));
            self.render_nodes(else_branch)?;
        }
        self.output.push_str(tags.close);
        Ok(())
    }

    /// Renders catalog clause `id` in the current scope. `raw` is what the
    /// unresolved policy sees if the clause can't be included.
    fn render_clause(&mut self, id: &str, raw: &str) -> KetavResult<()> {
        if !self.settings.passes.clauses {
            self.output.push_str(raw);
            return Ok(());
        }
        let Some(content) = self.settings.catalog.and_then(|catalog| catalog.content(id)) else {
            return self.unresolved(raw);
        };
        if self.clause_depth >= self.settings.options.max_clause_depth {
            warn!(clause = id, depth = self.clause_depth, "clause nesting too deep");
            return self.unresolved(raw);
        }

        let parsed = tokenize(content);
        self.clause_depth = self.clause_depth.saturating_add(1);
        let result = self.render_node(&parsed.ast);
        self.clause_depth = self.clause_depth.saturating_sub(1);
        result
    }

    fn render_node(&mut self, node: &AstNode<'_>) -> KetavResult<()> {
        let passes = self.settings.passes;

        match node {
            AstNode::Root(children) => self.render_nodes(children)?,
            AstNode::Constant { data } => self.output.push_str(data),
            AstNode::Malformed { raw, error } => match self.settings.options.on_malformed {
                TokenPolicy::Leave => self.output.push_str(raw),
                TokenPolicy::Blank => {}
                TokenPolicy::Error => return Err(KetavError::Parse(error.clone())),
            },
            AstNode::Variable { path, raw } if is_item_path(path) => {
                if !passes.collections {
                    self.output.push_str(raw);
                    return Ok(());
                }
                match self.lookup(path) {
                    Lookup::Deferred => self.output.push_str(raw),
                    Lookup::Found(value) => {
                        // Records inside an item have no text and render empty
                        if let Some(text) = value.as_text() {
                            self.output.push_str(&text);
                        }
                    }
                    // An absent field of an existing item is empty
                    Lookup::Missing if !self.frames.is_empty() => {}
                    Lookup::Missing => self.unresolved(raw)?,
                }
            }
            AstNode::Variable { path, raw } => {
                if !passes.variables {
                    self.output.push_str(raw);
                    return Ok(());
                }
                match self.lookup(path) {
                    Lookup::Found(value) => match value.as_text() {
                        Some(text) => self.output.push_str(&text),
                        None => self.unresolved(raw)?,
                    },
                    Lookup::Missing | Lookup::Deferred => self.unresolved(raw)?,
                }
            }
            AstNode::Index { raw } => {
                if !passes.collections || self.deferred_loops > 0 {
                    self.output.push_str(raw);
                    return Ok(());
                }
                match self.frames.last() {
                    Some(frame) => {
                        let position = frame.index.saturating_add(1).to_string();
                        self.output.push_str(&position);
                    }
                    None => self.unresolved(raw)?,
                }
            }
            AstNode::Gender { role, options, raw } => {
                match self.gender_for(*role).filter(|_| passes.genders) {
                    Some(gender) => self.output.push_str(gender.select(options)),
                    None => self.output.push_str(raw),
                }
            }
            AstNode::Clause { id, raw } => self.render_clause(id, raw)?,
            AstNode::If {
                condition,
                body,
                else_branch,
                tags,
            } => {
                let decision = if passes.conditionals {
                    match self.lookup(condition) {
                        Lookup::Found(value) => Some(value.is_truthy()),
                        Lookup::Missing => Some(false),
                        Lookup::Deferred => None,
                    }
                } else {
                    None
                };

                match decision {
                    Some(true) => self.render_nodes(body)?,
                    Some(false) => {
                        if let Some(else_branch) = else_branch {
                            self.render_nodes(else_branch)?;
                        }
                    }
                    None => self.render_verbatim_block(body, else_branch.as_deref(), tags)?,
                }
            }
            AstNode::Each {
                iterable,
                body,
                tags,
            } => {
                let target = if passes.collections {
                    self.lookup(iterable)
                } else {
                    Lookup::Deferred
                };

                match target {
                    Lookup::Deferred => {
                        self.deferred_loops = self.deferred_loops.saturating_add(1);
                        let result = self.render_verbatim_block(body, None, tags);
                        self.deferred_loops = self.deferred_loops.saturating_sub(1);
                        result?;
                    }
                    Lookup::Found(value) => match value.as_list() {
                        Some(items) => {
                            for (index, item) in items.iter().enumerate() {
                                self.frames.push(Frame { item, index });
                                let result = self.render_nodes(body);
                                self.frames.pop();
                                result?;
                            }
                        }
                        None => debug!(iterable = *iterable, "not a list, skipping collection"),
                    },
                    Lookup::Missing => debug!(iterable = *iterable, "missing list, skipping collection"),
                }
            }
        }

        Ok(())
    }
}

fn gender_of(value: &Value) -> Option<Gender> {
    match value {
        Value::Text(text) => Gender::parse(text),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::List(_) | Value::Record(_) => None,
    }
}

/// Runs `passes` over `template` leaving unresolved tokens in place.
fn expand(template: &str, data: &FillData, genders: &Genders, passes: Passes) -> String {
    let settings = RenderSettings::default().with_passes(passes);
    // Leaving tokens in place never fails; fall back to the input regardless.
    Template::new(template)
        .render(data, genders, &settings)
        .map_or_else(|_| template.to_owned(), RenderedDocument::into_text)
}

/// Replaces `{{key}}` tokens with values from `data`.
///
/// Keys missing from `data` are left as literal text. Falsy values (null,
/// `false`) become the empty string.
pub fn resolve_placeholders(template: &str, data: &FillData) -> String {
    expand(template, data, &Genders::new(), Passes::variables())
}

/// Resolves `{{gender:..}}` and `{{gender.role:..}}` tokens to `gender`.
///
/// `{{gender.this:..}}` inside a collection depends on each item, so it is
/// left for [`expand_collections`] or a full render.
pub fn select_gender_variants(template: &str, gender: Gender) -> String {
    expand(
        template,
        &FillData::new(),
        &Genders::uniform(gender),
        Passes::genders(),
    )
}

/// Expands `{{#if field}}..{{else}}..{{/if}}` blocks against `data`.
pub fn expand_conditionals(template: &str, data: &FillData) -> String {
    expand(template, data, &Genders::new(), Passes::conditionals())
}

/// Expands `{{#each list}}..{{/each}}` blocks against `data`, substituting
/// `{{@index}}` (from 1), `{{this}}` and `{{this.field}}` per item.
pub fn expand_collections(template: &str, data: &FillData) -> String {
    expand(template, data, &Genders::new(), Passes::collections())
}

/// Runs every pass. `{{standard:..}}` tokens are left in place since no
/// catalog is given; use [`Template::render`] with [`RenderSettings::new`]
/// to include clauses.
pub fn render(template: &str, data: &FillData, genders: &Genders) -> String {
    expand(template, data, genders, Passes::ALL)
}
