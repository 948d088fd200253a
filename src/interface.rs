use std::{borrow::Cow, collections::BTreeMap};

use serde::{Deserialize, Serialize};

/// The kind of value a template expects for a field, inferred from how the
/// field is used: substituted, tested in `{{#if}}`, or iterated by `{{#each}}`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Text,
    Flag,
    List,
}

/// A single piece of fill data.
///
/// Mirrors what a form collaborator produces as JSON, so it deserializes from
/// any JSON value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
}

impl Value {
    /// Builds a record from `(field, value)` pairs.
    pub fn record<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<Self>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Record(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Truthiness used by `{{#if}}`.
    ///
    /// - null and `false` are falsy
    /// - text is truthy if non-empty
    /// - numbers are truthy if non-zero
    /// - lists are truthy if they have at least one item
    /// - records are always truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::Text(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Record(_) => true,
        }
    }

    /// The text substituted for this value, or `None` if the value has no
    /// textual form (records, and lists containing records or lists).
    ///
    /// Falsy scalars (null, `false`, zero) render as the empty string, the
    /// same values `{{#if}}` treats as false.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Null | Self::Bool(false) => Some(Cow::Borrowed("")),
            Self::Bool(true) => Some(Cow::Borrowed("true")),
            Self::Number(n) if *n == 0.0 => Some(Cow::Borrowed("")),
            Self::Number(n) => Some(Cow::Owned(n.to_string())),
            Self::Text(s) => Some(Cow::Borrowed(s)),
            Self::List(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Self::List(_) | Self::Record(_) => return None,
                        Self::Null | Self::Bool(_) | Self::Number(_) | Self::Text(_) => {
                            parts.push(item.as_text()?);
                        }
                    }
                }
                Some(Cow::Owned(parts.join(", ")))
            }
            Self::Record(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::Text(_) | Self::Record(_) => None,
        }
    }

    /// Looks up a field of a record.
    pub fn get(&self, field: &str) -> Option<&Self> {
        match self {
            Self::Record(fields) => fields.get(field),
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::Text(_) | Self::List(_) => None,
        }
    }

    /// Walks a dotted path (`address.city`) through nested records.
    pub fn lookup_path(&self, path: &str) -> Option<&Self> {
        path.split('.')
            .try_fold(self, |value, segment| value.get(segment))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Self>> for Value {
    fn from(value: BTreeMap<String, Self>) -> Self {
        Self::Record(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(fields) => Self::Record(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, v.into()))
                    .collect(),
            ),
        }
    }
}

/// The caller-supplied key/value bag used to fill a skeleton.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FillData {
    values: BTreeMap<String, Value>,
}

impl FillData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<N: AsRef<str>, V: Into<Value>>(&mut self, name: N, value: V) -> &mut Self {
        self.values.insert(name.as_ref().to_string(), value.into());
        self
    }

    pub fn get<N: AsRef<str>>(&self, name: N) -> Option<&Value> {
        self.values.get(name.as_ref())
    }

    pub fn contains<N: AsRef<str>>(&self, name: N) -> bool {
        self.lookup(name.as_ref()).is_some()
    }

    /// Resolves a possibly dotted path.
    ///
    /// A flat key containing the dots wins over nested lookup, so both
    /// `{"principal.name": ..}` and `{"principal": {"name": ..}}` satisfy
    /// `principal.name`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.values.get(path) {
            return Some(value);
        }
        let (head, rest) = path.split_once('.')?;
        self.values.get(head)?.lookup_path(rest)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for FillData {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            values: map.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for FillData {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Grammatical gender and number of a party to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Male,
    Female,
    Plural,
}

impl Gender {
    /// Parses the English names and the Hebrew form labels.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" | "m" | "זכר" => Some(Self::Male),
            "female" | "f" | "נקבה" => Some(Self::Female),
            "plural" | "p" | "רבים" => Some(Self::Plural),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Plural => "plural",
        }
    }

    /// Picks a variant from the options of a `{{gender:...}}` token.
    ///
    /// One option is a female-only suffix, two options are male/female with
    /// plural falling back to the first, three options are male/female/plural.
    pub fn select<'o>(self, options: &[&'o str]) -> &'o str {
        match (options, self) {
            ([suffix], Self::Female) => *suffix,
            ([_], Self::Male | Self::Plural) => "",
            ([_, female], Self::Female) => *female,
            ([male, _], Self::Male | Self::Plural) => *male,
            ([male, _, _], Self::Male) => *male,
            ([_, female, _], Self::Female) => *female,
            ([_, _, plural], Self::Plural) => *plural,
            _ => "",
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gender tags for the parties of a document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Genders {
    default: Option<Gender>,
    roles: BTreeMap<String, Gender>,
}

impl Genders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every token, qualified or not, resolves to `gender` unless a role
    /// overrides it.
    pub fn uniform(gender: Gender) -> Self {
        Self {
            default: Some(gender),
            roles: BTreeMap::new(),
        }
    }

    pub fn set_default(&mut self, gender: Gender) -> &mut Self {
        self.default = Some(gender);
        self
    }

    pub fn set_role<R: AsRef<str>>(&mut self, role: R, gender: Gender) -> &mut Self {
        self.roles.insert(role.as_ref().to_string(), gender);
        self
    }

    pub const fn default_gender(&self) -> Option<Gender> {
        self.default
    }

    pub fn role<R: AsRef<str>>(&self, role: R) -> Option<Gender> {
        self.roles.get(role.as_ref()).copied()
    }
}

/// A request to assemble one document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentRequest {
    pub document_type: String,
    pub data: FillData,
    pub genders: Genders,
    /// Clause ids appended after the skeleton, in order.
    pub clauses: Vec<String>,
}

impl DocumentRequest {
    pub fn new<T: Into<String>>(document_type: T) -> Self {
        Self {
            document_type: document_type.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: FillData) -> Self {
        self.data = data;
        self
    }

    #[must_use]
    pub fn with_genders(mut self, genders: Genders) -> Self {
        self.genders = genders;
        self
    }

    #[must_use]
    pub fn with_clauses<I, S>(mut self, clauses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clauses = clauses.into_iter().map(Into::into).collect();
        self
    }
}

/// The output of a render call. Owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderedDocument {
    pub(crate) text: String,
    pub(crate) unresolved: Vec<String>,
}

impl RenderedDocument {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Raw text of every token that could not be resolved, in document order.
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// `DocumentAssembler` is the interface between form collaborators and the
/// templating core: register skeletons, render requests, and ask which
/// fields are still needed.
pub trait DocumentAssembler {
    /// `add_skeleton` registers a skeleton for a document type.
    ///
    /// # Errors
    /// - If a skeleton is already registered under `document_type`.
    /// - If the skeleton is malformed and the malformed-token policy is `Error`.
    fn add_skeleton<N: AsRef<str>, C: Into<String>>(
        &mut self,
        document_type: N,
        content: C,
    ) -> crate::KetavResult<()>;

    /// `render` assembles and renders the requested document.
    ///
    /// # Errors
    /// - If no skeleton is registered for the document type.
    /// - If a token cannot be resolved and the policy is `Error`.
    fn render(&self, request: &DocumentRequest) -> crate::KetavResult<RenderedDocument>;

    /// `missing_fields` lists the fields the skeleton needs that are not in
    /// `data`, skipping branches that `data` already rules out.
    fn missing_fields<T: AsRef<str>>(&self, document_type: T, data: &FillData)
    -> Vec<(String, FieldKind)>;
}
