//! Typed parameter/response schema tree and its portable rendering.
//!
//! A [`SchemaNode`] tree is authored by agent code to describe a tool's
//! inputs and outputs.  It is used for exactly two things: rendering a
//! [`Schema`] for the model client, and supplying per-field defaults to
//! the typed accessors over an inbound request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rendered schema (wire form)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    Object,
    Array,
    Integer,
    Number,
    String,
    Boolean,
}

/// JSON-schema-like structure handed to the model client and carried in
/// tool declarations.  Field names follow the Gemini `Schema` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub kind: SchemaType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default)]
    pub nullable: bool,
}

impl Schema {
    fn new(kind: SchemaType, description: &str) -> Self {
        Self {
            kind,
            description: description.to_string(),
            format: None,
            enum_values: Vec::new(),
            items: None,
            properties: BTreeMap::new(),
            required: Vec::new(),
            nullable: false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Authoring tree
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tri-state nullability.  An unset flag renders as nullable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Nullable {
    Yes,
    No,
    #[default]
    Unset,
}

impl Nullable {
    pub fn resolve(self) -> bool {
        !matches!(self, Nullable::No)
    }
}

impl From<bool> for Nullable {
    fn from(b: bool) -> Self {
        if b {
            Nullable::Yes
        } else {
            Nullable::No
        }
    }
}

/// Item type of a primitive array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Int,
    Float,
    String,
    Bool,
}

impl Primitive {
    fn schema_type(self) -> SchemaType {
        match self {
            Primitive::Int => SchemaType::Integer,
            Primitive::Float => SchemaType::Number,
            Primitive::String => SchemaType::String,
            Primitive::Bool => SchemaType::Boolean,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumKind {
    Int,
    String,
}

pub type Properties = BTreeMap<String, SchemaNode>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    pub description: String,
    pub properties: Properties,
    pub required: bool,
    pub nullable: Nullable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArraySchema {
    pub description: String,
    pub item_description: String,
    pub items: Primitive,
    pub required: bool,
    pub nullable: Nullable,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectArraySchema {
    pub description: String,
    pub item_description: String,
    pub items: Properties,
    pub required: bool,
    pub nullable: Nullable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumSchema {
    pub description: String,
    pub kind: EnumKind,
    pub values: Vec<String>,
    pub required: bool,
    pub nullable: Nullable,
}

/// Scalar leaf.  `default` feeds the typed request accessors; it is not
/// rendered into the model-facing schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScalarSchema<T> {
    pub description: String,
    pub default: Option<T>,
    pub required: bool,
    pub nullable: Nullable,
}

/// Closed set of schema variants.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Object(ObjectSchema),
    Array(ArraySchema),
    ObjectArray(ObjectArraySchema),
    Enum(EnumSchema),
    Int(ScalarSchema<i64>),
    Float(ScalarSchema<f64>),
    String(ScalarSchema<String>),
    Bool(ScalarSchema<bool>),
}

impl SchemaNode {
    /// Whether this node must be present in its parent object.
    pub fn is_required(&self) -> bool {
        match self {
            SchemaNode::Object(s) => s.required,
            SchemaNode::Array(s) => s.required,
            SchemaNode::ObjectArray(s) => s.required,
            SchemaNode::Enum(s) => s.required,
            SchemaNode::Int(s) => s.required,
            SchemaNode::Float(s) => s.required,
            SchemaNode::String(s) => s.required,
            SchemaNode::Bool(s) => s.required,
        }
    }

    pub fn render(&self) -> Schema {
        match self {
            SchemaNode::Object(s) => s.render(),
            SchemaNode::Array(s) => {
                let mut out = Schema::new(SchemaType::Array, &s.description);
                out.items = Some(Box::new(Schema::new(
                    s.items.schema_type(),
                    &s.item_description,
                )));
                out.nullable = s.nullable.resolve();
                out
            }
            SchemaNode::ObjectArray(s) => {
                let mut item = Schema::new(SchemaType::Object, &s.item_description);
                render_properties(&s.items, &mut item);
                let mut out = Schema::new(SchemaType::Array, &s.description);
                out.items = Some(Box::new(item));
                out.nullable = s.nullable.resolve();
                out
            }
            SchemaNode::Enum(s) => {
                let kind = match s.kind {
                    EnumKind::Int => SchemaType::Integer,
                    EnumKind::String => SchemaType::String,
                };
                let mut out = Schema::new(kind, &s.description);
                out.enum_values = s.values.clone();
                out.format = Some("enum".into());
                out.nullable = s.nullable.resolve();
                out
            }
            SchemaNode::Int(s) => leaf(SchemaType::Integer, &s.description, s.nullable),
            SchemaNode::Float(s) => leaf(SchemaType::Number, &s.description, s.nullable),
            SchemaNode::String(s) => leaf(SchemaType::String, &s.description, s.nullable),
            SchemaNode::Bool(s) => leaf(SchemaType::Boolean, &s.description, s.nullable),
        }
    }
}

fn leaf(kind: SchemaType, description: &str, nullable: Nullable) -> Schema {
    let mut out = Schema::new(kind, description);
    out.nullable = nullable.resolve();
    out
}

fn render_properties(props: &Properties, out: &mut Schema) {
    for (name, node) in props {
        out.properties.insert(name.clone(), node.render());
        if node.is_required() {
            out.required.push(name.clone());
        }
    }
}

impl ObjectSchema {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn property(mut self, name: impl Into<String>, node: impl Into<SchemaNode>) -> Self {
        self.properties.insert(name.into(), node.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.properties.get(name)
    }

    pub fn render(&self) -> Schema {
        let mut out = Schema::new(SchemaType::Object, &self.description);
        render_properties(&self.properties, &mut out);
        out.nullable = self.nullable.resolve();
        out
    }
}

impl ObjectArraySchema {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn item_description(mut self, d: impl Into<String>) -> Self {
        self.item_description = d.into();
        self
    }

    pub fn property(mut self, name: impl Into<String>, node: impl Into<SchemaNode>) -> Self {
        self.items.insert(name.into(), node.into());
        self
    }
}

impl ArraySchema {
    pub fn new(description: impl Into<String>, items: Primitive) -> Self {
        Self {
            description: description.into(),
            item_description: String::new(),
            items,
            required: false,
            nullable: Nullable::Unset,
        }
    }

    pub fn item_description(mut self, d: impl Into<String>) -> Self {
        self.item_description = d.into();
        self
    }
}

impl EnumSchema {
    pub fn new<I, S>(description: impl Into<String>, kind: EnumKind, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Self {
            description: description.into(),
            kind,
            values: values.into_iter().map(|v| v.to_string()).collect(),
            required: false,
            nullable: Nullable::Unset,
        }
    }
}

impl<T> ScalarSchema<T> {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            default: None,
            required: false,
            nullable: Nullable::Unset,
        }
    }

    pub fn default_value(mut self, v: impl Into<T>) -> Self {
        self.default = Some(v.into());
        self
    }
}

macro_rules! flag_builders {
    ($($ty:ty),* $(,)?) => {$(
        impl $ty {
            pub fn required(mut self) -> Self {
                self.required = true;
                self
            }

            pub fn nullable(mut self, n: impl Into<Nullable>) -> Self {
                self.nullable = n.into();
                self
            }
        }
    )*};
}

flag_builders!(
    ObjectSchema,
    ArraySchema,
    ObjectArraySchema,
    EnumSchema,
    ScalarSchema<i64>,
    ScalarSchema<f64>,
    ScalarSchema<String>,
    ScalarSchema<bool>,
);

impl From<ObjectSchema> for SchemaNode {
    fn from(s: ObjectSchema) -> Self {
        SchemaNode::Object(s)
    }
}
impl From<ArraySchema> for SchemaNode {
    fn from(s: ArraySchema) -> Self {
        SchemaNode::Array(s)
    }
}
impl From<ObjectArraySchema> for SchemaNode {
    fn from(s: ObjectArraySchema) -> Self {
        SchemaNode::ObjectArray(s)
    }
}
impl From<EnumSchema> for SchemaNode {
    fn from(s: EnumSchema) -> Self {
        SchemaNode::Enum(s)
    }
}
impl From<ScalarSchema<i64>> for SchemaNode {
    fn from(s: ScalarSchema<i64>) -> Self {
        SchemaNode::Int(s)
    }
}
impl From<ScalarSchema<f64>> for SchemaNode {
    fn from(s: ScalarSchema<f64>) -> Self {
        SchemaNode::Float(s)
    }
}
impl From<ScalarSchema<String>> for SchemaNode {
    fn from(s: ScalarSchema<String>) -> Self {
        SchemaNode::String(s)
    }
}
impl From<ScalarSchema<bool>> for SchemaNode {
    fn from(s: ScalarSchema<bool>) -> Self {
        SchemaNode::Bool(s)
    }
}

// ── Shorthand constructors ───────────────────────────────────────────

pub fn object(description: impl Into<String>) -> ObjectSchema {
    ObjectSchema::new(description)
}

pub fn int(description: impl Into<String>) -> ScalarSchema<i64> {
    ScalarSchema::new(description)
}

pub fn float(description: impl Into<String>) -> ScalarSchema<f64> {
    ScalarSchema::new(description)
}

pub fn string(description: impl Into<String>) -> ScalarSchema<String> {
    ScalarSchema::new(description)
}

pub fn boolean(description: impl Into<String>) -> ScalarSchema<bool> {
    ScalarSchema::new(description)
}

pub fn array(description: impl Into<String>, items: Primitive) -> ArraySchema {
    ArraySchema::new(description, items)
}

pub fn object_array(description: impl Into<String>) -> ObjectArraySchema {
    ObjectArraySchema::new(description)
}

pub fn int_enum<I: IntoIterator<Item = i64>>(description: impl Into<String>, values: I) -> EnumSchema {
    EnumSchema::new(description, EnumKind::Int, values)
}

pub fn string_enum<I, S>(description: impl Into<String>, values: I) -> EnumSchema
where
    I: IntoIterator<Item = S>,
    S: ToString,
{
    EnumSchema::new(description, EnumKind::String, values)
}
