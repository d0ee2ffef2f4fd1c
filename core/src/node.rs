//! Compiled schema nodes.
//!
//! A [`CompiledNode`] is the checked, pre-digested form of one schema object.
//! Compiling a node is also where the schema document is validated: every
//! keyword the engine understands is type-checked here, and any problem
//! aborts compilation with a [`SchemaError`] naming the offending location.
//!
//! Sub-schemas are never compiled recursively. A node only records the
//! [`NodeHandle`]s of the schemas it references; the compiler discovers and
//! compiles those in later rounds.

use std::collections::{BTreeMap, BTreeSet};

use bitflags::bitflags;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::compiler::HandleTable;
use crate::error::{Result, SchemaError};
use crate::format::Format;
use crate::number::{Bound, MultipleOf, Number};
use crate::options::CompileOptions;
use crate::reference::{SchemaDocument, child_location};

bitflags! {
    /// The primitive types named by the `type` keyword.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeSet: u8 {
        const NULL = 1 << 0;
        const BOOLEAN = 1 << 1;
        const INTEGER = 1 << 2;
        const NUMBER = 1 << 3;
        const STRING = 1 << 4;
        const ARRAY = 1 << 5;
        const OBJECT = 1 << 6;
    }
}

impl TypeSet {
    fn from_keyword(name: &str) -> Option<Self> {
        match name {
            "null" => Some(TypeSet::NULL),
            "boolean" => Some(TypeSet::BOOLEAN),
            "integer" => Some(TypeSet::INTEGER),
            "number" => Some(TypeSet::NUMBER),
            "string" => Some(TypeSet::STRING),
            "array" => Some(TypeSet::ARRAY),
            "object" => Some(TypeSet::OBJECT),
            _ => None,
        }
    }
}

/// Identity of a compiled node: an index into the schema's node arena.
///
/// Handles are assigned once per distinct resolved schema location, so two
/// references to the same definition share a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle(pub(crate) u32);

impl NodeHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The `items` keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Items {
    /// One schema for every element.
    Uniform(NodeHandle),
    /// Positional schemas; elements beyond the tuple fall to `additionalItems`.
    Tuple(Vec<NodeHandle>),
}

/// `additionalItems` / `additionalProperties`: a flag or a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Additional {
    Allowed(bool),
    Schema(NodeHandle),
}

/// One compiled schema object.
#[derive(Debug)]
pub struct CompiledNode {
    pub(crate) location: String,
    pub(crate) types: Option<TypeSet>,
    pub(crate) enum_values: Option<Vec<Value>>,

    pub(crate) all_of: Vec<NodeHandle>,
    pub(crate) any_of: Vec<NodeHandle>,
    pub(crate) one_of: Vec<NodeHandle>,
    pub(crate) not: Option<NodeHandle>,

    pub(crate) multiple_of: Option<MultipleOf>,
    pub(crate) maximum: Option<Bound>,
    pub(crate) minimum: Option<Bound>,

    pub(crate) max_length: Option<u64>,
    pub(crate) min_length: Option<u64>,
    pub(crate) pattern: Option<Regex>,
    pub(crate) format: Option<Format>,

    pub(crate) items: Option<Items>,
    pub(crate) additional_items: Option<Additional>,
    pub(crate) max_items: Option<u64>,
    pub(crate) min_items: Option<u64>,
    pub(crate) unique_items: bool,

    pub(crate) max_properties: Option<u64>,
    pub(crate) min_properties: Option<u64>,
    pub(crate) required: BTreeSet<String>,
    pub(crate) properties: BTreeMap<String, NodeHandle>,
    pub(crate) pattern_properties: Vec<(Regex, NodeHandle)>,
    pub(crate) additional_properties: Option<Additional>,
    pub(crate) property_dependencies: BTreeMap<String, BTreeSet<String>>,
    pub(crate) schema_dependencies: BTreeMap<String, NodeHandle>,

    referenced: BTreeSet<NodeHandle>,
}

impl CompiledNode {
    /// Resolved JSON Pointer of the schema object this node was compiled from.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The declared `type` set, if any.
    pub fn types(&self) -> Option<TypeSet> {
        self.types
    }

    /// Handle of the `properties` entry for `name`.
    pub fn property(&self, name: &str) -> Option<NodeHandle> {
        self.properties.get(name).copied()
    }

    /// `items` keyword, as one schema or a tuple.
    pub fn items(&self) -> Option<&Items> {
        self.items.as_ref()
    }

    /// Handles of the `allOf` branches.
    pub fn all_of(&self) -> &[NodeHandle] {
        &self.all_of
    }

    /// Handles of the `anyOf` branches.
    pub fn any_of(&self) -> &[NodeHandle] {
        &self.any_of
    }

    /// Handles of the `oneOf` branches.
    pub fn one_of(&self) -> &[NodeHandle] {
        &self.one_of
    }

    /// Handle of the `not` schema.
    pub fn not(&self) -> Option<NodeHandle> {
        self.not
    }

    /// Every handle this node refers to directly.
    pub fn referenced(&self) -> &BTreeSet<NodeHandle> {
        &self.referenced
    }

    /// Whether `key` events must be recorded to check `required` or
    /// `dependencies` at the end of the object.
    pub(crate) fn tracks_keys(&self) -> bool {
        !self.required.is_empty()
            || !self.property_dependencies.is_empty()
            || !self.schema_dependencies.is_empty()
    }

    /// Handles whose sessions are created together with this node's session.
    pub(crate) fn eager_children(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.all_of
            .iter()
            .chain(&self.any_of)
            .chain(&self.one_of)
            .chain(&self.not)
            .chain(self.schema_dependencies.values())
            .copied()
    }

    /// Compiles the schema object at `location`, which must already be
    /// alias-free.
    pub(crate) fn compile(
        document: &SchemaDocument,
        location: &str,
        options: &CompileOptions,
        table: &mut HandleTable,
    ) -> Result<Self> {
        let Some(Value::Object(members)) = document.get(location) else {
            return Err(SchemaError::NotAnObject {
                location: location.to_string(),
            });
        };
        NodeCompiler {
            document,
            location,
            members,
            table,
            referenced: BTreeSet::new(),
        }
        .compile(options)
    }
}

/// Both forms of the `dependencies` keyword, split by member kind.
#[derive(Default)]
struct Dependencies {
    properties: BTreeMap<String, BTreeSet<String>>,
    schemas: BTreeMap<String, NodeHandle>,
}

struct NodeCompiler<'d, 't> {
    document: &'d SchemaDocument,
    location: &'d str,
    members: &'d Map<String, Value>,
    table: &'t mut HandleTable,
    referenced: BTreeSet<NodeHandle>,
}

impl<'d> NodeCompiler<'d, '_> {
    fn compile(mut self, options: &CompileOptions) -> Result<CompiledNode> {
        for keyword in ["title", "description"] {
            if let Some((_, value)) = self.find(keyword) {
                if !value.is_string() {
                    return Err(self.wrong_type(keyword, "'string'"));
                }
            }
        }

        let types = self.types()?;

        let enum_values = match self.find("enum") {
            Some((_, Value::Array(values))) => Some(values.clone()),
            Some(_) => return Err(self.wrong_type("enum", "'array'")),
            None => None,
        };

        let all_of = self.combinator("allOf")?;
        let any_of = self.combinator("anyOf")?;
        let one_of = self.combinator("oneOf")?;
        let not = self.find("not").map(|(at, _)| self.reference(at));

        match self.find("definitions") {
            Some((at, Value::Object(definitions))) => {
                for key in definitions.keys() {
                    self.reference(child_location(&at, key));
                }
            }
            Some(_) => return Err(self.wrong_type("definitions", "'object'")),
            None => {}
        }

        let multiple_of = self.multiple_of()?;
        let maximum = self.bound("maximum", "exclusiveMaximum")?;
        let minimum = self.bound("minimum", "exclusiveMinimum")?;

        let max_length = self.count("maxLength")?;
        let min_length = self.count("minLength")?.filter(|&n| n > 0);
        let pattern = match self.find("pattern") {
            Some((_, Value::String(pattern))) => Some(self.regex("pattern", pattern)?),
            Some(_) => return Err(self.wrong_type("pattern", "'string'")),
            None => None,
        };
        let format = self.format(options)?;

        let items = match self.find("items") {
            Some((at, Value::Array(tuple))) => Some(Items::Tuple(
                (0..tuple.len())
                    .map(|index| self.reference(format!("{at}/{index}")))
                    .collect(),
            )),
            Some((at, Value::Object(_))) => Some(Items::Uniform(self.reference(at))),
            Some(_) => return Err(self.wrong_type("items", "'object' or 'array'")),
            None => None,
        };
        let additional_items = self.additional("additionalItems")?;
        let max_items = self.count("maxItems")?;
        let min_items = self.count("minItems")?;
        let unique_items = match self.find("uniqueItems") {
            Some((_, Value::Bool(flag))) => *flag,
            Some(_) => return Err(self.wrong_type("uniqueItems", "'boolean'")),
            None => false,
        };

        let max_properties = self.count("maxProperties")?;
        let min_properties = self.count("minProperties")?;
        let required = match self.find("required") {
            Some((_, Value::Array(keys))) => self.unique_strings("required", keys)?,
            Some(_) => return Err(self.wrong_type("required", "'array'")),
            None => BTreeSet::new(),
        };

        let mut properties = BTreeMap::new();
        match self.find("properties") {
            Some((at, Value::Object(entries))) => {
                for key in entries.keys() {
                    let handle = self.reference(child_location(&at, key));
                    properties.insert(key.clone(), handle);
                }
            }
            Some(_) => return Err(self.wrong_type("properties", "'object'")),
            None => {}
        }

        let mut pattern_properties = Vec::new();
        match self.find("patternProperties") {
            Some((at, Value::Object(entries))) => {
                for key in entries.keys() {
                    let regex = self.regex("patternProperties", key)?;
                    let handle = self.reference(child_location(&at, key));
                    pattern_properties.push((regex, handle));
                }
            }
            Some(_) => return Err(self.wrong_type("patternProperties", "'object'")),
            None => {}
        }

        let additional_properties = self.additional("additionalProperties")?;
        let dependencies = self.dependencies()?;

        Ok(CompiledNode {
            location: self.location.to_string(),
            types,
            enum_values,
            all_of,
            any_of,
            one_of,
            not,
            multiple_of,
            maximum,
            minimum,
            max_length,
            min_length,
            pattern,
            format,
            items,
            additional_items,
            max_items,
            min_items,
            unique_items,
            max_properties,
            min_properties,
            required,
            properties,
            pattern_properties,
            additional_properties,
            property_dependencies: dependencies.properties,
            schema_dependencies: dependencies.schemas,
            referenced: self.referenced,
        })
    }

    /// Looks up a keyword, following the keyword value itself if it is a
    /// resolved reference. Returns the resolved location and value.
    fn find(&self, keyword: &str) -> Option<(String, &'d Value)> {
        if !self.members.contains_key(keyword) {
            return None;
        }
        let at = self.document.follow(&child_location(self.location, keyword));
        let value = self.document.get(&at)?;
        Some((at, value))
    }

    /// Records a sub-schema at `location` (following aliases) and returns its
    /// handle.
    fn reference(&mut self, location: String) -> NodeHandle {
        let resolved = self.document.follow(&location);
        let handle = self.table.intern(resolved);
        self.referenced.insert(handle);
        handle
    }

    fn wrong_type(&self, keyword: &'static str, expected: &'static str) -> SchemaError {
        SchemaError::WrongType {
            location: self.location.to_string(),
            keyword,
            expected,
        }
    }

    fn regex(&self, keyword: &'static str, pattern: &str) -> Result<Regex> {
        Regex::new(pattern).map_err(|source| SchemaError::InvalidRegex {
            location: self.location.to_string(),
            keyword,
            source,
        })
    }

    fn types(&self) -> Result<Option<TypeSet>> {
        let names: Vec<&str> = match self.find("type") {
            None => return Ok(None),
            Some((_, Value::String(name))) => vec![name.as_str()],
            Some((_, Value::Array(names))) => names
                .iter()
                .map(|name| {
                    name.as_str()
                        .ok_or_else(|| self.wrong_type("type", "'string' (array elements)"))
                })
                .collect::<Result<_>>()?,
            Some(_) => return Err(self.wrong_type("type", "'string' or 'array'")),
        };

        let mut types = TypeSet::empty();
        for name in names {
            let Some(t) = TypeSet::from_keyword(name) else {
                return Err(SchemaError::UnknownType {
                    location: self.location.to_string(),
                    name: name.to_string(),
                });
            };
            if types.contains(t) {
                return Err(SchemaError::DuplicateType {
                    location: self.location.to_string(),
                    name: name.to_string(),
                });
            }
            types |= t;
        }
        Ok(Some(types))
    }

    fn combinator(&mut self, keyword: &'static str) -> Result<Vec<NodeHandle>> {
        match self.find(keyword) {
            None => Ok(Vec::new()),
            Some((_, Value::Array(branches))) if branches.is_empty() => {
                Err(SchemaError::EmptyArray {
                    location: self.location.to_string(),
                    keyword,
                })
            }
            Some((at, Value::Array(branches))) => Ok((0..branches.len())
                .map(|index| self.reference(format!("{at}/{index}")))
                .collect()),
            Some(_) => Err(self.wrong_type(keyword, "'array'")),
        }
    }

    fn number(&self, keyword: &'static str) -> Result<Option<Number>> {
        match self.find(keyword) {
            None => Ok(None),
            Some((_, Value::Number(n))) => Ok(Some(Number::from_json(n))),
            Some(_) => Err(self.wrong_type(keyword, "'number'")),
        }
    }

    fn multiple_of(&self) -> Result<Option<MultipleOf>> {
        let divisor = match self.number("multipleOf")? {
            None => return Ok(None),
            Some(Number::Unsigned(u)) if u > 0 => MultipleOf::Unsigned(u),
            Some(Number::Double(d)) if d > 0.0 => MultipleOf::Double(d),
            Some(_) => {
                return Err(SchemaError::OutOfRange {
                    location: self.location.to_string(),
                    keyword: "multipleOf",
                    constraint: "strictly greater than zero",
                });
            }
        };
        Ok(Some(divisor))
    }

    fn bound(&self, keyword: &'static str, exclusive: &'static str) -> Result<Option<Bound>> {
        let limit = self.number(keyword)?;
        let exclusive = match self.find(exclusive) {
            None => false,
            Some((_, Value::Bool(_))) if limit.is_none() => {
                return Err(SchemaError::MissingPrerequisite {
                    location: self.location.to_string(),
                    keyword: exclusive,
                    requires: keyword,
                });
            }
            Some((_, Value::Bool(flag))) => *flag,
            Some(_) => return Err(self.wrong_type(exclusive, "'boolean'")),
        };
        Ok(limit.map(|limit| Bound { limit, exclusive }))
    }

    fn count(&self, keyword: &'static str) -> Result<Option<u64>> {
        match self.number(keyword) {
            Ok(None) => Ok(None),
            Ok(Some(Number::Unsigned(n))) => Ok(Some(n)),
            Ok(Some(Number::Signed(_))) => Err(SchemaError::OutOfRange {
                location: self.location.to_string(),
                keyword,
                constraint: "greater than or equal to zero",
            }),
            Ok(Some(Number::Double(_))) | Err(_) => Err(self.wrong_type(keyword, "'integer'")),
        }
    }

    fn format(&self, options: &CompileOptions) -> Result<Option<Format>> {
        let name = match self.find("format") {
            None => return Ok(None),
            Some((_, Value::String(name))) => name,
            Some(_) => return Err(self.wrong_type("format", "'string'")),
        };
        let format = Format::from_name(name);
        if format.is_none() {
            debug!(location = self.location, format = %name, "Ignoring unknown format");
        }
        Ok(format.filter(|_| options.validate_formats))
    }

    fn additional(&mut self, keyword: &'static str) -> Result<Option<Additional>> {
        match self.find(keyword) {
            None => Ok(None),
            Some((_, Value::Bool(flag))) => Ok(Some(Additional::Allowed(*flag))),
            Some((at, Value::Object(_))) => Ok(Some(Additional::Schema(self.reference(at)))),
            Some(_) => Err(self.wrong_type(keyword, "'boolean' or 'object'")),
        }
    }

    fn unique_strings(&self, keyword: &'static str, values: &[Value]) -> Result<BTreeSet<String>> {
        if values.is_empty() {
            return Err(SchemaError::EmptyArray {
                location: self.location.to_string(),
                keyword,
            });
        }
        let mut set = BTreeSet::new();
        for value in values {
            let Some(entry) = value.as_str() else {
                return Err(self.wrong_type(keyword, "'array' of 'string'"));
            };
            if !set.insert(entry.to_string()) {
                return Err(SchemaError::DuplicateEntry {
                    location: self.location.to_string(),
                    keyword,
                    entry: entry.to_string(),
                });
            }
        }
        Ok(set)
    }

    fn dependencies(&mut self) -> Result<Dependencies> {
        let mut dependencies = Dependencies::default();
        let (at, entries) = match self.find("dependencies") {
            None => return Ok(dependencies),
            Some((at, Value::Object(entries))) => (at, entries),
            Some(_) => return Err(self.wrong_type("dependencies", "'object'")),
        };
        for key in entries.keys() {
            let target = self.document.follow(&child_location(&at, key));
            match self.document.get(&target) {
                Some(Value::Object(_)) => {
                    let handle = self.reference(target);
                    dependencies.schemas.insert(key.clone(), handle);
                }
                Some(Value::Array(required)) => {
                    let required = self.unique_strings("dependencies", required)?;
                    dependencies.properties.insert(key.clone(), required);
                }
                _ => {
                    return Err(self.wrong_type(
                        "dependencies",
                        "'object' or 'array' (member values)",
                    ));
                }
            }
        }
        Ok(dependencies)
    }
}
