//! Incremental validation of one JSON value.
//!
//! A [`ValidationSession`] consumes the events of a single value and keeps a
//! running verdict. Sub-schemas that apply to the same value (allOf, anyOf,
//! oneOf, not, schema dependencies) or to a nested value (array items,
//! object members) get their own child sessions, which are fed the same
//! events and dropped as soon as their outcome is known.
//!
//! Constraints on the session's own value (type, numeric bounds, string
//! checks, counts) are applied only at depth zero; everything deeper is the
//! business of the child sessions.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::compare::ValueMatcher;
use crate::compiler::CompiledSchema;
use crate::events::Consumer;
use crate::hash::{HashAccumulator, ValueDigest};
use crate::node::{Additional, CompiledNode, Items, NodeHandle, TypeSet};
use crate::number::Number;

/// One event, replayable on any consumer.
type Event<'e> = &'e dyn Fn(&mut dyn Consumer);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerKind {
    Array,
    Object,
}

#[derive(Debug, Clone, Copy)]
struct Container {
    kind: ContainerKind,
    count: usize,
}

/// Streaming validator for one value against one compiled node.
///
/// Feed it the events of exactly one value, then call
/// [`finalize`](Self::finalize). [`is_match`](Self::is_match) may be polled at
/// any time; once it returns `false` the remaining events are ignored.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use stream_schema_core::{CompiledSchema, Consumer};
///
/// let schema = CompiledSchema::build(json!({"type": "array", "maxItems": 1})).unwrap();
/// let mut session = schema.consumer();
/// session.begin_array();
/// session.null();
/// session.element();
/// session.boolean(true);
/// session.element();
/// session.end_array();
/// assert!(!session.finalize());
/// ```
pub struct ValidationSession<'s> {
    schema: &'s CompiledSchema,
    node: &'s CompiledNode,
    matched: bool,

    enum_candidates: Vec<ValueMatcher<'s>>,
    hash: Option<HashAccumulator>,
    unique: HashSet<ValueDigest>,
    keys: BTreeSet<String>,
    containers: Vec<Container>,

    item: Option<Box<ValidationSession<'s>>>,
    properties: Vec<ValidationSession<'s>>,
    all_of: Vec<ValidationSession<'s>>,
    any_of: Vec<ValidationSession<'s>>,
    one_of: Vec<ValidationSession<'s>>,
    not: Option<Box<ValidationSession<'s>>>,
    schema_dependencies: BTreeMap<String, ValidationSession<'s>>,
}

impl<'s> ValidationSession<'s> {
    pub(crate) fn new(schema: &'s CompiledSchema, handle: NodeHandle) -> Self {
        let node = schema.node(handle);
        let sessions = |handles: &[NodeHandle]| -> Vec<Self> {
            handles.iter().map(|&h| Self::new(schema, h)).collect()
        };
        Self {
            schema,
            node,
            matched: true,
            enum_candidates: node
                .enum_values
                .iter()
                .flatten()
                .map(ValueMatcher::new)
                .collect(),
            hash: None,
            unique: HashSet::new(),
            keys: BTreeSet::new(),
            containers: Vec::new(),
            item: None,
            properties: Vec::new(),
            all_of: sessions(&node.all_of),
            any_of: sessions(&node.any_of),
            one_of: sessions(&node.one_of),
            not: node.not.map(|h| Box::new(Self::new(schema, h))),
            schema_dependencies: node
                .schema_dependencies
                .iter()
                .map(|(key, &h)| (key.clone(), Self::new(schema, h)))
                .collect(),
        }
    }

    /// Returns `false` once the events seen so far rule out a match.
    pub fn is_match(&self) -> bool {
        self.matched
    }

    /// Completes validation after the last event and returns the verdict.
    ///
    /// Combinators are decided here: every allOf branch must accept, at least
    /// one anyOf branch must accept, exactly one oneOf branch must accept, and
    /// the not branch must reject.
    pub fn finalize(mut self) -> bool {
        if self.matched && self.all_of.drain(..).any(|branch| !branch.finalize()) {
            self.matched = false;
        }
        if self.matched && !self.node.any_of.is_empty() {
            let accepted = self.any_of.drain(..).map(Self::finalize).filter(|&ok| ok).count();
            self.matched = accepted > 0;
        }
        if self.matched && !self.node.one_of.is_empty() {
            let accepted = self.one_of.drain(..).map(Self::finalize).filter(|&ok| ok).count();
            self.matched = accepted == 1;
        }
        if self.matched {
            if let Some(not) = self.not.take() {
                if not.finalize() {
                    self.matched = false;
                }
            }
        }
        self.matched
    }

    fn fail(&mut self) {
        self.matched = false;
    }

    fn at_own_level(&self) -> bool {
        self.containers.len() == 1
    }

    fn own_container(&self, kind: ContainerKind) -> bool {
        self.containers.len() == 1 && self.containers[0].kind == kind
    }

    fn check_type(&mut self, kind: TypeSet) {
        if !self.containers.is_empty() {
            return;
        }
        if let Some(types) = self.node.types {
            if !types.intersects(kind) {
                self.fail();
            }
        }
    }

    fn narrow_enum(&mut self, event: Event<'_>) {
        if self.node.enum_values.is_none() {
            return;
        }
        self.enum_candidates.retain_mut(|candidate| {
            event(candidate);
            candidate.is_match()
        });
        if self.enum_candidates.is_empty() {
            self.fail();
        }
    }

    /// Opens the item session for the current element of the session's own
    /// array, on the element's first event.
    fn open_item(&mut self) {
        if self.item.is_some() || !self.own_container(ContainerKind::Array) {
            return;
        }
        let index = self.containers[0].count;
        let positional = match &self.node.items {
            Some(Items::Uniform(handle)) => Some(*handle),
            Some(Items::Tuple(handles)) => handles.get(index).copied(),
            None => None,
        };
        let handle = positional.or(match self.node.additional_items {
            Some(Additional::Schema(handle)) => Some(handle),
            _ => None,
        });
        if let Some(handle) = handle {
            self.item = Some(Box::new(Self::new(self.schema, handle)));
        }
    }

    /// Replays `event` on every live child session.
    fn fan_out(&mut self, event: Event<'_>) {
        if let Some(item) = self.item.as_deref_mut() {
            event(item);
            if !item.matched {
                return self.fail();
            }
        }
        let failed = self
            .properties
            .iter_mut()
            .chain(self.all_of.iter_mut())
            .any(|child| {
                event(child);
                !child.matched
            });
        if failed {
            return self.fail();
        }
        if !self.any_of.is_empty() {
            self.any_of.retain_mut(|branch| {
                event(branch);
                branch.matched
            });
            if self.any_of.is_empty() {
                return self.fail();
            }
        }
        if !self.one_of.is_empty() {
            self.one_of.retain_mut(|branch| {
                event(branch);
                branch.matched
            });
            if self.one_of.is_empty() {
                return self.fail();
            }
        }
        if let Some(not) = self.not.as_deref_mut() {
            event(not);
            if !not.matched {
                self.not = None;
            }
        }
        self.schema_dependencies.retain(|_, dependency| {
            event(dependency);
            dependency.matched
        });
    }

    /// The steps shared by every event that starts a value.
    fn begin_value(&mut self, kind: TypeSet, event: Event<'_>) {
        if self.matched {
            self.check_type(kind);
        }
        if self.matched {
            self.narrow_enum(event);
        }
        if self.matched {
            self.open_item();
        }
        if self.matched {
            self.fan_out(event);
        }
    }

    /// The steps shared by delimiter events.
    fn delimit(&mut self, event: Event<'_>) {
        if self.matched {
            self.narrow_enum(event);
        }
        if self.matched {
            self.fan_out(event);
        }
    }

    fn feed_hash(&mut self, event: Event<'_>) {
        if self.matched {
            if let Some(hash) = self.hash.as_mut() {
                event(hash);
            }
        }
    }

    fn check_number(&mut self, value: Number) {
        let node = self.node;
        let conforms = node.multiple_of.is_none_or(|m| m.divides(value))
            && node.maximum.is_none_or(|b| b.admits_below(value))
            && node.minimum.is_none_or(|b| b.admits_above(value));
        if !conforms {
            self.fail();
        }
    }

    fn check_string(&mut self, value: &str) {
        let node = self.node;
        let length = unicode_length(value);
        if node.max_length.is_some_and(|max| length > max)
            || node.min_length.is_some_and(|min| length < min)
        {
            return self.fail();
        }
        if node.pattern.as_ref().is_some_and(|re| !re.is_match(value)) {
            return self.fail();
        }
        if node.format.is_some_and(|format| !format.check(value)) {
            self.fail();
        }
    }

    fn finalize_item(&mut self) {
        if let Some(item) = self.item.take() {
            if !item.finalize() {
                self.fail();
            }
        }
    }

    fn finalize_properties(&mut self) {
        if self.properties.drain(..).any(|property| !property.finalize()) {
            self.fail();
        }
    }

    fn open_properties(&mut self, name: &str) {
        let node = self.node;
        let schema = self.schema;
        if let Some(&handle) = node.properties.get(name) {
            self.properties.push(Self::new(schema, handle));
        }
        for (pattern, handle) in &node.pattern_properties {
            if pattern.is_match(name) {
                self.properties.push(Self::new(schema, *handle));
            }
        }
        if self.properties.is_empty() {
            match node.additional_properties {
                Some(Additional::Allowed(false)) => self.fail(),
                Some(Additional::Schema(handle)) => {
                    self.properties.push(Self::new(schema, handle));
                }
                _ => {}
            }
        }
    }

    fn check_count(&mut self, count: usize, max: Option<u64>, min: Option<u64>) {
        let count = count as u64;
        if max.is_some_and(|max| count > max) || min.is_some_and(|min| count < min) {
            self.fail();
        }
    }

    fn check_object(&mut self, count: usize) {
        let node = self.node;
        self.check_count(count, node.max_properties, node.min_properties);
        if self.matched && !node.required.is_subset(&self.keys) {
            return self.fail();
        }
        if self.matched {
            let missing_dependency = node
                .property_dependencies
                .iter()
                .any(|(key, needed)| self.keys.contains(key) && !needed.is_subset(&self.keys));
            if missing_dependency {
                return self.fail();
            }
        }
        if self.matched {
            for key in node.schema_dependencies.keys() {
                if !self.keys.contains(key) {
                    continue;
                }
                let accepted = self
                    .schema_dependencies
                    .remove(key)
                    .is_some_and(ValidationSession::finalize);
                if !accepted {
                    return self.fail();
                }
            }
        }
    }
}

/// Number of Unicode scalar values in `value`, counted by UTF-8 lead bytes.
fn unicode_length(value: &str) -> u64 {
    value.bytes().filter(|b| b & 0xC0 != 0x80).count() as u64
}

impl Consumer for ValidationSession<'_> {
    fn null(&mut self) {
        self.begin_value(TypeSet::NULL, &|c| c.null());
        self.feed_hash(&|c| c.null());
    }

    fn boolean(&mut self, value: bool) {
        self.begin_value(TypeSet::BOOLEAN, &|c| c.boolean(value));
        self.feed_hash(&|c| c.boolean(value));
    }

    fn number(&mut self, value: Number) {
        let kind = if value.is_integer() {
            TypeSet::INTEGER | TypeSet::NUMBER
        } else {
            TypeSet::NUMBER
        };
        self.begin_value(kind, &|c| c.number(value));
        if self.matched && self.containers.is_empty() {
            self.check_number(value);
        }
        self.feed_hash(&|c| c.number(value));
    }

    fn string(&mut self, value: &str) {
        self.begin_value(TypeSet::STRING, &|c| c.string(value));
        if self.matched && self.containers.is_empty() {
            self.check_string(value);
        }
        self.feed_hash(&|c| c.string(value));
    }

    fn binary(&mut self, value: &[u8]) {
        // No schema keyword constrains binary data; it only has to reach
        // nested sessions and the uniqueness hash.
        if self.matched {
            self.open_item();
        }
        if self.matched {
            self.fan_out(&|c| c.binary(value));
        }
        self.feed_hash(&|c| c.binary(value));
    }

    fn begin_array(&mut self) {
        self.begin_value(TypeSet::ARRAY, &|c| c.begin_array());
        if self.matched {
            if self.containers.is_empty() {
                if self.node.unique_items {
                    self.hash = Some(HashAccumulator::new());
                }
            } else if let Some(hash) = self.hash.as_mut() {
                hash.begin_array();
            }
        }
        self.containers.push(Container {
            kind: ContainerKind::Array,
            count: 0,
        });
    }

    fn element(&mut self) {
        let own = self.at_own_level();
        if self.matched {
            self.narrow_enum(&|c| c.element());
        }
        if self.matched && own {
            self.finalize_item();
        }
        if self.matched {
            self.fan_out(&|c| c.element());
        }
        if self.matched {
            if let Some(hash) = self.hash.as_mut() {
                if own {
                    let digest = hash.digest();
                    hash.reset();
                    if let Some(digest) = digest {
                        if !self.unique.insert(digest) {
                            self.fail();
                        }
                    }
                } else {
                    hash.element();
                }
            }
        }
        if let Some(top) = self.containers.last_mut() {
            top.count += 1;
        }
    }

    fn end_array(&mut self) {
        let own = self.at_own_level();
        if self.matched {
            self.narrow_enum(&|c| c.end_array());
        }
        if self.matched && own {
            self.finalize_item();
        }
        if self.matched && own {
            let node = self.node;
            if let (Some(Items::Tuple(tuple)), Some(Additional::Allowed(false))) =
                (&node.items, node.additional_items)
            {
                if self.containers[0].count > tuple.len() {
                    self.fail();
                }
            }
        }
        if self.matched {
            self.fan_out(&|c| c.end_array());
        }
        if !own {
            self.feed_hash(&|c| c.end_array());
        }
        if let Some(top) = self.containers.pop() {
            if self.matched && own {
                self.check_count(top.count, self.node.max_items, self.node.min_items);
            }
        }
    }

    fn begin_object(&mut self) {
        self.begin_value(TypeSet::OBJECT, &|c| c.begin_object());
        self.feed_hash(&|c| c.begin_object());
        self.containers.push(Container {
            kind: ContainerKind::Object,
            count: 0,
        });
    }

    fn key(&mut self, name: &str) {
        self.delimit(&|c| c.key(name));
        self.feed_hash(&|c| c.key(name));
        if self.matched && self.own_container(ContainerKind::Object) {
            if self.node.tracks_keys() && !self.keys.insert(name.to_string()) {
                return self.fail();
            }
            self.open_properties(name);
        }
    }

    fn member(&mut self) {
        if self.matched {
            self.narrow_enum(&|c| c.member());
        }
        if self.matched && self.at_own_level() {
            self.finalize_properties();
        }
        if self.matched {
            self.fan_out(&|c| c.member());
        }
        self.feed_hash(&|c| c.member());
        if let Some(top) = self.containers.last_mut() {
            top.count += 1;
        }
    }

    fn end_object(&mut self) {
        let own = self.at_own_level();
        self.delimit(&|c| c.end_object());
        self.feed_hash(&|c| c.end_object());
        if let Some(top) = self.containers.pop() {
            if self.matched && own {
                self.check_object(top.count);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::events::from_value;

    fn accepts(schema: Value, instance: Value) -> bool {
        CompiledSchema::build(schema).unwrap().validate(&instance)
    }

    #[test]
    fn test_type_applies_to_own_value_only() {
        let schema = json!({"type": "array"});
        assert!(accepts(schema.clone(), json!([1, "a", null])));
        assert!(!accepts(schema, json!("a")));
        assert!(!accepts(json!({"type": "integer"}), json!(1.5)));
        assert!(accepts(json!({"type": "number"}), json!(1)));
    }

    #[test]
    fn test_double_literals_are_not_integers() {
        let schema = CompiledSchema::build(json!({"type": "integer"})).unwrap();
        assert!(!schema.validate_str("2.0").unwrap());
        assert!(schema.validate_str("2").unwrap());
    }

    #[test]
    fn test_enum_candidates_are_narrowed() {
        let schema = json!({"enum": [[1, 2], {"a": null}, "x"]});
        assert!(accepts(schema.clone(), json!([1, 2])));
        assert!(accepts(schema.clone(), json!({"a": null})));
        assert!(accepts(schema.clone(), json!("x")));
        assert!(!accepts(schema.clone(), json!([1])));
        assert!(!accepts(schema, json!({"a": null, "b": 1})));
    }

    #[test]
    fn test_enum_rejects_repeated_keys() {
        let schema = CompiledSchema::build(json!({"enum": [{"a": 1, "b": 2}]})).unwrap();
        assert!(!schema.validate_str(r#"{"a": 1, "a": 1}"#).unwrap());
        assert!(schema.validate_str(r#"{"b": 2, "a": 1}"#).unwrap());
    }

    #[test]
    fn test_tuple_items_and_additional_items() {
        let schema = json!({
            "items": [{"type": "string"}, {"type": "integer"}],
            "additionalItems": false
        });
        assert!(accepts(schema.clone(), json!(["a", 1])));
        assert!(accepts(schema.clone(), json!(["a"])));
        assert!(!accepts(schema.clone(), json!([1, "a"])));
        assert!(!accepts(schema, json!(["a", 1, 2])));

        let schema = json!({
            "items": [{"type": "string"}],
            "additionalItems": {"type": "boolean"}
        });
        assert!(accepts(schema.clone(), json!(["a", true, false])));
        assert!(!accepts(schema, json!(["a", true, 0])));
    }

    #[test]
    fn test_items_apply_to_nested_containers() {
        let schema = json!({"items": {"type": "array", "items": {"type": "integer"}}});
        assert!(accepts(schema.clone(), json!([[1, 2], [], [3]])));
        assert!(!accepts(schema.clone(), json!([[1, 2], ["x"]])));
        assert!(!accepts(schema, json!([[1], 2])));
    }

    #[test]
    fn test_empty_array_opens_no_item_session() {
        assert!(accepts(json!({"items": {"type": "string"}}), json!([])));
        assert!(accepts(json!({"items": [{"type": "string"}]}), json!([])));
    }

    #[test]
    fn test_item_counts() {
        let schema = json!({"minItems": 1, "maxItems": 2});
        assert!(!accepts(schema.clone(), json!([])));
        assert!(accepts(schema.clone(), json!([[1, 2, 3]])));
        assert!(!accepts(schema, json!([1, 2, 3])));
    }

    #[test]
    fn test_unique_items_compares_structurally() {
        let schema = json!({"uniqueItems": true});
        assert!(accepts(schema.clone(), json!([1, "1", [1], {"a": 1}])));
        assert!(!accepts(schema.clone(), json!([1, 1.0])));
        assert!(!accepts(schema.clone(), json!([{"a": 1, "b": 2}, {"b": 2, "a": 1}])));
        assert!(!accepts(schema, json!([[1, [2]], [1, [2]]])));
    }

    #[test]
    fn test_properties_pattern_properties_and_additional() {
        let schema = json!({
            "properties": {"id": {"type": "integer"}},
            "patternProperties": {"^x-": {"type": "string"}, "id": {"minimum": 10}},
            "additionalProperties": {"type": "boolean"}
        });
        assert!(accepts(schema.clone(), json!({"id": 12, "x-a": "s", "flag": true})));
        assert!(!accepts(schema.clone(), json!({"id": 5})));
        assert!(!accepts(schema.clone(), json!({"x-a": 1})));
        assert!(!accepts(schema, json!({"flag": "no"})));
    }

    #[test]
    fn test_duplicate_keys_fail_when_keys_are_tracked() {
        let schema = CompiledSchema::build(json!({"required": ["a"]})).unwrap();
        assert!(!schema.validate_str(r#"{"a": 1, "a": 2}"#).unwrap());
        let lenient = CompiledSchema::build(json!({"type": "object"})).unwrap();
        assert!(lenient.validate_str(r#"{"a": 1, "a": 2}"#).unwrap());
    }

    #[test]
    fn test_property_counts() {
        let schema = json!({"minProperties": 1, "maxProperties": 1});
        assert!(!accepts(schema.clone(), json!({})));
        assert!(accepts(schema.clone(), json!({"a": {"b": 1, "c": 2}})));
        assert!(!accepts(schema, json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_dependencies() {
        let schema = json!({
            "dependencies": {
                "card": ["billing"],
                "vip": {"required": ["level"]}
            }
        });
        assert!(accepts(schema.clone(), json!({"card": 1, "billing": 2})));
        assert!(!accepts(schema.clone(), json!({"card": 1})));
        assert!(accepts(schema.clone(), json!({"vip": true, "level": 3})));
        assert!(!accepts(schema.clone(), json!({"vip": true})));
        assert!(accepts(schema, json!({"level": 3})));
    }

    #[test]
    fn test_combinators() {
        let all_of = json!({"allOf": [{"minimum": 2}, {"maximum": 4}]});
        assert!(accepts(all_of.clone(), json!(3)));
        assert!(!accepts(all_of, json!(5)));

        let any_of = json!({"anyOf": [{"type": "string"}, {"type": "null"}]});
        assert!(accepts(any_of.clone(), json!(null)));
        assert!(!accepts(any_of, json!(0)));

        let one_of = json!({"oneOf": [{"type": "integer"}, {"minimum": 2}]});
        assert!(accepts(one_of.clone(), json!(1)));
        assert!(accepts(one_of.clone(), json!(2.5)));
        assert!(!accepts(one_of, json!(3)));

        let not = json!({"not": {"type": "string"}});
        assert!(accepts(not.clone(), json!(1)));
        assert!(!accepts(not, json!("s")));
    }

    #[test]
    fn test_combinators_see_nested_values() {
        let schema = json!({
            "anyOf": [
                {"items": {"type": "string"}},
                {"items": {"type": "integer"}}
            ]
        });
        assert!(accepts(schema.clone(), json!(["a", "b"])));
        assert!(accepts(schema.clone(), json!([1, 2])));
        assert!(!accepts(schema, json!(["a", 2])));
    }

    #[test]
    fn test_string_length_counts_code_points() {
        let schema = json!({"maxLength": 2, "minLength": 2});
        assert!(accepts(schema.clone(), json!("\u{e9}\u{e8}")));
        assert!(!accepts(schema, json!("abc")));
        assert_eq!(unicode_length("\u{1f600}a"), 2);
    }

    #[test]
    fn test_pattern_is_a_search() {
        let schema = json!({"pattern": "b+"});
        assert!(accepts(schema.clone(), json!("abba")));
        assert!(!accepts(schema.clone(), json!("acca")));
        assert!(accepts(schema, json!(5)));
    }

    #[test]
    fn test_format_checks() {
        assert!(accepts(json!({"format": "ipv4"}), json!("10.0.0.1")));
        assert!(!accepts(json!({"format": "ipv4"}), json!("10.0.0.256")));
        assert!(accepts(json!({"format": "bogus"}), json!("anything")));
    }

    #[test]
    fn test_is_match_flips_early() {
        let schema = CompiledSchema::build(json!({"type": "object"})).unwrap();
        let mut session = schema.consumer();
        session.begin_array();
        assert!(!session.is_match());
        session.end_array();
        assert!(!session.finalize());
    }

    #[test]
    fn test_binary_is_accepted_and_hashed() {
        let schema = CompiledSchema::build(json!({"type": "string", "uniqueItems": true})).unwrap();
        let mut session = schema.consumer();
        session.binary(b"abc");
        assert!(session.finalize());

        let schema = CompiledSchema::build(json!({"uniqueItems": true})).unwrap();
        let mut session = schema.consumer();
        session.begin_array();
        session.binary(b"abc");
        session.element();
        session.binary(b"abc");
        session.element();
        session.end_array();
        assert!(!session.finalize());
    }

    #[test]
    fn test_session_for_inner_handle() {
        let schema = CompiledSchema::build(json!({
            "definitions": {"pos": {"type": "integer", "minimum": 1}}
        }))
        .unwrap();
        let handle = schema.handle_at("/definitions/pos").unwrap();
        let mut session = schema.session(handle);
        from_value(&mut session, &json!(0));
        assert!(!session.finalize());
    }
}
