//! Streaming structural comparison against a known value.
//!
//! A [`ValueMatcher`] holds one expected [`Value`] and consumes the events of
//! an instance, flipping to "no match" the moment the two diverge. Enum
//! validation runs one matcher per enum entry and drops the ones that stop
//! matching, so an instance is checked against every entry without being
//! buffered.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::events::Consumer;
use crate::number::Number;

enum Frame<'a> {
    Array { items: &'a [Value], index: usize },
    Object {
        members: &'a Map<String, Value>,
        seen: BTreeSet<&'a str>,
    },
}

/// Compares an event stream against one borrowed value.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use stream_schema_core::{ValueMatcher, events};
///
/// let expected = json!({"a": [1, 2]});
/// let mut matcher = ValueMatcher::new(&expected);
/// events::from_str(r#"{"a": [1, 2.0]}"#, &mut matcher).unwrap();
/// assert!(matcher.is_match());
///
/// let mut matcher = ValueMatcher::new(&expected);
/// events::from_str(r#"{"a": [2, 1]}"#, &mut matcher).unwrap();
/// assert!(!matcher.is_match());
/// ```
pub struct ValueMatcher<'a> {
    stack: Vec<Frame<'a>>,
    next: Option<&'a Value>,
    matched: bool,
}

impl<'a> ValueMatcher<'a> {
    /// Creates a matcher expecting exactly `expected`.
    pub fn new(expected: &'a Value) -> Self {
        Self {
            stack: Vec::new(),
            next: Some(expected),
            matched: true,
        }
    }

    /// Returns `false` once the events seen so far rule out a match.
    pub fn is_match(&self) -> bool {
        self.matched
    }

    fn take_expected(&mut self) -> Option<&'a Value> {
        let expected = self.next.take();
        if expected.is_none() {
            self.matched = false;
        }
        expected
    }

    fn check(&mut self, accepted: impl FnOnce(&'a Value) -> bool) {
        if !self.matched {
            return;
        }
        if let Some(expected) = self.take_expected() {
            if !accepted(expected) {
                self.matched = false;
            }
        }
    }
}

impl<'a> Consumer for ValueMatcher<'a> {
    fn null(&mut self) {
        self.check(Value::is_null);
    }

    fn boolean(&mut self, value: bool) {
        self.check(|expected| expected.as_bool() == Some(value));
    }

    fn number(&mut self, value: Number) {
        self.check(|expected| match expected {
            Value::Number(n) => Number::from_json(n).canonical() == value.canonical(),
            _ => false,
        });
    }

    fn string(&mut self, value: &str) {
        self.check(|expected| expected.as_str() == Some(value));
    }

    fn binary(&mut self, _value: &[u8]) {
        self.matched = false;
    }

    fn begin_array(&mut self) {
        if !self.matched {
            return;
        }
        match self.take_expected() {
            Some(Value::Array(items)) => {
                self.next = items.first();
                self.stack.push(Frame::Array { items, index: 0 });
            }
            _ => self.matched = false,
        }
    }

    fn element(&mut self) {
        if !self.matched {
            return;
        }
        if let Some(Frame::Array { items, index }) = self.stack.last_mut() {
            let items: &'a [Value] = *items;
            *index += 1;
            self.next = items.get(*index);
        }
    }

    fn end_array(&mut self) {
        if !self.matched {
            return;
        }
        match self.stack.pop() {
            Some(Frame::Array { items, index }) if index == items.len() => self.next = None,
            _ => self.matched = false,
        }
    }

    fn begin_object(&mut self) {
        if !self.matched {
            return;
        }
        match self.take_expected() {
            Some(Value::Object(members)) => self.stack.push(Frame::Object {
                members,
                seen: BTreeSet::new(),
            }),
            _ => self.matched = false,
        }
    }

    fn key(&mut self, name: &str) {
        if !self.matched {
            return;
        }
        if let Some(Frame::Object { members, seen }) = self.stack.last_mut() {
            let members: &'a Map<String, Value> = *members;
            // A repeated key can never equal a map entry.
            match members.get_key_value(name) {
                Some((known, value)) if seen.insert(known.as_str()) => self.next = Some(value),
                _ => self.matched = false,
            }
        }
    }

    fn member(&mut self) {}

    fn end_object(&mut self) {
        if !self.matched {
            return;
        }
        match self.stack.pop() {
            Some(Frame::Object { members, seen }) if seen.len() == members.len() => self.next = None,
            _ => self.matched = false,
        }
    }
}
