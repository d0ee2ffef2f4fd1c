//! Incremental structural hashing for `uniqueItems`.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::events::Consumer;
use crate::number::Number;

/// SHA-256 digest of one complete JSON value.
pub type ValueDigest = [u8; 32];

enum Frame {
    Array(Sha256),
    Object {
        members: BTreeMap<String, ValueDigest>,
        key: String,
        value: Option<ValueDigest>,
    },
}

/// Accumulates a digest for a value while its events are still arriving.
///
/// Equal values produce equal digests: numbers are hashed in their
/// [canonical](Number::canonical) form and object members are folded in key
/// order, so `{"a":1,"b":2.0}` and `{"b":2,"a":1}` collide on purpose.
///
/// # Examples
///
/// ```
/// use stream_schema_core::{HashAccumulator, events};
///
/// let mut hash = HashAccumulator::new();
/// events::from_str(r#"{"a": 1, "b": 2.0}"#, &mut hash).unwrap();
/// let first = hash.digest().unwrap();
///
/// hash.reset();
/// events::from_str(r#"{"b": 2, "a": 1}"#, &mut hash).unwrap();
/// assert_eq!(hash.digest(), Some(first));
/// ```
#[derive(Default)]
pub struct HashAccumulator {
    stack: Vec<Frame>,
    digest: Option<ValueDigest>,
}

impl HashAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Digest of the most recently completed top-level value.
    pub fn digest(&self) -> Option<ValueDigest> {
        self.digest
    }

    /// Discards all state so the accumulator can hash the next sibling.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.digest = None;
    }

    fn scalar(&mut self, tag: u8, payload: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update([tag]);
        hasher.update(payload);
        self.complete(hasher.finalize().into());
    }

    fn complete(&mut self, digest: ValueDigest) {
        match self.stack.last_mut() {
            Some(Frame::Array(hasher)) => hasher.update(digest),
            Some(Frame::Object { value, .. }) => *value = Some(digest),
            None => self.digest = Some(digest),
        }
    }
}

impl Consumer for HashAccumulator {
    fn null(&mut self) {
        self.scalar(b'n', &[]);
    }

    fn boolean(&mut self, value: bool) {
        self.scalar(if value { b't' } else { b'f' }, &[]);
    }

    fn number(&mut self, value: Number) {
        match value.canonical() {
            Number::Unsigned(u) => self.scalar(b'u', &u.to_be_bytes()),
            Number::Signed(i) => self.scalar(b'i', &i.to_be_bytes()),
            Number::Double(d) => self.scalar(b'd', &d.to_bits().to_be_bytes()),
        }
    }

    fn string(&mut self, value: &str) {
        self.scalar(b's', value.as_bytes());
    }

    fn binary(&mut self, value: &[u8]) {
        self.scalar(b'x', value);
    }

    fn begin_array(&mut self) {
        let mut hasher = Sha256::new();
        hasher.update(b"[");
        self.stack.push(Frame::Array(hasher));
    }

    fn element(&mut self) {}

    fn end_array(&mut self) {
        if let Some(Frame::Array(mut hasher)) = self.stack.pop() {
            hasher.update(b"]");
            self.complete(hasher.finalize().into());
        }
    }

    fn begin_object(&mut self) {
        self.stack.push(Frame::Object {
            members: BTreeMap::new(),
            key: String::new(),
            value: None,
        });
    }

    fn key(&mut self, name: &str) {
        if let Some(Frame::Object { key, .. }) = self.stack.last_mut() {
            name.clone_into(key);
        }
    }

    fn member(&mut self) {
        if let Some(Frame::Object {
            members,
            key,
            value,
        }) = self.stack.last_mut()
        {
            if let Some(digest) = value.take() {
                members.insert(std::mem::take(key), digest);
            }
        }
    }

    fn end_object(&mut self) {
        if let Some(Frame::Object { members, .. }) = self.stack.pop() {
            let mut hasher = Sha256::new();
            hasher.update(b"{");
            for (key, digest) in &members {
                hasher.update((key.len() as u64).to_be_bytes());
                hasher.update(key.as_bytes());
                hasher.update(digest);
            }
            hasher.update(b"}");
            self.complete(hasher.finalize().into());
        }
    }
}
