//! Resolution of internal JSON References (`$ref`).
//!
//! Only URI-fragment references (`"#..."`) are resolved; remote references
//! are left as they are. The document tree itself is never rewritten:
//! instead every reference object is recorded as an alias from its own
//! location to the location it refers to, and all lookups during compilation
//! go through [`SchemaDocument::follow`].
//!
//! Locations are JSON Pointers into the raw document, `""` being the root.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SchemaError};

/// A schema document together with its resolved reference aliases.
#[derive(Debug)]
pub struct SchemaDocument {
    root: Value,
    aliases: HashMap<String, String>,
}

impl SchemaDocument {
    /// Resolves every internal `$ref` in `root`.
    ///
    /// The walk is depth-first: array elements and object members are
    /// resolved before the object's own `$ref`, so references may point
    /// through other references that appear earlier in document order.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::SelfReference`] if a reference resolves to the
    /// object containing it, and [`SchemaError::InvalidReference`] for a
    /// malformed fragment, a missing target, or a pointer that steps into a
    /// scalar or into another reference object.
    ///
    /// # Examples
    ///
    /// ```
    /// use serde_json::json;
    /// use stream_schema_core::SchemaDocument;
    ///
    /// let doc = SchemaDocument::resolve(json!({
    ///     "definitions": {"id": {"type": "integer"}},
    ///     "properties": {"a": {"$ref": "#/definitions/id"}}
    /// }))
    /// .unwrap();
    /// assert_eq!(doc.follow("/properties/a"), "/definitions/id");
    ///
    /// assert!(SchemaDocument::resolve(json!({"$ref": "#"})).is_err());
    /// ```
    pub fn resolve(root: Value) -> Result<Self> {
        let mut document = Self {
            root,
            aliases: HashMap::new(),
        };
        let mut resolved = HashMap::new();
        document.resolve_node(&document.root, "", &mut resolved)?;
        document.aliases = resolved;
        Ok(document)
    }

    /// The raw document.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Follows aliases from `location` until a location that is not itself a
    /// resolved reference.
    pub fn follow(&self, location: &str) -> String {
        follow(&self.aliases, location)
    }

    /// Returns the raw value stored at `location`, without following aliases.
    pub fn get(&self, location: &str) -> Option<&Value> {
        self.root.pointer(location)
    }

    /// Number of resolved references.
    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    fn resolve_node(
        &self,
        value: &Value,
        location: &str,
        aliases: &mut HashMap<String, String>,
    ) -> Result<()> {
        match value {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    self.resolve_node(item, &format!("{location}/{index}"), aliases)?;
                }
            }
            Value::Object(members) => {
                for (key, item) in members {
                    self.resolve_node(item, &child_location(location, key), aliases)?;
                }
                if let Some(Value::String(reference)) = members.get("$ref") {
                    if reference.starts_with('#') {
                        let target = self.walk(reference, location, aliases)?;
                        if target == location {
                            return Err(SchemaError::SelfReference {
                                location: location.to_string(),
                                reference: reference.clone(),
                            });
                        }
                        debug!(location, reference = %reference, target = %target, "Resolved JSON reference");
                        aliases.insert(location.to_string(), target);
                    } else {
                        debug!(location, reference = %reference, "Ignoring remote JSON reference");
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn walk(
        &self,
        reference: &str,
        location: &str,
        aliases: &HashMap<String, String>,
    ) -> Result<String> {
        let invalid = |reason: String| SchemaError::InvalidReference {
            location: location.to_string(),
            reference: reference.to_string(),
            reason,
        };

        let tokens = fragment_tokens(reference).map_err(invalid)?;
        let mut current = follow(aliases, "");
        for token in tokens {
            let next = match self.root.pointer(&current) {
                Some(Value::Array(items)) => match token.parse::<usize>() {
                    Ok(index) if index < items.len() => format!("{current}/{index}"),
                    _ => {
                        return Err(invalid(format!(
                            "no array element '{token}' at '{current}'"
                        )));
                    }
                },
                Some(Value::Object(members)) => {
                    if matches!(members.get("$ref"), Some(Value::String(_))) {
                        return Err(invalid(format!(
                            "referencing additional members of the reference object at '{current}' is invalid"
                        )));
                    }
                    if !members.contains_key(&token) {
                        return Err(invalid(format!("no member '{token}' at '{current}'")));
                    }
                    child_location(&current, &token)
                }
                _ => {
                    return Err(invalid(format!(
                        "cannot step into '{token}': '{current}' is not an array or object"
                    )));
                }
            };
            current = follow(aliases, &next);
        }
        Ok(current)
    }
}

fn follow(aliases: &HashMap<String, String>, location: &str) -> String {
    let mut current = location;
    while let Some(target) = aliases.get(current) {
        current = target;
    }
    current.to_string()
}

/// Appends an escaped JSON Pointer token to `location`.
pub(crate) fn child_location(location: &str, key: &str) -> String {
    let mut child = String::with_capacity(location.len() + key.len() + 1);
    child.push_str(location);
    child.push('/');
    for c in key.chars() {
        match c {
            '~' => child.push_str("~0"),
            '/' => child.push_str("~1"),
            _ => child.push(c),
        }
    }
    child
}

/// Decodes a URI fragment (`#/a/b%20c`) into unescaped JSON Pointer tokens.
fn fragment_tokens(reference: &str) -> std::result::Result<Vec<String>, String> {
    let fragment = reference.strip_prefix('#').unwrap_or(reference);
    let pointer = percent_decode(fragment)?;
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err("fragment must be empty or start with '/'".to_string());
    };
    rest.split('/').map(unescape_token).collect()
}

fn unescape_token(token: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return Err(format!("invalid escape sequence in pointer token '{token}'")),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

fn percent_decode(fragment: &str) -> std::result::Result<String, String> {
    let bytes = fragment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| "invalid percent-encoding in fragment".to_string())?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| "percent-decoded fragment is not UTF-8".to_string())
}
