//! Schema compilation: from a raw document to an arena of compiled nodes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;

use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::events;
use crate::node::{CompiledNode, NodeHandle};
use crate::options::CompileOptions;
use crate::reference::SchemaDocument;
use crate::session::ValidationSession;

/// Assigns one [`NodeHandle`] per distinct resolved location.
#[derive(Debug, Default)]
pub(crate) struct HandleTable {
    handles: HashMap<String, NodeHandle>,
    locations: Vec<String>,
}

impl HandleTable {
    pub(crate) fn intern(&mut self, location: String) -> NodeHandle {
        if let Some(&handle) = self.handles.get(&location) {
            return handle;
        }
        let handle = NodeHandle(self.locations.len() as u32);
        self.locations.push(location.clone());
        self.handles.insert(location, handle);
        handle
    }

    fn location(&self, handle: NodeHandle) -> &str {
        &self.locations[handle.index()]
    }
}

/// Compiles schema documents with a fixed set of [`CompileOptions`].
#[derive(Debug, Clone, Default)]
pub struct SchemaCompiler {
    options: CompileOptions,
}

impl SchemaCompiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Resolves references, then compiles the root and every schema reachable
    /// from it.
    ///
    /// Compilation runs in rounds: each round compiles the handles referenced
    /// by already-compiled nodes but not compiled themselves, until a round
    /// discovers nothing new.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found in any reachable schema object.
    pub fn build(&self, schema: Value) -> Result<CompiledSchema> {
        let document = SchemaDocument::resolve(schema)?;
        let mut table = HandleTable::default();
        let root = table.intern(document.follow(""));

        let mut compiled: BTreeMap<NodeHandle, CompiledNode> = BTreeMap::new();
        let mut pending = BTreeSet::from([root]);
        let mut round = 0;
        while !pending.is_empty() {
            round += 1;
            debug!(round, pending = pending.len(), "Compiling schema nodes");
            for handle in pending {
                let location = table.location(handle).to_string();
                let node = CompiledNode::compile(&document, &location, &self.options, &mut table)?;
                compiled.insert(handle, node);
            }
            pending = compiled
                .values()
                .flat_map(|node| node.referenced().iter().copied())
                .filter(|handle| !compiled.contains_key(handle))
                .collect();
        }

        // Every interned handle is referenced by some compiled node, so the
        // map keys are exactly 0..n and the values line up with their index.
        let nodes: Vec<CompiledNode> = compiled.into_values().collect();
        check_recursion(&nodes)?;

        debug!(
            nodes = nodes.len(),
            references = document.alias_count(),
            "Compiled schema"
        );
        Ok(CompiledSchema {
            document,
            nodes,
            handles: table.handles,
            root,
        })
    }
}

/// Rejects a node that reaches itself through combinator and
/// schema-dependency edges alone. Such edges create child sessions eagerly,
/// so a cycle among them would never stop allocating sessions.
fn check_recursion(nodes: &[CompiledNode]) -> Result<()> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    let edges: Vec<Vec<NodeHandle>> = nodes
        .iter()
        .map(|node| node.eager_children().collect())
        .collect();
    let mut marks = vec![Mark::New; nodes.len()];
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for start in 0..nodes.len() {
        if marks[start] != Mark::New {
            continue;
        }
        marks[start] = Mark::Active;
        stack.push((start, 0));
        while let Some(top) = stack.last_mut() {
            let (index, next) = *top;
            top.1 += 1;
            match edges[index].get(next) {
                Some(child) => match marks[child.index()] {
                    Mark::Active => {
                        return Err(SchemaError::UnguardedRecursion {
                            location: nodes[child.index()].location().to_string(),
                        });
                    }
                    Mark::New => {
                        marks[child.index()] = Mark::Active;
                        stack.push((child.index(), 0));
                    }
                    Mark::Done => {}
                },
                None => {
                    marks[index] = Mark::Done;
                    stack.pop();
                }
            }
        }
    }
    Ok(())
}

/// An immutable, compiled schema.
///
/// Cheap to share: validation only borrows it, so one instance can serve any
/// number of concurrent [`ValidationSession`]s.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use stream_schema_core::CompiledSchema;
///
/// let schema = CompiledSchema::build(json!({
///     "type": "object",
///     "required": ["id"],
///     "properties": {"id": {"type": "integer", "minimum": 1}}
/// }))
/// .unwrap();
///
/// assert!(schema.validate(&json!({"id": 7})));
/// assert!(!schema.validate(&json!({"id": 0})));
/// assert_eq!(schema.validate_str(r#"{"name": "x"}"#).unwrap(), false);
/// ```
#[derive(Debug)]
pub struct CompiledSchema {
    document: SchemaDocument,
    nodes: Vec<CompiledNode>,
    handles: HashMap<String, NodeHandle>,
    root: NodeHandle,
}

impl CompiledSchema {
    /// Compiles `schema` with default options.
    ///
    /// # Errors
    ///
    /// See [`SchemaCompiler::build`].
    pub fn build(schema: Value) -> Result<Self> {
        SchemaCompiler::default().build(schema)
    }

    /// Compiles `schema` with `options`.
    ///
    /// # Errors
    ///
    /// See [`SchemaCompiler::build`].
    pub fn build_with(schema: Value, options: &CompileOptions) -> Result<Self> {
        SchemaCompiler::new(options.clone()).build(schema)
    }

    pub fn root(&self) -> NodeHandle {
        self.root
    }

    /// Panics if `handle` did not come from this schema.
    pub fn node(&self, handle: NodeHandle) -> &CompiledNode {
        &self.nodes[handle.index()]
    }

    /// Number of compiled nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Handle of the node compiled for the schema at JSON Pointer `location`,
    /// following references.
    pub fn handle_at(&self, location: &str) -> Option<NodeHandle> {
        self.handles.get(&self.document.follow(location)).copied()
    }

    /// The resolved source document.
    pub fn document(&self) -> &SchemaDocument {
        &self.document
    }

    /// A fresh session validating one value against the root schema.
    pub fn consumer(&self) -> ValidationSession<'_> {
        self.session(self.root)
    }

    /// A fresh session validating one value against the node `handle`.
    pub fn session(&self, handle: NodeHandle) -> ValidationSession<'_> {
        ValidationSession::new(self, handle)
    }

    /// Validates an in-memory value.
    pub fn validate(&self, value: &Value) -> bool {
        let mut session = self.consumer();
        events::from_value(&mut session, value);
        session.finalize()
    }

    /// Streams JSON text from `reader` through a session without building a
    /// value.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if the input is not well-formed JSON. A
    /// well-formed instance that does not conform yields `Ok(false)`.
    pub fn validate_reader<R: Read>(&self, reader: R) -> serde_json::Result<bool> {
        let mut session = self.consumer();
        events::from_reader(reader, &mut session)?;
        Ok(session.finalize())
    }

    /// Like [`validate_reader`](Self::validate_reader), for text in memory.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if `text` is not well-formed JSON.
    pub fn validate_str(&self, text: &str) -> serde_json::Result<bool> {
        let mut session = self.consumer();
        events::from_str(text, &mut session)?;
        Ok(session.finalize())
    }
}
