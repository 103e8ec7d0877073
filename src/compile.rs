//! The declarative scene compiler.
//!
//! A JSON value compiles to a [`CompileResult`]: the nodes it produced
//! (root first) plus the named links to be resolved later. Dispatch is
//! sigil-keyed: an object with exactly one `$name` property invokes the
//! registered compiler for `name`; a bare 3-number array is sugar for a
//! literal vector node.
//!
//! All compilation state — the statically constructed compiler registry,
//! the auto-id sequence, and the data directory for asset resolution —
//! lives in an explicit [`CompileContext`] threaded through every call,
//! so compilation is side-effect-free and independently testable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use glam::Vec3;
use serde_json::Value;

use crate::error::CompileError;
use crate::node::Node;
use crate::nodes;

/// A pending edge: `source` node's `attr` refers to `target`, which is
/// either a node id or `id:slot`.
#[derive(Debug, Clone)]
pub struct NodeLink {
    pub source: String,
    pub attr: String,
    pub target: String,
}

impl NodeLink {
    pub fn new(source: &str, attr: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            attr: attr.to_string(),
            target: target.to_string(),
        }
    }

    /// Split the target reference on the first `:` into `(id, slot)`,
    /// the slot defaulting to `"default"`.
    pub fn split_target(&self) -> (&str, &str) {
        match self.target.split_once(':') {
            Some((id, slot)) => (id, slot),
            None => (self.target.as_str(), crate::node::DEFAULT_SLOT),
        }
    }
}

/// Everything one compile step produced, transitively. A successful
/// result always holds the step's own node first in `nodes`.
pub struct CompileResult {
    pub nodes: Vec<Box<dyn Node>>,
    pub links: Vec<NodeLink>,
}

impl CompileResult {
    pub fn root_id(&self) -> &str {
        self.nodes[0].id()
    }
}

type CompileFn = fn(&mut CompileContext, String, &Value) -> Result<CompileResult, CompileError>;

/// Explicit compilation context: compiler registry, auto-id sequence,
/// and the data directory mesh paths resolve against.
pub struct CompileContext {
    registry: HashMap<&'static str, CompileFn>,
    id_seq: u32,
    data_dir: PathBuf,
}

impl CompileContext {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let mut ctx = Self {
            registry: HashMap::new(),
            id_seq: 0,
            data_dir: data_dir.into(),
        };
        ctx.register("float3", nodes::value::compile_float3);
        ctx.register("mul", nodes::value::compile_mul);
        ctx.register("add", nodes::value::compile_add);
        ctx.register("computed", nodes::computed::compile);
        ctx.register("look", nodes::camera::compile);
        ctx.register("rotate", nodes::transform::compile_rotate);
        ctx.register("modify", nodes::transform::compile_modify);
        ctx.register("multiply", nodes::transform::compile_multiply);
        ctx.register("mesh", nodes::mesh::compile);
        ctx.register("layer", nodes::layer::compile);
        ctx
    }

    fn register(&mut self, name: &'static str, f: CompileFn) {
        log::debug!("registered [{name}]");
        let previous = self.registry.insert(name, f);
        debug_assert!(previous.is_none(), "node type {name:?} registered twice");
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Next auto-generated node id; unique across the whole compile
    /// session, never reused.
    fn next_id(&mut self) -> String {
        let id = format!("__auto{}__", self.id_seq);
        self.id_seq += 1;
        id
    }

    /// Compile one JSON value by the dispatch rule.
    pub fn compile(&mut self, data: &Value) -> Result<CompileResult, CompileError> {
        let auto_id = self.next_id();
        match data {
            Value::Array(elems) => {
                let nums: Vec<f32> = elems
                    .iter()
                    .filter_map(|e| e.as_f64().map(|n| n as f32))
                    .collect();
                if elems.len() != 3 || nums.len() != 3 {
                    return Err(CompileError::MalformedNode);
                }
                let node = nodes::value::Vec3Node::new(auto_id, Vec3::new(nums[0], nums[1], nums[2]));
                Ok(CompileResult {
                    nodes: vec![Box::new(node)],
                    links: Vec::new(),
                })
            }
            Value::Object(props) => {
                let mut invocations = props.iter().filter(|(k, _)| k.starts_with('$'));
                let Some((key, payload)) = invocations.next() else {
                    return Err(CompileError::MalformedNode);
                };
                if invocations.next().is_some() {
                    return Err(CompileError::MalformedNode);
                }
                let name = &key[1..];
                if !payload.is_object() {
                    return Err(CompileError::MalformedNode);
                }
                let id = match payload.get("id").and_then(|v| v.as_str()) {
                    Some(id) => id.to_string(),
                    None => auto_id,
                };
                let f = *self
                    .registry
                    .get(name)
                    .ok_or_else(|| CompileError::UnknownNodeType(name.to_string()))?;
                f(self, id, payload)
            }
            _ => Err(CompileError::MalformedNode),
        }
    }
}

/// Per-invocation helper used by every node compiler: reads named inputs
/// from the payload, accumulating sub-nodes and pending links.
pub struct CompileScope<'a, 'v> {
    ctx: &'a mut CompileContext,
    id: String,
    data: &'v Value,
    nodes: Vec<Box<dyn Node>>,
    links: Vec<NodeLink>,
}

impl<'a, 'v> CompileScope<'a, 'v> {
    pub fn new(ctx: &'a mut CompileContext, id: String, data: &'v Value) -> Self {
        Self {
            ctx,
            id,
            data,
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data_dir(&self) -> &Path {
        self.ctx.data_dir()
    }

    fn missing(&self, attr: &str) -> CompileError {
        CompileError::MissingInput {
            id: self.id.clone(),
            attr: attr.to_string(),
        }
    }

    fn malformed(&self, attr: &str) -> CompileError {
        CompileError::MalformedInput {
            id: self.id.clone(),
            attr: attr.to_string(),
        }
    }

    fn link_to(&mut self, attr: &str, value: &Value) -> Result<(), CompileError> {
        match value {
            // A string is a reference, "id" or "id:slot".
            Value::String(target) => {
                self.links.push(NodeLink::new(&self.id, attr, target));
            }
            // Anything else compiles recursively and links to its root.
            _ => {
                let sub = self.ctx.compile(value)?;
                self.links.push(NodeLink::new(&self.id, attr, sub.root_id()));
                let CompileResult { nodes, links } = sub;
                self.nodes.extend(nodes);
                self.links.extend(links);
            }
        }
        Ok(())
    }

    /// Read one named input, producing at most one link.
    pub fn input(&mut self, attr: &str, required: bool) -> Result<(), CompileError> {
        match self.data.get(attr) {
            Some(value) => self.link_to(attr, value),
            None if required => Err(self.missing(attr)),
            None => Ok(()),
        }
    }

    /// Read an array-valued input, producing one link per element, all
    /// sharing the attribute name.
    pub fn input_many(&mut self, attr: &str, required: bool) -> Result<(), CompileError> {
        match self.data.get(attr) {
            Some(Value::Array(elems)) => {
                for elem in elems {
                    self.link_to(attr, elem)?;
                }
                Ok(())
            }
            Some(_) => Err(self.malformed(attr)),
            None if required => Err(self.missing(attr)),
            None => Ok(()),
        }
    }

    /// A required string payload field (not a link).
    pub fn require_str(&self, attr: &str) -> Result<&'v str, CompileError> {
        match self.data.get(attr) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(self.malformed(attr)),
            None => Err(self.missing(attr)),
        }
    }

    /// An optional numeric payload field (not a link).
    pub fn opt_f32(&self, attr: &str) -> Result<Option<f32>, CompileError> {
        match self.data.get(attr) {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .map(|n| Some(n as f32))
                .ok_or_else(|| self.malformed(attr)),
        }
    }

    /// A required numeric payload field (not a link).
    pub fn require_f32(&self, attr: &str) -> Result<f32, CompileError> {
        self.opt_f32(attr)?.ok_or_else(|| self.missing(attr))
    }

    /// Finish the invocation: `node` becomes the result's root.
    pub fn finish(self, node: Box<dyn Node>) -> CompileResult {
        let mut nodes = self.nodes;
        nodes.insert(0, node);
        CompileResult {
            nodes,
            links: self.links,
        }
    }
}
