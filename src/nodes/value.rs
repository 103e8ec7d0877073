//! Value-producing nodes: literals, elementwise arithmetic, and the
//! host-updated system value table.

use std::any::Any;
use std::collections::HashMap;

use glam::{Vec3, Vec4};
use serde_json::Value;

use crate::compile::{CompileContext, CompileResult, CompileScope};
use crate::error::CompileError;
use crate::flex::FlexValue;
use crate::node::{EvalCtx, LinkTarget, Node, ValueSource, ValueRef};

/// Literal 3-vector value node. Also the target of the bare
/// `[x, y, z]` array sugar.
pub struct Vec3Node {
    id: String,
    value: Vec3,
}

impl Vec3Node {
    pub fn new(id: impl Into<String>, value: Vec3) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }
}

impl Node for Vec3Node {
    fn id(&self) -> &str {
        &self.id
    }

    fn as_value(&self) -> Option<&dyn ValueSource> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl ValueSource for Vec3Node {
    fn eval(&self, _slot: &str, _ctx: &EvalCtx) -> FlexValue {
        FlexValue::Vec3(self.value)
    }
}

pub(crate) fn compile_float3(
    ctx: &mut CompileContext,
    id: String,
    data: &Value,
) -> Result<CompileResult, CompileError> {
    let scope = CompileScope::new(ctx, id, data);
    let x = scope.require_f32("x")?;
    let y = scope.require_f32("y")?;
    let z = scope.require_f32("z")?;
    let node = Vec3Node::new(scope.id(), Vec3::new(x, y, z));
    Ok(scope.finish(Box::new(node)))
}

/// Elementwise binary arithmetic over 4-vector-widened operands.
/// An unlinked operand defaults to the all-ones vector.
enum BinOp {
    Mul,
    Add,
}

pub struct BinaryNode {
    id: String,
    op: BinOp,
    a: Option<ValueRef>,
    b: Option<ValueRef>,
}

impl BinaryNode {
    fn new(id: impl Into<String>, op: BinOp) -> Self {
        Self {
            id: id.into(),
            op,
            a: None,
            b: None,
        }
    }
}

impl Node for BinaryNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn connect(&mut self, attr: &str, target: LinkTarget) -> Result<(), CompileError> {
        match attr {
            "a" => self.a = Some(target.value(attr)?),
            "b" => self.b = Some(target.value(attr)?),
            _ => {}
        }
        Ok(())
    }

    fn as_value(&self) -> Option<&dyn ValueSource> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl ValueSource for BinaryNode {
    fn eval(&self, _slot: &str, ctx: &EvalCtx) -> FlexValue {
        let va = ctx
            .value_or(self.a.as_ref(), FlexValue::Vec4(Vec4::ONE))
            .as_vec4();
        let vb = ctx
            .value_or(self.b.as_ref(), FlexValue::Vec4(Vec4::ONE))
            .as_vec4();
        FlexValue::Vec4(match self.op {
            BinOp::Mul => va * vb,
            BinOp::Add => va + vb,
        })
    }
}

fn compile_binary(
    ctx: &mut CompileContext,
    id: String,
    data: &Value,
    op: BinOp,
) -> Result<CompileResult, CompileError> {
    let mut scope = CompileScope::new(ctx, id, data);
    scope.input("a", false)?;
    scope.input("b", false)?;
    let node = BinaryNode::new(scope.id(), op);
    Ok(scope.finish(Box::new(node)))
}

pub(crate) fn compile_mul(
    ctx: &mut CompileContext,
    id: String,
    data: &Value,
) -> Result<CompileResult, CompileError> {
    compile_binary(ctx, id, data, BinOp::Mul)
}

pub(crate) fn compile_add(
    ctx: &mut CompileContext,
    id: String,
    data: &Value,
) -> Result<CompileResult, CompileError> {
    compile_binary(ctx, id, data, BinOp::Add)
}

/// Mutable key→value table fed from outside the graph once per frame.
/// Instantiated as a builtin with the reserved id `"system"`; the output
/// slot name selects the key. Missing keys read as zero.
pub struct SystemValues {
    id: String,
    db: HashMap<String, FlexValue>,
}

impl SystemValues {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            db: HashMap::new(),
        }
    }

    pub fn upsert(&mut self, key: &str, value: FlexValue) {
        self.db.insert(key.to_string(), value);
    }
}

impl Node for SystemValues {
    fn id(&self) -> &str {
        &self.id
    }

    fn as_value(&self) -> Option<&dyn ValueSource> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl ValueSource for SystemValues {
    fn eval(&self, slot: &str, _ctx: &EvalCtx) -> FlexValue {
        self.db.get(slot).cloned().unwrap_or(FlexValue::Float(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_alone(node: &dyn Node) -> FlexValue {
        let nodes: Vec<Box<dyn Node>> = Vec::new();
        let ctx = EvalCtx::new(&nodes);
        node.as_value().unwrap().eval("default", &ctx)
    }

    #[test]
    fn test_mul_defaults_to_identity() {
        let node = BinaryNode::new("m", BinOp::Mul);
        assert_eq!(eval_alone(&node), FlexValue::Vec4(Vec4::ONE));
    }

    #[test]
    fn test_add_defaults_to_identity() {
        let node = BinaryNode::new("a", BinOp::Add);
        // Documented reference behavior: both operands default to ones.
        assert_eq!(eval_alone(&node), FlexValue::Vec4(Vec4::ONE));
    }

    #[test]
    fn test_system_values_missing_key_reads_zero() {
        let mut sys = SystemValues::new("system");
        sys.upsert("T", FlexValue::Float(2.0));
        let nodes: Vec<Box<dyn Node>> = Vec::new();
        let ctx = EvalCtx::new(&nodes);
        assert_eq!(sys.as_value().unwrap().eval("T", &ctx), FlexValue::Float(2.0));
        assert_eq!(
            sys.as_value().unwrap().eval("missing", &ctx),
            FlexValue::Float(0.0)
        );
    }
}
