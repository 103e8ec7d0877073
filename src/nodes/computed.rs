//! The `computed` node: packs 1–4 expression-driven scalars into a
//! value.
//!
//! The `expr` payload splits on top-level commas into component
//! sub-expressions, each compiled by [`crate::expr`]. Every variable
//! referenced anywhere in the text becomes a required named input, so a
//! fully linked node can never hit an unresolved variable at frame time.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};

use glam::{Vec2, Vec3, Vec4};
use serde_json::Value;

use crate::compile::{CompileContext, CompileResult, CompileScope};
use crate::error::CompileError;
use crate::expr::{self, Ast};
use crate::flex::FlexValue;
use crate::node::{EvalCtx, LinkTarget, Node, ValueRef, ValueSource};

pub struct ComputedNode {
    id: String,
    components: Vec<Ast>,
    /// Variable name → linked input, in declaration order.
    inputs: Vec<(String, Option<ValueRef>)>,
}

impl ComputedNode {
    fn new(id: impl Into<String>, components: Vec<Ast>, names: BTreeSet<String>) -> Self {
        Self {
            id: id.into(),
            components,
            inputs: names.into_iter().map(|n| (n, None)).collect(),
        }
    }
}

impl Node for ComputedNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn connect(&mut self, attr: &str, target: LinkTarget) -> Result<(), CompileError> {
        if let Some(slot) = self.inputs.iter_mut().find(|(name, _)| name == attr) {
            slot.1 = Some(target.value(attr)?);
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

impl ValueSource for ComputedNode {
    fn eval(&self, _slot: &str, ctx: &EvalCtx) -> FlexValue {
        let mut vars = HashMap::with_capacity(self.inputs.len());
        for (name, input) in &self.inputs {
            let value = ctx.value_or(input.as_ref(), FlexValue::Float(0.0));
            vars.insert(name.clone(), f64::from(value.as_float()));
        }
        let mut out = [0.0f32; 4];
        for (i, component) in self.components.iter().enumerate() {
            match component.eval(&vars) {
                Ok(v) => out[i] = v as f32,
                Err(e) => log::error!("computed node {:?}: {e}", self.id),
            }
        }
        match self.components.len() {
            1 => FlexValue::Float(out[0]),
            2 => FlexValue::Vec2(Vec2::new(out[0], out[1])),
            3 => FlexValue::Vec3(Vec3::new(out[0], out[1], out[2])),
            _ => FlexValue::Vec4(Vec4::new(out[0], out[1], out[2], out[3])),
        }
    }
}

pub(crate) fn compile(
    ctx: &mut CompileContext,
    id: String,
    data: &Value,
) -> Result<CompileResult, CompileError> {
    let mut scope = CompileScope::new(ctx, id, data);
    let source = scope.require_str("expr")?.to_string();

    let pieces = expr::split_top_level(&source)?;
    if pieces.len() > 4 {
        return Err(CompileError::TooManyComponents(pieces.len()));
    }
    let components = pieces
        .into_iter()
        .map(expr::compile)
        .collect::<Result<Vec<_>, _>>()?;

    let mut names = BTreeSet::new();
    for component in &components {
        component.variables(&mut names);
    }
    for name in &names {
        scope.input(name, true)?;
    }

    let node = ComputedNode::new(scope.id(), components, names);
    Ok(scope.finish(Box::new(node)))
}
