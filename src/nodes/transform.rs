//! Transform drawables: rotate, modify (rotate/translate/scale over many
//! children), and multiply (accumulating instancer).
//!
//! Matrix conventions are column-vector glam. A transform composed
//! "before the incoming view matrix" appears on its right:
//! `view * xform * point`.

use std::any::Any;

use glam::{Mat4, Vec3};
use serde_json::Value;

use crate::compile::{CompileContext, CompileResult, CompileScope};
use crate::error::CompileError;
use crate::flex::FlexValue;
use crate::node::{DrawCtx, Drawable, DrawableRef, LinkTarget, Node, ValueRef};

/// Euler XYZ rotation: X applied first, then Y, then Z.
pub(crate) fn euler_xyz(r: Vec3) -> Mat4 {
    Mat4::from_rotation_z(r.z) * Mat4::from_rotation_y(r.y) * Mat4::from_rotation_x(r.x)
}

/// Applies a single Euler rotation ahead of its child's transform.
pub struct RotateNode {
    id: String,
    child: Option<DrawableRef>,
    amount: Option<ValueRef>,
}

impl RotateNode {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            child: None,
            amount: None,
        }
    }
}

impl Node for RotateNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn connect(&mut self, attr: &str, target: LinkTarget) -> Result<(), CompileError> {
        match attr {
            "gl" => self.child = Some(target.drawable(attr)?),
            "amount" => self.amount = Some(target.value(attr)?),
            _ => {}
        }
        Ok(())
    }

    fn verify(&self) -> Result<(), CompileError> {
        if self.child.is_none() {
            return Err(CompileError::Verify {
                id: self.id.clone(),
                msg: "no drawable node connected".to_string(),
            });
        }
        Ok(())
    }

    fn as_drawable(&self) -> Option<&dyn Drawable> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drawable for RotateNode {
    fn draw(&self, ctx: &mut DrawCtx, view: Mat4, proj: Mat4) {
        let Some(child) = &self.child else { return };
        let rot = ctx
            .eval()
            .value_or(self.amount.as_ref(), FlexValue::Vec3(Vec3::ZERO))
            .as_vec3();
        ctx.draw(child, view * euler_xyz(rot), proj);
    }
}

pub(crate) fn compile_rotate(
    ctx: &mut CompileContext,
    id: String,
    data: &Value,
) -> Result<CompileResult, CompileError> {
    let mut scope = CompileScope::new(ctx, id, data);
    scope.input("amount", false)?;
    scope.input("gl", true)?;
    let node = RotateNode::new(scope.id());
    Ok(scope.finish(Box::new(node)))
}

/// Optional rotate/translate/scale values composed into the incoming
/// matrix, applied identically to every child.
pub struct ModifyNode {
    id: String,
    children: Vec<DrawableRef>,
    rotate: Option<ValueRef>,
    translate: Option<ValueRef>,
    scale: Option<ValueRef>,
}

impl ModifyNode {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
            rotate: None,
            translate: None,
            scale: None,
        }
    }
}

impl Node for ModifyNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn connect(&mut self, attr: &str, target: LinkTarget) -> Result<(), CompileError> {
        match attr {
            "gl" => self.children.push(target.drawable(attr)?),
            "rotate" => self.rotate = Some(target.value(attr)?),
            "translate" => self.translate = Some(target.value(attr)?),
            "scale" => self.scale = Some(target.value(attr)?),
            _ => {}
        }
        Ok(())
    }

    fn verify(&self) -> Result<(), CompileError> {
        if self.children.is_empty() {
            return Err(CompileError::Verify {
                id: self.id.clone(),
                msg: "no drawable node connected".to_string(),
            });
        }
        Ok(())
    }

    fn as_drawable(&self) -> Option<&dyn Drawable> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drawable for ModifyNode {
    fn draw(&self, ctx: &mut DrawCtx, view: Mat4, proj: Mat4) {
        let eval = ctx.eval();
        let mut m = view;
        if let Some(rotate) = &self.rotate {
            m *= euler_xyz(eval.value(rotate).as_vec3());
        }
        if let Some(translate) = &self.translate {
            m *= Mat4::from_translation(eval.value(translate).as_vec3());
        }
        if let Some(scale) = &self.scale {
            m *= Mat4::from_scale(eval.value(scale).as_vec3());
        }
        for child in &self.children {
            ctx.draw(child, m, proj);
        }
    }
}

pub(crate) fn compile_modify(
    ctx: &mut CompileContext,
    id: String,
    data: &Value,
) -> Result<CompileResult, CompileError> {
    let mut scope = CompileScope::new(ctx, id, data);
    scope.input("rotate", false)?;
    scope.input("translate", false)?;
    scope.input("scale", false)?;
    scope.input_many("gl", true)?;
    let node = ModifyNode::new(scope.id());
    Ok(scope.finish(Box::new(node)))
}

/// Instancing node: draws its child `many` times, instance i carrying
/// i×rotate and i×translate accumulated from zero.
pub struct MultiplyNode {
    id: String,
    child: Option<DrawableRef>,
    many: Option<ValueRef>,
    rotate: Option<ValueRef>,
    translate: Option<ValueRef>,
}

impl MultiplyNode {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            child: None,
            many: None,
            rotate: None,
            translate: None,
        }
    }
}

impl Node for MultiplyNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn connect(&mut self, attr: &str, target: LinkTarget) -> Result<(), CompileError> {
        match attr {
            "gl" => self.child = Some(target.drawable(attr)?),
            "many" => self.many = Some(target.value(attr)?),
            "rotate" => self.rotate = Some(target.value(attr)?),
            "translate" => self.translate = Some(target.value(attr)?),
            _ => {}
        }
        Ok(())
    }

    fn verify(&self) -> Result<(), CompileError> {
        if self.child.is_none() {
            return Err(CompileError::Verify {
                id: self.id.clone(),
                msg: "no drawable node connected".to_string(),
            });
        }
        Ok(())
    }

    fn as_drawable(&self) -> Option<&dyn Drawable> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drawable for MultiplyNode {
    fn draw(&self, ctx: &mut DrawCtx, view: Mat4, proj: Mat4) {
        let Some(child) = &self.child else { return };
        let eval = ctx.eval();
        let many = eval
            .value_or(self.many.as_ref(), FlexValue::Float(1.0))
            .as_float() as i32;
        let rotate_amt = eval
            .value_or(self.rotate.as_ref(), FlexValue::Vec3(Vec3::ZERO))
            .as_vec3();
        let translate_amt = eval
            .value_or(self.translate.as_ref(), FlexValue::Vec3(Vec3::ZERO))
            .as_vec3();

        let mut rotate = Vec3::ZERO;
        let mut translate = Vec3::ZERO;
        for _ in 0..many {
            let m = view * Mat4::from_translation(translate) * euler_xyz(rotate);
            ctx.draw(child, m, proj);
            rotate += rotate_amt;
            translate += translate_amt;
        }
    }
}

pub(crate) fn compile_multiply(
    ctx: &mut CompileContext,
    id: String,
    data: &Value,
) -> Result<CompileResult, CompileError> {
    let mut scope = CompileScope::new(ctx, id, data);
    scope.input("many", false)?;
    scope.input("rotate", false)?;
    scope.input("translate", false)?;
    scope.input("gl", true)?;
    let node = MultiplyNode::new(scope.id());
    Ok(scope.finish(Box::new(node)))
}
