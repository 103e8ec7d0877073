//! Look-at camera node.

use std::any::Any;
use std::f32::consts::FRAC_PI_4;

use glam::{Mat4, Vec2, Vec3};
use serde_json::Value;

use crate::compile::{CompileContext, CompileResult, CompileScope};
use crate::error::CompileError;
use crate::flex::FlexValue;
use crate::node::{CameraSource, EvalCtx, LinkTarget, Node, ValueRef};

const NEAR: f32 = 0.1;
const FAR: f32 = 100.0;

/// Right-handed look-at camera with a fixed 45° vertical-FOV perspective
/// projection. All inputs are optional value links: `position` (default
/// (0, 0, -5)), `target` (default origin), and `aspect` (a 2-vector read
/// as width/height, default (1, 1)).
pub struct LookAtNode {
    id: String,
    position: Option<ValueRef>,
    target: Option<ValueRef>,
    aspect: Option<ValueRef>,
}

impl LookAtNode {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            position: None,
            target: None,
            aspect: None,
        }
    }
}

impl Node for LookAtNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn connect(&mut self, attr: &str, target: LinkTarget) -> Result<(), CompileError> {
        match attr {
            "position" => self.position = Some(target.value(attr)?),
            "target" => self.target = Some(target.value(attr)?),
            "aspect" => self.aspect = Some(target.value(attr)?),
            _ => {}
        }
        Ok(())
    }

    fn as_camera(&self) -> Option<&dyn CameraSource> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl CameraSource for LookAtNode {
    fn view_matrix(&self, ctx: &EvalCtx) -> Mat4 {
        let pos = ctx
            .value_or(self.position.as_ref(), FlexValue::Vec3(Vec3::new(0.0, 0.0, -5.0)))
            .as_vec3();
        let target = ctx
            .value_or(self.target.as_ref(), FlexValue::Vec3(Vec3::ZERO))
            .as_vec3();
        Mat4::look_at_rh(pos, target, Vec3::Y)
    }

    fn proj_matrix(&self, ctx: &EvalCtx) -> Mat4 {
        let ax = ctx
            .value_or(self.aspect.as_ref(), FlexValue::Vec2(Vec2::ONE))
            .as_vec2();
        Mat4::perspective_rh(FRAC_PI_4, ax.x / ax.y, NEAR, FAR)
    }
}

pub(crate) fn compile(
    ctx: &mut CompileContext,
    id: String,
    data: &Value,
) -> Result<CompileResult, CompileError> {
    let mut scope = CompileScope::new(ctx, id, data);
    scope.input("position", false)?;
    scope.input("target", false)?;
    scope.input("aspect", false)?;
    let node = LookAtNode::new(scope.id());
    Ok(scope.finish(Box::new(node)))
}
