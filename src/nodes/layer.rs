//! The top-level layer node: one camera, one drawable, a background
//! color.

use std::any::Any;

use glam::Vec4;
use serde_json::Value;

use crate::compile::{CompileContext, CompileResult, CompileScope};
use crate::error::CompileError;
use crate::node::{
    CameraRef, DrawCtx, DrawableRef, EvalCtx, LayerSource, LinkTarget, Node, ValueRef,
};

pub struct LayerNode {
    id: String,
    camera: Option<CameraRef>,
    drawable: Option<DrawableRef>,
    color_link: Option<ValueRef>,
    color: Vec4,
}

impl LayerNode {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            camera: None,
            drawable: None,
            color_link: None,
            color: Vec4::ZERO,
        }
    }
}

impl Node for LayerNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn connect(&mut self, attr: &str, target: LinkTarget) -> Result<(), CompileError> {
        match attr {
            "camera" => self.camera = Some(target.camera(attr)?),
            "gl" => self.drawable = Some(target.drawable(attr)?),
            "color" => self.color_link = Some(target.value(attr)?),
            _ => {}
        }
        Ok(())
    }

    fn verify(&self) -> Result<(), CompileError> {
        if self.camera.is_none() {
            return Err(CompileError::Verify {
                id: self.id.clone(),
                msg: "no camera node connected".to_string(),
            });
        }
        if self.drawable.is_none() {
            return Err(CompileError::Verify {
                id: self.id.clone(),
                msg: "no drawable node connected".to_string(),
            });
        }
        Ok(())
    }

    fn as_layer(&self) -> Option<&dyn LayerSource> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl LayerSource for LayerNode {
    fn color(&self, ctx: &EvalCtx) -> Vec4 {
        match &self.color_link {
            Some(link) => ctx.value(link).as_vec4(),
            None => self.color,
        }
    }

    fn draw(&self, ctx: &mut DrawCtx) {
        let (Some(camera), Some(drawable)) = (&self.camera, &self.drawable) else {
            return;
        };
        let view = ctx.eval().camera_view(camera);
        let proj = ctx.eval().camera_proj(camera);
        ctx.draw(drawable, view, proj);
    }
}

pub(crate) fn compile(
    ctx: &mut CompileContext,
    id: String,
    data: &Value,
) -> Result<CompileResult, CompileError> {
    let mut scope = CompileScope::new(ctx, id, data);
    scope.input("camera", true)?;
    scope.input("gl", true)?;
    scope.input("color", false)?;
    let node = LayerNode::new(scope.id());
    Ok(scope.finish(Box::new(node)))
}
