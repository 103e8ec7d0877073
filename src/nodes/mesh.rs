//! The mesh drawable: OBJ geometry baked into a device vertex buffer.
//!
//! Geometry loads synchronously at compile time so a broken path fails
//! the whole compile; the GPU buffer is created at init and released at
//! dispose, both owned exclusively by this node.

use std::any::Any;
use std::path::{Path, PathBuf};

use glam::Mat4;
use serde_json::Value;

use crate::compile::{CompileContext, CompileResult, CompileScope};
use crate::error::CompileError;
use crate::gpu::{MeshHandle, RenderDevice, Vertex};
use crate::node::{DrawCtx, Drawable, Node};
use crate::obj;

/// Uniform position scale applied at bake time unless the payload
/// overrides it.
const DEFAULT_SCALE: f32 = 0.025;

pub struct MeshNode {
    id: String,
    vertices: Vec<Vertex>,
    handle: Option<MeshHandle>,
}

impl MeshNode {
    fn new(id: impl Into<String>, vertices: Vec<Vertex>) -> Self {
        Self {
            id: id.into(),
            vertices,
            handle: None,
        }
    }
}

impl Node for MeshNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn init(&mut self, device: &mut dyn RenderDevice) -> anyhow::Result<()> {
        self.handle = Some(device.upload_mesh(&self.vertices)?);
        Ok(())
    }

    fn dispose(&mut self, device: &mut dyn RenderDevice) {
        if let Some(handle) = self.handle.take() {
            device.release_mesh(handle);
        }
    }

    fn as_drawable(&self) -> Option<&dyn Drawable> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drawable for MeshNode {
    fn draw(&self, ctx: &mut DrawCtx, view: Mat4, proj: Mat4) {
        if let Some(handle) = self.handle {
            ctx.gfx.draw_mesh(handle, view, proj);
        }
    }
}

pub(crate) fn compile(
    ctx: &mut CompileContext,
    id: String,
    data: &Value,
) -> Result<CompileResult, CompileError> {
    let scope = CompileScope::new(ctx, id, data);
    let src = scope.require_str("src")?;
    let scale = scope.opt_f32("scale")?.unwrap_or(DEFAULT_SCALE);

    let path = if Path::new(src).is_absolute() {
        PathBuf::from(src)
    } else {
        scope.data_dir().join(src)
    };
    log::info!("loading mesh [{}]", path.display());
    let (mesh, stats) = obj::load(&path)?;

    let took_ms = stats.elapsed.as_secs_f64() * 1000.0;
    log::info!(
        "perf: {took_ms:.1} ms, {:.1} MB/sec",
        stats.size_in_bytes as f64 / stats.elapsed.as_secs_f64().max(1e-9) / 1e6,
    );
    log::info!(
        "counts: position={} normal={} uv={} prims={} maxDegree={}",
        mesh.position_count(),
        mesh.normal_count(),
        mesh.texcoord_count(),
        mesh.primitive_count(),
        mesh.max_degree(),
    );
    for name in mesh.materials() {
        log::debug!("material {name:?}");
    }
    for name in mesh.groups() {
        log::debug!("group {name:?}");
    }

    let node = MeshNode::new(scope.id(), mesh.make_buffer(scale));
    Ok(scope.finish(Box::new(node)))
}
