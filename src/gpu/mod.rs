//! GPU-facing surface of the scene graph.
//!
//! The node model only ever sees the two small traits defined here: a
//! [`RenderDevice`] that owns device-resident vertex data behind opaque
//! handles, and a [`RenderContext`] that accepts draw commands. The wgpu
//! implementation lives in [`renderer`]; tests substitute recording
//! fakes.

pub mod mesh;
pub mod pipeline;
pub mod renderer;

pub use mesh::Vertex;

use glam::Mat4;

/// Opaque handle to device-resident vertex data. Exclusively owned by
/// the node that created it and released only by that node's dispose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u64);

/// Resource side of the render collaborator.
pub trait RenderDevice {
    fn upload_mesh(&mut self, vertices: &[Vertex]) -> anyhow::Result<MeshHandle>;
    fn release_mesh(&mut self, handle: MeshHandle);
}

/// Draw side of the render collaborator.
pub trait RenderContext {
    /// Issue one triangle-list draw of the whole mesh.
    fn draw_mesh(&mut self, mesh: MeshHandle, view: Mat4, proj: Mat4);
}

/// One recorded draw command.
#[derive(Debug, Clone, Copy)]
pub struct DrawCmd {
    pub mesh: MeshHandle,
    pub view: Mat4,
    pub proj: Mat4,
}

/// A [`RenderContext`] that records draw commands for later replay by
/// the renderer.
#[derive(Debug, Default)]
pub struct DrawList {
    pub items: Vec<DrawCmd>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl RenderContext for DrawList {
    fn draw_mesh(&mut self, mesh: MeshHandle, view: Mat4, proj: Mat4) {
        self.items.push(DrawCmd { mesh, view, proj });
    }
}
