//! Scene lifecycle: initial load and hot reload.
//!
//! [`SceneHost`] owns the running graph. A reload attempt builds and
//! GPU-initializes a complete new graph before anything becomes visible;
//! only on success does ownership swap, and the old graph is disposed
//! strictly after the swap. Any failure is caught here, logged, and
//! leaves the running graph untouched — this is the only boundary where
//! fatal compile errors are downgraded to recoverable ones.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use glam::Vec2;

use crate::compile::CompileContext;
use crate::flex::FlexValue;
use crate::gpu::RenderDevice;
use crate::graph::SceneGraph;

pub struct SceneHost {
    scene_path: PathBuf,
    data_dir: PathBuf,
    mtime: Option<SystemTime>,
    graph: SceneGraph,
}

impl SceneHost {
    /// Initial compile and GPU init. Failure here is a fatal startup
    /// error.
    pub fn load(
        scene_path: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        device: &mut dyn RenderDevice,
    ) -> anyhow::Result<Self> {
        let scene_path = scene_path.into();
        let data_dir = data_dir.into();
        let mtime = probe_mtime(&scene_path);
        let graph = build_and_init(&scene_path, &data_dir, device)?;
        Ok(Self {
            scene_path,
            data_dir,
            mtime,
            graph,
        })
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    /// Push the per-frame system values into the running graph.
    pub fn update(&mut self, t: f32, canvas_size: Vec2, pixel_aspect: Vec2) {
        self.graph.upsert("T", FlexValue::Float(t));
        self.graph.upsert("canvasSize", FlexValue::Vec2(canvas_size));
        self.graph.upsert("pixelAspect", FlexValue::Vec2(pixel_aspect));
    }

    /// Probe the scene file's modification time and reload on change.
    /// Returns true if a new graph was swapped in.
    pub fn poll(&mut self, device: &mut dyn RenderDevice) -> bool {
        let mtime = probe_mtime(&self.scene_path);
        if mtime.is_none() || mtime == self.mtime {
            return false;
        }
        self.mtime = mtime;

        log::info!("scene file changed, reloading [{}]", self.scene_path.display());
        match build_and_init(&self.scene_path, &self.data_dir, device) {
            Ok(new_graph) => {
                let mut old = std::mem::replace(&mut self.graph, new_graph);
                old.dispose(device);
                true
            }
            Err(e) => {
                log::error!("scene reload failed, keeping running graph: {e:#}");
                false
            }
        }
    }

    /// Release the running graph's GPU resources.
    pub fn shutdown(&mut self, device: &mut dyn RenderDevice) {
        self.graph.dispose(device);
    }
}

fn probe_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn build_and_init(
    scene_path: &Path,
    data_dir: &Path,
    device: &mut dyn RenderDevice,
) -> anyhow::Result<SceneGraph> {
    let text = std::fs::read_to_string(scene_path)
        .with_context(|| format!("reading scene file {}", scene_path.display()))?;
    let mut ctx = CompileContext::new(data_dir);
    let mut graph = SceneGraph::build(&text, &mut ctx)
        .with_context(|| format!("compiling scene {}", scene_path.display()))?;
    if let Err(e) = graph.init(device) {
        // Nodes that did init must not leak their resources.
        graph.dispose(device);
        return Err(e.context("initializing scene graph"));
    }
    Ok(graph)
}
