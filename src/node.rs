//! The polymorphic node model.
//!
//! A compiled scene is a slab of boxed [`Node`]s addressed by index.
//! Each node has a string identity fixed at construction, a lifecycle
//! (connect, verify, init, dispose) and an optional set of capabilities
//! exposed through accessor methods: value production, camera matrices,
//! drawing, and top-level layer composition.
//!
//! Connections are established exactly once per attribute during
//! linking. A [`LinkTarget`] carries the resolved index plus the
//! target's capability set, so the capability check happens fail-fast at
//! connect time; evaluation and drawing then recurse through plain
//! indices with no shared mutability.

use std::any::Any;

use glam::{Mat4, Vec4};

use crate::error::CompileError;
use crate::flex::FlexValue;
use crate::gpu::{RenderContext, RenderDevice};

/// Slot name used when a link target does not name one.
pub const DEFAULT_SLOT: &str = "default";

/// A scene-graph entity.
pub trait Node: Any {
    /// Unique identity within the graph; immutable after construction.
    fn id(&self) -> &str;

    /// Wire one named attribute to a resolved target. Called exactly
    /// once per link produced at compile time. Unknown attributes are
    /// ignored; capability mismatches are fatal.
    fn connect(&mut self, attr: &str, target: LinkTarget) -> Result<(), CompileError> {
        let _ = (attr, target);
        Ok(())
    }

    /// Post-link sanity check.
    fn verify(&self) -> Result<(), CompileError> {
        Ok(())
    }

    /// Allocate GPU-side resources. Called once per graph instance.
    fn init(&mut self, device: &mut dyn RenderDevice) -> anyhow::Result<()> {
        let _ = device;
        Ok(())
    }

    /// Release everything `init` created.
    fn dispose(&mut self, device: &mut dyn RenderDevice) {
        let _ = device;
    }

    fn as_value(&self) -> Option<&dyn ValueSource> {
        None
    }

    fn as_camera(&self) -> Option<&dyn CameraSource> {
        None
    }

    fn as_drawable(&self) -> Option<&dyn Drawable> {
        None
    }

    fn as_layer(&self) -> Option<&dyn LayerSource> {
        None
    }

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Produces a [`FlexValue`] for a named output slot.
pub trait ValueSource {
    fn eval(&self, slot: &str, ctx: &EvalCtx) -> FlexValue;
}

/// Supplies view and projection matrices.
pub trait CameraSource {
    fn view_matrix(&self, ctx: &EvalCtx) -> Mat4;
    fn proj_matrix(&self, ctx: &EvalCtx) -> Mat4;
}

/// Issues draw commands given transform matrices.
pub trait Drawable {
    fn draw(&self, ctx: &mut DrawCtx, view: Mat4, proj: Mat4);
}

/// Top-level renderable with a background color.
pub trait LayerSource {
    fn color(&self, ctx: &EvalCtx) -> Vec4;
    fn draw(&self, ctx: &mut DrawCtx);
}

/// Capability set of a node, computed by the linker from its accessors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub value: bool,
    pub camera: bool,
    pub drawable: bool,
    pub layer: bool,
}

impl Capabilities {
    pub fn of(node: &dyn Node) -> Self {
        Self {
            value: node.as_value().is_some(),
            camera: node.as_camera().is_some(),
            drawable: node.as_drawable().is_some(),
            layer: node.as_layer().is_some(),
        }
    }
}

/// A resolved connection to a value-producing node and output slot.
#[derive(Debug, Clone)]
pub struct ValueRef {
    pub index: usize,
    pub slot: String,
}

/// A resolved connection to a camera node.
#[derive(Debug, Clone, Copy)]
pub struct CameraRef {
    pub index: usize,
}

/// A resolved connection to a drawable node.
#[derive(Debug, Clone, Copy)]
pub struct DrawableRef {
    pub index: usize,
}

/// A link target handed to [`Node::connect`] by the linker: the resolved
/// node index, the requested slot, and the target's capability set for
/// fail-fast type checking.
#[derive(Debug, Clone)]
pub struct LinkTarget {
    pub index: usize,
    pub id: String,
    pub slot: String,
    pub caps: Capabilities,
}

impl LinkTarget {
    fn bad_link(&self, attr: &str, expected: &'static str) -> CompileError {
        CompileError::BadLink {
            attr: attr.to_string(),
            target: self.id.clone(),
            expected,
        }
    }

    /// The target as a value producer, or a bad-link error.
    pub fn value(self, attr: &str) -> Result<ValueRef, CompileError> {
        if self.caps.value {
            Ok(ValueRef {
                index: self.index,
                slot: self.slot,
            })
        } else {
            Err(self.bad_link(attr, "value"))
        }
    }

    /// The target as a camera, or a bad-link error.
    pub fn camera(self, attr: &str) -> Result<CameraRef, CompileError> {
        if self.caps.camera {
            Ok(CameraRef { index: self.index })
        } else {
            Err(self.bad_link(attr, "camera"))
        }
    }

    /// The target as a drawable, or a bad-link error.
    pub fn drawable(self, attr: &str) -> Result<DrawableRef, CompileError> {
        if self.caps.drawable {
            Ok(DrawableRef { index: self.index })
        } else {
            Err(self.bad_link(attr, "drawable"))
        }
    }
}

/// Evaluation context: read access to the graph's node slab.
#[derive(Clone, Copy)]
pub struct EvalCtx<'a> {
    nodes: &'a [Box<dyn Node>],
}

impl<'a> EvalCtx<'a> {
    pub fn new(nodes: &'a [Box<dyn Node>]) -> Self {
        Self { nodes }
    }

    /// Evaluate a connected value reference. The capability was checked
    /// at link time, so a missing producer here cannot happen through
    /// the public API; it falls back to zero rather than panicking.
    pub fn value(&self, r: &ValueRef) -> FlexValue {
        match self.nodes.get(r.index).and_then(|n| n.as_value()) {
            Some(v) => v.eval(&r.slot, self),
            None => FlexValue::Float(0.0),
        }
    }

    /// Evaluate an optional input, falling back to `default` when it was
    /// never linked.
    pub fn value_or(&self, r: Option<&ValueRef>, default: FlexValue) -> FlexValue {
        match r {
            Some(r) => self.value(r),
            None => default,
        }
    }

    pub fn camera_view(&self, r: &CameraRef) -> Mat4 {
        match self.nodes.get(r.index).and_then(|n| n.as_camera()) {
            Some(c) => c.view_matrix(self),
            None => Mat4::IDENTITY,
        }
    }

    pub fn camera_proj(&self, r: &CameraRef) -> Mat4 {
        match self.nodes.get(r.index).and_then(|n| n.as_camera()) {
            Some(c) => c.proj_matrix(self),
            None => Mat4::IDENTITY,
        }
    }
}

/// Draw context: read access to the node slab plus the external render
/// collaborator.
pub struct DrawCtx<'a> {
    nodes: &'a [Box<dyn Node>],
    pub gfx: &'a mut dyn RenderContext,
}

impl<'a> DrawCtx<'a> {
    pub fn new(nodes: &'a [Box<dyn Node>], gfx: &'a mut dyn RenderContext) -> Self {
        Self { nodes, gfx }
    }

    pub fn eval(&self) -> EvalCtx<'a> {
        EvalCtx { nodes: self.nodes }
    }

    /// Recurse into a connected drawable.
    pub fn draw(&mut self, r: &DrawableRef, view: Mat4, proj: Mat4) {
        let nodes = self.nodes;
        if let Some(d) = nodes.get(r.index).and_then(|n| n.as_drawable()) {
            d.draw(self, view, proj);
        }
    }
}
