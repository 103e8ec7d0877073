//! Streaming OBJ mesh parser and the mesh accumulator.
//!
//! [`parse_obj`] walks one contiguous byte buffer with the span-cursor
//! primitives from [`crate::text`] and reports structure through the
//! [`ObjSink`] callback trait; it never buffers the file as discrete
//! lines. [`ObjMesh`] is the sink used by the scene's mesh node: it
//! accumulates attributes, fan-triangulates faces, and bakes the final
//! interleaved vertex buffer with each primitive's material color.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use glam::{Vec2, Vec3};

use crate::error::CompileError;
use crate::gpu::Vertex;
use crate::mtl::{self, MaterialDb, Mtl};
use crate::text;

/// Callback events produced by [`parse_obj`].
///
/// Face events arrive as `begin_face`, then one `index_*` triple per
/// referenced vertex (texcoord/normal only when present in the source),
/// then `end_face`. Indices are passed raw: positive 1-based, negative
/// relative-from-end.
pub trait ObjSink {
    fn mtl_lib(&mut self, name: &str);
    fn use_mtl(&mut self, name: &str);
    fn group(&mut self, name: &str);
    fn position(&mut self, x: f32, y: f32, z: f32);
    fn normal(&mut self, x: f32, y: f32, z: f32);
    fn texcoord(&mut self, u: f32, v: f32);
    fn begin_face(&mut self);
    fn index_position(&mut self, idx: i32);
    fn index_texcoord(&mut self, idx: i32);
    fn index_normal(&mut self, idx: i32);
    fn end_face(&mut self);
    fn error(&mut self, line: usize, msg: &str);
    fn end(&mut self);
}

fn consume_float3(data: &mut &[u8]) -> Option<(f32, f32, f32)> {
    let x = text::consume_f32(data)?;
    text::ltrim(data);
    let y = text::consume_f32(data)?;
    text::ltrim(data);
    let z = text::consume_f32(data)?;
    Some((x, y, z))
}

fn consume_float2(data: &mut &[u8]) -> Option<(f32, f32)> {
    let x = text::consume_f32(data)?;
    text::ltrim(data);
    let y = text::consume_f32(data)?;
    Some((x, y))
}

// Face vertex references come in four shapes:
//   "f n n n"  "f n/n n/n"  "f n//n n//n"  "f n/n/n n/n/n"
fn parse_face(mut data: &[u8], sink: &mut dyn ObjSink) {
    sink.begin_face();
    while !data.is_empty() {
        let mut word = text::pop_word(&mut data);
        let mut col = 0;
        while !word.is_empty() {
            if let Some(idx) = text::consume_i32(&mut word) {
                match col {
                    0 => sink.index_position(idx),
                    1 => sink.index_texcoord(idx),
                    2 => sink.index_normal(idx),
                    _ => {}
                }
            }
            text::consume_byte(&mut word);
            col += 1;
        }
    }
    sink.end_face();
}

/// Stream-parse OBJ text, reporting events to `sink`.
///
/// Unrecognized lines and malformed numeric fields are reported through
/// `sink.error` and parsing continues; a bad numeric field aborts only
/// the rest of its own line.
pub fn parse_obj(mut data: &[u8], sink: &mut dyn ObjSink) {
    let mut line_num = 0;
    while !data.is_empty() {
        let mut line = text::pop_line(&mut data);
        text::strip_comment(&mut line);
        text::ltrim(&mut line);
        if line.is_empty() {
            line_num += 1;
            continue;
        }
        if text::consume_prefix(&mut line, b"f ") {
            text::ltrim(&mut line);
            parse_face(line, sink);
        } else if text::consume_prefix(&mut line, b"v ") {
            text::ltrim(&mut line);
            match consume_float3(&mut line) {
                Some((x, y, z)) => sink.position(x, y, z),
                None => sink.error(line_num, "bad float3 in position"),
            }
        } else if text::consume_prefix(&mut line, b"vn ") {
            text::ltrim(&mut line);
            match consume_float3(&mut line) {
                Some((x, y, z)) => sink.normal(x, y, z),
                None => sink.error(line_num, "bad float3 in normal"),
            }
        } else if text::consume_prefix(&mut line, b"vt ") {
            text::ltrim(&mut line);
            match consume_float2(&mut line) {
                Some((u, v)) => sink.texcoord(u, v),
                None => sink.error(line_num, "bad float2 in texture"),
            }
        } else if text::consume_prefix(&mut line, b"mtllib ") {
            text::ltrim(&mut line);
            sink.mtl_lib(&text::decode(line));
        } else if text::consume_prefix(&mut line, b"usemtl ") {
            text::ltrim(&mut line);
            sink.use_mtl(&text::decode(line));
        } else if text::consume_prefix(&mut line, b"g ") {
            text::ltrim(&mut line);
            sink.group(&text::decode(line));
        } else {
            sink.error(line_num, &format!("unknown command {}", text::decode(line)));
        }
        line_num += 1;
    }
    sink.end();
}

/// Accumulated mesh model: attribute arrays plus a fan-expanded
/// primitive index list with a material and group index per primitive.
#[derive(Debug, Default)]
pub struct ObjMesh {
    dir: PathBuf,

    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    texcoords: Vec<Vec2>,

    prim_position: Vec<i32>,
    prim_normal: Vec<i32>,
    prim_texcoord: Vec<i32>,
    prim_material: Vec<usize>,
    prim_group: Vec<usize>,

    mtl: Option<MaterialDb>,

    material_names: Vec<String>,
    material_ids: HashMap<String, usize>,
    cur_material: usize,

    group_names: Vec<String>,
    group_ids: HashMap<String, usize>,
    cur_group: usize,

    face_position: Vec<i32>,
    face_normal: Vec<i32>,
    face_texcoord: Vec<i32>,
    max_degree: usize,
}

impl ObjMesh {
    /// `dir` is the directory `mtllib` references resolve against.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn normal_count(&self) -> usize {
        self.normals.len()
    }

    pub fn texcoord_count(&self) -> usize {
        self.texcoords.len()
    }

    /// Number of triangles after fan expansion.
    pub fn primitive_count(&self) -> usize {
        self.prim_position.len() / 3
    }

    /// Largest face degree seen in the source.
    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    pub fn materials(&self) -> impl Iterator<Item = &str> {
        self.material_names.iter().map(|s| s.as_str())
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.group_names.iter().map(|s| s.as_str())
    }

    fn material_color(&self, prim: usize) -> Vec3 {
        let fallback = Mtl::default();
        self.prim_material
            .get(prim)
            .and_then(|&m| self.material_names.get(m))
            .and_then(|name| self.mtl.as_ref()?.find(name))
            .unwrap_or(&fallback)
            .kd
    }

    /// Bake the flat interleaved `(position, color)` vertex buffer.
    ///
    /// Positions are uniformly scaled by `scale` and each primitive's
    /// material diffuse color is baked into its three vertices. Vertex
    /// order is reversed (2,1,0) relative to storage order.
    pub fn make_buffer(&self, scale: f32) -> Vec<Vertex> {
        let n_prims = self.primitive_count();
        let mut out = Vec::with_capacity(n_prims * 3);
        for pi in 0..n_prims {
            let kd = self.material_color(pi);
            for vi in 0..3 {
                let idx = self.prim_position[pi * 3 + (2 - vi)];
                let pos = usize::try_from(idx)
                    .ok()
                    .and_then(|i| self.positions.get(i))
                    .copied()
                    .unwrap_or(Vec3::ZERO);
                out.push(Vertex {
                    position: (pos * scale).to_array(),
                    color: kd.to_array(),
                });
            }
        }
        out
    }

    fn resolve(idx: i32, count: usize) -> i32 {
        if idx < 0 {
            count as i32 + idx
        } else {
            idx - 1
        }
    }
}

impl ObjSink for ObjMesh {
    fn mtl_lib(&mut self, name: &str) {
        let path = if Path::new(name).is_absolute() {
            PathBuf::from(name)
        } else {
            self.dir.join(name)
        };
        match mtl::load(&path) {
            Ok((db, _)) => self.mtl = Some(db),
            Err(e) => log::warn!("failed to load material library {path:?}: {e}"),
        }
    }

    fn use_mtl(&mut self, name: &str) {
        let next = self.material_names.len();
        self.cur_material = *self.material_ids.entry(name.to_string()).or_insert_with(|| {
            self.material_names.push(name.to_string());
            next
        });
    }

    fn group(&mut self, name: &str) {
        let next = self.group_names.len();
        self.cur_group = *self.group_ids.entry(name.to_string()).or_insert_with(|| {
            self.group_names.push(name.to_string());
            next
        });
    }

    fn position(&mut self, x: f32, y: f32, z: f32) {
        self.positions.push(Vec3::new(x, y, z));
    }

    fn normal(&mut self, x: f32, y: f32, z: f32) {
        self.normals.push(Vec3::new(x, y, z));
    }

    fn texcoord(&mut self, u: f32, v: f32) {
        self.texcoords.push(Vec2::new(u, v));
    }

    fn begin_face(&mut self) {
        self.face_position.clear();
        self.face_normal.clear();
        self.face_texcoord.clear();
    }

    fn index_position(&mut self, idx: i32) {
        let idx = Self::resolve(idx, self.positions.len());
        self.face_position.push(idx);
    }

    fn index_normal(&mut self, idx: i32) {
        let idx = Self::resolve(idx, self.normals.len());
        self.face_normal.push(idx);
    }

    fn index_texcoord(&mut self, idx: i32) {
        let idx = Self::resolve(idx, self.texcoords.len());
        self.face_texcoord.push(idx);
    }

    // Fan-triangulate around vertex 0: (0, j, j+1) for j in 1..degree-1,
    // tagging every emitted primitive with the active material and group.
    fn end_face(&mut self) {
        let degree = self.face_position.len();
        self.max_degree = self.max_degree.max(degree);
        for j in 1..degree.saturating_sub(1) {
            self.prim_material.push(self.cur_material);
            self.prim_group.push(self.cur_group);
            self.prim_position.push(self.face_position[0]);
            if !self.face_normal.is_empty() {
                self.prim_normal.push(self.face_normal[0]);
            }
            if !self.face_texcoord.is_empty() {
                self.prim_texcoord.push(self.face_texcoord[0]);
            }
            for k in j..j + 2 {
                self.prim_position.push(self.face_position[k]);
                if let Some(&n) = self.face_normal.get(k) {
                    self.prim_normal.push(n);
                }
                if let Some(&t) = self.face_texcoord.get(k) {
                    self.prim_texcoord.push(t);
                }
            }
        }
    }

    fn error(&mut self, line: usize, msg: &str) {
        log::warn!("obj parse error: line={line} msg={msg}");
    }

    fn end(&mut self) {}
}

/// Read and parse an OBJ file, resolving `mtllib` references relative to
/// the file's own directory.
pub fn load(path: &Path) -> Result<(ObjMesh, mtl::LoadStats), CompileError> {
    let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let bytes = std::fs::read(path)?;
    let timer = Instant::now();
    let mut mesh = ObjMesh::new(dir);
    parse_obj(&bytes, &mut mesh);
    Ok((
        mesh,
        mtl::LoadStats {
            elapsed: timer.elapsed(),
            size_in_bytes: bytes.len(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &[u8]) -> ObjMesh {
        let mut mesh = ObjMesh::new(".");
        parse_obj(src, &mut mesh);
        mesh
    }

    #[test]
    fn test_quad_fan_triangulates_to_two_triangles() {
        let mesh = parse(b"v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n");
        assert_eq!(mesh.primitive_count(), 2);
        assert_eq!(mesh.prim_position, [0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.max_degree(), 4);
    }

    #[test]
    fn test_negative_indices_are_relative_from_end() {
        let mesh = parse(b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n");
        assert_eq!(mesh.prim_position, [0, 1, 2]);
    }

    #[test]
    fn test_face_reference_shapes() {
        let mesh = parse(
            b"v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 0 1\nvn 0 0 1\nf 1/1/1 2/2/1 3/3/1\n",
        );
        assert_eq!(mesh.prim_position, [0, 1, 2]);
        assert_eq!(mesh.prim_texcoord, [0, 1, 2]);
        assert_eq!(mesh.prim_normal, [0, 0, 0]);

        // "n//n" skips the texcoord column.
        let mesh = parse(b"v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1\n");
        assert_eq!(mesh.prim_normal, [0, 0, 0]);
        assert!(mesh.prim_texcoord.is_empty());
    }

    #[test]
    fn test_bad_line_continues() {
        let mesh = parse(b"v 0 0 0\nv nope 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n");
        // The malformed position line was dropped, the rest parsed.
        assert_eq!(mesh.position_count(), 3);
        assert_eq!(mesh.primitive_count(), 1);
    }

    #[test]
    fn test_groups_and_materials_are_interned() {
        let mesh = parse(
            b"v 0 0 0\nv 1 0 0\nv 0 1 0\ng a\nusemtl m1\nf 1 2 3\ng b\nusemtl m2\nf 1 2 3\nusemtl m1\nf 1 2 3\n",
        );
        assert_eq!(mesh.materials().collect::<Vec<_>>(), ["m1", "m2"]);
        assert_eq!(mesh.groups().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(mesh.prim_material, [0, 1, 0]);
        assert_eq!(mesh.prim_group, [0, 1, 1]);
    }

    #[test]
    fn test_make_buffer_scales_and_reverses_winding() {
        let mesh = parse(b"v 1 0 0\nv 0 1 0\nv 0 0 1\nf 1 2 3\n");
        let buffer = mesh.make_buffer(0.5);
        assert_eq!(buffer.len(), 3);
        // Storage order 0,1,2 bakes as 2,1,0.
        assert_eq!(buffer[0].position, [0.0, 0.0, 0.5]);
        assert_eq!(buffer[1].position, [0.0, 0.5, 0.0]);
        assert_eq!(buffer[2].position, [0.5, 0.0, 0.0]);
        // No material library: default diffuse.
        assert_eq!(buffer[0].color, [0.8, 0.8, 0.8]);
    }
}
