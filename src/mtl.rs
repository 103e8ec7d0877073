//! Streaming MTL material-library parser and the material database.
//!
//! The parser walks one contiguous byte buffer line by line and reports
//! events through [`MtlSink`]. Diagnostics are line-numbered and
//! non-fatal: parsing continues with the next line.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use glam::Vec3;

use crate::error::CompileError;
use crate::text;

/// Callback events produced by [`parse_mtl`].
pub trait MtlSink {
    fn new_mtl(&mut self, name: &str);
    fn map_kd(&mut self, path: &str);
    fn ka(&mut self, r: f32, g: f32, b: f32);
    fn kd(&mut self, r: f32, g: f32, b: f32);
    fn ks(&mut self, r: f32, g: f32, b: f32);
    fn ns(&mut self, e: f32);
    fn d(&mut self, d: f32);
    fn illum(&mut self, mode: i32);
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

/// Stream-parse MTL text, reporting events to `sink`.
pub fn parse_mtl(mut data: &[u8], sink: &mut dyn MtlSink) {
    let mut line_num = 0;
    while !data.is_empty() {
        let mut line = text::pop_line(&mut data);
        text::strip_comment(&mut line);
        text::ltrim(&mut line);
        if line.is_empty() {
            line_num += 1;
            continue;
        }
        if text::consume_prefix(&mut line, b"newmtl ") {
            text::ltrim(&mut line);
            sink.new_mtl(&text::decode(line));
        } else if text::consume_prefix(&mut line, b"map_Kd ") {
            text::ltrim(&mut line);
            sink.map_kd(&text::decode(line));
        } else if text::consume_prefix(&mut line, b"Ka ") {
            text::ltrim(&mut line);
            match consume_float3(&mut line) {
                Some((r, g, b)) => sink.ka(r, g, b),
                None => sink.error(line_num, "bad float3 in Ka"),
            }
        } else if text::consume_prefix(&mut line, b"Kd ") {
            text::ltrim(&mut line);
            match consume_float3(&mut line) {
                Some((r, g, b)) => sink.kd(r, g, b),
                None => sink.error(line_num, "bad float3 in Kd"),
            }
        } else if text::consume_prefix(&mut line, b"Ks ") {
            text::ltrim(&mut line);
            match consume_float3(&mut line) {
                Some((r, g, b)) => sink.ks(r, g, b),
                None => sink.error(line_num, "bad float3 in Ks"),
            }
        } else if text::consume_prefix(&mut line, b"Ns ") {
            text::ltrim(&mut line);
            match text::consume_f32(&mut line) {
                Some(e) => sink.ns(e),
                None => sink.error(line_num, "bad float in Ns"),
            }
        } else if text::consume_prefix(&mut line, b"d ") {
            text::ltrim(&mut line);
            match text::consume_f32(&mut line) {
                Some(d) => sink.d(d),
                None => sink.error(line_num, "bad float in d"),
            }
        } else if text::consume_prefix(&mut line, b"Tr ") {
            text::ltrim(&mut line);
            match text::consume_f32(&mut line) {
                // Tr is inverted opacity.
                Some(tr) => sink.d(1.0 - tr),
                None => sink.error(line_num, "bad float in Tr"),
            }
        } else if text::consume_prefix(&mut line, b"illum ") {
            text::ltrim(&mut line);
            match text::consume_i32(&mut line) {
                Some(mode) => sink.illum(mode),
                None => sink.error(line_num, "bad int in illum"),
            }
        } else {
            sink.error(line_num, &format!("unknown command {}", text::decode(line)));
        }
        line_num += 1;
    }
    sink.end();
}

/// One material record.
#[derive(Debug, Clone)]
pub struct Mtl {
    pub name: String,
    pub ka: Vec3,
    pub kd: Vec3,
    pub ks: Vec3,
    pub ns: f32,
    pub d: f32,
    pub map_kd: Option<String>,
    pub illum: i32,
}

impl Default for Mtl {
    fn default() -> Self {
        Self {
            name: String::new(),
            ka: Vec3::splat(0.2),
            kd: Vec3::splat(0.8),
            ks: Vec3::splat(1.0),
            ns: 1.0,
            d: 1.0,
            map_kd: None,
            illum: 1,
        }
    }
}

/// Accumulates materials from parser events and resolves them by name.
#[derive(Debug, Default)]
pub struct MaterialDb {
    materials: Vec<Mtl>,
    by_name: HashMap<String, usize>,
    cur: Mtl,
}

impl MaterialDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, name: &str) -> Option<&Mtl> {
        self.by_name.get(name).map(|&i| &self.materials[i])
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    fn maybe_push_and_reset(&mut self) {
        if !self.cur.name.is_empty() {
            let id = self.materials.len();
            let cur = std::mem::take(&mut self.cur);
            log::debug!("added material [{}] -> {}", cur.name, id);
            self.by_name.insert(cur.name.clone(), id);
            self.materials.push(cur);
        }
    }
}

impl MtlSink for MaterialDb {
    fn new_mtl(&mut self, name: &str) {
        self.maybe_push_and_reset();
        self.cur.name = name.to_string();
    }

    fn map_kd(&mut self, path: &str) {
        self.cur.map_kd = Some(path.to_string());
    }

    fn ka(&mut self, r: f32, g: f32, b: f32) {
        self.cur.ka = Vec3::new(r, g, b);
    }

    fn kd(&mut self, r: f32, g: f32, b: f32) {
        self.cur.kd = Vec3::new(r, g, b);
    }

    fn ks(&mut self, r: f32, g: f32, b: f32) {
        self.cur.ks = Vec3::new(r, g, b);
    }

    fn ns(&mut self, e: f32) {
        self.cur.ns = e;
    }

    fn d(&mut self, d: f32) {
        self.cur.d = d;
    }

    fn illum(&mut self, mode: i32) {
        self.cur.illum = mode;
    }

    fn error(&mut self, line: usize, msg: &str) {
        log::warn!("mtl error in line {line}: {msg}");
    }

    fn end(&mut self) {
        self.maybe_push_and_reset();
    }
}

/// Load statistics for a parsed file.
#[derive(Debug, Clone, Copy)]
pub struct LoadStats {
    pub elapsed: Duration,
    pub size_in_bytes: usize,
}

/// Read and parse an MTL file into a [`MaterialDb`].
pub fn load(path: &Path) -> Result<(MaterialDb, LoadStats), CompileError> {
    let bytes = std::fs::read(path)?;
    let timer = Instant::now();
    let mut db = MaterialDb::new();
    parse_mtl(&bytes, &mut db);
    Ok((
        db,
        LoadStats {
            elapsed: timer.elapsed(),
            size_in_bytes: bytes.len(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_materials() {
        let src = b"newmtl red\nKd 1 0 0\nNs 32\n\nnewmtl glass\nKd 0.9 0.9 1.0\nd 0.25\n";
        let mut db = MaterialDb::new();
        parse_mtl(src, &mut db);

        assert_eq!(db.len(), 2);
        let red = db.find("red").unwrap();
        assert_eq!(red.kd, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(red.ns, 32.0);
        // Unset channels keep their defaults.
        assert_eq!(red.ka, Vec3::splat(0.2));

        let glass = db.find("glass").unwrap();
        assert_eq!(glass.d, 0.25);
    }

    #[test]
    fn test_tr_is_inverted_opacity() {
        let src = b"newmtl fog\nTr 0.25\n";
        let mut db = MaterialDb::new();
        parse_mtl(src, &mut db);
        assert_eq!(db.find("fog").unwrap().d, 0.75);
    }

    #[test]
    fn test_unknown_lines_do_not_stop_the_parse() {
        let src = b"newmtl a\nwibble 1 2 3\nKd 0 1 0\n";
        let mut db = MaterialDb::new();
        parse_mtl(src, &mut db);
        assert_eq!(db.find("a").unwrap().kd, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_error_lines_are_numbered() {
        struct Recorder(Vec<(usize, String)>);
        impl MtlSink for Recorder {
            fn new_mtl(&mut self, _: &str) {}
            fn map_kd(&mut self, _: &str) {}
            fn ka(&mut self, _: f32, _: f32, _: f32) {}
            fn kd(&mut self, _: f32, _: f32, _: f32) {}
            fn ks(&mut self, _: f32, _: f32, _: f32) {}
            fn ns(&mut self, _: f32) {}
            fn d(&mut self, _: f32) {}
            fn illum(&mut self, _: i32) {}
            fn error(&mut self, line: usize, msg: &str) {
                self.0.push((line, msg.to_string()));
            }
            fn end(&mut self) {}
        }

        let src = b"newmtl a\nKd nope\n";
        let mut rec = Recorder(Vec::new());
        parse_mtl(src, &mut rec);
        assert_eq!(rec.0.len(), 1);
        assert_eq!(rec.0[0].0, 1);
        assert!(rec.0[0].1.contains("Kd"));
    }
}
