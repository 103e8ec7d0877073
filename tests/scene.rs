//! End-to-end tests: compile → link → init → draw, plus hot reload,
//! against a recording fake render device.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use glam::{Mat4, Vec2, Vec3, Vec4};

use sceneview::compile::CompileContext;
use sceneview::flex::FlexValue;
use sceneview::gpu::{DrawList, MeshHandle, RenderDevice, Vertex};
use sceneview::graph::SceneGraph;
use sceneview::reload::SceneHost;

#[derive(Default)]
struct FakeDevice {
    uploads: usize,
    releases: usize,
    live: Vec<MeshHandle>,
}

impl RenderDevice for FakeDevice {
    fn upload_mesh(&mut self, _vertices: &[Vertex]) -> anyhow::Result<MeshHandle> {
        self.uploads += 1;
        let handle = MeshHandle(self.uploads as u64);
        self.live.push(handle);
        Ok(handle)
    }

    fn release_mesh(&mut self, handle: MeshHandle) {
        self.releases += 1;
        self.live.retain(|&h| h != handle);
    }
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sceneview_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

const TRIANGLE_OBJ: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

const SCENE: &str = r#"[
  {"$layer": {"id": "__main__",
    "camera": {"$look": {}},
    "color": [0.1, 0.2, 0.3],
    "gl": {"$multiply": {
      "gl": {"$mesh": {"src": "tri.obj", "scale": 1.0}},
      "many": [3, 3, 3],
      "rotate": [0, 1, 0],
      "translate": [0, 0, 1]}}}}
]"#;

fn write_scene(dir: &PathBuf, scene: &str) {
    fs::write(dir.join("scene.json"), scene).unwrap();
    fs::write(dir.join("tri.obj"), TRIANGLE_OBJ).unwrap();
}

#[test]
fn test_compile_link_init_draw() {
    let dir = scratch_dir("draw");
    write_scene(&dir, SCENE);

    let mut device = FakeDevice::default();
    let host = SceneHost::load(dir.join("scene.json"), &dir, &mut device).unwrap();
    assert_eq!(device.uploads, 1);

    // Constant background, widened from the 3-vector literal.
    assert_eq!(host.graph().background(), Vec4::new(0.1, 0.2, 0.3, 0.0));

    let mut list = DrawList::new();
    host.graph().draw(&mut list);
    assert_eq!(list.items.len(), 3);

    // Default camera: position (0,0,-5) looking at the origin, 45° FOV,
    // aspect 1.
    let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO, Vec3::Y);
    let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 100.0);

    // Instance k draws with accumulated rotation (0,k,0) and translation
    // (0,0,k) composed before the incoming view matrix.
    for (k, cmd) in list.items.iter().enumerate() {
        let expected =
            view * Mat4::from_translation(Vec3::new(0.0, 0.0, k as f32))
                * Mat4::from_rotation_y(k as f32);
        assert!(
            cmd.view.abs_diff_eq(expected, 1e-5),
            "instance {k} view mismatch"
        );
        assert!(cmd.proj.abs_diff_eq(proj, 1e-5), "instance {k} proj mismatch");
    }
}

#[test]
fn test_system_values_drive_computed_color() {
    let dir = scratch_dir("system");
    let scene = r#"[
      {"$layer": {"id": "__main__",
        "camera": {"$look": {}},
        "color": {"$computed": {"expr": "T, T*2, 0, 1", "T": "system:T"}},
        "gl": {"$mesh": {"src": "tri.obj"}}}}
    ]"#;
    write_scene(&dir, scene);

    let mut device = FakeDevice::default();
    let mut host = SceneHost::load(dir.join("scene.json"), &dir, &mut device).unwrap();

    host.update(0.5, Vec2::new(640.0, 480.0), Vec2::ONE);
    assert_eq!(host.graph().background(), Vec4::new(0.5, 1.0, 0.0, 1.0));

    host.update(1.0, Vec2::new(640.0, 480.0), Vec2::ONE);
    assert_eq!(host.graph().background(), Vec4::new(1.0, 2.0, 0.0, 1.0));
}

#[test]
fn test_initial_load_failure_is_fatal() {
    let dir = scratch_dir("fatal");
    fs::write(dir.join("scene.json"), "not json").unwrap();
    let mut device = FakeDevice::default();
    assert!(SceneHost::load(dir.join("scene.json"), &dir, &mut device).is_err());
}

#[test]
fn test_reload_failure_preserves_running_graph() {
    let dir = scratch_dir("reload_fail");
    write_scene(&dir, SCENE);

    let mut device = FakeDevice::default();
    let mut host = SceneHost::load(dir.join("scene.json"), &dir, &mut device).unwrap();
    let root_before = host.graph() as *const SceneGraph;
    let background_before = host.graph().background();

    // Break the scene file; the mtime changes, the compile fails.
    std::thread::sleep(Duration::from_millis(20));
    fs::write(dir.join("scene.json"), "{ this is not json").unwrap();

    assert!(!host.poll(&mut device));
    // The running graph is the same object, nothing was disposed.
    assert!(std::ptr::eq(root_before, host.graph() as *const SceneGraph));
    assert_eq!(host.graph().background(), background_before);
    assert_eq!(device.releases, 0);
    assert_eq!(device.live.len(), 1);
}

#[test]
fn test_reload_success_swaps_and_disposes_old_graph() {
    let dir = scratch_dir("reload_ok");
    write_scene(&dir, SCENE);

    let mut device = FakeDevice::default();
    let mut host = SceneHost::load(dir.join("scene.json"), &dir, &mut device).unwrap();
    assert_eq!(device.uploads, 1);

    std::thread::sleep(Duration::from_millis(20));
    let recolored = SCENE.replace("[0.1, 0.2, 0.3]", "[0.9, 0.0, 0.0]");
    fs::write(dir.join("scene.json"), recolored).unwrap();

    assert!(host.poll(&mut device));
    assert_eq!(host.graph().background(), Vec4::new(0.9, 0.0, 0.0, 0.0));
    // The new graph initialized, the old one released its buffer.
    assert_eq!(device.uploads, 2);
    assert_eq!(device.releases, 1);
    assert_eq!(device.live.len(), 1);

    host.shutdown(&mut device);
    assert!(device.live.is_empty());
}

#[test]
fn test_unchanged_file_does_not_reload() {
    let dir = scratch_dir("no_change");
    write_scene(&dir, SCENE);

    let mut device = FakeDevice::default();
    let mut host = SceneHost::load(dir.join("scene.json"), &dir, &mut device).unwrap();
    assert!(!host.poll(&mut device));
    assert_eq!(device.uploads, 1);
}

#[test]
fn test_mesh_materials_color_the_baked_buffer() {
    let dir = scratch_dir("mtl");
    fs::write(
        dir.join("tri.mtl"),
        "newmtl red\nKd 1 0 0\nnewmtl blue\nKd 0 0 1\n",
    )
    .unwrap();
    fs::write(
        dir.join("two.obj"),
        "mtllib tri.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\n\
         usemtl red\nf 1 2 3\nusemtl blue\nf 2 4 3\n",
    )
    .unwrap();

    let (mesh, _) = sceneview::obj::load(&dir.join("two.obj")).unwrap();
    let buffer = mesh.make_buffer(1.0);
    assert_eq!(buffer.len(), 6);
    assert_eq!(buffer[0].color, [1.0, 0.0, 0.0]);
    assert_eq!(buffer[3].color, [0.0, 0.0, 1.0]);
}

#[test]
fn test_modify_composes_rotation_translation_scale() {
    let dir = scratch_dir("modify");
    let scene = r#"[
      {"$layer": {"id": "__main__",
        "camera": {"$look": {}},
        "gl": {"$modify": {
          "rotate": [0, 0.5, 0],
          "translate": [1, 2, 3],
          "scale": [2, 2, 2],
          "gl": [{"$mesh": {"src": "tri.obj"}}, {"$mesh": {"src": "tri.obj"}}]}}}}
    ]"#;
    write_scene(&dir, scene);

    let mut device = FakeDevice::default();
    let host = SceneHost::load(dir.join("scene.json"), &dir, &mut device).unwrap();
    assert_eq!(device.uploads, 2);

    let mut list = DrawList::new();
    host.graph().draw(&mut list);
    assert_eq!(list.items.len(), 2);

    let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO, Vec3::Y);
    let expected = view
        * Mat4::from_rotation_y(0.5)
        * Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0))
        * Mat4::from_scale(Vec3::splat(2.0));
    // Both children draw with the same composed transform.
    assert!(list.items[0].view.abs_diff_eq(expected, 1e-5));
    assert!(list.items[1].view.abs_diff_eq(expected, 1e-5));
}

#[test]
fn test_aspect_feeds_projection() {
    let dir = scratch_dir("aspect");
    let scene = r#"[
      {"$layer": {"id": "__main__",
        "camera": {"$look": {"aspect": "system:canvasSize"}},
        "gl": {"$mesh": {"src": "tri.obj"}}}}
    ]"#;
    write_scene(&dir, scene);

    let mut device = FakeDevice::default();
    let mut host = SceneHost::load(dir.join("scene.json"), &dir, &mut device).unwrap();
    host.update(0.0, Vec2::new(1600.0, 900.0), Vec2::ONE);

    let mut list = DrawList::new();
    host.graph().draw(&mut list);
    let expected = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 1600.0 / 900.0, 0.1, 100.0);
    assert!(list.items[0].proj.abs_diff_eq(expected, 1e-5));
}

#[test]
fn test_standalone_graph_build() {
    let dir = scratch_dir("standalone");
    write_scene(&dir, SCENE);

    let mut ctx = CompileContext::new(&dir);
    let text = fs::read_to_string(dir.join("scene.json")).unwrap();
    let mut graph = SceneGraph::build(&text, &mut ctx).unwrap();
    // layer + look + color literal + multiply + mesh + three value
    // literals + the system builtin
    assert_eq!(graph.len(), 9);

    graph.upsert("T", FlexValue::Float(1.0));
    let mut device = FakeDevice::default();
    graph.init(&mut device).unwrap();
    graph.dispose(&mut device);
    assert_eq!(device.uploads, device.releases);
}
