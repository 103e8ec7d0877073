//! Command line entry: configuration, window and GPU bring-up, and the
//! frame loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec2;
use winit::event::{Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::window::WindowBuilder;

use crate::gpu::renderer::Renderer;
use crate::gpu::DrawList;
use crate::reload::SceneHost;

/// Interactive viewer for declarative JSON scene documents.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory containing the scene file and mesh assets.
    /// Falls back to SCENEVIEW_DATA_DIR, then "data".
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Scene file name inside the data directory.
    /// Falls back to SCENEVIEW_SCENE, then "scene.json".
    #[arg(long)]
    scene: Option<String>,

    /// Scene file poll interval in milliseconds
    #[arg(long, default_value_t = 250)]
    watch_ms: u64,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = cli
        .data_dir
        .or_else(|| std::env::var_os("SCENEVIEW_DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("data"));
    let scene = cli
        .scene
        .or_else(|| std::env::var("SCENEVIEW_SCENE").ok())
        .unwrap_or_else(|| "scene.json".to_string());
    pollster::block_on(view(data_dir, scene, Duration::from_millis(cli.watch_ms)))
}

async fn view(data_dir: PathBuf, scene: String, watch_interval: Duration) -> Result<()> {
    let scene_path = data_dir.join(&scene);

    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("sceneview")
            .build(&event_loop)?,
    );

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let surface = instance.create_surface(window.clone())?;
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| anyhow::anyhow!("no adapter found"))?;
    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await?;

    let caps = surface.get_capabilities(&adapter);
    let format = caps
        .formats
        .first()
        .copied()
        .ok_or_else(|| anyhow::anyhow!("surface has no supported formats"))?;
    let size = window.inner_size();
    let mut config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode: wgpu::PresentMode::Fifo,
        alpha_mode: caps.alpha_modes[0],
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&device, &config);

    let mut renderer = Renderer::new(device, queue, format, config.width, config.height);
    let mut host = SceneHost::load(&scene_path, &data_dir, &mut renderer)
        .with_context(|| format!("loading scene {}", scene_path.display()))?;

    let clock = Instant::now();
    let mut last_poll = Instant::now();

    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, .. } => match event {
            WindowEvent::CloseRequested => {
                host.shutdown(&mut renderer);
                elwt.exit();
            }
            WindowEvent::Resized(new_size) => {
                config.width = new_size.width.max(1);
                config.height = new_size.height.max(1);
                surface.configure(renderer.device(), &config);
            }
            WindowEvent::RedrawRequested => {
                if last_poll.elapsed() >= watch_interval {
                    last_poll = Instant::now();
                    host.poll(&mut renderer);
                }

                host.update(
                    clock.elapsed().as_secs_f32(),
                    Vec2::new(config.width as f32, config.height as f32),
                    Vec2::ONE,
                );

                let frame = match surface.get_current_texture() {
                    Ok(frame) => frame,
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        surface.configure(renderer.device(), &config);
                        return;
                    }
                    Err(e) => {
                        log::warn!("surface error: {e}");
                        return;
                    }
                };
                let target = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());

                let mut list = DrawList::new();
                host.graph().draw(&mut list);
                let clear = host.graph().background();
                renderer.render(&target, config.width, config.height, clear, &list);
                frame.present();
            }
            _ => {}
        },
        Event::AboutToWait => window.request_redraw(),
        _ => {}
    })?;

    Ok(())
}
