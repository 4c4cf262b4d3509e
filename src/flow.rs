//! Scene lifecycle and the application event loop.
//!
//! A [`SurfaceRenderer`] receives the four surface callbacks a windowing host
//! produces: the surface (and its GPU context) was created, it changed size, a
//! frame is due, and it is going away. [`Scene`] is the renderer shipped with
//! the crate: two cubes, one of them orbiting.
//!
//! # Lifecycle
//!
//! 1. `on_surface_created` builds the scene once and uploads node resources
//! 2. `on_surface_changed` sets the viewport and the projection
//! 3. `on_draw_frame` is called for every frame: clear, advance, render
//! 4. `on_surface_destroyed` releases node resources
//!
//! [`run`] drives a renderer from a winit event loop with a [`WgpuContext`].

use std::sync::Arc;

use anyhow::Context as _;
use cgmath::{Deg, Rad};
use log::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowId},
};

use crate::{
    camera::Projection,
    context::{Capability, ClearMask, Face, MatrixMode, RenderContext, Winding},
    data_structures::{
        cube::CubeNode,
        scene_graph::{DEFAULT_EYE_OFFSET, Propagation, SceneGraph},
    },
    error::SceneError,
    render::WgpuContext,
};

/// Callbacks a windowing host delivers to whatever draws into its surface.
pub trait SurfaceRenderer {
    /// The context is new: any previously created GPU resources are gone.
    fn on_surface_created(&mut self, ctx: &mut dyn RenderContext) -> Result<(), SceneError>;

    fn on_surface_changed(&mut self, ctx: &mut dyn RenderContext, width: u32, height: u32);

    fn on_draw_frame(&mut self, ctx: &mut dyn RenderContext);

    fn on_surface_destroyed(&mut self, ctx: &mut dyn RenderContext);
}

/// Tunables for [`Scene`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneConfig {
    pub clear_colour: [f32; 4],
    pub fovy: Rad<f32>,
    pub znear: f32,
    pub zfar: f32,
    /// Added to the orbit angle every frame.
    pub angle_step: f32,
    pub eye_offset: f32,
    pub propagation: Propagation,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            clear_colour: [0.25, 0.25, 0.25, 1.0],
            fovy: Deg(45.0).into(),
            znear: 0.1,
            zfar: 100.0,
            angle_step: 0.05,
            eye_offset: DEFAULT_EYE_OFFSET,
            propagation: Propagation::default(),
        }
    }
}

impl SceneConfig {
    pub fn with_clear_colour(mut self, r: f32, g: f32, b: f32, a: f32) -> Self {
        self.clear_colour = [r, g, b, a];
        self
    }

    pub fn with_fovy<F: Into<Rad<f32>>>(mut self, fovy: F) -> Self {
        self.fovy = fovy.into();
        self
    }

    pub fn with_clip_planes(mut self, znear: f32, zfar: f32) -> Self {
        self.znear = znear;
        self.zfar = zfar;
        self
    }

    pub fn with_angle_step(mut self, angle_step: f32) -> Self {
        self.angle_step = angle_step;
        self
    }

    pub fn with_eye_offset(mut self, eye_offset: f32) -> Self {
        self.eye_offset = eye_offset;
        self
    }

    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }
}

/// The demo scene: a far cube orbiting and a green cube in front of it.
#[derive(Debug)]
pub struct Scene {
    config: SceneConfig,
    graph: SceneGraph,
    projection: Option<Projection>,
    angle: f32,
}

impl Scene {
    pub fn new(config: SceneConfig) -> Self {
        let graph = SceneGraph::new()
            .with_propagation(config.propagation)
            .with_eye_offset(config.eye_offset);
        Self {
            config,
            graph,
            projection: None,
            angle: 0.0,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    /// `None` until the first `on_surface_changed`.
    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Builds the two cubes under the root. Does nothing if the root already
    /// has children, so a recreated surface does not duplicate the scene.
    fn create_scene(&mut self) -> Result<(), SceneError> {
        let root = self.graph.root();
        if self.graph.child_count(root) > 0 {
            debug!("scene already built");
            return Ok(());
        }

        let orbiting = self.graph.add_child(root, CubeNode::new())?;
        if let Some(node) = self.graph.node_mut(orbiting) {
            node.set_position(0.5, 0.0, -10.0);
        }
        let near = self.graph.add_child(root, CubeNode::new())?;
        if let Some(node) = self.graph.node_mut(near) {
            node.set_position(0.0, 0.0, -5.0).set_colour(0.0, 1.0, 0.0);
        }

        info!("scene built with {} nodes", self.graph.node_count());
        Ok(())
    }

    /// Steps the orbit angle and moves the root's first child along it.
    fn advance(&mut self) {
        self.angle = (self.angle + self.config.angle_step) % 360.0;
        let (sin, cos) = self.angle.sin_cos();
        let root = self.graph.root();
        if let Some(node) = self
            .graph
            .child(root, 0)
            .and_then(|id| self.graph.node_mut(id))
        {
            node.set_position(sin * 2.0, 0.0, cos * 9.0 - 10.0);
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(SceneConfig::default())
    }
}

impl SurfaceRenderer for Scene {
    fn on_surface_created(&mut self, ctx: &mut dyn RenderContext) -> Result<(), SceneError> {
        let [r, g, b, a] = self.config.clear_colour;
        ctx.clear_colour(r, g, b, a);
        self.create_scene()?;
        self.graph.setup(ctx)
    }

    fn on_surface_changed(&mut self, ctx: &mut dyn RenderContext, width: u32, height: u32) {
        ctx.viewport(0, 0, width, height);

        let projection = match self.projection.as_mut() {
            Some(projection) => {
                projection.resize(width, height);
                *projection
            }
            None => Projection::new(
                width,
                height,
                self.config.fovy,
                self.config.znear,
                self.config.zfar,
            ),
        };
        self.projection = Some(projection);
        debug!("surface changed to {}x{}", width, height);

        ctx.matrix_mode(MatrixMode::Projection);
        ctx.load_matrix(&projection.calc_matrix());
        ctx.matrix_mode(MatrixMode::ModelView);
    }

    fn on_draw_frame(&mut self, ctx: &mut dyn RenderContext) {
        ctx.clear(ClearMask::COLOUR | ClearMask::DEPTH);
        ctx.enable(Capability::DepthTest);
        ctx.enable(Capability::CullFace);
        ctx.cull_face(Face::Back);
        ctx.front_face(Winding::Ccw);

        self.advance();
        self.graph.render(ctx);
    }

    fn on_surface_destroyed(&mut self, ctx: &mut dyn RenderContext) {
        self.graph.cleanup(ctx);
    }
}

/// The native window hosting the surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: String::from("vbo-playground"),
            width: 800,
            height: 600,
        }
    }
}

/// Everything that lives exactly as long as the window's surface.
struct SurfaceState {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    ctx: WgpuContext,
}

impl SurfaceState {
    fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create wgpu surface")?;

        let adapter = futures::executor::block_on(instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            },
        ))
        .context("failed to find a suitable GPU adapter")?;
        let info = adapter.get_info();
        info!("using {} ({:?})", info.name, info.backend);

        let (device, queue) = futures::executor::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("vbo-playground device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            },
        ))
        .context("failed to create wgpu device/queue")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("no supported surface formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let ctx = WgpuContext::new(
            device,
            queue,
            format,
            [config.width, config.height],
            info.backend,
        );

        Ok(Self {
            window,
            surface,
            config,
            ctx,
        })
    }

    /// Returns `false` for a zero-sized surface, which wgpu cannot configure.
    fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(self.ctx.device(), &self.config);
        self.ctx.resize(width, height);
        true
    }

    fn draw<R: SurfaceRenderer>(&mut self, renderer: &mut R) -> anyhow::Result<()> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                debug!("surface lost, reconfiguring");
                self.surface.configure(self.ctx.device(), &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("surface timed out, skipping frame");
                return Ok(());
            }
            Err(e) => return Err(e).context("failed to acquire the next frame"),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        renderer.on_draw_frame(&mut self.ctx);
        let draws = self.ctx.flush(&view);
        self.window.pre_present_notify();
        output.present();
        log::trace!("presented frame with {} draws", draws);
        Ok(())
    }
}

struct App<R: SurfaceRenderer> {
    window_config: WindowConfig,
    renderer: R,
    state: Option<SurfaceState>,
}

impl<R: SurfaceRenderer> App<R> {
    fn new(renderer: R, window_config: WindowConfig) -> Self {
        Self {
            window_config,
            renderer,
            state: None,
        }
    }

    fn create_surface(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let attributes = Window::default_attributes()
            .with_title(self.window_config.title.clone())
            .with_inner_size(PhysicalSize::new(
                self.window_config.width,
                self.window_config.height,
            ));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("failed to create the window")?,
        );

        let mut state = SurfaceState::new(window)?;
        self.renderer
            .on_surface_created(&mut state.ctx)
            .context("scene setup failed")?;
        self.renderer
            .on_surface_changed(&mut state.ctx, state.config.width, state.config.height);
        state.window.request_redraw();
        self.state = Some(state);
        Ok(())
    }

    fn destroy_surface(&mut self) {
        if let Some(mut state) = self.state.take() {
            info!("releasing surface resources");
            self.renderer.on_surface_destroyed(&mut state.ctx);
        }
    }
}

impl<R: SurfaceRenderer> ApplicationHandler for App<R> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        if let Err(e) = self.create_surface(event_loop) {
            error!("{:#}", e);
            event_loop.exit();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        self.destroy_surface();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let state = match &mut self.state {
            Some(state) => state,
            None => return,
        };

        match event {
            WindowEvent::CloseRequested => {
                self.destroy_surface();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if state.resize(size.width, size.height) {
                    self.renderer
                        .on_surface_changed(&mut state.ctx, size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = state.draw(&mut self.renderer) {
                    error!("{:#}", e);
                    self.destroy_surface();
                    event_loop.exit();
                    return;
                }
                state.window.request_redraw();
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.destroy_surface();
    }
}

/// Opens a window and drives `renderer` until the window is closed.
pub fn run<R: SurfaceRenderer + 'static>(
    renderer: R,
    window_config: WindowConfig,
) -> anyhow::Result<()> {
    if let Err(e) =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init()
    {
        println!("Warning: Could not initialize logger: {}", e);
    }

    let event_loop = EventLoop::new().context("failed to create an event loop")?;
    let mut app = App::new(renderer, window_config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
