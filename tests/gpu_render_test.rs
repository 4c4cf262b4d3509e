#[cfg(feature = "integration-tests")]
fn headless_device() -> Option<(wgpu::Device, wgpu::Queue, wgpu::Backend)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    let adapter = futures::executor::block_on(instance.request_adapter(
        &wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: None,
            force_fallback_adapter: false,
        },
    ))
    .ok()?;
    let backend = adapter.get_info().backend;
    let (device, queue) = futures::executor::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("test device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        },
    ))
    .ok()?;
    Some((device, queue, backend))
}

#[test]
#[cfg(feature = "integration-tests")]
fn scene_renders_through_wgpu() {
    use vbo_playground::{
        context::RenderContext,
        flow::{Scene, SurfaceRenderer},
        render::WgpuContext,
    };

    let Some((device, queue, backend)) = headless_device() else {
        eprintln!("no GPU adapter available, skipping");
        return;
    };
    let format = wgpu::TextureFormat::Rgba8Unorm;
    let target = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("test target"),
        size: wgpu::Extent3d {
            width: 64,
            height: 64,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());

    let mut ctx = WgpuContext::new(device, queue, format, [64, 64], backend);
    assert!(ctx.extensions().contains("vertex_buffer_object"));

    let mut scene = Scene::default();
    scene.on_surface_created(&mut ctx).unwrap();
    scene.on_surface_changed(&mut ctx, 64, 64);

    for _ in 0..3 {
        scene.on_draw_frame(&mut ctx);
        assert_eq!(ctx.pending_draws(), 2);
        assert_eq!(ctx.flush(&view), 2);
        assert_eq!(ctx.pending_draws(), 0);
    }

    scene.on_surface_destroyed(&mut ctx);
}
