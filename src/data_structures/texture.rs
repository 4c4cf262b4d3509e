//! The depth attachment of the window surface.

/// A depth texture sized to the surface.
///
/// Recreated with [`create`](Self::create) whenever the surface is resized so
/// that its extent always matches the colour attachment.
#[derive(Clone, Debug)]
pub struct DepthTexture {
    #[allow(unused)]
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    size: [u32; 2],
}

impl DepthTexture {
    /// Standard depth buffer texture format (32-bit float).
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    pub fn create(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let size = [size[0].max(1), size[1].max(1)];
        let desc = wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size[0],
                height: size[1],
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[Self::DEPTH_FORMAT],
        };
        let texture = device.create_texture(&desc);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            size,
        }
    }

    /// Width and height in pixels; never zero.
    pub fn size(&self) -> [u32; 2] {
        self.size
    }
}
