//! A [`RenderContext`] backed by wgpu.
//!
//! GL-style calls made during a frame only update state and queue draws. Each
//! queued draw snapshots the current matrices, colour and pipeline state, so
//! [`WgpuContext::flush`] can replay the frame as a single render pass: one
//! pipeline per distinct fixed-function state and one instance per draw.
//!
//! Buffer objects map onto `wgpu::Buffer`s keyed by GL-like integer handles.
//! Client-side arrays are copied into transient buffers at draw time.

use std::{collections::HashMap, iter, mem};

use log::{debug, error, warn};
use wgpu::util::DeviceExt;

use crate::{
    camera::OPENGL_TO_WGPU_MATRIX,
    context::{
        BufferId, BufferTarget, BufferUsage, Capabilities, Capability, ClearMask, Face,
        MatrixMode, NO_BUFFER, RenderContext, Winding,
    },
    data_structures::{
        matrix_stack::{MatrixStacks, StackError},
        texture::DepthTexture,
    },
    error::SceneError,
    pipelines::flat::{DrawRaw, PipelineKey, mk_flat_pipeline},
};

/// Bytes per vertex the flat pipeline reads.
const VERTEX_STRIDE: u32 = 3 * mem::size_of::<f32>() as u32;

/// A draw recorded during the frame, replayed by [`WgpuContext::flush`].
struct QueuedDraw {
    key: PipelineKey,
    vertex: wgpu::Buffer,
    vertex_offset: wgpu::BufferAddress,
    index: wgpu::Buffer,
    index_offset: wgpu::BufferAddress,
    index_count: u32,
    raw: DrawRaw,
}

/// Where vertex positions come from for the next draw.
#[derive(Clone, Debug, Default)]
enum VertexSource {
    #[default]
    None,
    Buffer {
        offset: usize,
    },
    Client(Vec<f32>),
}

pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    depth_texture: DepthTexture,
    extensions: String,

    stacks: MatrixStacks,
    colour: [f32; 4],
    clear_colour: wgpu::Color,
    pending_clear: ClearMask,
    viewport: Option<(i32, i32, u32, u32)>,
    depth_test: bool,
    cull_enabled: bool,
    cull_face: Face,
    winding: Winding,

    buffers: HashMap<BufferId, Option<wgpu::Buffer>>,
    next_buffer: BufferId,
    array_binding: BufferId,
    element_binding: BufferId,
    vertex_array: bool,
    vertex_source: VertexSource,

    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    draws: Vec<QueuedDraw>,
    instance_buffer: Option<wgpu::Buffer>,
    instance_capacity: usize,
}

impl WgpuContext {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        format: wgpu::TextureFormat,
        size: [u32; 2],
        backend: wgpu::Backend,
    ) -> Self {
        let depth_texture = DepthTexture::create(&device, size, "Depth Texture");
        Self {
            device,
            queue,
            format,
            depth_texture,
            extensions: format!("WGPU_{backend:?} GL_ARB_{}", Capabilities::VERTEX_BUFFER_OBJECT),
            stacks: MatrixStacks::new(),
            colour: [1.0, 1.0, 1.0, 1.0],
            clear_colour: wgpu::Color::BLACK,
            pending_clear: ClearMask::default(),
            viewport: None,
            depth_test: false,
            cull_enabled: false,
            cull_face: Face::Back,
            winding: Winding::Ccw,
            buffers: HashMap::new(),
            next_buffer: 1,
            array_binding: NO_BUFFER,
            element_binding: NO_BUFFER,
            vertex_array: false,
            vertex_source: VertexSource::None,
            pipelines: HashMap::new(),
            draws: Vec::new(),
            instance_buffer: None,
            instance_capacity: 0,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Number of draws queued since the last flush.
    pub fn pending_draws(&self) -> usize {
        self.draws.len()
    }

    /// Recreates the depth attachment for a new surface size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.depth_texture = DepthTexture::create(&self.device, [width, height], "Depth Texture");
    }

    /// Submits every queued draw as one render pass into `view`.
    ///
    /// Pending clears become the pass's load operations. Returns the number
    /// of draws submitted.
    pub fn flush(&mut self, view: &wgpu::TextureView) -> usize {
        let draws = mem::take(&mut self.draws);
        let clear = mem::take(&mut self.pending_clear);

        if !draws.is_empty() {
            self.reserve_instances(draws.len());
            let raws: Vec<DrawRaw> = draws.iter().map(|draw| draw.raw).collect();
            if let Some(instances) = &self.instance_buffer {
                self.queue.write_buffer(instances, 0, bytemuck::cast_slice(&raws));
            }
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: if clear.colour {
                            wgpu::LoadOp::Clear(self.clear_colour)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: if clear.depth {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            if let Some((x, y, w, h)) = self.clamped_viewport() {
                pass.set_viewport(x, y, w, h, 0.0, 1.0);
            }

            if let Some(instances) = &self.instance_buffer {
                pass.set_vertex_buffer(1, instances.slice(..));
                for (i, draw) in draws.iter().enumerate() {
                    let Some(pipeline) = self.pipelines.get(&draw.key) else {
                        continue;
                    };
                    let instance = i as u32;
                    pass.set_pipeline(pipeline);
                    pass.set_vertex_buffer(0, draw.vertex.slice(draw.vertex_offset..));
                    pass.set_index_buffer(
                        draw.index.slice(draw.index_offset..),
                        wgpu::IndexFormat::Uint16,
                    );
                    pass.draw_indexed(0..draw.index_count, 0, instance..instance + 1);
                }
            }
        }
        self.queue.submit(iter::once(encoder.finish()));
        draws.len()
    }

    fn reserve_instances(&mut self, needed: usize) {
        if self.instance_capacity >= needed && self.instance_buffer.is_some() {
            return;
        }
        let capacity = needed.next_power_of_two();
        debug!("growing the draw buffer to {} entries", capacity);
        self.instance_buffer = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw Buffer"),
            size: (capacity * mem::size_of::<DrawRaw>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.instance_capacity = capacity;
    }

    /// The viewport in pixels, clipped to the depth attachment which always
    /// matches the surface.
    fn clamped_viewport(&self) -> Option<(f32, f32, f32, f32)> {
        let (x, y, w, h) = self.viewport?;
        let [max_w, max_h] = self.depth_texture.size();
        let x = x.clamp(0, max_w as i32 - 1) as u32;
        let y = y.clamp(0, max_h as i32 - 1) as u32;
        let w = w.min(max_w - x);
        let h = h.min(max_h - y);
        if w == 0 || h == 0 {
            return None;
        }
        Some((x as f32, y as f32, w as f32, h as f32))
    }

    fn pipeline_key(&mut self) -> PipelineKey {
        let key = PipelineKey::new(
            self.depth_test,
            self.cull_enabled.then_some(self.cull_face),
            self.winding,
        );
        if !self.pipelines.contains_key(&key) {
            debug!("creating pipeline for {:?}", key);
            let pipeline = mk_flat_pipeline(&self.device, self.format, key);
            self.pipelines.insert(key, pipeline);
        }
        key
    }

    fn current_draw(&self) -> DrawRaw {
        DrawRaw::new(
            OPENGL_TO_WGPU_MATRIX * self.stacks.model_view_projection(),
            self.colour,
        )
    }

    fn bound(&self, target: BufferTarget) -> Option<&wgpu::Buffer> {
        let id = match target {
            BufferTarget::Array => self.array_binding,
            BufferTarget::ElementArray => self.element_binding,
        };
        self.buffers.get(&id).and_then(Option::as_ref)
    }

    fn invalid(&self, what: &str) {
        error!("invalid operation: {}", what);
    }
}

impl RenderContext for WgpuContext {
    fn extensions(&self) -> String {
        self.extensions.clone()
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.viewport = Some((x, y, width, height));
    }

    fn matrix_mode(&mut self, mode: MatrixMode) {
        self.stacks.set_mode(mode);
    }

    fn load_identity(&mut self) {
        self.stacks.load(cgmath::SquareMatrix::identity());
    }

    fn load_matrix(&mut self, matrix: &cgmath::Matrix4<f32>) {
        self.stacks.load(*matrix);
    }

    fn mult_matrix(&mut self, matrix: &cgmath::Matrix4<f32>) {
        self.stacks.mult(matrix);
    }

    fn push_matrix(&mut self) -> bool {
        match self.stacks.push() {
            Ok(()) => true,
            Err(_) => {
                self.invalid("matrix stack overflow");
                false
            }
        }
    }

    fn pop_matrix(&mut self) {
        if let Err(StackError::Underflow) = self.stacks.pop() {
            self.invalid("matrix stack underflow");
        }
    }

    fn colour(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.colour = [r, g, b, a];
    }

    fn clear_colour(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.clear_colour = wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        };
    }

    fn clear(&mut self, mask: ClearMask) {
        self.pending_clear = self.pending_clear | mask;
    }

    fn enable(&mut self, capability: Capability) {
        match capability {
            Capability::DepthTest => self.depth_test = true,
            Capability::CullFace => self.cull_enabled = true,
        }
    }

    fn disable(&mut self, capability: Capability) {
        match capability {
            Capability::DepthTest => self.depth_test = false,
            Capability::CullFace => self.cull_enabled = false,
        }
    }

    fn cull_face(&mut self, face: Face) {
        self.cull_face = face;
    }

    fn front_face(&mut self, winding: Winding) {
        self.winding = winding;
    }

    fn gen_buffers(&mut self, count: usize) -> Result<Vec<BufferId>, SceneError> {
        let first = self.next_buffer;
        let ids: Vec<BufferId> = (first..first + count as BufferId).collect();
        self.next_buffer += count as BufferId;
        for &id in &ids {
            self.buffers.insert(id, None);
        }
        Ok(ids)
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferId) {
        match target {
            BufferTarget::Array => self.array_binding = buffer,
            BufferTarget::ElementArray => self.element_binding = buffer,
        }
    }

    fn buffer_data(
        &mut self,
        target: BufferTarget,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<(), SceneError> {
        let id = match target {
            BufferTarget::Array => self.array_binding,
            BufferTarget::ElementArray => self.element_binding,
        };
        if id == NO_BUFFER || !self.buffers.contains_key(&id) {
            return Err(SceneError::NoBufferBound(target));
        }
        let available = self.device.limits().max_buffer_size;
        if data.len() as u64 > available {
            return Err(SceneError::OutOfBufferMemory {
                requested: data.len(),
                available: available as usize,
            });
        }

        let kind = match target {
            BufferTarget::Array => wgpu::BufferUsages::VERTEX,
            BufferTarget::ElementArray => wgpu::BufferUsages::INDEX,
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("Buffer {id} ({usage:?})")),
                contents: data,
                usage: kind | wgpu::BufferUsages::COPY_DST,
            });
        self.buffers.insert(id, Some(buffer));
        Ok(())
    }

    fn delete_buffers(&mut self, buffers: &[BufferId]) {
        for id in buffers {
            // wgpu frees the memory once queued draws drop their references
            self.buffers.remove(id);
            if self.array_binding == *id {
                self.array_binding = NO_BUFFER;
            }
            if self.element_binding == *id {
                self.element_binding = NO_BUFFER;
            }
        }
    }

    fn enable_vertex_array(&mut self) {
        self.vertex_array = true;
    }

    fn disable_vertex_array(&mut self) {
        self.vertex_array = false;
    }

    fn vertex_pointer(&mut self, size: u32, stride: u32, offset: usize) {
        if size != 3 || (stride != 0 && stride != VERTEX_STRIDE) {
            warn!("unsupported vertex layout: {} components, stride {}", size, stride);
            self.vertex_source = VertexSource::None;
            return;
        }
        self.vertex_source = VertexSource::Buffer { offset };
    }

    fn client_vertex_array(&mut self, size: u32, vertices: &[f32]) {
        if size != 3 {
            warn!("unsupported client vertex size {}", size);
            self.vertex_source = VertexSource::None;
            return;
        }
        self.vertex_source = VertexSource::Client(vertices.to_vec());
    }

    fn draw_elements(&mut self, count: u32, offset: usize) {
        if !self.vertex_array {
            self.invalid("draw with the vertex array disabled");
            return;
        }
        if count == 0 {
            return;
        }
        let VertexSource::Buffer { offset: vertex_offset } = self.vertex_source else {
            self.invalid("draw without a vertex pointer");
            return;
        };
        let Some(vertex) = self.bound(BufferTarget::Array).cloned() else {
            self.invalid("draw without a vertex buffer");
            return;
        };
        let Some(index) = self.bound(BufferTarget::ElementArray).cloned() else {
            self.invalid("draw without an element buffer");
            return;
        };
        let needed = offset as u64 + count as u64 * mem::size_of::<u16>() as u64;
        if index.size() < needed {
            self.invalid("draw reads past the end of the element buffer");
            return;
        }

        let key = self.pipeline_key();
        let raw = self.current_draw();
        self.draws.push(QueuedDraw {
            key,
            vertex,
            vertex_offset: vertex_offset as wgpu::BufferAddress,
            index,
            index_offset: offset as wgpu::BufferAddress,
            index_count: count,
            raw,
        });
    }

    fn draw_client_elements(&mut self, indices: &[u16]) {
        if !self.vertex_array {
            self.invalid("draw with the vertex array disabled");
            return;
        }
        let VertexSource::Client(vertices) = &self.vertex_source else {
            self.invalid("client draw without a client vertex array");
            return;
        };
        if indices.is_empty() {
            return;
        }
        let vertex_count = vertices.len() / 3;
        if indices.iter().any(|&i| i as usize >= vertex_count) {
            self.invalid("client draw indexes past the vertex array");
            return;
        }

        let vertex = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Client Vertices"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Client Indices"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        let key = self.pipeline_key();
        let raw = self.current_draw();
        self.draws.push(QueuedDraw {
            key,
            vertex,
            vertex_offset: 0,
            index,
            index_offset: 0,
            index_count: indices.len() as u32,
            raw,
        });
    }
}
