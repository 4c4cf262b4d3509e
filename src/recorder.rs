//! An in-memory [`RenderContext`] that tracks state and records every call.
//!
//! Used headless and in tests: it keeps real matrix stacks, buffer objects
//! and bindings, validates draws the way a GL implementation would, and
//! appends a [`Call`] for everything observable.

use std::collections::{HashMap, HashSet};

use cgmath::{Matrix4, SquareMatrix};
use log::error;

use crate::{
    context::{
        BufferId, BufferTarget, BufferUsage, Capabilities, Capability, ClearMask, Face, MatrixMode,
        NO_BUFFER, RenderContext, Winding,
    },
    data_structures::matrix_stack::{MatrixStacks, StackError},
    error::SceneError,
};

/// Extension string reported by [`RecordingContext::new`].
pub const DEFAULT_EXTENSIONS: &str =
    "GL_OES_byte_coordinates GL_OES_fixed_point GL_OES_single_precision GL_ARB_vertex_buffer_object";

/// A buffer object's contents.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BufferObject {
    pub data: Vec<u8>,
    pub usage: Option<BufferUsage>,
}

/// Where a draw read its vertices and indices from.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawSource {
    Buffers { vertex: BufferId, index: BufferId },
    Client { vertex_count: usize },
}

/// A draw as seen by the context.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub index_count: u32,
    pub source: DrawSource,
    pub model_view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub colour: [f32; 4],
}

/// Observable operations in the order they were issued.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Viewport { x: i32, y: i32, width: u32, height: u32 },
    ClearColour([f32; 4]),
    Clear(ClearMask),
    Enable(Capability),
    Disable(Capability),
    CullFace(Face),
    FrontFace(Winding),
    GenBuffers(Vec<BufferId>),
    BufferData { buffer: BufferId, size: usize, usage: BufferUsage },
    DeleteBuffers(Vec<BufferId>),
    Draw(DrawCall),
    /// A call that a GL implementation would reject with an error.
    InvalidOperation(&'static str),
}

#[derive(Clone, Debug, Default)]
struct ClientState {
    vertex_array: bool,
    vertex_pointer: Option<(u32, u32, usize)>,
    client_vertices: Option<Vec<f32>>,
}

#[derive(Debug)]
pub struct RecordingContext {
    extensions: String,
    stacks: MatrixStacks,
    colour: [f32; 4],
    enabled: HashSet<Capability>,
    buffers: HashMap<BufferId, BufferObject>,
    next_buffer: BufferId,
    buffer_limit: Option<usize>,
    array_binding: BufferId,
    element_binding: BufferId,
    client: ClientState,
    calls: Vec<Call>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::with_extensions(DEFAULT_EXTENSIONS)
    }

    pub fn with_extensions(extensions: &str) -> Self {
        Self {
            extensions: extensions.to_string(),
            stacks: MatrixStacks::new(),
            colour: [1.0, 1.0, 1.0, 1.0],
            enabled: HashSet::new(),
            buffers: HashMap::new(),
            next_buffer: 1,
            buffer_limit: None,
            array_binding: NO_BUFFER,
            element_binding: NO_BUFFER,
            client: ClientState::default(),
            calls: Vec::new(),
        }
    }

    /// Caps the number of live buffer objects; further allocations fail.
    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = Some(limit);
        self
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn draws(&self) -> Vec<&DrawCall> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Draw(draw) => Some(draw),
                _ => None,
            })
            .collect()
    }

    /// Every handle passed to `delete_buffers`, in order.
    pub fn deleted_buffers(&self) -> Vec<BufferId> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::DeleteBuffers(ids) => Some(ids.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn invalid_operations(&self) -> Vec<&'static str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::InvalidOperation(what) => Some(*what),
                _ => None,
            })
            .collect()
    }

    pub fn buffer(&self, id: BufferId) -> Option<&BufferObject> {
        self.buffers.get(&id)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn binding(&self, target: BufferTarget) -> BufferId {
        match target {
            BufferTarget::Array => self.array_binding,
            BufferTarget::ElementArray => self.element_binding,
        }
    }

    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.enabled.contains(&capability)
    }

    pub fn current_colour(&self) -> [f32; 4] {
        self.colour
    }

    pub fn matrix(&self, mode: MatrixMode) -> Matrix4<f32> {
        self.stacks.top(mode)
    }

    pub fn stack_depth(&self, mode: MatrixMode) -> usize {
        self.stacks.depth(mode)
    }

    pub fn current_matrix_mode(&self) -> MatrixMode {
        self.stacks.mode()
    }

    fn invalid(&mut self, what: &'static str) {
        error!("invalid operation: {}", what);
        self.calls.push(Call::InvalidOperation(what));
    }

    fn bound_mut(&mut self, target: BufferTarget) -> Option<&mut BufferObject> {
        let id = self.binding(target);
        self.buffers.get_mut(&id)
    }

    fn record_draw(&mut self, index_count: u32, source: DrawSource) {
        self.calls.push(Call::Draw(DrawCall {
            index_count,
            source,
            model_view: self.stacks.top(MatrixMode::ModelView),
            projection: self.stacks.top(MatrixMode::Projection),
            colour: self.colour,
        }));
    }
}

impl Default for RecordingContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderContext for RecordingContext {
    fn extensions(&self) -> String {
        self.extensions.clone()
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.calls.push(Call::Viewport {
            x,
            y,
            width,
            height,
        });
    }

    fn matrix_mode(&mut self, mode: MatrixMode) {
        self.stacks.set_mode(mode);
    }

    fn load_identity(&mut self) {
        self.stacks.load(Matrix4::identity());
    }

    fn load_matrix(&mut self, matrix: &Matrix4<f32>) {
        self.stacks.load(*matrix);
    }

    fn mult_matrix(&mut self, matrix: &Matrix4<f32>) {
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
        self.calls.push(Call::ClearColour([r, g, b, a]));
    }

    fn clear(&mut self, mask: ClearMask) {
        self.calls.push(Call::Clear(mask));
    }

    fn enable(&mut self, capability: Capability) {
        self.enabled.insert(capability);
        self.calls.push(Call::Enable(capability));
    }

    fn disable(&mut self, capability: Capability) {
        self.enabled.remove(&capability);
        self.calls.push(Call::Disable(capability));
    }

    fn cull_face(&mut self, face: Face) {
        self.calls.push(Call::CullFace(face));
    }

    fn front_face(&mut self, winding: Winding) {
        self.calls.push(Call::FrontFace(winding));
    }

    fn gen_buffers(&mut self, count: usize) -> Result<Vec<BufferId>, SceneError> {
        if !self.extensions.contains(Capabilities::VERTEX_BUFFER_OBJECT) {
            return Err(SceneError::CapabilityUnsupported {
                extensions: self.extensions.clone(),
            });
        }
        if let Some(limit) = self.buffer_limit {
            let available = limit.saturating_sub(self.buffers.len());
            if count > available {
                return Err(SceneError::OutOfBufferMemory {
                    requested: count,
                    available,
                });
            }
        }
        let ids: Vec<BufferId> = (0..count as BufferId)
            .map(|i| self.next_buffer + i)
            .collect();
        self.next_buffer += count as BufferId;
        for id in &ids {
            self.buffers.insert(*id, BufferObject::default());
        }
        self.calls.push(Call::GenBuffers(ids.clone()));
        Ok(ids)
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferId) {
        if buffer != NO_BUFFER && !self.buffers.contains_key(&buffer) {
            self.invalid("bind of an unknown buffer");
            return;
        }
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
        let id = self.binding(target);
        let Some(buffer) = self.bound_mut(target) else {
            return Err(SceneError::NoBufferBound(target));
        };
        buffer.data = data.to_vec();
        buffer.usage = Some(usage);
        self.calls.push(Call::BufferData {
            buffer: id,
            size: data.len(),
            usage,
        });
        Ok(())
    }

    fn delete_buffers(&mut self, buffers: &[BufferId]) {
        for id in buffers {
            if self.buffers.remove(id).is_some() {
                if self.array_binding == *id {
                    self.array_binding = NO_BUFFER;
                }
                if self.element_binding == *id {
                    self.element_binding = NO_BUFFER;
                }
            }
        }
        self.calls.push(Call::DeleteBuffers(buffers.to_vec()));
    }

    fn enable_vertex_array(&mut self) {
        self.client.vertex_array = true;
    }

    fn disable_vertex_array(&mut self) {
        self.client.vertex_array = false;
    }

    fn vertex_pointer(&mut self, size: u32, stride: u32, offset: usize) {
        self.client.vertex_pointer = Some((size, stride, offset));
        self.client.client_vertices = None;
    }

    fn client_vertex_array(&mut self, size: u32, vertices: &[f32]) {
        self.client.vertex_pointer = Some((size, 0, 0));
        self.client.client_vertices = Some(vertices.to_vec());
    }

    fn draw_elements(&mut self, count: u32, offset: usize) {
        if !self.client.vertex_array {
            self.invalid("draw with the vertex array disabled");
            return;
        }
        let (vertex, index) = (self.array_binding, self.element_binding);
        if vertex == NO_BUFFER || self.client.vertex_pointer.is_none() {
            self.invalid("draw without a vertex buffer");
            return;
        }
        let Some(indices) = self.buffers.get(&index) else {
            self.invalid("draw without an element buffer");
            return;
        };
        let needed = offset + count as usize * std::mem::size_of::<u16>();
        if indices.data.len() < needed {
            self.invalid("draw reads past the end of the element buffer");
            return;
        }
        self.record_draw(count, DrawSource::Buffers { vertex, index });
    }

    fn draw_client_elements(&mut self, indices: &[u16]) {
        if !self.client.vertex_array {
            self.invalid("draw with the vertex array disabled");
            return;
        }
        let Some(vertices) = &self.client.client_vertices else {
            self.invalid("client draw without a client vertex array");
            return;
        };
        let size = self.client.vertex_pointer.map_or(3, |(size, _, _)| size.max(1)) as usize;
        let vertex_count = vertices.len() / size;
        if indices.iter().any(|&i| i as usize >= vertex_count) {
            self.invalid("client draw indexes past the vertex array");
            return;
        }
        self.record_draw(indices.len() as u32, DrawSource::Client { vertex_count });
    }
}
