//! A node that draws a static quad from buffer objects.
//!
//! Only the front face of the cube is built: four vertices and two triangles.

use log::{debug, warn};

use crate::{
    context::{BufferId, BufferTarget, BufferUsage, Capabilities, NO_BUFFER, RenderContext},
    data_structures::scene_graph::SceneNode,
    error::SceneError,
};

/// Two counter-clockwise triangles covering the quad.
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Components per vertex.
pub const VERTEX_SIZE: u32 = 3;

/// A vertex as uploaded into the vertex buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 3],
}

/// The quad's corners in the z = 0 plane, centred on the origin.
pub fn quad_vertices(width: f32, height: f32) -> [QuadVertex; 4] {
    let (x, y) = (width / 2.0, height / 2.0);
    [
        QuadVertex { position: [x, y, 0.0] },
        QuadVertex { position: [-x, y, 0.0] },
        QuadVertex { position: [-x, -y, 0.0] },
        QuadVertex { position: [x, -y, 0.0] },
    ]
}

/// Where the geometry lives between setup and cleanup.
#[derive(Clone, Debug, Default, PartialEq)]
enum Geometry {
    #[default]
    Unloaded,
    Buffers {
        vertex: BufferId,
        index: BufferId,
    },
    /// Used when the context has no buffer objects.
    Client {
        vertices: Vec<f32>,
        indices: Vec<u16>,
    },
}

#[derive(Clone, Debug)]
pub struct CubeNode {
    width: f32,
    height: f32,
    depth: f32,
    geometry: Geometry,
}

impl CubeNode {
    /// A 1x1x1 cube.
    pub fn new() -> Self {
        Self::with_dimensions(1.0, 1.0, 1.0)
    }

    pub fn with_dimensions(width: f32, height: f32, depth: f32) -> Self {
        Self {
            width,
            height,
            depth,
            geometry: Geometry::Unloaded,
        }
    }

    pub fn dimensions(&self) -> (f32, f32, f32) {
        (self.width, self.height, self.depth)
    }

    /// The `(vertex, index)` buffer handles while set up with buffer objects.
    pub fn buffers(&self) -> Option<(BufferId, BufferId)> {
        match self.geometry {
            Geometry::Buffers { vertex, index } => Some((vertex, index)),
            _ => None,
        }
    }

    pub fn is_set_up(&self) -> bool {
        self.geometry != Geometry::Unloaded
    }

    /// True when the geometry is drawn from client memory.
    pub fn uses_client_arrays(&self) -> bool {
        matches!(self.geometry, Geometry::Client { .. })
    }
}

impl Default for CubeNode {
    fn default() -> Self {
        Self::new()
    }
}

fn upload(
    ctx: &mut dyn RenderContext,
    vertex: BufferId,
    index: BufferId,
    vertices: &[QuadVertex],
) -> Result<(), SceneError> {
    ctx.bind_buffer(BufferTarget::Array, vertex);
    ctx.buffer_data(
        BufferTarget::Array,
        bytemuck::cast_slice(vertices),
        BufferUsage::StaticDraw,
    )?;
    ctx.bind_buffer(BufferTarget::ElementArray, index);
    ctx.buffer_data(
        BufferTarget::ElementArray,
        bytemuck::cast_slice(&QUAD_INDICES),
        BufferUsage::StaticDraw,
    )
}

impl SceneNode for CubeNode {
    fn render_internal(&self, ctx: &mut dyn RenderContext) -> bool {
        match &self.geometry {
            Geometry::Buffers { vertex, index } => {
                ctx.bind_buffer(BufferTarget::Array, *vertex);
                ctx.bind_buffer(BufferTarget::ElementArray, *index);
                ctx.enable_vertex_array();
                ctx.vertex_pointer(VERTEX_SIZE, 0, 0);
                ctx.draw_elements(QUAD_INDICES.len() as u32, 0);
                ctx.disable_vertex_array();
                ctx.bind_buffer(BufferTarget::Array, NO_BUFFER);
                ctx.bind_buffer(BufferTarget::ElementArray, NO_BUFFER);
            }
            Geometry::Client { vertices, indices } => {
                ctx.enable_vertex_array();
                ctx.client_vertex_array(VERTEX_SIZE, vertices);
                ctx.draw_client_elements(indices);
                ctx.disable_vertex_array();
            }
            Geometry::Unloaded => warn!("cube rendered before setup, nothing drawn"),
        }
        true
    }

    fn setup_node(
        &mut self,
        ctx: &mut dyn RenderContext,
        capabilities: &Capabilities,
    ) -> Result<(), SceneError> {
        if self.is_set_up() {
            // the handles died with the previous context
            debug!("re-uploading cube geometry");
        }
        self.geometry = Geometry::Unloaded;
        let vertices = quad_vertices(self.width, self.height);

        if !capabilities.vertex_buffer_objects {
            self.geometry = Geometry::Client {
                vertices: bytemuck::cast_slice(&vertices).to_vec(),
                indices: QUAD_INDICES.to_vec(),
            };
            return Ok(());
        }

        let handles = ctx.gen_buffers(2)?;
        let &[vertex, index] = handles.as_slice() else {
            ctx.delete_buffers(&handles);
            return Err(SceneError::OutOfBufferMemory {
                requested: 2,
                available: handles.len(),
            });
        };

        let uploaded = upload(ctx, vertex, index, &vertices);
        ctx.bind_buffer(BufferTarget::Array, NO_BUFFER);
        ctx.bind_buffer(BufferTarget::ElementArray, NO_BUFFER);
        if let Err(e) = uploaded {
            ctx.delete_buffers(&handles);
            return Err(e);
        }

        debug!("cube uploaded into buffers {} and {}", vertex, index);
        self.geometry = Geometry::Buffers { vertex, index };
        Ok(())
    }

    fn cleanup_node(&mut self, ctx: &mut dyn RenderContext) {
        if let Geometry::Buffers { vertex, index } = std::mem::take(&mut self.geometry) {
            ctx.delete_buffers(&[vertex, index]);
        }
    }

    fn name(&self) -> &'static str {
        "cube"
    }
}
