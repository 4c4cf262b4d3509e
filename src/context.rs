//! The drawing surface the scene graph renders into.
//!
//! [`RenderContext`] is the only thing the scene graph knows about the host:
//! a fixed-function style matrix stack, colour and clear state, buffer objects
//! and indexed draws. [`crate::recorder::RecordingContext`] implements it in
//! memory, [`crate::render::WgpuContext`] on top of wgpu.

use std::ops::BitOr;

use cgmath::{Matrix4, Vector3};

use crate::error::SceneError;

/// Opaque buffer object handle. `0` never names a buffer and unbinds a target.
pub type BufferId = u32;

/// The handle that unbinds a buffer target.
pub const NO_BUFFER: BufferId = 0;

/// Which matrix stack the matrix operations apply to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatrixMode {
    ModelView,
    Projection,
}

/// Server-side state toggled with `enable`/`disable`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    DepthTest,
    CullFace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    Front,
    Back,
}

/// Vertex winding of front-facing triangles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Winding {
    Cw,
    Ccw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attributes.
    Array,
    /// `u16` indices.
    ElementArray,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Uploaded once, drawn many times.
    StaticDraw,
}

/// Buffers cleared by [`RenderContext::clear`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClearMask {
    pub colour: bool,
    pub depth: bool,
}

impl ClearMask {
    pub const COLOUR: ClearMask = ClearMask {
        colour: true,
        depth: false,
    };
    pub const DEPTH: ClearMask = ClearMask {
        colour: false,
        depth: true,
    };
}

impl BitOr for ClearMask {
    type Output = ClearMask;

    fn bitor(self, rhs: ClearMask) -> ClearMask {
        ClearMask {
            colour: self.colour || rhs.colour,
            depth: self.depth || rhs.depth,
        }
    }
}

/// Features detected from a context's extension string.
///
/// Computed once per [`crate::data_structures::scene_graph::SceneGraph::setup`]
/// and handed to every node's setup hook.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub vertex_buffer_objects: bool,
}

impl Capabilities {
    /// Substring that marks buffer-object support in an extension string.
    pub const VERTEX_BUFFER_OBJECT: &'static str = "vertex_buffer_object";

    pub fn from_extensions(extensions: &str) -> Self {
        Self {
            vertex_buffer_objects: extensions.contains(Self::VERTEX_BUFFER_OBJECT),
        }
    }
}

/// A fixed-function style drawing surface.
///
/// Matrix operations act on the stack selected by [`matrix_mode`](Self::matrix_mode).
/// Draws use the current colour and the product of the projection and
/// model-view tops at the time of the call. Indices are always `u16` and
/// vertices are three `f32`s.
pub trait RenderContext {
    /// Space separated list of supported extensions.
    fn extensions(&self) -> String;

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32);

    fn matrix_mode(&mut self, mode: MatrixMode);

    fn load_identity(&mut self);

    /// Replaces the current matrix.
    fn load_matrix(&mut self, matrix: &Matrix4<f32>);

    /// Post-multiplies the current matrix: `top = top * matrix`.
    fn mult_matrix(&mut self, matrix: &Matrix4<f32>);

    /// Duplicates the top of the current stack. Returns `false` and leaves the
    /// stack untouched when it is already full.
    fn push_matrix(&mut self) -> bool;

    fn pop_matrix(&mut self);

    fn translate(&mut self, x: f32, y: f32, z: f32) {
        self.mult_matrix(&Matrix4::from_translation(Vector3::new(x, y, z)));
    }

    fn colour(&mut self, r: f32, g: f32, b: f32, a: f32);

    fn clear_colour(&mut self, r: f32, g: f32, b: f32, a: f32);

    fn clear(&mut self, mask: ClearMask);

    fn enable(&mut self, capability: Capability);

    fn disable(&mut self, capability: Capability);

    fn cull_face(&mut self, face: Face);

    fn front_face(&mut self, winding: Winding);

    /// Allocates `count` fresh, non-zero buffer handles.
    fn gen_buffers(&mut self, count: usize) -> Result<Vec<BufferId>, SceneError>;

    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferId);

    /// Replaces the contents of the buffer bound to `target`.
    fn buffer_data(
        &mut self,
        target: BufferTarget,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<(), SceneError>;

    /// Deletes the given handles. Unknown handles and `0` are ignored.
    fn delete_buffers(&mut self, buffers: &[BufferId]);

    fn enable_vertex_array(&mut self);

    fn disable_vertex_array(&mut self);

    /// Sources vertices from the bound array buffer, starting at byte `offset`.
    fn vertex_pointer(&mut self, size: u32, stride: u32, offset: usize);

    /// Sources vertices from host memory instead of a buffer object.
    fn client_vertex_array(&mut self, size: u32, vertices: &[f32]);

    /// Draws `count` indices as triangles from the bound element buffer,
    /// starting at byte `offset`.
    fn draw_elements(&mut self, count: u32, offset: usize);

    /// Draws triangles from host-side indices.
    fn draw_client_elements(&mut self, indices: &[u16]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_buffer_objects_in_extension_string() {
        let caps = Capabilities::from_extensions("GL_OES_byte_coordinates GL_ARB_vertex_buffer_object");
        assert!(caps.vertex_buffer_objects);
        let caps = Capabilities::from_extensions("GL_OES_byte_coordinates");
        assert!(!caps.vertex_buffer_objects);
        assert_eq!(Capabilities::from_extensions(""), Capabilities::default());
    }

    #[test]
    fn clear_masks_combine() {
        let both = ClearMask::COLOUR | ClearMask::DEPTH;
        assert!(both.colour && both.depth);
    }
}
