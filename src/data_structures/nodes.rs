//! Node kinds without geometry: organizational nodes and cameras.

use cgmath::Matrix4;

use crate::{
    camera::Camera,
    context::{Capabilities, RenderContext},
    data_structures::scene_graph::SceneNode,
    error::SceneError,
};

/// A node that draws nothing. Used for the root and for grouping.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullNode;

impl SceneNode for NullNode {
    fn render_internal(&self, _: &mut dyn RenderContext) -> bool {
        true
    }

    fn setup_node(&mut self, _: &mut dyn RenderContext, _: &Capabilities) -> Result<(), SceneError> {
        Ok(())
    }

    fn cleanup_node(&mut self, _: &mut dyn RenderContext) {}

    fn name(&self) -> &'static str {
        "null"
    }
}

/// A node that provides the view transform when it is the active camera.
///
/// Like [`NullNode`] it draws nothing when it is part of the tree.
#[derive(Clone, Copy, Debug, Default)]
pub struct CameraNode {
    pub camera: Camera,
}

impl CameraNode {
    pub fn new(camera: Camera) -> Self {
        Self { camera }
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        self.camera.calc_matrix()
    }
}

impl SceneNode for CameraNode {
    fn render_internal(&self, _: &mut dyn RenderContext) -> bool {
        true
    }

    fn setup_node(&mut self, _: &mut dyn RenderContext, _: &Capabilities) -> Result<(), SceneError> {
        Ok(())
    }

    fn cleanup_node(&mut self, _: &mut dyn RenderContext) {}

    fn name(&self) -> &'static str {
        "camera"
    }
}
