#![allow(dead_code)]

use cgmath::Matrix4;
use vbo_playground::{
    context::{Capabilities, RenderContext},
    data_structures::{
        cube::CubeNode,
        scene_graph::{NodeId, SceneGraph, SceneNode},
    },
    error::SceneError,
    recorder::{Call, DrawCall, RecordingContext},
};

pub const EPSILON: f32 = 1e-5;

/// Asserts two matrices are equal up to [`EPSILON`] per element.
pub fn assert_matrix_eq(actual: &Matrix4<f32>, expected: &Matrix4<f32>) {
    for c in 0..4 {
        for r in 0..4 {
            assert!(
                (actual[c][r] - expected[c][r]).abs() < EPSILON,
                "matrices differ at [{c}][{r}]:\n{actual:?}\n{expected:?}"
            );
        }
    }
}

/// The translation part of a model-view matrix.
pub fn translation(matrix: &Matrix4<f32>) -> [f32; 3] {
    [matrix.w.x, matrix.w.y, matrix.w.z]
}

pub fn assert_translation(matrix: &Matrix4<f32>, expected: [f32; 3]) {
    let actual = translation(matrix);
    for i in 0..3 {
        assert!(
            (actual[i] - expected[i]).abs() < EPSILON,
            "translation {actual:?} != {expected:?}"
        );
    }
}

/// A graph without eye offset, so draws carry exactly the node translations.
pub fn plain_graph() -> SceneGraph {
    SceneGraph::new().with_eye_offset(0.0)
}

/// Adds a cube under `parent` at `position`.
pub fn add_cube(graph: &mut SceneGraph, parent: NodeId, position: [f32; 3]) -> NodeId {
    let id = graph
        .add_child(parent, CubeNode::new())
        .expect("parent exists");
    graph
        .node_mut(id)
        .expect("just inserted")
        .set_position(position[0], position[1], position[2]);
    id
}

pub fn draws(ctx: &RecordingContext) -> Vec<DrawCall> {
    ctx.draws().into_iter().cloned().collect()
}

pub fn gen_buffer_calls(ctx: &RecordingContext) -> usize {
    ctx.calls()
        .iter()
        .filter(|call| matches!(call, Call::GenBuffers(_)))
        .count()
}

/// A node kind that counts its hook invocations.
#[derive(Debug, Default)]
pub struct CountingNode {
    pub setups: u32,
    pub renders: std::cell::Cell<u32>,
    pub cleanups: u32,
    /// Returned from `render_internal`.
    pub descend: bool,
}

impl CountingNode {
    pub fn new() -> Self {
        Self {
            descend: true,
            ..Default::default()
        }
    }

    pub fn leaf() -> Self {
        Self::default()
    }
}

impl SceneNode for CountingNode {
    fn render_internal(&self, _: &mut dyn RenderContext) -> bool {
        self.renders.set(self.renders.get() + 1);
        self.descend
    }

    fn setup_node(&mut self, _: &mut dyn RenderContext, _: &Capabilities) -> Result<(), SceneError> {
        self.setups += 1;
        Ok(())
    }

    fn cleanup_node(&mut self, _: &mut dyn RenderContext) {
        self.cleanups += 1;
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}
