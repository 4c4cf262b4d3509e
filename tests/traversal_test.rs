use std::panic::{self, AssertUnwindSafe};

use cgmath::{Matrix4, SquareMatrix, Vector3};
use vbo_playground::{
    context::{Capabilities, MatrixMode, NO_BUFFER, RenderContext},
    data_structures::{
        cube::CubeNode,
        matrix_stack::MAX_STACK_DEPTH,
        nodes::{CameraNode, NullNode},
        scene_graph::{Propagation, SceneGraph, SceneNode},
    },
    error::SceneError,
    recorder::{DrawSource, RecordingContext},
};

use crate::common::test_utils::*;
mod common;

#[test]
fn empty_scene_draws_nothing_and_restores_the_stack() {
    let graph = plain_graph();
    let mut ctx = RecordingContext::new();

    graph.render(&mut ctx);

    assert!(ctx.draws().is_empty());
    assert!(ctx.invalid_operations().is_empty());
    assert_eq!(ctx.stack_depth(MatrixMode::ModelView), 1);
    assert_matrix_eq(&ctx.matrix(MatrixMode::ModelView), &Matrix4::identity());
}

#[test]
fn nested_translations_compose() {
    let mut graph = plain_graph();
    let root = graph.root();
    let outer = add_cube(&mut graph, root, [1.0, 0.0, 0.0]);
    add_cube(&mut graph, outer, [0.0, 2.0, 0.0]);
    let mut ctx = RecordingContext::new();
    graph.setup(&mut ctx).unwrap();

    graph.render(&mut ctx);

    let draws = draws(&ctx);
    assert_eq!(draws.len(), 2);
    assert_translation(&draws[0].model_view, [1.0, 0.0, 0.0]);
    assert_translation(&draws[1].model_view, [1.0, 2.0, 0.0]);
}

#[test]
fn siblings_do_not_inherit_each_others_transform() {
    let mut graph = plain_graph();
    let root = graph.root();
    add_cube(&mut graph, root, [3.0, 0.0, 0.0]);
    add_cube(&mut graph, root, [0.0, 0.0, -5.0]);
    let mut ctx = RecordingContext::new();
    graph.setup(&mut ctx).unwrap();

    graph.render(&mut ctx);

    let draws = draws(&ctx);
    assert_translation(&draws[0].model_view, [3.0, 0.0, 0.0]);
    assert_translation(&draws[1].model_view, [0.0, 0.0, -5.0]);
}

#[test]
fn stack_is_balanced_at_every_depth() {
    for depth in 0..20 {
        let mut graph = plain_graph();
        let mut parent = graph.root();
        for _ in 0..depth {
            parent = add_cube(&mut graph, parent, [0.0, 0.0, -1.0]);
        }
        let mut ctx = RecordingContext::new();
        graph.setup(&mut ctx).unwrap();
        let before = ctx.matrix(MatrixMode::ModelView);

        graph.render(&mut ctx);

        assert_eq!(ctx.stack_depth(MatrixMode::ModelView), 1, "depth {depth}");
        assert_matrix_eq(&ctx.matrix(MatrixMode::ModelView), &before);
        assert!(ctx.invalid_operations().is_empty(), "depth {depth}");
        assert_eq!(ctx.draws().len(), depth);
    }
}

#[test]
fn overflowing_the_stack_keeps_the_callers_matrices() {
    let mut graph = plain_graph();
    let root = graph.root();
    let mut parent = root;
    for _ in 0..MAX_STACK_DEPTH + 8 {
        parent = graph.add_child(parent, NullNode).unwrap();
    }
    add_cube(&mut graph, root, [0.0, 0.0, -2.0]);
    let mut ctx = RecordingContext::new();
    graph.setup(&mut ctx).unwrap();
    assert!(ctx.push_matrix());
    ctx.translate(3.0, 0.0, 0.0);
    let before = ctx.matrix(MatrixMode::ModelView);

    graph.render(&mut ctx);

    let invalid = ctx.invalid_operations();
    assert!(!invalid.is_empty());
    assert!(invalid.iter().all(|&what| what == "matrix stack overflow"));
    assert_eq!(ctx.stack_depth(MatrixMode::ModelView), 2);
    assert_matrix_eq(&ctx.matrix(MatrixMode::ModelView), &before);
    assert_eq!(ctx.draws().len(), 1);
}

/// Panics as soon as it is drawn.
struct FaultyNode;

impl SceneNode for FaultyNode {
    fn render_internal(&self, _: &mut dyn RenderContext) -> bool {
        panic!("faulty node drawn");
    }

    fn setup_node(&mut self, _: &mut dyn RenderContext, _: &Capabilities) -> Result<(), SceneError> {
        Ok(())
    }

    fn cleanup_node(&mut self, _: &mut dyn RenderContext) {}

    fn name(&self) -> &'static str {
        "faulty"
    }
}

#[test]
fn a_panicking_hook_still_unwinds_the_stack() {
    let mut graph = plain_graph();
    let root = graph.root();
    let group = graph.add_child(root, NullNode).unwrap();
    graph.node_mut(group).unwrap().set_position(0.0, 0.0, -1.0);
    graph.add_child(group, FaultyNode).unwrap();
    let mut ctx = RecordingContext::new();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| graph.render(&mut ctx)));

    assert!(outcome.is_err());
    assert_eq!(ctx.stack_depth(MatrixMode::ModelView), 1);
    assert_matrix_eq(&ctx.matrix(MatrixMode::ModelView), &Matrix4::identity());
    assert!(ctx.invalid_operations().is_empty());
}

#[test]
fn render_node_leaves_the_current_matrix_alone() {
    let mut graph = plain_graph();
    let root = graph.root();
    let cube = add_cube(&mut graph, root, [0.0, 1.0, 0.0]);
    let mut ctx = RecordingContext::new();
    graph.setup(&mut ctx).unwrap();
    ctx.translate(5.0, 0.0, 0.0);
    let before = ctx.matrix(MatrixMode::ModelView);

    graph.render_node(cube, &mut ctx);

    assert_translation(&draws(&ctx)[0].model_view, [5.0, 1.0, 0.0]);
    assert_matrix_eq(&ctx.matrix(MatrixMode::ModelView), &before);
}

#[test]
fn invisible_nodes_hide_their_subtree() {
    let mut graph = plain_graph();
    let root = graph.root();
    let hidden = add_cube(&mut graph, root, [0.0, 0.0, 0.0]);
    add_cube(&mut graph, hidden, [0.0, 0.0, 0.0]);
    add_cube(&mut graph, root, [1.0, 0.0, 0.0]);
    graph.node_mut(hidden).unwrap().set_visible(false);
    let mut ctx = RecordingContext::new();
    graph.setup(&mut ctx).unwrap();

    graph.render(&mut ctx);

    let draws = draws(&ctx);
    assert_eq!(draws.len(), 1);
    assert_translation(&draws[0].model_view, [1.0, 0.0, 0.0]);
}

#[test]
fn render_hook_can_stop_the_descent() {
    let mut graph = plain_graph();
    let root = graph.root();
    let stop = graph.add_child(root, CountingNode::leaf()).unwrap();
    let below = graph.add_child(stop, CountingNode::new()).unwrap();
    let mut ctx = RecordingContext::new();

    graph.render(&mut ctx);

    assert_eq!(graph.kind::<CountingNode>(stop).unwrap().renders.get(), 1);
    assert_eq!(graph.kind::<CountingNode>(below).unwrap().renders.get(), 0);
}

#[test]
fn colour_is_set_per_node_with_full_alpha() {
    let mut graph = plain_graph();
    let root = graph.root();
    add_cube(&mut graph, root, [0.0, 0.0, 0.0]);
    let green = add_cube(&mut graph, root, [0.0, 0.0, 0.0]);
    graph.node_mut(green).unwrap().set_colour(0.0, 1.0, 0.0);
    let mut ctx = RecordingContext::new();
    graph.setup(&mut ctx).unwrap();

    graph.render(&mut ctx);

    let draws = draws(&ctx);
    assert_eq!(draws[0].colour, [1.0, 1.0, 1.0, 1.0]);
    assert_eq!(draws[1].colour, [0.0, 1.0, 0.0, 1.0]);
}

#[test]
fn camera_and_eye_offset_precede_the_scene() {
    let mut graph = SceneGraph::new().with_eye_offset(0.5);
    let root = graph.root();
    add_cube(&mut graph, root, [0.0, 0.0, -5.0]);
    let camera = graph.insert(CameraNode::new(vbo_playground::camera::Camera::new(
        (0.0, 0.0, 3.0),
        cgmath::Deg(-90.0),
        cgmath::Deg(0.0),
    )));
    graph.set_active_camera(camera).unwrap();
    let mut ctx = RecordingContext::new();
    graph.setup(&mut ctx).unwrap();

    graph.render(&mut ctx);

    // view moves the world by -3 along z, then the eye shifts it along x
    assert_translation(&draws(&ctx)[0].model_view, [0.5, 0.0, -8.0]);
}

#[test]
fn setup_gives_each_cube_two_distinct_buffers() {
    let mut graph = plain_graph();
    let root = graph.root();
    let a = add_cube(&mut graph, root, [0.0, 0.0, 0.0]);
    let b = add_cube(&mut graph, root, [0.0, 0.0, 0.0]);
    let mut ctx = RecordingContext::new();

    graph.setup(&mut ctx).unwrap();

    let (av, ai) = graph.kind::<CubeNode>(a).unwrap().buffers().unwrap();
    let (bv, bi) = graph.kind::<CubeNode>(b).unwrap().buffers().unwrap();
    let mut handles = vec![av, ai, bv, bi];
    assert!(!handles.contains(&NO_BUFFER));
    handles.sort();
    handles.dedup();
    assert_eq!(handles.len(), 4);

    let vertices = ctx.buffer(av).unwrap();
    assert_eq!(vertices.data.len(), 4 * 3 * std::mem::size_of::<f32>());
    let indices = ctx.buffer(ai).unwrap();
    assert_eq!(indices.data.len(), 6 * std::mem::size_of::<u16>());
    assert_eq!(ctx.binding(vbo_playground::context::BufferTarget::Array), NO_BUFFER);
}

#[test]
fn draws_use_the_nodes_buffers() {
    let mut graph = plain_graph();
    let root = graph.root();
    let cube = add_cube(&mut graph, root, [0.0, 0.0, 0.0]);
    let mut ctx = RecordingContext::new();
    graph.setup(&mut ctx).unwrap();
    let (vertex, index) = graph.kind::<CubeNode>(cube).unwrap().buffers().unwrap();

    graph.render(&mut ctx);

    let draws = draws(&ctx);
    assert_eq!(draws[0].index_count, 6);
    assert_eq!(draws[0].source, DrawSource::Buffers { vertex, index });
}

#[test]
fn cleanup_deletes_every_handle_once() {
    let mut graph = plain_graph();
    let root = graph.root();
    let a = add_cube(&mut graph, root, [0.0, 0.0, 0.0]);
    let b = add_cube(&mut graph, a, [0.0, 0.0, 0.0]);
    let mut ctx = RecordingContext::new();
    graph.setup(&mut ctx).unwrap();
    let (av, ai) = graph.kind::<CubeNode>(a).unwrap().buffers().unwrap();
    let (bv, bi) = graph.kind::<CubeNode>(b).unwrap().buffers().unwrap();

    graph.cleanup(&mut ctx);

    let mut deleted = ctx.deleted_buffers();
    deleted.sort();
    let mut expected = vec![av, ai, bv, bi];
    expected.sort();
    assert_eq!(deleted, expected);
    assert_eq!(ctx.live_buffers(), 0);
    assert!(!graph.kind::<CubeNode>(a).unwrap().is_set_up());

    // a second cleanup has nothing left to release
    graph.cleanup(&mut ctx);
    assert_eq!(ctx.deleted_buffers().len(), 4);
}

#[test]
fn cleanup_without_setup_deletes_nothing() {
    let mut graph = plain_graph();
    let root = graph.root();
    add_cube(&mut graph, root, [0.0, 0.0, 0.0]);
    let mut ctx = RecordingContext::new();

    graph.cleanup(&mut ctx);

    assert!(ctx.deleted_buffers().is_empty());
}

#[test]
fn rendering_before_setup_draws_nothing() {
    let mut graph = plain_graph();
    let root = graph.root();
    add_cube(&mut graph, root, [0.0, 0.0, 0.0]);
    let mut ctx = RecordingContext::new();

    graph.render(&mut ctx);

    assert!(ctx.draws().is_empty());
    assert!(ctx.invalid_operations().is_empty());
}

#[test]
fn recursive_propagation_reaches_grandchildren() {
    let mut graph = plain_graph();
    let root = graph.root();
    let child = graph.add_child(root, CountingNode::new()).unwrap();
    let grandchild = graph.add_child(child, CountingNode::new()).unwrap();
    let mut ctx = RecordingContext::new();

    graph.setup(&mut ctx).unwrap();
    graph.cleanup(&mut ctx);

    for id in [child, grandchild] {
        let node = graph.kind::<CountingNode>(id).unwrap();
        assert_eq!((node.setups, node.cleanups), (1, 1));
    }
}

#[test]
fn shallow_propagation_stops_at_immediate_children() {
    let mut graph = plain_graph().with_propagation(Propagation::ImmediateChildren);
    let root = graph.root();
    let child = graph.add_child(root, CountingNode::new()).unwrap();
    let grandchild = graph.add_child(child, CountingNode::new()).unwrap();
    let mut ctx = RecordingContext::new();

    graph.setup(&mut ctx).unwrap();
    graph.cleanup(&mut ctx);

    let child = graph.kind::<CountingNode>(child).unwrap();
    assert_eq!((child.setups, child.cleanups), (1, 1));
    let grandchild = graph.kind::<CountingNode>(grandchild).unwrap();
    assert_eq!((grandchild.setups, grandchild.cleanups), (0, 0));
}

#[test]
fn without_buffer_objects_cubes_draw_from_client_memory() {
    let mut graph = plain_graph();
    let root = graph.root();
    let cube = add_cube(&mut graph, root, [0.0, 0.0, 0.0]);
    let mut ctx = RecordingContext::with_extensions("GL_OES_fixed_point");

    graph.setup(&mut ctx).unwrap();
    graph.render(&mut ctx);
    graph.cleanup(&mut ctx);

    assert!(!graph.capabilities().vertex_buffer_objects);
    assert_eq!(gen_buffer_calls(&ctx), 0);
    assert!(ctx.deleted_buffers().is_empty());
    let draws = draws(&ctx);
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].index_count, 6);
    assert_eq!(draws[0].source, DrawSource::Client { vertex_count: 4 });
    assert!(!graph.kind::<CubeNode>(cube).unwrap().is_set_up());
}

#[test]
fn failed_allocation_only_aborts_that_node() {
    let mut graph = plain_graph();
    let root = graph.root();
    let first = add_cube(&mut graph, root, [0.0, 0.0, 0.0]);
    let second = add_cube(&mut graph, root, [1.0, 0.0, 0.0]);
    let counter = graph.add_child(root, CountingNode::new()).unwrap();
    let mut ctx = RecordingContext::new().with_buffer_limit(2);

    let result = graph.setup(&mut ctx);

    match result {
        Err(SceneError::Setup(failed)) => {
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].0, second);
            assert!(matches!(failed[0].1, SceneError::OutOfBufferMemory { .. }));
        }
        other => panic!("expected a setup failure, got {other:?}"),
    }
    assert!(graph.kind::<CubeNode>(first).unwrap().is_set_up());
    assert!(!graph.kind::<CubeNode>(second).unwrap().is_set_up());
    assert_eq!(graph.kind::<CountingNode>(counter).unwrap().setups, 1);

    graph.render(&mut ctx);
    assert_eq!(ctx.draws().len(), 1);
}

#[test]
fn organizational_nodes_only_transform() {
    let mut graph = plain_graph();
    let root = graph.root();
    let group = graph.add_child(root, NullNode).unwrap();
    graph.node_mut(group).unwrap().set_position(0.0, 0.0, -10.0);
    add_cube(&mut graph, group, [1.0, 0.0, 0.0]);
    let mut ctx = RecordingContext::new();
    graph.setup(&mut ctx).unwrap();

    graph.render(&mut ctx);

    let draws = draws(&ctx);
    assert_eq!(draws.len(), 1);
    assert_translation(&draws[0].model_view, [1.0, 0.0, -10.0]);
    assert_eq!(
        graph.node(group).unwrap().position(),
        Vector3::new(0.0, 0.0, -10.0)
    );
}
