//! vbo-playground
//!
//! A small scene graph that draws static geometry from GPU buffer objects.
//! Nodes are kept in an arena and rendered by a depth-first traversal that
//! composes each node's translation onto a GL-style model-view stack. Node
//! kinds plug in through the [`SceneNode`](data_structures::scene_graph::SceneNode)
//! hooks for setup, rendering and cleanup.
//!
//! High-level modules
//! - `camera`: camera and perspective projection parameters
//! - `context`: the fixed-function [`RenderContext`](context::RenderContext) surface the graph draws through
//! - `data_structures`: the scene graph, node kinds and matrix stacks
//! - `error`: [`SceneError`](error::SceneError)
//! - `flow`: the scene lifecycle and the winit event loop
//! - `pipelines`: the wgpu pipeline for flat-coloured geometry
//! - `recorder`: a headless context that records every call, used by tests
//! - `render`: the wgpu-backed render context
//!

pub mod camera;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod flow;
pub mod pipelines;
pub mod recorder;
pub mod render;

pub use error::SceneError;
