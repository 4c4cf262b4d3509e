//! Scene data: the graph, its node kinds and the traversal matrix stacks.
//!
//! - `scene_graph` holds the node arena and the setup/render/cleanup traversals
//! - `nodes` contains the organizational kinds (null and camera)
//! - `cube` is the buffer-object quad
//! - `matrix_stack` implements the model-view/projection stacks
//! - `texture` contains the depth attachment of the window surface

pub mod cube;
pub mod matrix_stack;
pub mod nodes;
pub mod scene_graph;
pub mod texture;
