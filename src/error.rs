//! Error types for scene construction and GPU resource handling.

use thiserror::Error;

use crate::{context::BufferTarget, data_structures::scene_graph::NodeId};

/// Errors reported by the scene graph and by render contexts.
///
/// Only setup-time conditions are recoverable. Broken state at draw time
/// (missing buffers, unbalanced matrix stacks) is logged by the context and
/// never surfaces here.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("buffer objects are not supported by this context (extensions: {extensions:?})")]
    CapabilityUnsupported { extensions: String },

    #[error("out of buffer memory: requested {requested}, {available} available")]
    OutOfBufferMemory { requested: usize, available: usize },

    #[error("no buffer bound to {0:?}")]
    NoBufferBound(BufferTarget),

    #[error("unknown scene node {0:?}")]
    UnknownNode(NodeId),

    #[error("scene node {0:?} is not a camera")]
    NotACamera(NodeId),

    #[error("attaching {child:?} under {parent:?} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },

    #[error("setup failed for {} node(s)", .0.len())]
    Setup(Vec<(NodeId, SceneError)>),
}
