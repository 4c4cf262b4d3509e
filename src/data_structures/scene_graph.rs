//! Scene graph and hierarchical scene organization.
//!
//! Nodes live in an arena owned by [`SceneGraph`] and refer to each other by
//! [`NodeId`]. Every node carries a local position, an ambient colour and a
//! visibility flag; what a node actually does is supplied by its kind, a boxed
//! [`SceneNode`] providing the setup, render and cleanup hooks.
//!
//! Rendering is a depth-first walk. Each visible node pushes the model-view
//! matrix, translates by its position, sets its colour, draws, recurses into
//! its children and pops again.

use std::{
    any::Any,
    fmt::Debug,
    ops::{Deref, DerefMut},
};

use cgmath::Vector3;
use log::{debug, info, warn};

use crate::{
    context::{Capabilities, MatrixMode, RenderContext},
    data_structures::nodes::{CameraNode, NullNode},
    error::SceneError,
};

/// Horizontal offset applied in front of the whole scene each frame.
pub const DEFAULT_EYE_OFFSET: f32 = 0.035;

/// Identifies a node inside one [`SceneGraph`]. Ids are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Hooks a node kind plugs into the generic traversals.
pub trait SceneNode: Any {
    /// Draws the node with the node's transform and colour already applied.
    ///
    /// Returning `false` keeps the traversal out of the node's children.
    fn render_internal(&self, ctx: &mut dyn RenderContext) -> bool;

    /// Acquires the node's GPU resources.
    fn setup_node(
        &mut self,
        ctx: &mut dyn RenderContext,
        capabilities: &Capabilities,
    ) -> Result<(), SceneError>;

    /// Releases whatever `setup_node` acquired. Must tolerate a missing setup.
    fn cleanup_node(&mut self, ctx: &mut dyn RenderContext);

    /// Short name used in log output.
    fn name(&self) -> &'static str;
}

impl dyn SceneNode {
    pub fn downcast_ref<T: SceneNode>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }

    pub fn downcast_mut<T: SceneNode>(&mut self) -> Option<&mut T> {
        (self as &mut dyn Any).downcast_mut::<T>()
    }
}

impl Debug for dyn SceneNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How far [`SceneGraph::setup`] and [`SceneGraph::cleanup`] reach.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Propagation {
    /// Every node reachable from the root, in depth-first pre-order.
    #[default]
    Recursive,
    /// The root and its direct children only.
    ImmediateChildren,
}

/// A node in the arena: shared local state plus its kind.
#[derive(Debug)]
pub struct Node {
    position: Vector3<f32>,
    colour: Vector3<f32>,
    visible: bool,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    kind: Box<dyn SceneNode>,
}

impl Node {
    fn new(kind: Box<dyn SceneNode>) -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            colour: Vector3::new(1.0, 1.0, 1.0),
            visible: true,
            children: Vec::new(),
            parent: None,
            kind,
        }
    }

    pub fn position(&self) -> Vector3<f32> {
        self.position
    }

    pub fn colour(&self) -> Vector3<f32> {
        self.colour
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn child(&self, index: usize) -> Option<NodeId> {
        self.children.get(index).copied()
    }

    pub fn kind(&self) -> &dyn SceneNode {
        self.kind.as_ref()
    }

    pub fn kind_mut(&mut self) -> &mut dyn SceneNode {
        self.kind.as_mut()
    }

    pub fn set_position(&mut self, x: f32, y: f32, z: f32) -> &mut Self {
        self.position = Vector3::new(x, y, z);
        self
    }

    pub fn set_colour(&mut self, r: f32, g: f32, b: f32) -> &mut Self {
        self.colour = Vector3::new(r, g, b);
        self
    }

    pub fn set_visible(&mut self, visible: bool) -> &mut Self {
        self.visible = visible;
        self
    }
}

/// The arena of nodes with a root and an active camera.
///
/// The root is a [`NullNode`] created with the graph. The active camera starts
/// out as a detached default [`CameraNode`]; the graph only refers to it, so
/// swapping cameras leaves the previous one alive.
#[derive(Debug)]
pub struct SceneGraph {
    nodes: Vec<Option<Node>>,
    root: NodeId,
    active_camera: NodeId,
    capabilities: Capabilities,
    propagation: Propagation,
    eye_offset: f32,
}

impl SceneGraph {
    pub fn new() -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            active_camera: NodeId(0),
            capabilities: Capabilities::default(),
            propagation: Propagation::default(),
            eye_offset: DEFAULT_EYE_OFFSET,
        };
        graph.root = graph.insert(NullNode);
        graph.active_camera = graph.insert(CameraNode::default());
        graph
    }

    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn with_eye_offset(mut self, eye_offset: f32) -> Self {
        self.eye_offset = eye_offset;
        self
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn active_camera(&self) -> NodeId {
        self.active_camera
    }

    /// Makes `camera` the view used by the next [`render`](Self::render).
    pub fn set_active_camera(&mut self, camera: NodeId) -> Result<(), SceneError> {
        if !self.contains(camera) {
            return Err(SceneError::UnknownNode(camera));
        }
        if self.kind::<CameraNode>(camera).is_none() {
            return Err(SceneError::NotACamera(camera));
        }
        self.active_camera = camera;
        Ok(())
    }

    /// Capabilities detected by the last [`setup`](Self::setup).
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    pub fn eye_offset(&self) -> f32 {
        self.eye_offset
    }

    /// Number of live nodes, including the root and detached nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Adds a detached node to the arena.
    pub fn insert<N: SceneNode>(&mut self, kind: N) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node::new(Box::new(kind))));
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)?.as_ref()
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)?.as_mut()
    }

    /// The node's kind, if it is a `T`.
    pub fn kind<T: SceneNode>(&self, id: NodeId) -> Option<&T> {
        self.node(id)?.kind().downcast_ref::<T>()
    }

    pub fn kind_mut<T: SceneNode>(&mut self, id: NodeId) -> Option<&mut T> {
        self.node_mut(id)?.kind_mut().downcast_mut::<T>()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    /// Children in insertion order; empty for unknown ids.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[][..], Node::children)
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.node(id).map_or(0, Node::child_count)
    }

    /// The child at `index`, or `None` when the index is out of range.
    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.node(id)?.child(index)
    }

    /// Appends `child` to `parent`'s children.
    ///
    /// A child that already has a parent is moved, so every node has at most
    /// one parent. Attaching a node below itself is refused.
    pub fn add(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        if !self.contains(parent) {
            return Err(SceneError::UnknownNode(parent));
        }
        if !self.contains(child) {
            return Err(SceneError::UnknownNode(child));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(SceneError::Cycle { parent, child });
        }
        if let Some(previous) = self.parent(child) {
            self.remove(previous, child);
        }
        if let Some(node) = self.node_mut(parent) {
            node.children.push(child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        Ok(())
    }

    /// Inserts `kind` and attaches it under `parent`.
    pub fn add_child<N: SceneNode>(
        &mut self,
        parent: NodeId,
        kind: N,
    ) -> Result<NodeId, SceneError> {
        if !self.contains(parent) {
            return Err(SceneError::UnknownNode(parent));
        }
        let id = self.insert(kind);
        self.add(parent, id)?;
        Ok(id)
    }

    /// Detaches `child` from `parent`. The child stays in the arena.
    ///
    /// Returns `false`, leaving the graph untouched, if `child` is not a
    /// child of `parent`.
    pub fn remove(&mut self, parent: NodeId, child: NodeId) -> bool {
        let Some(node) = self.node_mut(parent) else {
            return false;
        };
        let Some(index) = node.children.iter().position(|&c| c == child) else {
            return false;
        };
        node.children.remove(index);
        if let Some(node) = self.node_mut(child) {
            node.parent = None;
        }
        true
    }

    /// Drops `id` and its whole subtree from the arena.
    ///
    /// The root and any subtree holding the active camera are kept. Call
    /// [`cleanup`](Self::cleanup) first: GPU handles owned by destroyed nodes
    /// are not released.
    pub fn destroy(&mut self, id: NodeId) -> bool {
        if id == self.root || !self.contains(id) {
            return false;
        }
        if self.is_ancestor_or_self(id, self.active_camera) {
            warn!("refusing to destroy {:?}: it holds the active camera", id);
            return false;
        }
        if let Some(parent) = self.parent(id) {
            self.remove(parent, id);
        }
        let subtree = self.pre_order(id);
        for node in &subtree {
            if let Some(slot) = self.nodes.get_mut(node.0) {
                *slot = None;
            }
        }
        debug!("destroyed {} node(s) below and including {:?}", subtree.len(), id);
        true
    }

    /// Renders the scene: view transform, eye offset, then the tree from the root.
    ///
    /// The model-view stack is left as it was found.
    pub fn render(&self, ctx: &mut dyn RenderContext) {
        let mut ctx = MatrixGuard::push(ctx);
        ctx.load_identity();
        match self.kind::<CameraNode>(self.active_camera) {
            Some(camera) => ctx.mult_matrix(&camera.view_matrix()),
            None => warn!("active camera {:?} is gone, rendering without a view transform", self.active_camera),
        }
        ctx.translate(self.eye_offset, 0.0, 0.0);
        self.render_node(self.root, &mut *ctx);
    }

    /// Renders the subtree below `id` relative to the current model-view matrix.
    ///
    /// Invisible nodes are skipped together with everything below them.
    pub fn render_node(&self, id: NodeId, ctx: &mut dyn RenderContext) {
        let Some(node) = self.node(id) else {
            warn!("tried to render unknown node {:?}", id);
            return;
        };
        if !node.visible {
            return;
        }

        let mut ctx = MatrixGuard::push(ctx);
        ctx.translate(node.position.x, node.position.y, node.position.z);
        ctx.colour(node.colour.x, node.colour.y, node.colour.z, 1.0);

        if node.kind.render_internal(&mut *ctx) {
            for &child in &node.children {
                self.render_node(child, &mut *ctx);
            }
        }
    }

    /// Detects the context's capabilities and runs every node's setup hook.
    ///
    /// A node whose setup fails is left without resources while the others
    /// carry on; all failures are returned together.
    ///
    /// A repeated setup assumes `ctx` is a new context: handles from an earlier
    /// setup are dropped without being deleted. Run [`cleanup`](Self::cleanup)
    /// first to re-upload into the same context.
    pub fn setup(&mut self, ctx: &mut dyn RenderContext) -> Result<(), SceneError> {
        let extensions = ctx.extensions();
        self.capabilities = Capabilities::from_extensions(&extensions);
        if self.capabilities.vertex_buffer_objects {
            info!("vertex buffer objects are supported");
        } else {
            warn!(
                "vertex buffer objects are not supported, drawing from client memory (extensions: {:?})",
                extensions
            );
        }

        let capabilities = self.capabilities;
        let mut failed = Vec::new();
        for id in self.pass_order() {
            let Some(node) = self.node_mut(id) else {
                continue;
            };
            debug!("setting up {:?} ({})", id, node.kind.name());
            if let Err(e) = node.kind.setup_node(ctx, &capabilities) {
                warn!("setup of {:?} ({}) failed: {}", id, node.kind.name(), e);
                failed.push((id, e));
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(SceneError::Setup(failed))
        }
    }

    /// Runs every node's cleanup hook.
    pub fn cleanup(&mut self, ctx: &mut dyn RenderContext) {
        for id in self.pass_order() {
            if let Some(node) = self.node_mut(id) {
                debug!("cleaning up {:?} ({})", id, node.kind.name());
                node.kind.cleanup_node(ctx);
            }
        }
    }

    fn pass_order(&self) -> Vec<NodeId> {
        match self.propagation {
            Propagation::Recursive => self.pre_order(self.root),
            Propagation::ImmediateChildren => std::iter::once(self.root)
                .chain(self.node(self.root).map_or(&[][..], Node::children).iter().copied())
                .collect(),
        }
    }

    fn pre_order(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut to_visit = vec![start];
        while let Some(id) = to_visit.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            order.push(id);
            to_visit.extend(node.children.iter().rev().copied());
        }
        order
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, mut id: NodeId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.parent(id) {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Pushes the model-view matrix on creation and pops it when dropped, so the
/// stack stays balanced even if a hook panics. A refused push is not popped.
struct MatrixGuard<'a> {
    ctx: &'a mut dyn RenderContext,
    pushed: bool,
}

impl<'a> MatrixGuard<'a> {
    fn push(ctx: &'a mut dyn RenderContext) -> Self {
        ctx.matrix_mode(MatrixMode::ModelView);
        let pushed = ctx.push_matrix();
        Self { ctx, pushed }
    }
}

impl<'a> Deref for MatrixGuard<'a> {
    type Target = dyn RenderContext + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.ctx
    }
}

impl<'a> DerefMut for MatrixGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.ctx
    }
}

impl Drop for MatrixGuard<'_> {
    fn drop(&mut self) {
        self.ctx.matrix_mode(MatrixMode::ModelView);
        if self.pushed {
            self.ctx.pop_matrix();
        }
    }
}
