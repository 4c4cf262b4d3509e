//! Render pipelines.
//!
//! The fixed-function state a [`RenderContext`](crate::context::RenderContext)
//! tracks (depth test, culling, winding) is baked into wgpu pipelines. One
//! pipeline exists per distinct [`flat::PipelineKey`].

pub mod flat;
