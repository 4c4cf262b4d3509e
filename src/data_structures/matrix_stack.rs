//! Model-view and projection matrix stacks shared by the render contexts.

use cgmath::{Matrix4, SquareMatrix};

use crate::context::MatrixMode;

/// Maximum number of entries per stack, including the current matrix.
pub const MAX_STACK_DEPTH: usize = 32;

/// Reasons a stack operation was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackError {
    Overflow,
    Underflow,
}

/// A pair of matrix stacks with a selected mode, as in fixed-function GL.
///
/// Each stack always holds at least one matrix, its current top.
#[derive(Clone, Debug)]
pub struct MatrixStacks {
    mode: MatrixMode,
    model_view: Vec<Matrix4<f32>>,
    projection: Vec<Matrix4<f32>>,
}

impl MatrixStacks {
    pub fn new() -> Self {
        Self {
            mode: MatrixMode::ModelView,
            model_view: vec![Matrix4::identity()],
            projection: vec![Matrix4::identity()],
        }
    }

    pub fn mode(&self) -> MatrixMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: MatrixMode) {
        self.mode = mode;
    }

    pub fn top(&self, mode: MatrixMode) -> Matrix4<f32> {
        // never empty: pop refuses to remove the last entry
        *self.stack(mode).last().unwrap_or(&Matrix4::identity())
    }

    pub fn depth(&self, mode: MatrixMode) -> usize {
        self.stack(mode).len()
    }

    /// `projection * model_view`, the transform applied to a draw.
    pub fn model_view_projection(&self) -> Matrix4<f32> {
        self.top(MatrixMode::Projection) * self.top(MatrixMode::ModelView)
    }

    pub fn load(&mut self, matrix: Matrix4<f32>) {
        if let Some(top) = self.current_mut().last_mut() {
            *top = matrix;
        }
    }

    pub fn mult(&mut self, matrix: &Matrix4<f32>) {
        if let Some(top) = self.current_mut().last_mut() {
            *top = *top * *matrix;
        }
    }

    pub fn push(&mut self) -> Result<(), StackError> {
        let stack = self.current_mut();
        if stack.len() >= MAX_STACK_DEPTH {
            return Err(StackError::Overflow);
        }
        let top = *stack.last().unwrap_or(&Matrix4::identity());
        stack.push(top);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<(), StackError> {
        let stack = self.current_mut();
        if stack.len() <= 1 {
            return Err(StackError::Underflow);
        }
        stack.pop();
        Ok(())
    }

    fn stack(&self, mode: MatrixMode) -> &Vec<Matrix4<f32>> {
        match mode {
            MatrixMode::ModelView => &self.model_view,
            MatrixMode::Projection => &self.projection,
        }
    }

    fn current_mut(&mut self) -> &mut Vec<Matrix4<f32>> {
        match self.mode {
            MatrixMode::ModelView => &mut self.model_view,
            MatrixMode::Projection => &mut self.projection,
        }
    }
}

impl Default for MatrixStacks {
    fn default() -> Self {
        Self::new()
    }
}
