//! Stacked environments: the global chain, local frames and loop frames.

use rustc_hash::FxHashSet;

use crate::ast::Position;
use crate::context::frame::{Frame, FramePool};
use crate::value::Value;

/// One entry of the global chain: a model root plus the read-only flags set on
/// it from templates when the model cannot track them itself.
#[derive(Debug)]
pub(crate) struct GlobalFrame {
    pub(crate) model: Value,
    pub(crate) read_only: FxHashSet<String>,
}

#[derive(Debug, Clone, Copy)]
struct LoopMarker {
    frame: usize,
    position: Position,
}

/// Frame stacks and safety counters.
#[derive(Debug, Default)]
pub(crate) struct Scopes {
    pool: FramePool,
    globals: Vec<GlobalFrame>,
    locals: Vec<usize>,
    loops: Vec<LoopMarker>,
    depth: usize,
    iterations: u64,
}

impl Scopes {
    pub(crate) fn new(root: Value) -> Self {
        let mut scopes = Self::default();
        scopes.push_global(root);
        scopes
    }

    pub(crate) fn push_global(&mut self, model: Value) {
        self.globals.push(GlobalFrame {
            model,
            read_only: FxHashSet::default(),
        });
        let frame = self.pool.acquire();
        self.locals.push(frame);
    }

    /// Pops the innermost global frame and its paired local frame. The root
    /// frame is never popped.
    pub(crate) fn pop_global(&mut self) -> Option<Value> {
        if self.globals.len() <= 1 || self.locals.len() <= 1 {
            return None;
        }
        let frame = self.globals.pop()?;
        if let Some(local) = self.locals.pop() {
            self.pool.release(local);
        }
        Some(frame.model)
    }

    /// Innermost first.
    pub(crate) fn globals(&self) -> impl Iterator<Item = &GlobalFrame> {
        self.globals.iter().rev()
    }

    pub(crate) fn innermost_global(&self) -> Option<&GlobalFrame> {
        self.globals.last()
    }

    pub(crate) fn innermost_global_mut(&mut self) -> Option<&mut GlobalFrame> {
        self.globals.last_mut()
    }

    pub(crate) fn global_depth(&self) -> usize {
        self.globals.len()
    }

    pub(crate) fn push_local(&mut self) {
        let frame = self.pool.acquire();
        self.locals.push(frame);
    }

    /// Closes the top local frame unless it is the root one.
    pub(crate) fn pop_local(&mut self) -> bool {
        if self.locals.len() <= 1 {
            return false;
        }
        match self.locals.pop() {
            Some(frame) => {
                self.pool.release(frame);
                true
            }
            None => false,
        }
    }

    pub(crate) fn local(&self) -> Option<&Frame> {
        self.locals.last().map(|&index| self.pool.get(index))
    }

    pub(crate) fn local_mut(&mut self) -> Option<&mut Frame> {
        let index = *self.locals.last()?;
        Some(self.pool.get_mut(index))
    }

    pub(crate) fn push_loop(&mut self, position: Position) {
        let frame = self.pool.acquire();
        self.loops.push(LoopMarker { frame, position });
    }

    pub(crate) fn pop_loop(&mut self) -> bool {
        match self.loops.pop() {
            Some(marker) => {
                self.pool.release(marker.frame);
                true
            }
            None => false,
        }
    }

    pub(crate) fn loop_frame(&self) -> Option<&Frame> {
        self.loops.last().map(|marker| self.pool.get(marker.frame))
    }

    pub(crate) fn loop_frame_mut(&mut self) -> Option<&mut Frame> {
        let index = self.loops.last()?.frame;
        Some(self.pool.get_mut(index))
    }

    /// Copies the bindings of the enclosing loop frame into the innermost one,
    /// so that outer loop variables stay visible to nested loops.
    pub(crate) fn inherit_loop_variables(&mut self) {
        let [.., outer, inner] = self.loops.as_slice() else {
            return;
        };
        let (outer, inner) = (outer.frame, inner.frame);
        let inherited: Vec<(String, Value, bool)> = self
            .pool
            .get(outer)
            .entries()
            .map(|(name, value, read_only)| (name.to_owned(), value.clone(), read_only))
            .collect();
        let frame = self.pool.get_mut(inner);
        for (name, value, read_only) in inherited {
            frame.define(&name, value, read_only);
        }
    }

    pub(crate) fn loop_position(&self) -> Option<Position> {
        self.loops.last().map(|marker| marker.position)
    }

    pub(crate) fn loop_depth(&self) -> usize {
        self.loops.len()
    }

    /// Increments recursion depth and returns the new depth.
    pub(crate) fn deepen(&mut self) -> usize {
        self.depth += 1;
        self.depth
    }

    pub(crate) fn shallow(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    /// Increments the shared iteration counter and returns the new count.
    pub(crate) fn count_iteration(&mut self) -> u64 {
        self.iterations += 1;
        self.iterations
    }

    pub(crate) fn iterations(&self) -> u64 {
        self.iterations
    }

    #[cfg(test)]
    pub(crate) fn frames_allocated(&self) -> usize {
        self.pool.allocated()
    }
}
