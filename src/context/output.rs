//! Nested output buffers.

/// Stack of text sinks. The root buffer exists from creation and is never
/// popped; writes always target the top buffer.
#[derive(Debug)]
pub(crate) struct OutputStack {
    buffers: Vec<String>,
    enabled: bool,
}

impl Default for OutputStack {
    fn default() -> Self {
        Self {
            buffers: vec![String::new()],
            enabled: true,
        }
    }
}

impl OutputStack {
    pub(crate) fn current(&self) -> &str {
        self.buffers.last().map_or("", String::as_str)
    }

    pub(crate) fn push(&mut self) {
        self.buffers.push(String::new());
    }

    /// Removes the top buffer, or `None` when only the root remains.
    pub(crate) fn pop(&mut self) -> Option<String> {
        if self.buffers.len() <= 1 {
            return None;
        }
        self.buffers.pop()
    }

    pub(crate) fn write(&mut self, text: &str) {
        if !self.enabled || text.is_empty() {
            return;
        }
        if let Some(top) = self.buffers.last_mut() {
            top.push_str(text);
        }
    }

    /// Empties the root buffer and returns what it held.
    pub(crate) fn take_root(&mut self) -> String {
        self.buffers
            .first_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }

    pub(crate) fn depth(&self) -> usize {
        self.buffers.len()
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_buffers() {
        let mut output = OutputStack::default();
        output.write("A");
        output.push();
        output.write("B");
        assert_eq!(output.current(), "B");
        assert_eq!(output.pop().as_deref(), Some("B"));
        assert_eq!(output.current(), "A");
        assert_eq!(output.pop(), None);
        assert_eq!(output.depth(), 1);
    }

    #[test]
    fn test_disabled_output_drops_writes() {
        let mut output = OutputStack::default();
        output.set_enabled(false);
        output.write("hidden");
        assert_eq!(output.current(), "");
        output.set_enabled(true);
        output.write("shown");
        assert_eq!(output.take_root(), "shown");
        assert_eq!(output.current(), "");
    }
}
