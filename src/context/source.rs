//! Stack of the template identifiers currently executing.

#[derive(Debug, Default)]
pub(crate) struct SourceStack {
    names: Vec<String>,
}

impl SourceStack {
    pub(crate) fn push(&mut self, name: &str) {
        self.names.push(name.to_owned());
    }

    pub(crate) fn pop(&mut self) -> Option<String> {
        self.names.pop()
    }

    pub(crate) fn current(&self) -> Option<&str> {
        self.names.last().map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.names.len()
    }
}
