// SPDX-License-Identifier: MIT

/// A semantic rule violation. `path` holds the enclosing nodes from the
/// outermost inward, e.g. `["reference value at index 3", "measurement at index 0"]`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ValidationError {
    pub path: Vec<String>,
    pub detail: String,
}

impl ValidationError {
    pub fn new<M: Into<String>>(detail: M) -> Self {
        Self {
            path: vec![],
            detail: detail.into(),
        }
    }

    /// Pushes an outer frame in front of the current path.
    pub fn at<C: Into<String>>(mut self, ctx: C) -> Self {
        self.path.insert(0, ctx.into());
        self
    }
}

impl std::error::Error for ValidationError {}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.detail)
        } else {
            write!(f, "{}: {}", self.path.join(", "), self.detail)
        }
    }
}
