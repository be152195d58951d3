// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the MIND project (Machine Intelligence Native Design).

//! Building blocks for emitting C code text.

pub mod blas;

use std::fmt;

/// Ordered, append-only sequence of emitted lines.
///
/// Lines are indented with one tab per open block. Closing a block that was
/// never opened is a no-op on the depth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedCode {
    lines: Vec<String>,
    depth: usize,
}

impl GeneratedCode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `depth` levels of indentation already open.
    pub fn with_depth(depth: usize) -> Self {
        Self {
            lines: Vec::new(),
            depth,
        }
    }

    pub fn emit_line(&mut self, line: &str) {
        let mut text = "\t".repeat(self.depth);
        text.push_str(line);
        self.lines.push(text);
    }

    /// Emit `header {` and indent everything until the matching [`close`].
    ///
    /// [`close`]: GeneratedCode::close
    pub fn open(&mut self, header: &str) {
        self.emit_line(&format!("{header} {{"));
        self.depth += 1;
    }

    pub fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.emit_line("}");
    }

    /// Close the current block and open `} header {` at the same depth.
    pub fn reopen(&mut self, header: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.emit_line(&format!("}} {header} {{"));
        self.depth += 1;
    }

    /// Append another fragment, re-indented under the current depth.
    pub fn append(&mut self, other: GeneratedCode) {
        let prefix = "\t".repeat(self.depth);
        self.lines
            .extend(other.lines.into_iter().map(|l| format!("{prefix}{l}")));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_text(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GeneratedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// A `(buffer, offset, length)` window into a flat buffer owned elsewhere.
///
/// Renders as the C pointer expression addressing its first element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferView {
    pub buffer: String,
    pub offset: usize,
    pub len: usize,
}

impl BufferView {
    pub fn new(buffer: impl Into<String>, offset: usize, len: usize) -> Self {
        Self {
            buffer: buffer.into(),
            offset,
            len,
        }
    }

    /// View of the whole buffer starting at element 0.
    pub fn whole(buffer: impl Into<String>, len: usize) -> Self {
        Self::new(buffer, 0, len)
    }

    /// Sub-window relative to this view.
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        Self::new(self.buffer.clone(), self.offset + offset, len)
    }
}

impl fmt::Display for BufferView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset == 0 {
            write!(f, "{}", self.buffer)
        } else {
            write!(f, "{} + {}", self.buffer, self.offset)
        }
    }
}

/// C spelling of a registry tensor.
pub fn tensor_symbol(name: &str) -> String {
    format!("tensor_{name}")
}

/// Float literal as it appears in emitted code.
pub fn format_float(value: f32) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// `for (size_t var = start; var < end; var++)` header.
pub fn for_range(var: &str, start: &str, end: &str) -> String {
    format!("for (size_t {var} = {start}; {var} < {end}; {var}++)")
}
