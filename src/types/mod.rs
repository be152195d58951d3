//! Tensor metadata shared by the registry and every operator.
//!
//! # Example
//! ```
//! use oplower::types::{ElementType, TensorDescriptor, TensorRole};
//! let desc = TensorDescriptor::new("X", vec![3, 1, 2], ElementType::F32, TensorRole::Input);
//! assert_eq!(desc.element_count(), 6);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Element type tag carried by every tensor descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    F32,
    F64,
    I32,
    I64,
    U8,
    Bool,
}

impl ElementType {
    /// Parse an element type from its canonical token.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "f32" | "float" => Some(Self::F32),
            "f64" | "double" => Some(Self::F64),
            "i32" | "int32" => Some(Self::I32),
            "i64" | "int64" => Some(Self::I64),
            "u8" | "uint8" => Some(Self::U8),
            "bool" => Some(Self::Bool),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::Bool => "bool",
        }
    }

    /// C spelling used in emitted declarations.
    pub fn c_type(&self) -> &'static str {
        match self {
            Self::F32 => "float",
            Self::F64 => "double",
            Self::I32 => "int32_t",
            Self::I64 => "int64_t",
            Self::U8 => "uint8_t",
            Self::Bool => "bool",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::I32 | Self::I64 | Self::U8)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a tensor comes from in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorRole {
    Input,
    Initializer,
    Intermediate,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorDescriptor {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: ElementType,
    pub role: TensorRole,
}

impl TensorDescriptor {
    pub fn new(
        name: impl Into<String>,
        shape: Vec<usize>,
        dtype: ElementType,
        role: TensorRole,
    ) -> Self {
        Self {
            name: name.into(),
            shape,
            dtype,
            role,
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }
}
