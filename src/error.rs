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

//! Structured errors raised while initializing or generating an operator.
//!
//! Every variant aborts lowering for the operator instance that produced it.
//! Nothing is retried and no partial code is ever returned.

use crate::types::ElementType;

/// Result alias used across the lowering engine.
pub type Result<T> = std::result::Result<T, LowerError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LowerError {
    /// A referenced tensor is absent from the registry.
    #[error("{op} input tensor `{tensor}` is not found in the registry")]
    MissingTensor { op: &'static str, tensor: String },

    /// The tensor exists but has the wrong number of dimensions for its role.
    #[error("{op} tensor `{tensor}` has rank {actual}, expected {expected}")]
    ShapeRank {
        op: &'static str,
        tensor: String,
        expected: String,
        actual: usize,
    },

    /// Declared sizes disagree with the tensor dimensions.
    #[error("{op} shape mismatch: {detail}")]
    ShapeMismatch { op: &'static str, detail: String },

    /// An attribute value is outside its enumerated domain.
    #[error("{op} attribute `{attribute}` = {value} is invalid: {reason}")]
    InvalidAttribute {
        op: &'static str,
        attribute: &'static str,
        value: String,
        reason: String,
    },

    /// The activation name is not one of the supported kinds.
    #[error("activation function `{0}` is not implemented")]
    UnsupportedActivation(String),

    /// Only the 32-bit float path is fully specified.
    #[error("{op} tensor `{tensor}` has unsupported element type {found}")]
    UnsupportedElementType {
        op: &'static str,
        tensor: String,
        found: ElementType,
    },

    /// A tensor that must be a constant carries no initializer payload.
    #[error("{op} tensor `{tensor}` must be an initializer")]
    MissingInitializer { op: &'static str, tensor: String },

    /// A transpose permutation is not a bijection over the input axes.
    #[error("permutation {perm:?} is invalid for a rank-{rank} tensor")]
    InvalidPermutation { perm: Vec<usize>, rank: usize },

    /// `generate` was called before a successful `initialize`.
    #[error("{op} operator must be initialized before generating code")]
    NotInitialized { op: &'static str },
}

impl LowerError {
    pub(crate) fn rank(
        op: &'static str,
        tensor: &str,
        expected: impl Into<String>,
        actual: usize,
    ) -> Self {
        LowerError::ShapeRank {
            op,
            tensor: tensor.to_string(),
            expected: expected.into(),
            actual,
        }
    }

    pub(crate) fn attribute(
        op: &'static str,
        attribute: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        LowerError::InvalidAttribute {
            op,
            attribute,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
