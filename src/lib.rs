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

//! Operator lowering: shape inference, initializer canonicalization and C
//! code synthesis for neural-network graph nodes.
//!
//! ```
//! use oplower::ops::{lower, Transpose, TransposeAttributes};
//! use oplower::registry::InMemoryRegistry;
//! use oplower::types::ElementType;
//!
//! let mut registry = InMemoryRegistry::new();
//! registry.add_input("x", ElementType::F32, vec![2, 3]);
//! let mut op = Transpose::new(TransposeAttributes::default(), "x", "y");
//! let code = lower(&mut op, &mut registry, "t").unwrap();
//! assert!(code.contains("tensor_y[id / 3 % 2 * 1 + id / 1 % 3 * 2] = tensor_x[id];"));
//! ```

pub mod codegen;
pub mod error;
pub mod ops;
pub mod registry;
pub mod shapes;
pub mod types;

pub use error::{LowerError, Result};
pub use ops::{lower, Operator, OperatorKind};
pub use registry::{InMemoryRegistry, TensorData, TensorRegistry};
