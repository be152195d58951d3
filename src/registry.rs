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

//! Tensor registry consumed by operators during `initialize`.
//!
//! The registry owns every descriptor and initializer payload. Operators only
//! ever refer to tensors by name; generated code addresses them through
//! [`BufferView`](crate::codegen::BufferView)s built from those names.

use std::collections::BTreeMap;

use tracing::debug;

use crate::types::{ElementType, TensorDescriptor, TensorRole};

/// Flat, row-major initializer payload.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

impl TensorData {
    pub fn dtype(&self) -> ElementType {
        match self {
            TensorData::F32(_) => ElementType::F32,
            TensorData::F64(_) => ElementType::F64,
            TensorData::I32(_) => ElementType::I32,
            TensorData::I64(_) => ElementType::I64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::F64(v) => v.len(),
            TensorData::I32(v) => v.len(),
            TensorData::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            TensorData::F32(v) => Some(v),
            _ => None,
        }
    }
}

/// Lookup and mutation of named tensor metadata.
///
/// Producer-before-consumer ordering over the registry is the caller's
/// responsibility; implementations need no interior synchronization.
pub trait TensorRegistry {
    fn exists(&self, name: &str) -> bool;

    fn shape_of(&self, name: &str) -> Option<&[usize]>;

    fn element_type_of(&self, name: &str) -> Option<ElementType>;

    fn initializer_data(&self, name: &str) -> Option<&TensorData>;

    /// Swap an initializer's shape and payload in place. Later lookups see
    /// only the replacement.
    fn replace_initializer(
        &mut self,
        name: &str,
        dtype: ElementType,
        shape: Vec<usize>,
        data: TensorData,
    );

    fn register_intermediate(&mut self, name: &str, dtype: ElementType, shape: Vec<usize>);
}

#[derive(Debug, Clone)]
struct Entry {
    desc: TensorDescriptor,
    data: Option<TensorData>,
}

/// Registry backed by an ordered map; iteration order is by tensor name.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    tensors: BTreeMap<String, Entry>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, name: &str, dtype: ElementType, shape: Vec<usize>) {
        self.insert(TensorDescriptor::new(name, shape, dtype, TensorRole::Input), None);
    }

    pub fn add_output(&mut self, name: &str, dtype: ElementType, shape: Vec<usize>) {
        self.insert(TensorDescriptor::new(name, shape, dtype, TensorRole::Output), None);
    }

    pub fn add_initializer(&mut self, name: &str, shape: Vec<usize>, data: TensorData) {
        let desc = TensorDescriptor::new(name, shape, data.dtype(), TensorRole::Initializer);
        self.insert(desc, Some(data));
    }

    pub fn descriptor(&self, name: &str) -> Option<&TensorDescriptor> {
        self.tensors.get(name).map(|e| &e.desc)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    fn insert(&mut self, desc: TensorDescriptor, data: Option<TensorData>) {
        self.tensors.insert(desc.name.clone(), Entry { desc, data });
    }
}

impl TensorRegistry for InMemoryRegistry {
    fn exists(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    fn shape_of(&self, name: &str) -> Option<&[usize]> {
        self.tensors.get(name).map(|e| e.desc.shape.as_slice())
    }

    fn element_type_of(&self, name: &str) -> Option<ElementType> {
        self.tensors.get(name).map(|e| e.desc.dtype)
    }

    fn initializer_data(&self, name: &str) -> Option<&TensorData> {
        self.tensors.get(name).and_then(|e| e.data.as_ref())
    }

    fn replace_initializer(
        &mut self,
        name: &str,
        dtype: ElementType,
        shape: Vec<usize>,
        data: TensorData,
    ) {
        debug!(tensor = name, ?shape, "replacing initializer");
        let desc = TensorDescriptor::new(name, shape, dtype, TensorRole::Initializer);
        self.insert(desc, Some(data));
    }

    fn register_intermediate(&mut self, name: &str, dtype: ElementType, shape: Vec<usize>) {
        debug!(tensor = name, ?shape, "registering intermediate tensor");
        self.insert(
            TensorDescriptor::new(name, shape, dtype, TensorRole::Intermediate),
            None,
        );
    }
}
