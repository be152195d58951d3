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

//! Axis permutation lowered to one flat copy loop.
//!
//! For source axis `i` with row-major stride `s_i` and extent `n_i`, the
//! destination index of linear element `id` is
//! `sum_i (id / s_i % n_i) * t_i`, where `t_i` is the stride that axis `i`
//! takes in the permuted shape. The sum is unrolled at generation time.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{clean_name, require_element_type, require_shape, Operator};
use crate::codegen::{for_range, tensor_symbol, GeneratedCode};
use crate::error::{LowerError, Result};
use crate::registry::TensorRegistry;
use crate::shapes::{element_count, row_major_strides, transpose_shape, validate_permutation};
use crate::types::ElementType;

const OP: &str = "Transpose";

/// Closed-form index remapping for one `(shape, perm)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermutationPlan {
    shape: Vec<usize>,
    perm: Vec<usize>,
    strides: Vec<usize>,
    output_shape: Vec<usize>,
    /// Destination stride of each source axis.
    target_strides: Vec<usize>,
}

impl PermutationPlan {
    /// `perm[i]` names the source axis that becomes output axis `i`.
    pub fn new(shape: &[usize], perm: &[usize]) -> Result<Self> {
        validate_permutation(perm, shape.len())?;
        let strides = row_major_strides(shape);
        let output_shape = transpose_shape(shape, perm)?;
        let output_strides = row_major_strides(&output_shape);
        let mut target_strides = vec![0; shape.len()];
        for (out_axis, &src_axis) in perm.iter().enumerate() {
            target_strides[src_axis] = output_strides[out_axis];
        }
        Ok(Self {
            shape: shape.to_vec(),
            perm: perm.to_vec(),
            strides,
            output_shape,
            target_strides,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn perm(&self) -> &[usize] {
        &self.perm
    }

    pub fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    pub fn len(&self) -> usize {
        element_count(&self.shape)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destination-index expression over the loop variable `var`.
    pub fn formula(&self, var: &str) -> String {
        if self.shape.is_empty() {
            return "0".to_string();
        }
        self.strides
            .iter()
            .zip(&self.shape)
            .zip(&self.target_strides)
            .map(|((stride, extent), target)| format!("{var} / {stride} % {extent} * {target}"))
            .collect::<Vec<_>>()
            .join(" + ")
    }

    /// Evaluate the same expression as [`formula`](Self::formula) for `id`.
    pub fn destination_index(&self, id: usize) -> usize {
        self.strides
            .iter()
            .zip(&self.shape)
            .zip(&self.target_strides)
            .map(|((stride, extent), target)| id / stride % extent * target)
            .sum()
    }

    /// Permute a flat row-major buffer on the host.
    pub fn apply<T: Copy + Default>(&self, input: &[T]) -> Vec<T> {
        let mut output = vec![T::default(); input.len()];
        for (id, value) in input.iter().enumerate() {
            output[self.destination_index(id)] = *value;
        }
        output
    }

    /// The copy loop: `output[formula(id)] = input[id]`.
    pub fn render_loop(&self, input: &str, output: &str) -> GeneratedCode {
        let mut code = GeneratedCode::new();
        code.open(&for_range("id", "0", &self.len().to_string()));
        code.emit_line(&format!("{output}[{}] = {input}[id];", self.formula("id")));
        code.close();
        code
    }

    /// Standalone `permute(input, output)` routine over float buffers.
    pub fn render_function(&self) -> String {
        let n = self.len();
        let mut code = GeneratedCode::new();
        code.open(&format!("void permute(float input[{n}], float output[{n}])"));
        code.append(self.render_loop("input", "output"));
        code.close();
        code.into_text()
    }
}

/// Attribute set of the Transpose node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransposeAttributes {
    /// Empty means reverse the axes.
    #[serde(default)]
    pub perm: Vec<usize>,
}

impl TransposeAttributes {
    pub fn new(perm: Vec<usize>) -> Self {
        Self { perm }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| LowerError::attribute(OP, "attributes", text, e.to_string()))
    }

    fn resolve(&self, rank: usize) -> Vec<usize> {
        if self.perm.is_empty() {
            (0..rank).rev().collect()
        } else {
            self.perm.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transpose {
    attributes: TransposeAttributes,
    data: String,
    transposed: String,
    plan: Option<PermutationPlan>,
}

impl Transpose {
    pub fn new(attributes: TransposeAttributes, data: &str, transposed: &str) -> Self {
        Self {
            attributes,
            data: clean_name(data),
            transposed: clean_name(transposed),
            plan: None,
        }
    }

    pub fn plan(&self) -> Option<&PermutationPlan> {
        self.plan.as_ref()
    }
}

impl Operator for Transpose {
    fn op_type(&self) -> &'static str {
        OP
    }

    fn type_inference(&self, inputs: &[ElementType]) -> Result<Vec<ElementType>> {
        let dtype = inputs.first().copied().ok_or_else(|| LowerError::MissingTensor {
            op: OP,
            tensor: self.data.clone(),
        })?;
        Ok(vec![dtype])
    }

    fn shape_inference(&self, inputs: &[Vec<usize>]) -> Result<Vec<Vec<usize>>> {
        let shape = inputs.first().ok_or_else(|| LowerError::MissingTensor {
            op: OP,
            tensor: self.data.clone(),
        })?;
        Ok(vec![transpose_shape(shape, &self.attributes.resolve(shape.len()))?])
    }

    fn initialize(&mut self, registry: &mut dyn TensorRegistry) -> Result<()> {
        let shape = require_shape(registry, OP, &self.data)?.to_vec();
        let dtype = require_element_type(
            registry,
            OP,
            &self.data,
            &[ElementType::F32, ElementType::F64, ElementType::I32, ElementType::I64],
        )?;
        let perm = self.attributes.resolve(shape.len());
        let plan = PermutationPlan::new(&shape, &perm)?;
        debug!(input = %self.data, shape = ?plan.shape(), perm = ?plan.perm(), "resolved transpose");
        if !registry.exists(&self.transposed) {
            registry.register_intermediate(&self.transposed, dtype, plan.output_shape().to_vec());
        }
        self.plan = Some(plan);
        Ok(())
    }

    fn generate(&self, instance: &str) -> Result<GeneratedCode> {
        let plan = self.plan.as_ref().ok_or(LowerError::NotInitialized { op: OP })?;
        let mut code = GeneratedCode::with_depth(1);
        code.emit_line(&format!("// Transpose {}", clean_name(instance)));
        code.append(plan.render_loop(&tensor_symbol(&self.data), &tensor_symbol(&self.transposed)));
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;

    #[test]
    fn reversed_rank4_formula() {
        let plan = PermutationPlan::new(&[1, 2, 3, 4], &[3, 2, 1, 0]).unwrap();
        assert_eq!(
            plan.formula("id"),
            "id / 24 % 1 * 1 + id / 12 % 2 * 1 + id / 4 % 3 * 2 + id / 1 % 4 * 6"
        );
        assert_eq!(plan.destination_index(0), 0);
        assert_eq!(plan.output_shape(), &[4, 3, 2, 1]);
    }

    #[test]
    fn identity_maps_each_index_to_itself() {
        let plan = PermutationPlan::new(&[2, 3], &[0, 1]).unwrap();
        assert!((0..6).all(|id| plan.destination_index(id) == id));
    }

    #[test]
    fn matrix_transpose_on_host() {
        let plan = PermutationPlan::new(&[2, 3], &[1, 0]).unwrap();
        let out = plan.apply(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(out, vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn scalar_formula_is_zero() {
        let plan = PermutationPlan::new(&[], &[]).unwrap();
        assert_eq!(plan.formula("id"), "0");
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn empty_perm_reverses_axes() {
        let mut reg = InMemoryRegistry::new();
        reg.add_input("data", ElementType::F32, vec![2, 3, 4]);
        let mut op = Transpose::new(TransposeAttributes::default(), "data", "out");
        op.initialize(&mut reg).unwrap();
        assert_eq!(reg.shape_of("out"), Some(&[4, 3, 2][..]));
        let text = op.generate("t0").unwrap().into_text();
        assert!(text.contains("tensor_out[id / 12 % 2 * 1 + id / 4 % 3 * 2 + id / 1 % 4 * 6] = tensor_data[id];"));
    }

    #[test]
    fn bad_perm_is_rejected() {
        let mut reg = InMemoryRegistry::new();
        reg.add_input("data", ElementType::F32, vec![2, 3]);
        let mut op = Transpose::new(TransposeAttributes::new(vec![0, 0]), "data", "out");
        assert!(matches!(
            op.initialize(&mut reg),
            Err(LowerError::InvalidPermutation { .. })
        ));
        assert!(!reg.exists("out"));
    }
}
