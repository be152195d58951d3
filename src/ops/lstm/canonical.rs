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

//! One-time expansion of compact bias and peephole initializers.
//!
//! The rank of the registered tensor decides what happens: the compact rank
//! is expanded and written back, the canonical rank is left alone. Because
//! the expanded tensor no longer has the compact rank, a second call is a
//! no-op.

use tracing::debug;

use super::layout::{GateLayout, GATE_BLOCKS, PEEPHOLE_BLOCKS};
use crate::error::{LowerError, Result};
use crate::registry::{TensorData, TensorRegistry};
use crate::types::ElementType;

const OP: &str = "LSTM";

/// `[D, 8H]` to `[4, D, S, B, H]`.
///
/// Each gate's input and recurrence bias halves are summed per hidden unit,
/// then the sum is replicated over every `(seq, batch)` pair.
pub fn expand_bias(original: &[f32], layout: &GateLayout) -> Vec<f32> {
    let h = layout.hidden_size;
    let mut expanded = vec![0.0_f32; GATE_BLOCKS * layout.num_directions * layout.ff_size()];
    if h == 0 {
        return expanded;
    }
    let mut sum = vec![0.0_f32; h];
    for block in 0..GATE_BLOCKS {
        for direction in 0..layout.num_directions {
            let src = direction * 2 * GATE_BLOCKS * h + block * h;
            for (i, s) in sum.iter_mut().enumerate() {
                *s = original[src + i] + original[src + i + GATE_BLOCKS * h];
            }
            let base = block * layout.num_directions * layout.ff_size() + direction * layout.ff_size();
            for row in expanded[base..base + layout.ff_size()].chunks_exact_mut(h) {
                row.copy_from_slice(&sum);
            }
        }
    }
    expanded
}

/// `[D, 3H]` to `[D, 3, B, H]`, copying each gate row across the batch axis.
pub fn expand_peephole(original: &[f32], layout: &GateLayout) -> Vec<f32> {
    let h = layout.hidden_size;
    let mut expanded = Vec::with_capacity(layout.num_directions * PEEPHOLE_BLOCKS * layout.step_size());
    for direction in 0..layout.num_directions {
        for block in 0..PEEPHOLE_BLOCKS {
            let src = direction * PEEPHOLE_BLOCKS * h + block * h;
            for _ in 0..layout.batch_size {
                expanded.extend_from_slice(&original[src..src + h]);
            }
        }
    }
    expanded
}

fn f32_payload<'r>(registry: &'r dyn TensorRegistry, tensor: &str) -> Result<&'r [f32]> {
    let data = registry
        .initializer_data(tensor)
        .ok_or_else(|| LowerError::MissingInitializer {
            op: OP,
            tensor: tensor.to_string(),
        })?;
    data.as_f32().ok_or_else(|| LowerError::UnsupportedElementType {
        op: OP,
        tensor: tensor.to_string(),
        found: data.dtype(),
    })
}

fn check_len(tensor: &str, found: usize, expected: usize) -> Result<()> {
    if found == expected {
        return Ok(());
    }
    Err(LowerError::ShapeMismatch {
        op: OP,
        detail: format!("tensor `{tensor}` holds {found} elements, expected {expected}"),
    })
}

/// Expand a rank-2 bias in the registry; rank-5 biases are checked only.
pub(crate) fn canonicalize_bias(
    registry: &mut dyn TensorRegistry,
    tensor: &str,
    layout: &GateLayout,
) -> Result<()> {
    let rank = registry.shape_of(tensor).map_or(0, <[usize]>::len);
    if rank == 5 {
        let shape = registry.shape_of(tensor).unwrap_or_default();
        if shape != layout.canonical_bias_shape().as_slice() {
            return Err(LowerError::ShapeMismatch {
                op: OP,
                detail: format!(
                    "bias `{tensor}` has shape {shape:?}, expected {:?}",
                    layout.canonical_bias_shape()
                ),
            });
        }
        debug!(tensor, "bias already canonical");
        return Ok(());
    }
    let original = f32_payload(registry, tensor)?;
    check_len(tensor, original.len(), layout.compact_bias_len())?;
    let expanded = expand_bias(original, layout);
    debug!(tensor, len = expanded.len(), "expanding compact bias");
    registry.replace_initializer(
        tensor,
        ElementType::F32,
        layout.canonical_bias_shape(),
        TensorData::F32(expanded),
    );
    Ok(())
}

/// Expand a rank-2 peephole in the registry; rank-4 peepholes are checked only.
pub(crate) fn canonicalize_peephole(
    registry: &mut dyn TensorRegistry,
    tensor: &str,
    layout: &GateLayout,
) -> Result<()> {
    let rank = registry.shape_of(tensor).map_or(0, <[usize]>::len);
    if rank == 4 {
        let shape = registry.shape_of(tensor).unwrap_or_default();
        if shape != layout.canonical_peephole_shape().as_slice() {
            return Err(LowerError::ShapeMismatch {
                op: OP,
                detail: format!(
                    "peephole `{tensor}` has shape {shape:?}, expected {:?}",
                    layout.canonical_peephole_shape()
                ),
            });
        }
        debug!(tensor, "peephole already canonical");
        return Ok(());
    }
    let original = f32_payload(registry, tensor)?;
    check_len(tensor, original.len(), layout.compact_peephole_len())?;
    let expanded = expand_peephole(original, layout);
    debug!(tensor, len = expanded.len(), "expanding compact peephole");
    registry.replace_initializer(
        tensor,
        ElementType::F32,
        layout.canonical_peephole_shape(),
        TensorData::F32(expanded),
    );
    Ok(())
}
