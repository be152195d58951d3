// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Pure shape rules. Nothing here touches the registry.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{LowerError, Result};

/// Leading-axis convention of sequence tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SequenceLayout {
    /// `[seq, batch, ...]`
    #[default]
    TimeMajor,
    /// `[batch, seq, ...]`
    BatchMajor,
}

impl SequenceLayout {
    pub fn from_attr(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::TimeMajor),
            1 => Some(Self::BatchMajor),
            _ => None,
        }
    }

    /// `(seq_length, batch_size)` of a rank-3 sequence input.
    pub fn seq_and_batch(&self, x: &[usize]) -> (usize, usize) {
        match self {
            Self::TimeMajor => (x[0], x[1]),
            Self::BatchMajor => (x[1], x[0]),
        }
    }
}

pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Row-major strides: the last axis has stride 1.
pub fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    let mut running = 1;
    for (stride, extent) in strides.iter_mut().zip(shape).rev() {
        *stride = running;
        running *= extent;
    }
    strides
}

pub fn expect_rank(op: &'static str, tensor: &str, shape: &[usize], allowed: &[usize]) -> Result<()> {
    if allowed.contains(&shape.len()) {
        return Ok(());
    }
    let expected = allowed
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(" or ");
    Err(LowerError::rank(op, tensor, expected, shape.len()))
}

/// Checks that `perm` is a bijection over `0..rank`.
pub fn validate_permutation(perm: &[usize], rank: usize) -> Result<()> {
    let invalid = || LowerError::InvalidPermutation {
        perm: perm.to_vec(),
        rank,
    };
    if perm.len() != rank {
        return Err(invalid());
    }
    let mut seen = BTreeSet::new();
    for &axis in perm {
        if axis >= rank || !seen.insert(axis) {
            return Err(invalid());
        }
    }
    Ok(())
}

/// `out[i] = input[perm[i]]`.
pub fn transpose_shape(input: &[usize], perm: &[usize]) -> Result<Vec<usize>> {
    validate_permutation(perm, input.len())?;
    Ok(perm.iter().map(|&axis| input[axis]).collect())
}

/// Output shapes `[Y, Y_h, Y_c]` of a recurrent unit from `[X, W]`.
///
/// `num_directions` and `hidden` come from the gate-concatenated weight
/// `W[num_directions, 4 * hidden, input_size]`.
pub fn lstm_output_shapes(
    x: &[usize],
    w: &[usize],
    layout: SequenceLayout,
) -> Result<[Vec<usize>; 3]> {
    expect_rank("LSTM", "X", x, &[3])?;
    expect_rank("LSTM", "W", w, &[3])?;
    let num_directions = w[0];
    let hidden = w[1] / 4;
    let (seq, batch) = layout.seq_and_batch(x);
    Ok(match layout {
        SequenceLayout::TimeMajor => [
            vec![seq, num_directions, batch, hidden],
            vec![num_directions, batch, hidden],
            vec![num_directions, batch, hidden],
        ],
        SequenceLayout::BatchMajor => [
            vec![batch, seq, num_directions, hidden],
            vec![batch, num_directions, hidden],
            vec![batch, num_directions, hidden],
        ],
    })
}
