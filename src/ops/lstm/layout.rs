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

//! Gate ordering and every offset into weight, bias, peephole and state
//! buffers.
//!
//! Exchange-format tensors store gates block-major as input, forget, output,
//! cell for `W`, `R` and `B`; the peephole tensor stores input, forget,
//! output. All slicing in the canonicalizer and the code generator goes
//! through [`GateLayout`].

/// One of the four gate sub-computations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gate {
    Input,
    Output,
    Cell,
    Forget,
}

/// How a gate's activation is chosen from the per-direction triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationSlot {
    /// `f`: input, output and forget gates.
    Gate = 0,
    /// `g`: cell gate.
    Cell = 1,
    /// `h`: applied to the new cell state.
    State = 2,
}

impl ActivationSlot {
    /// Index into the flattened activation list.
    pub fn index(self, direction: usize) -> usize {
        direction * ACTIVATIONS_PER_DIRECTION + self as usize
    }
}

pub const ACTIVATIONS_PER_DIRECTION: usize = 3;
pub const GATE_BLOCKS: usize = 4;
pub const PEEPHOLE_BLOCKS: usize = 3;

impl Gate {
    /// Emission order of the generated code.
    pub const ALL: [Gate; 4] = [Gate::Input, Gate::Output, Gate::Cell, Gate::Forget];

    pub fn name(self) -> &'static str {
        match self {
            Gate::Input => "input",
            Gate::Output => "output",
            Gate::Cell => "cell",
            Gate::Forget => "forget",
        }
    }

    /// Block index inside `W`, `R` and the canonical bias.
    pub fn block(self) -> usize {
        match self {
            Gate::Input => 0,
            Gate::Forget => 1,
            Gate::Output => 2,
            Gate::Cell => 3,
        }
    }

    /// Block index inside the peephole tensor; the cell gate has none.
    pub fn peephole_block(self) -> Option<usize> {
        match self {
            Gate::Input => Some(0),
            Gate::Forget => Some(1),
            Gate::Output => Some(2),
            Gate::Cell => None,
        }
    }

    pub fn activation_slot(self) -> ActivationSlot {
        match self {
            Gate::Cell => ActivationSlot::Cell,
            _ => ActivationSlot::Gate,
        }
    }

    /// Gates that exist under the given coupling mode.
    pub fn active(input_forget: bool) -> impl Iterator<Item = Gate> {
        Gate::ALL
            .into_iter()
            .filter(move |gate| !(input_forget && *gate == Gate::Forget))
    }
}

/// Resolved dimensions of one recurrent unit instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateLayout {
    pub num_directions: usize,
    pub seq_length: usize,
    pub batch_size: usize,
    pub hidden_size: usize,
    pub input_size: usize,
}

impl GateLayout {
    /// Elements of one gate slice of `W` for one direction.
    fn w_block(&self) -> usize {
        self.hidden_size * self.input_size
    }

    fn r_block(&self) -> usize {
        self.hidden_size * self.hidden_size
    }

    /// Elements of `W`: `D * 4H * I`.
    pub fn weight_len(&self) -> usize {
        self.num_directions * GATE_BLOCKS * self.w_block()
    }

    pub fn recurrence_len(&self) -> usize {
        self.num_directions * GATE_BLOCKS * self.r_block()
    }

    pub fn weight_offset(&self, direction: usize, gate: Gate) -> usize {
        direction * GATE_BLOCKS * self.w_block() + gate.block() * self.w_block()
    }

    pub fn recurrence_offset(&self, direction: usize, gate: Gate) -> usize {
        direction * GATE_BLOCKS * self.r_block() + gate.block() * self.r_block()
    }

    /// Offset into the canonical `[4, D, S, B, H]` bias.
    pub fn bias_offset(&self, direction: usize, gate: Gate) -> usize {
        gate.block() * self.num_directions * self.ff_size() + direction * self.ff_size()
    }

    /// Offset into the canonical `[D, 3, B, H]` peephole.
    pub fn peephole_offset(&self, direction: usize, gate: Gate) -> Option<usize> {
        gate.peephole_block()
            .map(|block| (direction * PEEPHOLE_BLOCKS + block) * self.step_size())
    }

    /// Elements of one timestep of one direction: `B * H`.
    pub fn step_size(&self) -> usize {
        self.batch_size * self.hidden_size
    }

    /// Distance between consecutive timesteps in a state buffer: `D * B * H`.
    pub fn step_stride(&self) -> usize {
        self.num_directions * self.step_size()
    }

    /// Offset of `direction` within one timestep (and within initial states).
    pub fn direction_offset(&self, direction: usize) -> usize {
        direction * self.step_size()
    }

    /// Feed-forward gate buffer length: `S * B * H`.
    pub fn ff_size(&self) -> usize {
        self.seq_length * self.step_size()
    }

    /// Gate and state buffer length: `S * D * B * H`.
    pub fn state_size(&self) -> usize {
        self.seq_length * self.step_stride()
    }

    /// Initial hidden/cell state length: `D * B * H`.
    pub fn initial_state_size(&self) -> usize {
        self.step_stride()
    }

    pub fn input_len(&self) -> usize {
        self.seq_length * self.batch_size * self.input_size
    }

    pub fn canonical_bias_shape(&self) -> Vec<usize> {
        vec![
            GATE_BLOCKS,
            self.num_directions,
            self.seq_length,
            self.batch_size,
            self.hidden_size,
        ]
    }

    pub fn canonical_peephole_shape(&self) -> Vec<usize> {
        vec![
            self.num_directions,
            PEEPHOLE_BLOCKS,
            self.batch_size,
            self.hidden_size,
        ]
    }

    /// Compact bias length `D * 8 * H`.
    pub fn compact_bias_len(&self) -> usize {
        self.num_directions * 2 * GATE_BLOCKS * self.hidden_size
    }

    /// Compact peephole length `D * 3 * H`.
    pub fn compact_peephole_len(&self) -> usize {
        self.num_directions * PEEPHOLE_BLOCKS * self.hidden_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(num_directions: usize) -> GateLayout {
        GateLayout {
            num_directions,
            seq_length: 3,
            batch_size: 1,
            hidden_size: 4,
            input_size: 2,
        }
    }

    #[test]
    fn forward_weight_offsets() {
        let l = layout(1);
        assert_eq!(l.weight_offset(0, Gate::Input), 0);
        assert_eq!(l.weight_offset(0, Gate::Forget), 8);
        assert_eq!(l.weight_offset(0, Gate::Output), 16);
        assert_eq!(l.weight_offset(0, Gate::Cell), 24);
    }

    #[test]
    fn second_direction_shifts_by_four_blocks() {
        let l = layout(2);
        assert_eq!(l.weight_offset(1, Gate::Input), 4 * 4 * 2);
        assert_eq!(l.weight_offset(1, Gate::Forget), 4 * 4 * 2 + 4 * 2);
        assert_eq!(l.recurrence_offset(1, Gate::Output), 4 * 16 + 2 * 16);
        assert_eq!(l.weight_len(), 2 * 16 * 2);
        assert_eq!(l.recurrence_len(), 2 * 16 * 4);
    }

    #[test]
    fn bias_and_peephole_offsets() {
        let l = layout(2);
        // ff_size = 3 * 1 * 4 = 12
        assert_eq!(l.bias_offset(0, Gate::Output), 2 * 2 * 12);
        assert_eq!(l.bias_offset(1, Gate::Forget), 2 * 12 + 12);
        assert_eq!(l.peephole_offset(0, Gate::Forget), Some(4));
        assert_eq!(l.peephole_offset(1, Gate::Output), Some(5 * 4));
        assert_eq!(l.peephole_offset(1, Gate::Cell), None);
    }

    #[test]
    fn coupled_mode_drops_forget_gate() {
        let gates: Vec<_> = Gate::active(true).collect();
        assert_eq!(gates, vec![Gate::Input, Gate::Output, Gate::Cell]);
        assert_eq!(Gate::active(false).count(), 4);
    }

    #[test]
    fn activation_slots() {
        assert_eq!(Gate::Forget.activation_slot().index(1), 3);
        assert_eq!(Gate::Cell.activation_slot().index(1), 4);
        assert_eq!(ActivationSlot::State.index(0), 2);
    }
}
