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

//! Code assembly for the recurrent unit.
//!
//! The emitted fragment runs in this order:
//!
//! 1. alias or transpose-copy `X` (and the initial states) into time-major
//!    buffers,
//! 2. declare the feed-forward, gate and state buffers plus the scalar
//!    kernel arguments,
//! 3. per direction: one `sgemm_` per gate over the whole sequence, bias
//!    `saxpy_`, scatter into the gate buffers, then a timestep loop that adds
//!    the recurrence term, peepholes and activations and updates the cell and
//!    hidden state,
//! 4. zero steps past each batch element's sequence length,
//! 5. copy the results into `Y`, `Y_h` and `Y_c`.
//!
//! Offsets that depend only on shapes are folded into literals; `offset`,
//! `index` and friends are C locals of the emitted timestep loop.

use tracing::trace;

use super::layout::{ActivationSlot, Gate, GateLayout};
use super::{LstmInputs, LstmOutputs, LstmPlan, ValidatedAttributes};
use crate::codegen::blas::{Saxpy, Sgemm};
use crate::codegen::{for_range, tensor_symbol, BufferView, GeneratedCode};
use crate::ops::activation::{emit_activation, ElementRange};
use crate::ops::clean_name;
use crate::shapes::SequenceLayout;

pub(crate) fn emit(
    instance: &str,
    inputs: &LstmInputs,
    outputs: &LstmOutputs,
    plan: &LstmPlan,
) -> GeneratedCode {
    let mut emitter = Emitter {
        op: format!("op_{}", clean_name(instance)),
        inputs,
        outputs,
        attrs: &plan.attrs,
        l: plan.layout,
        code: GeneratedCode::with_depth(1),
    };
    emitter.input();
    emitter.initial_state(inputs.initial_h.as_deref(), "initial_hidden_state");
    emitter.initial_state(inputs.initial_c.as_deref(), "initial_cell_state");
    emitter.declare_buffers();
    emitter.declare_scalars();
    for d in 0..plan.layout.num_directions {
        emitter.direction(d);
    }
    emitter.sequence_mask();
    emitter.outputs();
    emitter.code
}

/// Sum of offset terms with literal zeros dropped.
fn join_offset<I: IntoIterator<Item = String>>(terms: I) -> String {
    let terms: Vec<String> = terms.into_iter().filter(|t| t != "0").collect();
    if terms.is_empty() {
        "0".to_string()
    } else {
        terms.join(" + ")
    }
}

fn ptr(base: &str, offset: &str) -> String {
    if offset == "0" {
        base.to_string()
    } else {
        format!("{base} + {offset}")
    }
}

fn copy_line(src: &BufferView, dst: &str) -> String {
    format!("std::copy({src}, {src} + {}, {dst});", src.len)
}

struct Emitter<'a> {
    /// `op_<instance>`, the prefix of every scratch buffer and scalar.
    op: String,
    inputs: &'a LstmInputs,
    outputs: &'a LstmOutputs,
    attrs: &'a ValidatedAttributes,
    l: GateLayout,
    code: GeneratedCode,
}

impl<'a> Emitter<'a> {
    fn buf(&self, name: &str) -> String {
        format!("{}_{}", self.op, name)
    }

    fn gate_buf(&self, gate: Gate) -> String {
        self.buf(&format!("{}_gate", gate.name()))
    }

    fn ff_buf(&self, gate: Gate) -> String {
        self.buf(&format!("ff_{}_gate", gate.name()))
    }

    fn coupled(&self) -> bool {
        self.attrs.input_forget
    }

    fn line(&mut self, text: String) {
        self.code.emit_line(&text);
    }

    fn open_for(&mut self, var: &str, end: usize) {
        self.code.open(&for_range(var, "0", &end.to_string()));
    }

    /// `step * D*B*H + d*B*H`
    fn at_step(&self, step: &str, d: usize) -> String {
        join_offset([
            format!("{step} * {}", self.l.step_stride()),
            self.l.direction_offset(d).to_string(),
        ])
    }

    fn input(&mut self) {
        let x = tensor_symbol(&self.inputs.x);
        let input = self.buf("input");
        match self.attrs.layout {
            SequenceLayout::TimeMajor => self.line(format!("float *{input} = {x};")),
            SequenceLayout::BatchMajor => {
                let l = self.l;
                self.line(format!("float {input}[{}];", l.input_len()));
                self.open_for("seq", l.seq_length);
                self.open_for("batch", l.batch_size);
                self.open_for("i", l.input_size);
                self.line(format!(
                    "{input}[seq * {} + batch * {} + i] = {x}[batch * {} + seq * {} + i];",
                    l.batch_size * l.input_size,
                    l.input_size,
                    l.seq_length * l.input_size,
                    l.input_size
                ));
                self.code.close();
                self.code.close();
                self.code.close();
            }
        }
    }

    fn initial_state(&mut self, tensor: Option<&str>, name: &str) {
        let Some(tensor) = tensor else {
            return;
        };
        let src = tensor_symbol(tensor);
        let dst = self.buf(name);
        let l = self.l;
        match self.attrs.layout {
            SequenceLayout::TimeMajor => self.line(format!("float *{dst} = {src};")),
            SequenceLayout::BatchMajor => {
                self.line(format!("float {dst}[{}];", l.initial_state_size()));
                for d in 0..l.num_directions {
                    let dst_index = join_offset([
                        l.direction_offset(d).to_string(),
                        format!("batch * {}", l.hidden_size),
                        "h".to_string(),
                    ]);
                    let src_index = join_offset([
                        format!("batch * {}", l.num_directions * l.hidden_size),
                        (d * l.hidden_size).to_string(),
                        "h".to_string(),
                    ]);
                    self.open_for("batch", l.batch_size);
                    self.open_for("h", l.hidden_size);
                    self.line(format!("{dst}[{dst_index}] = {src}[{src_index}];"));
                    self.code.close();
                    self.code.close();
                }
            }
        }
    }

    fn declare_buffers(&mut self) {
        let l = self.l;
        for gate in Gate::active(self.coupled()) {
            let ff = self.ff_buf(gate);
            self.line(format!("float {ff}[{}];", l.ff_size()));
        }
        for gate in Gate::active(self.coupled()) {
            let buffer = self.gate_buf(gate);
            self.line(format!("float {buffer}[{}];", l.state_size()));
        }
        for state in ["cell_state", "new_cell_state"] {
            let buffer = self.buf(state);
            self.line(format!("float {buffer}[{}];", l.state_size()));
        }
        let hidden = self.buf("hidden_state");
        match (&self.attrs.layout, &self.outputs.y) {
            (SequenceLayout::TimeMajor, Some(y)) => {
                let y = tensor_symbol(y);
                self.line(format!("float *{hidden} = {y};"));
            }
            _ => self.line(format!("float {hidden}[{}];", l.state_size())),
        }
    }

    fn declare_scalars(&mut self) {
        let l = self.l;
        let op = self.op.clone();
        self.line(format!("char {op}_transA = 'N';"));
        self.line(format!("char {op}_transB = 'T';"));
        self.line(format!("int {op}_m = {};", l.seq_length * l.batch_size));
        self.line(format!("int {op}_n = {};", l.hidden_size));
        self.line(format!("int {op}_k = {};", l.input_size));
        self.line(format!("float {op}_alpha = 1.;"));
        self.line(format!("float {op}_beta = 0.;"));
        if self.inputs.b.is_some() {
            self.line(format!("int {op}_bias_size = {};", l.ff_size()));
            self.line(format!("int {op}_incx = 1;"));
            self.line(format!("int {op}_incy = 1;"));
        }
    }

    /// `out = operand * weights^T (+ out when accumulating)`, one row of
    /// `operand` per sequence/batch element.
    fn gemm(
        &self,
        weights: &BufferView,
        rows: &str,
        inner: &str,
        operand: String,
        accumulate: bool,
        out: String,
    ) -> String {
        let trans_a = self.buf("transA");
        let trans_b = self.buf("transB");
        let n = self.buf("n");
        let alpha = self.buf("alpha");
        let beta = if accumulate { alpha.clone() } else { self.buf("beta") };
        Sgemm {
            transa: &trans_b,
            transb: &trans_a,
            m: &n,
            n: rows,
            k: inner,
            alpha: &alpha,
            a: weights.to_string(),
            lda: inner,
            b: operand,
            ldb: inner,
            beta: &beta,
            c: out,
            ldc: &n,
        }
        .render()
    }

    fn direction(&mut self, d: usize) {
        let l = self.l;
        let reversed = self.attrs.direction.is_reversed(d);
        trace!(direction = d, reversed, "assembling LSTM direction");

        self.feed_forward(d);
        if let Some(bias) = self.inputs.b.as_deref() {
            self.bias(d, bias);
        }

        let step = l.step_size();
        self.open_for("seq", l.seq_length);
        self.line(format!("size_t ff_offset = seq * {step};"));
        let gate_offset = self.at_step("seq", d);
        self.line(format!("size_t gate_offset = {gate_offset};"));
        for gate in Gate::active(self.coupled()) {
            let ff = self.ff_buf(gate);
            let dst = self.gate_buf(gate);
            self.line(format!(
                "std::copy({ff} + ff_offset, {ff} + ff_offset + {step}, {dst} + gate_offset);"
            ));
        }
        self.code.close();

        self.open_for("seq", l.seq_length);
        if reversed {
            self.line(format!("size_t index = {} - seq;", l.seq_length - 1));
        } else {
            self.line("size_t index = seq;".to_string());
        }
        self.line(format!("int m2 = {};", l.batch_size));
        let offset = self.at_step("index", d);
        self.line(format!("size_t offset = {offset};"));
        let previous = if reversed {
            self.at_step("(index + 1)", d)
        } else {
            self.at_step("(seq - 1)", d)
        };

        self.recurrence(d, &previous);

        let cell_gate = self.gate_buf(Gate::Cell);
        self.activate(&cell_gate, ActivationSlot::Cell, d);

        if self.inputs.p.is_some() {
            self.input_forget_peepholes(d, &previous);
        }
        let input_gate = self.gate_buf(Gate::Input);
        self.activate(&input_gate, ActivationSlot::Gate, d);
        if !self.coupled() {
            let forget_gate = self.gate_buf(Gate::Forget);
            self.activate(&forget_gate, ActivationSlot::Gate, d);
        }

        self.cell_update(d, &previous);

        let output_gate = self.gate_buf(Gate::Output);
        let cell_state = self.buf("cell_state");
        if let Some(p) = self.inputs.p.as_deref() {
            let p = tensor_symbol(p);
            let mut code = GeneratedCode::new();
            self.peephole_loop(&mut code, d, Gate::Output, &p, &format!("{cell_state}[i + offset]"));
            self.code.append(code);
        }
        self.activate(&output_gate, ActivationSlot::Gate, d);

        let new_cell = self.buf("new_cell_state");
        self.line(format!(
            "std::copy({cell_state} + offset, {cell_state} + offset + {step}, {new_cell} + offset);"
        ));
        self.activate(&new_cell, ActivationSlot::State, d);

        let hidden = self.buf("hidden_state");
        self.code.open(&for_range("i", "offset", &format!("offset + {step}")));
        self.line(format!("{hidden}[i] = {output_gate}[i] * {new_cell}[i];"));
        self.code.close();

        self.code.close();
    }

    fn feed_forward(&mut self, d: usize) {
        let l = self.l;
        let w = BufferView::whole(tensor_symbol(&self.inputs.w), l.weight_len());
        let (m, k) = (self.buf("m"), self.buf("k"));
        let input = self.buf("input");
        for gate in Gate::active(self.coupled()) {
            let weights = w.slice(l.weight_offset(d, gate), l.hidden_size * l.input_size);
            let call = self.gemm(&weights, &m, &k, input.clone(), false, self.ff_buf(gate));
            self.line(call);
        }
    }

    fn bias(&mut self, d: usize, bias: &str) {
        let l = self.l;
        let bias = tensor_symbol(bias);
        let (size, alpha) = (self.buf("bias_size"), self.buf("alpha"));
        let (incx, incy) = (self.buf("incx"), self.buf("incy"));
        for gate in Gate::active(self.coupled()) {
            let call = Saxpy {
                n: &size,
                alpha: &alpha,
                x: BufferView::new(bias.clone(), l.bias_offset(d, gate), l.ff_size()).to_string(),
                incx: &incx,
                y: self.ff_buf(gate),
                incy: &incy,
            }
            .render();
            self.line(call);
        }
    }

    /// Accumulate `h_prev * R_gate^T` into every gate at this timestep.
    fn recurrence(&mut self, d: usize, previous: &str) {
        let first = self.inputs.initial_h.as_ref().map(|_| {
            let start = ptr(
                &self.buf("initial_hidden_state"),
                &self.l.direction_offset(d).to_string(),
            );
            self.recurrence_calls(d, start, None)
        });
        let hidden = self.buf("hidden_state");
        let rest = self.recurrence_calls(d, format!("{hidden} + previous_offset"), Some(previous));
        self.split_first_step(first, rest);
    }

    fn recurrence_calls(&self, d: usize, operand: String, previous: Option<&str>) -> GeneratedCode {
        let l = self.l;
        let r = BufferView::whole(tensor_symbol(&self.inputs.r), l.recurrence_len());
        let n = self.buf("n");
        let mut code = GeneratedCode::new();
        if let Some(previous) = previous {
            code.emit_line(&format!("size_t previous_offset = {previous};"));
        }
        for gate in Gate::active(self.coupled()) {
            let weights = r.slice(l.recurrence_offset(d, gate), l.hidden_size * l.hidden_size);
            let out = format!("{} + offset", self.gate_buf(gate));
            code.emit_line(&self.gemm(&weights, "m2", &n, operand.clone(), true, out));
        }
        code
    }

    /// `gate[i + offset] += P_gate[i] * state`, for one timestep.
    fn peephole_loop(&self, code: &mut GeneratedCode, d: usize, gate: Gate, p: &str, state: &str) {
        let Some(p_offset) = self.l.peephole_offset(d, gate) else {
            return;
        };
        let p_index = join_offset(["i".to_string(), p_offset.to_string()]);
        code.open(&for_range("i", "0", &self.l.step_size().to_string()));
        code.emit_line(&format!(
            "{}[i + offset] += {p}[{p_index}] * {state};",
            self.gate_buf(gate)
        ));
        code.close();
    }

    fn input_forget_peepholes(&mut self, d: usize, previous: &str) {
        let Some(p) = self.inputs.p.as_deref() else {
            return;
        };
        let p = tensor_symbol(p);
        let gates: Vec<Gate> = Gate::active(self.coupled())
            .filter(|g| matches!(g, Gate::Input | Gate::Forget))
            .collect();

        let first = self.inputs.initial_c.as_ref().map(|_| {
            let initial = self.buf("initial_cell_state");
            let index = join_offset(["i".to_string(), self.l.direction_offset(d).to_string()]);
            let mut code = GeneratedCode::new();
            for &gate in &gates {
                self.peephole_loop(&mut code, d, gate, &p, &format!("{initial}[{index}]"));
            }
            code
        });

        let cell = self.buf("cell_state");
        let mut rest = GeneratedCode::new();
        rest.emit_line(&format!("size_t c_offset = {previous};"));
        for &gate in &gates {
            self.peephole_loop(&mut rest, d, gate, &p, &format!("{cell}[i + c_offset]"));
        }
        self.split_first_step(first, rest);
    }

    /// `c = i * g`, plus `f * c_prev` unless input and forget are coupled.
    fn cell_update(&mut self, d: usize, previous: &str) {
        let step = self.l.step_size();
        let cell = self.buf("cell_state");
        let input = self.gate_buf(Gate::Input);
        let cell_gate = self.gate_buf(Gate::Cell);
        self.code.open(&for_range("i", "offset", &format!("offset + {step}")));
        self.line(format!("{cell}[i] = {input}[i] * {cell_gate}[i];"));
        self.code.close();

        if self.coupled() {
            return;
        }
        let forget = self.gate_buf(Gate::Forget);
        let first = self.inputs.initial_c.as_ref().map(|_| {
            let initial = self.buf("initial_cell_state");
            let index = join_offset(["i".to_string(), self.l.direction_offset(d).to_string()]);
            let mut code = GeneratedCode::new();
            code.open(&for_range("i", "0", &step.to_string()));
            code.emit_line(&format!(
                "{cell}[i + offset] += {forget}[i + offset] * {initial}[{index}];"
            ));
            code.close();
            code
        });
        let mut rest = GeneratedCode::new();
        rest.emit_line(&format!("size_t previous_offset = {previous};"));
        rest.open(&for_range("i", "0", &step.to_string()));
        rest.emit_line(&format!(
            "{cell}[i + offset] += {forget}[i + offset] * {cell}[i + previous_offset];"
        ));
        rest.close();
        self.split_first_step(first, rest);
    }

    /// `if (seq == 0) { first } else { rest }`. Without a first-step body only
    /// the `seq > 0` branch is emitted.
    fn split_first_step(&mut self, first: Option<GeneratedCode>, rest: GeneratedCode) {
        match first {
            Some(first) => {
                self.code.open("if (seq == 0)");
                self.code.append(first);
                self.code.reopen("else");
                self.code.append(rest);
                self.code.close();
            }
            None => {
                self.code.open("if (seq > 0)");
                self.code.append(rest);
                self.code.close();
            }
        }
    }

    fn activate(&mut self, buffer: &str, slot: ActivationSlot, d: usize) {
        let attrs = self.attrs;
        let spec = attrs.activations[slot.index(d)];
        let range = ElementRange::new("offset", self.l.step_size());
        emit_activation(&mut self.code, &spec, buffer, range, attrs.clip);
    }

    fn sequence_mask(&mut self) {
        let Some(lens) = self.inputs.sequence_lens.as_deref() else {
            return;
        };
        let l = self.l;
        let lens = tensor_symbol(lens);
        let cell = self.buf("cell_state");
        let hidden = self.buf("hidden_state");
        self.open_for("seq", l.seq_length);
        self.open_for("batch", l.batch_size);
        self.code.open(&format!("if (seq >= {lens}[batch])"));
        for d in 0..l.num_directions {
            let idx = join_offset([
                self.at_step("seq", d),
                format!("batch * {}", l.hidden_size),
                "h".to_string(),
            ]);
            self.open_for("h", l.hidden_size);
            self.line(format!("size_t idx = {idx};"));
            self.line(format!("{cell}[idx] = 0.;"));
            self.line(format!("{hidden}[idx] = 0.;"));
            self.code.close();
        }
        self.code.close();
        self.code.close();
        self.code.close();
    }

    fn outputs(&mut self) {
        let hidden = self.buf("hidden_state");
        let cell = self.buf("cell_state");
        let outputs = self.outputs;
        if self.attrs.layout == SequenceLayout::BatchMajor {
            if let Some(y) = outputs.y.as_deref() {
                self.scatter_sequence(&hidden, y);
            }
        }
        if let Some(y_h) = outputs.y_h.as_deref() {
            self.final_state(&hidden, y_h);
        }
        if let Some(y_c) = outputs.y_c.as_deref() {
            self.final_state(&cell, y_c);
        }
    }

    /// Time-major hidden states into a batch-major `Y`.
    fn scatter_sequence(&mut self, hidden: &str, y: &str) {
        let l = self.l;
        let y = tensor_symbol(y);
        for d in 0..l.num_directions {
            let offset = join_offset([
                self.at_step("seq", d),
                format!("batch * {}", l.hidden_size),
            ]);
            let y_offset = join_offset([
                format!("batch * {}", l.seq_length * l.num_directions * l.hidden_size),
                format!("seq * {}", l.num_directions * l.hidden_size),
                (d * l.hidden_size).to_string(),
            ]);
            self.open_for("seq", l.seq_length);
            self.open_for("batch", l.batch_size);
            self.line(format!("size_t offset = {offset};"));
            self.line(format!("size_t y_offset = {y_offset};"));
            self.line(format!(
                "std::copy({hidden} + offset, {hidden} + offset + {}, {y} + y_offset);",
                l.hidden_size
            ));
            self.code.close();
            self.code.close();
        }
    }

    /// Last valid step of every direction into `Y_h` or `Y_c`.
    ///
    /// Forward directions end at physical step `seq_length - 1` (or
    /// `sequence_lens[batch] - 1`); reversed directions end at step 0.
    fn final_state(&mut self, src: &str, dst: &str) {
        let l = self.l;
        let dst = tensor_symbol(dst);
        let lens = self.inputs.sequence_lens.as_deref().map(tensor_symbol);
        let time_major = self.attrs.layout == SequenceLayout::TimeMajor;
        for d in 0..l.num_directions {
            let reversed = self.attrs.direction.is_reversed(d);
            if time_major && lens.is_none() {
                let last = if reversed { 0 } else { l.seq_length - 1 };
                let offset = last * l.step_stride() + l.direction_offset(d);
                let view = BufferView::new(src, offset, l.step_size());
                let target = ptr(&dst, &l.direction_offset(d).to_string());
                self.line(copy_line(&view, &target));
                continue;
            }

            let row = format!("batch * {}", l.hidden_size);
            self.open_for("batch", l.batch_size);
            if reversed {
                let offset = join_offset([l.direction_offset(d).to_string(), row.clone()]);
                self.line(format!("size_t offset = {offset};"));
            } else {
                let seq = match &lens {
                    Some(lens) => format!("{lens}[batch] - 1"),
                    None => (l.seq_length - 1).to_string(),
                };
                self.line(format!("size_t seq = {seq};"));
                let offset = join_offset([self.at_step("seq", d), row.clone()]);
                self.line(format!("size_t offset = {offset};"));
            }
            let y_offset = if time_major {
                join_offset([l.direction_offset(d).to_string(), row])
            } else {
                join_offset([
                    format!("batch * {}", l.num_directions * l.hidden_size),
                    (d * l.hidden_size).to_string(),
                ])
            };
            self.line(format!("size_t y_h_offset = {y_offset};"));
            self.line(format!(
                "std::copy({src} + offset, {src} + offset + {}, {dst} + y_h_offset);",
                l.hidden_size
            ));
            self.code.close();
        }
    }
}
