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

//! Elementwise nonlinearities emitted as in-place loops.
//!
//! Each kind owns one entry in [`ACTIVATIONS`]: its exchange-format name,
//! default parameters, and the function that writes the per-element
//! statement(s). The synthesizer wraps those statements in a loop over a
//! contiguous index range, optionally preceded by a saturation pass.

use serde::{Deserialize, Serialize};

use crate::codegen::{for_range, format_float, GeneratedCode};
use crate::error::{LowerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationKind {
    Relu,
    Tanh,
    Sigmoid,
    Affine,
    LeakyRelu,
    ThresholdRelu,
    ScaledTanh,
    HardSigmoid,
    Elu,
    Softsign,
    Softplus,
}

type EmitFn = fn(&mut GeneratedCode, &str, f32, f32);

struct ActivationEntry {
    kind: ActivationKind,
    name: &'static str,
    alpha: f32,
    beta: f32,
    emit: EmitFn,
}

/// Indexed by `ActivationKind as usize`; keep the order in sync with the enum.
static ACTIVATIONS: [ActivationEntry; 11] = [
    ActivationEntry { kind: ActivationKind::Relu, name: "Relu", alpha: 0.0, beta: 0.0, emit: emit_relu },
    ActivationEntry { kind: ActivationKind::Tanh, name: "Tanh", alpha: 0.0, beta: 0.0, emit: emit_tanh },
    ActivationEntry { kind: ActivationKind::Sigmoid, name: "Sigmoid", alpha: 0.0, beta: 0.0, emit: emit_sigmoid },
    ActivationEntry { kind: ActivationKind::Affine, name: "Affine", alpha: 1.0, beta: 0.0, emit: emit_affine },
    ActivationEntry { kind: ActivationKind::LeakyRelu, name: "LeakyRelu", alpha: 0.01, beta: 0.0, emit: emit_leaky_relu },
    ActivationEntry { kind: ActivationKind::ThresholdRelu, name: "ThresholdRelu", alpha: 1.0, beta: 0.0, emit: emit_threshold_relu },
    ActivationEntry { kind: ActivationKind::ScaledTanh, name: "ScaledTanh", alpha: 1.0, beta: 1.0, emit: emit_scaled_tanh },
    ActivationEntry { kind: ActivationKind::HardSigmoid, name: "HardSigmoid", alpha: 0.2, beta: 0.5, emit: emit_hard_sigmoid },
    ActivationEntry { kind: ActivationKind::Elu, name: "Elu", alpha: 1.0, beta: 0.0, emit: emit_elu },
    ActivationEntry { kind: ActivationKind::Softsign, name: "Softsign", alpha: 0.0, beta: 0.0, emit: emit_softsign },
    ActivationEntry { kind: ActivationKind::Softplus, name: "Softplus", alpha: 0.0, beta: 0.0, emit: emit_softplus },
];

impl ActivationKind {
    pub const ALL: [ActivationKind; 11] = [
        ActivationKind::Relu,
        ActivationKind::Tanh,
        ActivationKind::Sigmoid,
        ActivationKind::Affine,
        ActivationKind::LeakyRelu,
        ActivationKind::ThresholdRelu,
        ActivationKind::ScaledTanh,
        ActivationKind::HardSigmoid,
        ActivationKind::Elu,
        ActivationKind::Softsign,
        ActivationKind::Softplus,
    ];

    /// Parse an exchange-format activation name (case sensitive).
    pub fn parse(name: &str) -> Result<Self> {
        ACTIVATIONS
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.kind)
            .ok_or_else(|| LowerError::UnsupportedActivation(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        self.entry().name
    }

    pub fn default_alpha(&self) -> f32 {
        self.entry().alpha
    }

    pub fn default_beta(&self) -> f32 {
        self.entry().beta
    }

    fn entry(&self) -> &'static ActivationEntry {
        &ACTIVATIONS[*self as usize]
    }
}

/// An activation kind with resolved parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivationSpec {
    pub kind: ActivationKind,
    pub alpha: f32,
    pub beta: f32,
}

impl ActivationSpec {
    pub fn new(kind: ActivationKind) -> Self {
        Self::with_params(kind, None, None)
    }

    /// Unset parameters take the kind's defaults.
    pub fn with_params(kind: ActivationKind, alpha: Option<f32>, beta: Option<f32>) -> Self {
        Self {
            kind,
            alpha: alpha.unwrap_or_else(|| kind.default_alpha()),
            beta: beta.unwrap_or_else(|| kind.default_beta()),
        }
    }

    /// Per-element statements rewriting `elem` in place.
    pub fn emit_element(&self, code: &mut GeneratedCode, elem: &str) {
        (self.kind.entry().emit)(code, elem, self.alpha, self.beta);
    }
}

/// A contiguous run of `len` elements starting at the C expression `start`.
#[derive(Debug, Clone, Copy)]
pub struct ElementRange<'a> {
    pub start: &'a str,
    pub len: usize,
}

impl<'a> ElementRange<'a> {
    pub fn new(start: &'a str, len: usize) -> Self {
        Self { start, len }
    }

    fn loop_header(&self) -> String {
        let end = if self.start == "0" {
            self.len.to_string()
        } else {
            format!("{} + {}", self.start, self.len)
        };
        for_range("i", self.start, &end)
    }
}

/// Returns the clip bound when clipping is enabled (`clip > 0`).
pub fn clip_threshold(clip: Option<f32>) -> Option<f32> {
    clip.filter(|c| *c > 0.0)
}

/// Clamp `buffer[range]` into `[-clip, clip]`.
pub fn emit_clip(code: &mut GeneratedCode, buffer: &str, range: ElementRange<'_>, clip: f32) {
    let lo = format_float(-clip);
    let hi = format_float(clip);
    code.open(&range.loop_header());
    code.emit_line(&format!("float x = ({buffer}[i] > {lo}) ? {buffer}[i] : {lo};"));
    code.emit_line(&format!("{buffer}[i] = (x < {hi}) ? x : {hi};"));
    code.close();
}

/// Rewrite `buffer[i] = f(buffer[i])` for every `i` in `range`, clamping first
/// when a positive clip is configured.
pub fn emit_activation(
    code: &mut GeneratedCode,
    spec: &ActivationSpec,
    buffer: &str,
    range: ElementRange<'_>,
    clip: Option<f32>,
) {
    if let Some(clip) = clip_threshold(clip) {
        emit_clip(code, buffer, range, clip);
    }
    code.open(&range.loop_header());
    spec.emit_element(code, &format!("{buffer}[i]"));
    code.close();
}

fn emit_relu(code: &mut GeneratedCode, x: &str, _alpha: f32, _beta: f32) {
    code.emit_line(&format!("if ({x} < 0.)"));
    code.emit_line(&format!("\t{x} = 0.;"));
}

fn emit_tanh(code: &mut GeneratedCode, x: &str, _alpha: f32, _beta: f32) {
    code.emit_line(&format!("float ex = exp(-2 * {x});"));
    code.emit_line(&format!("{x} = (1. - ex) / (1. + ex);"));
}

fn emit_sigmoid(code: &mut GeneratedCode, x: &str, _alpha: f32, _beta: f32) {
    code.emit_line(&format!("{x} = 1. / (1. + exp(-{x}));"));
}

fn emit_affine(code: &mut GeneratedCode, x: &str, alpha: f32, beta: f32) {
    code.emit_line(&format!(
        "{x} = {} * {x} + {};",
        format_float(alpha),
        format_float(beta)
    ));
}

fn emit_leaky_relu(code: &mut GeneratedCode, x: &str, alpha: f32, _beta: f32) {
    code.emit_line(&format!("if ({x} < 0.)"));
    code.emit_line(&format!("\t{x} = {} * {x};", format_float(alpha)));
}

fn emit_threshold_relu(code: &mut GeneratedCode, x: &str, alpha: f32, _beta: f32) {
    code.emit_line(&format!("if ({x} < {})", format_float(alpha)));
    code.emit_line(&format!("\t{x} = 0.;"));
}

fn emit_scaled_tanh(code: &mut GeneratedCode, x: &str, alpha: f32, beta: f32) {
    code.emit_line(&format!("float ex = exp(-2 * {} * {x});", format_float(beta)));
    code.emit_line(&format!("{x} = {} * (1. - ex) / (1. + ex);", format_float(alpha)));
}

fn emit_hard_sigmoid(code: &mut GeneratedCode, x: &str, alpha: f32, beta: f32) {
    code.emit_line(&format!(
        "float a = {} * {x} + {};",
        format_float(alpha),
        format_float(beta)
    ));
    code.emit_line("float b = (a > 0.) ? a : 0.;");
    code.emit_line(&format!("{x} = (b < 1.) ? b : 1.;"));
}

fn emit_elu(code: &mut GeneratedCode, x: &str, alpha: f32, _beta: f32) {
    code.emit_line(&format!("if ({x} < 0.)"));
    code.emit_line(&format!("\t{x} = {} * (exp({x}) - 1.);", format_float(alpha)));
}

fn emit_softsign(code: &mut GeneratedCode, x: &str, _alpha: f32, _beta: f32) {
    code.emit_line(&format!("{x} = {x} / (1. + fabs({x}));"));
}

fn emit_softplus(code: &mut GeneratedCode, x: &str, _alpha: f32, _beta: f32) {
    code.emit_line(&format!("{x} = log(1. + exp({x}));"));
}
