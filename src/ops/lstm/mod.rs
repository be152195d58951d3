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

//! Long short-term memory recurrent unit.
//!
//! `initialize` resolves shapes, validates attributes, canonicalizes the bias
//! and peephole initializers and registers outputs. `generate` assembles the
//! time-major recurrence described by [`generate`] from the resolved
//! [`LstmPlan`].

pub mod canonical;
pub mod generate;
pub mod layout;

use serde::{Deserialize, Serialize};
use tracing::debug;

use self::layout::{GateLayout, ACTIVATIONS_PER_DIRECTION};
use super::activation::{ActivationKind, ActivationSpec};
use super::{clean_name, require_element_type, require_shape, Operator};
use crate::codegen::GeneratedCode;
use crate::error::{LowerError, Result};
use crate::registry::TensorRegistry;
use crate::shapes::{expect_rank, lstm_output_shapes, SequenceLayout};
use crate::types::ElementType;

const OP: &str = "LSTM";

/// Processing order of the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
    Bidirectional,
}

impl Direction {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "forward" => Ok(Direction::Forward),
            "backward" => Ok(Direction::Backward),
            "bidirectional" => Ok(Direction::Bidirectional),
            other => Err(LowerError::attribute(
                OP,
                "direction",
                other,
                "expected forward, backward or bidirectional",
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Bidirectional => "bidirectional",
        }
    }

    pub fn num_directions(&self) -> usize {
        match self {
            Direction::Bidirectional => 2,
            _ => 1,
        }
    }

    /// Whether direction index `d` walks the sequence from the last step.
    pub fn is_reversed(&self, d: usize) -> bool {
        *self == Direction::Backward || d == 1
    }
}

fn default_direction() -> String {
    Direction::Forward.as_str().to_string()
}

/// Attribute set as it appears on the graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmAttributes {
    #[serde(default)]
    pub activations: Vec<String>,
    #[serde(default)]
    pub activation_alpha: Vec<f32>,
    #[serde(default)]
    pub activation_beta: Vec<f32>,
    /// Absent or non-positive disables clipping.
    #[serde(default)]
    pub clip: Option<f32>,
    #[serde(default = "default_direction")]
    pub direction: String,
    pub hidden_size: usize,
    #[serde(default)]
    pub input_forget: i64,
    #[serde(default)]
    pub layout: i64,
}

impl LstmAttributes {
    pub fn new(hidden_size: usize) -> Self {
        Self {
            activations: Vec::new(),
            activation_alpha: Vec::new(),
            activation_beta: Vec::new(),
            clip: None,
            direction: default_direction(),
            hidden_size,
            input_forget: 0,
            layout: 0,
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| LowerError::attribute(OP, "attributes", text, e.to_string()))
    }

    pub fn with_direction(mut self, direction: &str) -> Self {
        self.direction = direction.to_string();
        self
    }

    pub fn with_layout(mut self, layout: i64) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_input_forget(mut self, input_forget: i64) -> Self {
        self.input_forget = input_forget;
        self
    }

    pub fn with_clip(mut self, clip: f32) -> Self {
        self.clip = Some(clip);
        self
    }

    pub fn with_activations(mut self, names: &[&str]) -> Self {
        self.activations = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn sequence_layout(&self) -> Result<SequenceLayout> {
        u32::try_from(self.layout)
            .ok()
            .and_then(SequenceLayout::from_attr)
            .ok_or_else(|| {
                LowerError::attribute(
                    OP,
                    "layout",
                    self.layout,
                    "must be 0 (time-major) or 1 (batch-major)",
                )
            })
    }

    /// Check every attribute against its domain and resolve activations.
    ///
    /// `weight_shape` is `W`'s shape; its second axis must be
    /// `4 * hidden_size`.
    pub fn validate(&self, weight_shape: &[usize]) -> Result<ValidatedAttributes> {
        let kinds = self
            .activations
            .iter()
            .map(|name| ActivationKind::parse(name))
            .collect::<Result<Vec<_>>>()?;
        let direction = Direction::parse(&self.direction)?;
        if weight_shape.get(1).copied() != Some(4 * self.hidden_size) {
            return Err(LowerError::ShapeMismatch {
                op: OP,
                detail: format!(
                    "hidden_size {} requires W[1] = {}, found {:?}",
                    self.hidden_size,
                    4 * self.hidden_size,
                    weight_shape
                ),
            });
        }
        let input_forget = match self.input_forget {
            0 => false,
            1 => true,
            other => return Err(LowerError::attribute(OP, "input_forget", other, "must be 0 or 1")),
        };
        let layout = self.sequence_layout()?;
        for (attribute, values) in [
            ("activation_alpha", &self.activation_alpha),
            ("activation_beta", &self.activation_beta),
        ] {
            if let Some(value) = values.iter().find(|v| !v.is_finite()) {
                return Err(LowerError::attribute(OP, attribute, value, "must be finite"));
            }
        }
        if let Some(clip) = self.clip.filter(|c| !c.is_finite()) {
            return Err(LowerError::attribute(OP, "clip", clip, "must be finite"));
        }

        let expected = direction.num_directions() * ACTIVATIONS_PER_DIRECTION;
        let kinds = if kinds.is_empty() {
            debug!(direction = direction.as_str(), "defaulting activations");
            [ActivationKind::Sigmoid, ActivationKind::Tanh, ActivationKind::Tanh]
                .repeat(direction.num_directions())
        } else {
            kinds
        };
        if kinds.len() != expected {
            return Err(LowerError::attribute(
                OP,
                "activations",
                kinds.len(),
                format!("expected {expected} entries for direction {}", direction.as_str()),
            ));
        }
        let activations = kinds
            .into_iter()
            .enumerate()
            .map(|(i, kind)| {
                ActivationSpec::with_params(
                    kind,
                    self.activation_alpha.get(i).copied(),
                    self.activation_beta.get(i).copied(),
                )
            })
            .collect();

        Ok(ValidatedAttributes {
            direction,
            layout,
            input_forget,
            clip: self.clip.filter(|c| *c > 0.0),
            activations,
        })
    }
}

/// Attributes after domain checks and default-fill.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAttributes {
    pub direction: Direction,
    pub layout: SequenceLayout,
    pub input_forget: bool,
    pub clip: Option<f32>,
    /// Three entries per direction: `f`, `g`, `h`.
    pub activations: Vec<ActivationSpec>,
}

/// Input tensor names, sanitized. Optional slots are `None` when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LstmInputs {
    pub x: String,
    pub w: String,
    pub r: String,
    pub b: Option<String>,
    pub sequence_lens: Option<String>,
    pub initial_h: Option<String>,
    pub initial_c: Option<String>,
    pub p: Option<String>,
}

fn optional(name: Option<&&str>) -> Option<String> {
    name.filter(|n| !n.is_empty()).map(|n| clean_name(n))
}

impl LstmInputs {
    pub fn new(x: &str, w: &str, r: &str) -> Self {
        Self {
            x: clean_name(x),
            w: clean_name(w),
            r: clean_name(r),
            ..Self::default()
        }
    }

    /// Positional order `X, W, R, B, sequence_lens, initial_h, initial_c, P`.
    pub fn from_names(names: &[&str]) -> Result<Self> {
        if names.len() < 3 || names.len() > 8 || names[..3].iter().any(|n| n.is_empty()) {
            return Err(LowerError::attribute(
                OP,
                "inputs",
                names.len(),
                "expected X, W and R followed by up to five optional inputs",
            ));
        }
        Ok(Self {
            b: optional(names.get(3)),
            sequence_lens: optional(names.get(4)),
            initial_h: optional(names.get(5)),
            initial_c: optional(names.get(6)),
            p: optional(names.get(7)),
            ..Self::new(names[0], names[1], names[2])
        })
    }

    pub fn with_bias(mut self, name: &str) -> Self {
        self.b = Some(clean_name(name));
        self
    }

    pub fn with_sequence_lens(mut self, name: &str) -> Self {
        self.sequence_lens = Some(clean_name(name));
        self
    }

    pub fn with_initial_h(mut self, name: &str) -> Self {
        self.initial_h = Some(clean_name(name));
        self
    }

    pub fn with_initial_c(mut self, name: &str) -> Self {
        self.initial_c = Some(clean_name(name));
        self
    }

    pub fn with_peephole(mut self, name: &str) -> Self {
        self.p = Some(clean_name(name));
        self
    }
}

/// Output tensor names, sanitized. Every output is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LstmOutputs {
    pub y: Option<String>,
    pub y_h: Option<String>,
    pub y_c: Option<String>,
}

impl LstmOutputs {
    pub fn new(y: &str, y_h: &str, y_c: &str) -> Self {
        Self::from_names(&[y, y_h, y_c])
    }

    /// Positional order `Y, Y_h, Y_c`.
    pub fn from_names(names: &[&str]) -> Self {
        Self {
            y: optional(names.first()),
            y_h: optional(names.get(1)),
            y_c: optional(names.get(2)),
        }
    }
}

/// Everything `generate` needs, fixed by `initialize`.
#[derive(Debug, Clone, PartialEq)]
pub struct LstmPlan {
    pub attrs: ValidatedAttributes,
    pub layout: GateLayout,
}

#[derive(Debug, Clone)]
pub struct Lstm {
    attributes: LstmAttributes,
    inputs: LstmInputs,
    outputs: LstmOutputs,
    plan: Option<LstmPlan>,
}

const FLOAT_ONLY: &[ElementType] = &[ElementType::F32];
const INTEGER_LENGTHS: &[ElementType] = &[ElementType::I32, ElementType::I64];

impl Lstm {
    pub fn new(attributes: LstmAttributes, inputs: LstmInputs, outputs: LstmOutputs) -> Self {
        Self {
            attributes,
            inputs,
            outputs,
            plan: None,
        }
    }

    pub fn attributes(&self) -> &LstmAttributes {
        &self.attributes
    }

    pub fn inputs(&self) -> &LstmInputs {
        &self.inputs
    }

    pub fn outputs(&self) -> &LstmOutputs {
        &self.outputs
    }

    /// Resolved plan, available once `initialize` has succeeded.
    pub fn plan(&self) -> Option<&LstmPlan> {
        self.plan.as_ref()
    }

    fn check_optional(
        registry: &dyn TensorRegistry,
        name: Option<&str>,
        ranks: &[usize],
        accepted: &[ElementType],
    ) -> Result<()> {
        let Some(name) = name else {
            return Ok(());
        };
        let shape = require_shape(registry, OP, name)?;
        expect_rank(OP, name, shape, ranks)?;
        require_element_type(registry, OP, name, accepted)?;
        Ok(())
    }
}

/// Exact-shape check for an input whose rank was already verified.
fn expect_dims(registry: &dyn TensorRegistry, name: &str, expected: &[usize]) -> Result<()> {
    let shape = require_shape(registry, OP, name)?;
    if shape == expected {
        return Ok(());
    }
    Err(LowerError::ShapeMismatch {
        op: OP,
        detail: format!("tensor `{name}` has shape {shape:?}, expected {expected:?}"),
    })
}

impl Operator for Lstm {
    fn op_type(&self) -> &'static str {
        OP
    }

    fn type_inference(&self, inputs: &[ElementType]) -> Result<Vec<ElementType>> {
        let x = inputs.first().copied().ok_or_else(|| LowerError::MissingTensor {
            op: OP,
            tensor: self.inputs.x.clone(),
        })?;
        Ok(vec![x; 3])
    }

    fn shape_inference(&self, inputs: &[Vec<usize>]) -> Result<Vec<Vec<usize>>> {
        let (Some(x), Some(w)) = (inputs.first(), inputs.get(1)) else {
            return Err(LowerError::ShapeMismatch {
                op: OP,
                detail: format!("shape inference needs X and W, got {} shapes", inputs.len()),
            });
        };
        let layout = self.attributes.sequence_layout()?;
        Ok(lstm_output_shapes(x, w, layout)?.to_vec())
    }

    fn initialize(&mut self, registry: &mut dyn TensorRegistry) -> Result<()> {
        let x_shape = require_shape(registry, OP, &self.inputs.x)?.to_vec();
        expect_rank(OP, &self.inputs.x, &x_shape, &[3])?;
        let w_shape = require_shape(registry, OP, &self.inputs.w)?.to_vec();
        expect_rank(OP, &self.inputs.w, &w_shape, &[3])?;
        let r_shape = require_shape(registry, OP, &self.inputs.r)?.to_vec();
        expect_rank(OP, &self.inputs.r, &r_shape, &[3])?;

        let dtype = require_element_type(registry, OP, &self.inputs.x, FLOAT_ONLY)?;
        require_element_type(registry, OP, &self.inputs.w, FLOAT_ONLY)?;
        require_element_type(registry, OP, &self.inputs.r, FLOAT_ONLY)?;

        let inputs = &self.inputs;
        Self::check_optional(registry, inputs.b.as_deref(), &[2, 5], FLOAT_ONLY)?;
        Self::check_optional(registry, inputs.sequence_lens.as_deref(), &[1], INTEGER_LENGTHS)?;
        Self::check_optional(registry, inputs.initial_h.as_deref(), &[3], FLOAT_ONLY)?;
        Self::check_optional(registry, inputs.initial_c.as_deref(), &[3], FLOAT_ONLY)?;
        Self::check_optional(registry, inputs.p.as_deref(), &[2, 4], FLOAT_ONLY)?;

        let attrs = self.attributes.validate(&w_shape)?;
        let num_directions = w_shape[0];
        if num_directions != attrs.direction.num_directions() {
            return Err(LowerError::ShapeMismatch {
                op: OP,
                detail: format!(
                    "W has {num_directions} directions but direction is {}",
                    attrs.direction.as_str()
                ),
            });
        }
        let (seq_length, batch_size) = attrs.layout.seq_and_batch(&x_shape);
        let layout = GateLayout {
            num_directions,
            seq_length,
            batch_size,
            hidden_size: self.attributes.hidden_size,
            input_size: x_shape[2],
        };
        let hidden = layout.hidden_size;
        if w_shape[2] != layout.input_size || r_shape != [num_directions, 4 * hidden, hidden] {
            return Err(LowerError::ShapeMismatch {
                op: OP,
                detail: format!("X {x_shape:?}, W {w_shape:?} and R {r_shape:?} disagree"),
            });
        }
        if seq_length == 0 || batch_size == 0 || hidden == 0 {
            return Err(LowerError::ShapeMismatch {
                op: OP,
                detail: format!(
                    "sequence length {seq_length}, batch size {batch_size} and hidden size {hidden} must be non-zero"
                ),
            });
        }
        let state_shape = match attrs.layout {
            SequenceLayout::TimeMajor => [num_directions, batch_size, hidden],
            SequenceLayout::BatchMajor => [batch_size, num_directions, hidden],
        };
        for name in [&self.inputs.initial_h, &self.inputs.initial_c].into_iter().flatten() {
            expect_dims(registry, name, &state_shape)?;
        }
        if let Some(lens) = &self.inputs.sequence_lens {
            expect_dims(registry, lens, &[batch_size])?;
        }
        debug!(
            seq_length,
            batch_size,
            hidden = layout.hidden_size,
            input = layout.input_size,
            directions = num_directions,
            "resolved LSTM shapes"
        );

        if let Some(b) = &self.inputs.b {
            canonical::canonicalize_bias(registry, b, &layout)?;
        }
        if let Some(p) = &self.inputs.p {
            canonical::canonicalize_peephole(registry, p, &layout)?;
        }

        let [y_shape, y_h_shape, y_c_shape] = lstm_output_shapes(&x_shape, &w_shape, attrs.layout)?;
        for (name, shape) in [
            (&self.outputs.y, y_shape),
            (&self.outputs.y_h, y_h_shape),
            (&self.outputs.y_c, y_c_shape),
        ] {
            if let Some(name) = name {
                if !registry.exists(name) {
                    registry.register_intermediate(name, dtype, shape);
                }
            }
        }

        self.plan = Some(LstmPlan { attrs, layout });
        Ok(())
    }

    fn generate(&self, instance: &str) -> Result<GeneratedCode> {
        let plan = self.plan.as_ref().ok_or(LowerError::NotInitialized { op: OP })?;
        let code = generate::emit(instance, &self.inputs, &self.outputs, plan);
        debug!(instance, lines = code.len(), "generated LSTM");
        Ok(code)
    }
}
