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

//! Operator capability set and the closed set of supported operator kinds.

pub mod activation;
pub mod lstm;
pub mod transpose;

use tracing::debug;

use crate::codegen::GeneratedCode;
use crate::error::{LowerError, Result};
use crate::registry::TensorRegistry;
use crate::types::ElementType;

pub use lstm::{Lstm, LstmAttributes, LstmInputs, LstmOutputs};
pub use transpose::{PermutationPlan, Transpose, TransposeAttributes};

/// Lowering contract shared by every operator kind.
///
/// An instance goes through `initialize` once and then `generate` once.
/// `initialize` may rewrite initializers and register outputs; `generate`
/// only reads what `initialize` resolved.
pub trait Operator {
    /// Exchange-format operator name, used in diagnostics.
    fn op_type(&self) -> &'static str;

    fn type_inference(&self, inputs: &[ElementType]) -> Result<Vec<ElementType>>;

    fn shape_inference(&self, inputs: &[Vec<usize>]) -> Result<Vec<Vec<usize>>>;

    fn initialize(&mut self, registry: &mut dyn TensorRegistry) -> Result<()>;

    fn generate(&self, instance: &str) -> Result<GeneratedCode>;
}

/// Every operator this crate knows how to lower.
#[derive(Debug, Clone)]
pub enum OperatorKind {
    Lstm(Lstm),
    Transpose(Transpose),
}

impl OperatorKind {
    /// Build an operator from its exchange-format type, JSON attributes and
    /// positional tensor names (an empty name marks an absent optional slot).
    pub fn from_node(
        op_type: &str,
        attributes: &str,
        inputs: &[&str],
        outputs: &[&str],
    ) -> Result<Self> {
        match op_type {
            "LSTM" => Ok(OperatorKind::Lstm(Lstm::new(
                LstmAttributes::from_json(attributes)?,
                LstmInputs::from_names(inputs)?,
                LstmOutputs::from_names(outputs),
            ))),
            "Transpose" => {
                let [data] = inputs else {
                    return Err(LowerError::attribute(
                        "Transpose",
                        "inputs",
                        inputs.len(),
                        "expected exactly one input",
                    ));
                };
                let [transposed] = outputs else {
                    return Err(LowerError::attribute(
                        "Transpose",
                        "outputs",
                        outputs.len(),
                        "expected exactly one output",
                    ));
                };
                Ok(OperatorKind::Transpose(Transpose::new(
                    TransposeAttributes::from_json(attributes)?,
                    data,
                    transposed,
                )))
            }
            other => Err(LowerError::attribute(
                "Operator",
                "op_type",
                other,
                "no lowering is registered for this operator",
            )),
        }
    }

    fn inner(&self) -> &dyn Operator {
        match self {
            OperatorKind::Lstm(op) => op as &dyn Operator,
            OperatorKind::Transpose(op) => op,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Operator {
        match self {
            OperatorKind::Lstm(op) => op as &mut dyn Operator,
            OperatorKind::Transpose(op) => op,
        }
    }
}

impl Operator for OperatorKind {
    fn op_type(&self) -> &'static str {
        self.inner().op_type()
    }

    fn type_inference(&self, inputs: &[ElementType]) -> Result<Vec<ElementType>> {
        self.inner().type_inference(inputs)
    }

    fn shape_inference(&self, inputs: &[Vec<usize>]) -> Result<Vec<Vec<usize>>> {
        self.inner().shape_inference(inputs)
    }

    fn initialize(&mut self, registry: &mut dyn TensorRegistry) -> Result<()> {
        self.inner_mut().initialize(registry)
    }

    fn generate(&self, instance: &str) -> Result<GeneratedCode> {
        self.inner().generate(instance)
    }
}

/// Run both phases and return the code text for one operator instance.
pub fn lower(
    op: &mut dyn Operator,
    registry: &mut dyn TensorRegistry,
    instance: &str,
) -> Result<String> {
    op.initialize(registry)?;
    let code = op.generate(instance)?;
    debug!(op = op.op_type(), instance, lines = code.len(), "generated operator code");
    Ok(code.into_text())
}

/// Map a graph name onto a C identifier fragment.
pub fn clean_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Registry lookup shared by the operator modules.
pub(crate) fn require_shape<'r>(
    registry: &'r dyn TensorRegistry,
    op: &'static str,
    tensor: &str,
) -> Result<&'r [usize]> {
    registry
        .shape_of(tensor)
        .ok_or_else(|| LowerError::MissingTensor {
            op,
            tensor: tensor.to_string(),
        })
}

pub(crate) fn require_element_type(
    registry: &dyn TensorRegistry,
    op: &'static str,
    tensor: &str,
    accepted: &[ElementType],
) -> Result<ElementType> {
    let found = registry
        .element_type_of(tensor)
        .ok_or_else(|| LowerError::MissingTensor {
            op,
            tensor: tensor.to_string(),
        })?;
    if accepted.contains(&found) {
        Ok(found)
    } else {
        Err(LowerError::UnsupportedElementType {
            op,
            tensor: tensor.to_string(),
            found,
        })
    }
}
