//! Force/shape inference collaborator.
//!
//! A [`ForceModel`] maps the published Euler pose (single-row batch) to a
//! force vector and a node vector.  [`LinearForceModel`] is the built-in
//! implementation: two affine heads `y = W x + b` loaded from JSON.
//!
//! ```json
//! {
//!   "name": "ballnet-linear",
//!   "input_dim": 6,
//!   "force": { "weights": [[...6 values...], ...], "bias": [...] },
//!   "node":  { "weights": [[...]], "bias": [...] }
//! }
//! ```

use std::path::Path;

use metaball_types::MetaballError;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelOutput {
    pub force: Vec<f32>,
    pub node: Vec<f32>,
}

pub trait ForceModel: Send {
    fn name(&self) -> &str;
    fn input_dim(&self) -> usize;
    fn force_dim(&self) -> usize;
    fn node_dim(&self) -> usize;

    /// Run one inference.
    ///
    /// # Errors
    ///
    /// [`MetaballError::Configuration`] when `input.len()` differs from
    /// [`input_dim`](Self::input_dim).
    fn predict(&mut self, input: &[f32]) -> Result<ModelOutput, MetaballError>;

    /// Startup check that the pipeline feeds vectors of the right length.
    fn check_input_dim(&self, provided: usize) -> Result<(), MetaballError> {
        if provided != self.input_dim() {
            return Err(MetaballError::Configuration(format!(
                "model '{}' expects {} inputs, pipeline provides {provided}",
                self.name(),
                self.input_dim()
            )));
        }
        Ok(())
    }
}

/// One affine head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearLayer {
    /// Row-major, `out_dim × in_dim`.
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

impl LinearLayer {
    fn validate(&self, head: &str, input_dim: usize) -> Result<(), MetaballError> {
        if self.weights.len() != self.bias.len() {
            return Err(MetaballError::Configuration(format!(
                "{head} head has {} weight rows but {} biases",
                self.weights.len(),
                self.bias.len()
            )));
        }
        if let Some((row, w)) = self
            .weights
            .iter()
            .enumerate()
            .find(|(_, w)| w.len() != input_dim)
        {
            return Err(MetaballError::Configuration(format!(
                "{head} head row {row} has {} columns, expected {input_dim}",
                w.len()
            )));
        }
        Ok(())
    }

    fn eval(&self, x: &[f32]) -> Vec<f32> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f32>() + b)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearForceModel {
    pub name: String,
    pub input_dim: usize,
    pub force: LinearLayer,
    pub node: LinearLayer,
}

impl LinearForceModel {
    pub fn from_parts(
        name: impl Into<String>,
        input_dim: usize,
        force: LinearLayer,
        node: LinearLayer,
    ) -> Result<Self, MetaballError> {
        let model = Self {
            name: name.into(),
            input_dim,
            force,
            node,
        };
        model.validate()?;
        Ok(model)
    }

    /// Load and validate a model file.
    ///
    /// # Errors
    ///
    /// [`MetaballError::Configuration`] when the file is missing, is not
    /// valid JSON for this schema, or has inconsistent shapes.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, MetaballError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MetaballError::Configuration(format!("cannot read model {}: {e}", path.display()))
        })?;
        let model = Self::from_json_str(&raw).map_err(|e| match e {
            MetaballError::Configuration(msg) => {
                MetaballError::Configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        info!(
            model = %model.name,
            input_dim = model.input_dim,
            force_dim = model.force_dim(),
            node_dim = model.node_dim(),
            "force model loaded"
        );
        Ok(model)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, MetaballError> {
        let model: Self = serde_json::from_str(raw)
            .map_err(|e| MetaballError::Configuration(format!("invalid model file: {e}")))?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), MetaballError> {
        if self.input_dim == 0 {
            return Err(MetaballError::Configuration(
                "model input_dim must be positive".to_string(),
            ));
        }
        self.force.validate("force", self.input_dim)?;
        self.node.validate("node", self.input_dim)
    }
}

impl ForceModel for LinearForceModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn force_dim(&self) -> usize {
        self.force.bias.len()
    }

    fn node_dim(&self) -> usize {
        self.node.bias.len()
    }

    fn predict(&mut self, input: &[f32]) -> Result<ModelOutput, MetaballError> {
        self.check_input_dim(input.len())?;
        Ok(ModelOutput {
            force: self.force.eval(input),
            node: self.node.eval(input),
        })
    }
}
