use crate::error::ManifestError;
use crate::mlp::{HIDDEN, INPUTS, MlpWeights, Scales};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Output weights are exported either flat or as a single-row matrix.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Weights1 {
    Flat(Vec<i64>),
    Row(Vec<Vec<i64>>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Bias1 {
    Scalar(i64),
    List(Vec<i64>),
}

/// `mlp_int8.json` as written by the quantization export.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelManifest {
    #[serde(rename = "type")]
    pub model_type: String,
    pub in_scale: f32,
    pub w0_int8: Vec<Vec<i64>>,
    pub w0_scale: f32,
    pub b0_int32: Vec<i64>,
    #[serde(default)]
    pub b0_scale: Option<f32>,
    pub act0_scale: f32,
    pub w1_int8: Weights1,
    pub w1_scale: f32,
    pub b1_int32: Bias1,
    #[serde(default)]
    pub b1_scale: Option<f32>,
    #[serde(default)]
    pub norm: Option<serde_json::Value>,
}

impl ModelManifest {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn scales(&self) -> Scales {
        Scales {
            in_scale: self.in_scale,
            w0_scale: self.w0_scale,
            act0_scale: self.act0_scale,
            w1_scale: self.w1_scale,
        }
    }

    /// Validates shapes and integer ranges and builds the weight set.
    pub fn to_weights(&self) -> Result<MlpWeights, ManifestError> {
        if self.model_type != "mlp" {
            return Err(ManifestError::UnsupportedModel(self.model_type.clone()));
        }

        let mut weights = MlpWeights {
            scales: self.scales(),
            ..Default::default()
        };

        expect_len("w0_int8", self.w0_int8.len(), HIDDEN, &format!("[{HIDDEN}][{INPUTS}]"))?;
        for (h, row) in self.w0_int8.iter().enumerate() {
            expect_len("w0_int8", row.len(), INPUTS, &format!("[{HIDDEN}][{INPUTS}]"))?;
            for (d, v) in row.iter().enumerate() {
                weights.w0[h][d] = narrow("w0_int8", h * INPUTS + d, *v)?;
            }
        }

        expect_len("b0_int32", self.b0_int32.len(), HIDDEN, &format!("[{HIDDEN}]"))?;
        for (h, v) in self.b0_int32.iter().enumerate() {
            weights.b0[h] = narrow("b0_int32", h, *v)?;
        }

        let w1 = match &self.w1_int8 {
            Weights1::Flat(v) => v.as_slice(),
            Weights1::Row(rows) if rows.len() == 1 => rows[0].as_slice(),
            Weights1::Row(rows) => {
                return Err(ManifestError::Shape {
                    field: "w1_int8",
                    expected: format!("[1][{HIDDEN}]"),
                    actual: format!("[{}][..]", rows.len()),
                });
            }
        };
        expect_len("w1_int8", w1.len(), HIDDEN, &format!("[{HIDDEN}]"))?;
        for (h, v) in w1.iter().enumerate() {
            weights.w1[h] = narrow("w1_int8", h, *v)?;
        }

        weights.b1 = match &self.b1_int32 {
            Bias1::Scalar(v) => narrow("b1_int32", 0, *v)?,
            Bias1::List(v) => match v.first() {
                Some(first) => narrow("b1_int32", 0, *first)?,
                None => {
                    return Err(ManifestError::Shape {
                        field: "b1_int32",
                        expected: "[1]".into(),
                        actual: "[0]".into(),
                    });
                }
            },
        };

        Ok(weights)
    }
}

fn expect_len(field: &'static str, actual: usize, expected: usize, shape: &str) -> Result<(), ManifestError> {
    if actual != expected {
        return Err(ManifestError::Shape {
            field,
            expected: shape.to_string(),
            actual: format!("length {actual} where {expected} is required"),
        });
    }
    Ok(())
}

fn narrow<T: TryFrom<i64>>(field: &'static str, index: usize, value: i64) -> Result<T, ManifestError> {
    T::try_from(value).map_err(|_| ManifestError::Range { field, index, value })
}
