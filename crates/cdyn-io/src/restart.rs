use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoError, Result};

pub const RESTART_SCHEMA_VERSION: u32 = 1;

/// Named state vectors of one accepted time step.
///
/// The integrator stores `displacement`, `velocity`, `acceleration` and
/// `fexternal`; the contact manager adds `lagrmultold`, `activetoggle`
/// and `sliptoggle`. Toggles are stored as `0.0`/`1.0`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestartState {
    pub schema_version: u32,
    pub step: usize,
    pub time: f64,
    pub vectors: BTreeMap<String, Vec<f64>>,
    pub metadata: BTreeMap<String, String>,
}

impl Default for RestartState {
    fn default() -> Self {
        Self {
            schema_version: RESTART_SCHEMA_VERSION,
            step: 0,
            time: 0.0,
            vectors: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }
}

impl RestartState {
    pub fn new(step: usize, time: f64) -> Self {
        Self {
            step,
            time,
            ..Self::default()
        }
    }

    pub fn insert_vector(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.vectors.insert(name.into(), values);
    }

    pub fn vector(&self, name: &str) -> Result<&[f64]> {
        self.vectors
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| IoError::MissingVector(name.to_string()))
    }

    /// Like [`RestartState::vector`], but also checks the length.
    pub fn vector_with_len(&self, name: &str, expected: usize) -> Result<&[f64]> {
        let values = self.vector(name)?;
        if values.len() != expected {
            return Err(IoError::VectorLength {
                name: name.to_string(),
                expected,
                actual: values.len(),
            });
        }
        Ok(values)
    }

    /// Flag vector of `expected` entries stored as `0.0`/`1.0`.
    pub fn toggle(&self, name: &str, expected: usize) -> Result<Vec<bool>> {
        self.vector_with_len(name, expected)?
            .iter()
            .map(|&value| {
                if value == 0.0 {
                    Ok(false)
                } else if value == 1.0 {
                    Ok(true)
                } else {
                    Err(IoError::InvalidData(format!(
                        "toggle vector `{name}` holds {value}, expected 0 or 1"
                    )))
                }
            })
            .collect()
    }
}

/// File name of the restart written after `step`, e.g. `bar.restart.00012.json`.
pub fn restart_file_name(job_name: &str, step: usize) -> String {
    format!("{job_name}.restart.{step:05}.json")
}

pub fn save_restart(path: impl AsRef<Path>, state: &RestartState) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let bytes = serde_json::to_vec_pretty(state)?;
    fs::write(path, bytes)?;
    tracing::debug!(path = %path.display(), step = state.step, "restart written");
    Ok(())
}

pub fn load_restart(path: impl AsRef<Path>) -> Result<RestartState> {
    let bytes = fs::read(path)?;
    let state: RestartState = serde_json::from_slice(&bytes)?;
    if state.schema_version != RESTART_SCHEMA_VERSION {
        return Err(IoError::SchemaVersion {
            found: state.schema_version,
            expected: RESTART_SCHEMA_VERSION,
        });
    }
    Ok(state)
}
