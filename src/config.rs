//! Declarative pipeline configuration.
//!
//! A YAML spec drives the CLI `run` command end to end: load the log, build
//! the schema, encode, train the network, distill the tree. Parsing and
//! validation happen up front so a bad spec fails before any work starts.

use crate::distill::FinetuneParams;
use crate::encode::EncodeParams;
use crate::error::{DestilarError, Result};
use crate::network::{NetworkParams, TrainParams};
use crate::tree::TreeParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Full pipeline specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// CSV event log to load.
    pub log: PathBuf,
    /// Categorical attribute columns to encode.
    #[serde(default)]
    pub categorical_attrs: Vec<String>,
    /// Numerical attribute columns to encode.
    #[serde(default)]
    pub numerical_attrs: Vec<String>,
    #[serde(default)]
    pub encode: EncodeParams,
    #[serde(default)]
    pub network: NetworkParams,
    #[serde(default)]
    pub train: TrainParams,
    #[serde(default)]
    pub tree: TreeParams,
    #[serde(default)]
    pub finetune: FinetuneParams,
}

impl PipelineSpec {
    /// Load and validate a spec from a YAML file.
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DestilarError::io(format!("reading {}", path.display()), e))?;
        let spec: Self = serde_yaml::from_str(&content).map_err(|e| DestilarError::Config {
            message: format!("parsing {}: {e}", path.display()),
        })?;
        spec.validate()?;
        Ok(spec)
    }

    /// Check parameter ranges before any stage runs.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.encode.test_size) {
            return Err(DestilarError::Config {
                message: format!("encode.test_size must be in [0, 1), got {}", self.encode.test_size),
            });
        }
        if self.encode.prefix_length == 0 {
            return Err(DestilarError::Config {
                message: "encode.prefix_length must be at least 1".into(),
            });
        }
        if self.network.hidden_units.is_empty() {
            return Err(DestilarError::Config {
                message: "network.hidden_units must name at least one layer".into(),
            });
        }
        for (name, epochs, lr, batch) in [
            (
                "train",
                self.train.epochs,
                self.train.learning_rate,
                self.train.batch_size,
            ),
            (
                "finetune",
                self.finetune.epochs,
                self.finetune.learning_rate,
                self.finetune.batch_size,
            ),
        ] {
            if epochs == 0 || batch == 0 || lr <= 0.0 {
                return Err(DestilarError::Config {
                    message: format!(
                        "{name}: epochs, batch_size and learning_rate must be positive"
                    ),
                });
            }
        }
        if self.tree.ccp_alpha < 0.0 {
            return Err(DestilarError::Config {
                message: format!("tree.ccp_alpha must be >= 0, got {}", self.tree.ccp_alpha),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let spec: PipelineSpec = serde_yaml::from_str("log: events.csv\n").unwrap();
        spec.validate().unwrap();
        assert_eq!(spec.encode.prefix_length, 3);
        assert_eq!(spec.network.hidden_units, vec![512, 256, 128, 64]);
        assert_eq!(spec.tree.ccp_alpha, 0.001);
        assert!(spec.categorical_attrs.is_empty());
    }

    #[test]
    fn test_full_yaml_round_trip() {
        let yaml = "\
log: data/events.csv
categorical_attrs: [resource]
numerical_attrs: [amount]
encode:
  test_size: 0.2
  prefix_length: 4
  shuffle: true
  seed: 7
network:
  hidden_units: [64, 32]
  seed: 1
train:
  epochs: 20
  learning_rate: 0.005
tree:
  ccp_alpha: 0.01
  max_depth: 6
finetune:
  mode: changed_ground_truth
  epochs: 5
";
        let spec: PipelineSpec = serde_yaml::from_str(yaml).unwrap();
        spec.validate().unwrap();
        assert_eq!(spec.encode.prefix_length, 4);
        assert_eq!(spec.network.hidden_units, vec![64, 32]);
        assert_eq!(spec.tree.max_depth, Some(6));
        assert_eq!(spec.finetune.epochs, 5);
        assert_eq!(spec.train.batch_size, 32); // untouched default
    }

    #[test]
    fn test_bad_test_size_rejected() {
        let spec: PipelineSpec =
            serde_yaml::from_str("log: x.csv\nencode:\n  test_size: 1.5\n").unwrap();
        assert!(matches!(
            spec.validate(),
            Err(DestilarError::Config { .. })
        ));
    }

    #[test]
    fn test_zero_epochs_rejected() {
        let spec: PipelineSpec =
            serde_yaml::from_str("log: x.csv\ntrain:\n  epochs: 0\n").unwrap();
        assert!(matches!(
            spec.validate(),
            Err(DestilarError::Config { .. })
        ));
    }

    #[test]
    fn test_unknown_mode_fails_at_parse() {
        let result: std::result::Result<PipelineSpec, _> =
            serde_yaml::from_str("log: x.csv\nfinetune:\n  mode: mystery\n");
        assert!(result.is_err());
    }
}
