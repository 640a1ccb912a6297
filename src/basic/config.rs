use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{Result, TopologyError};
use super::volt_lvl::{DEFAULT_VN_KV_LIMITS, MAX_VN_KV_LIMITS};
use crate::io::pandapower::table::ElementType;

/// Options of a compact/expanded conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Merge structurally identical branches when compacting.
    pub merge_parallel: bool,
    /// Assign coordinate ids and rebuild the `coordinates` table when expanding.
    pub include_coordinates: bool,
    pub exclude_columns_from_duplicate_detection: BTreeSet<String>,
    pub elements_to_convert: Vec<ElementType>,
    /// Voltage thresholds in kV, strictly descending.
    pub vn_kv_limits: Vec<f64>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            merge_parallel: true,
            include_coordinates: true,
            exclude_columns_from_duplicate_detection: ["name", "parallel"]
                .into_iter()
                .map(String::from)
                .collect(),
            elements_to_convert: vec![ElementType::Line, ElementType::Trafo],
            vn_kv_limits: DEFAULT_VN_KV_LIMITS.to_vec(),
        }
    }
}

impl ConversionConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Checks limits ordering, convertible element types and excluded column names.
    pub fn validate(&self) -> Result<()> {
        if self.vn_kv_limits.is_empty() {
            return Err(TopologyError::InvalidConfig(
                "vn_kv_limits must not be empty".into(),
            ));
        }
        if self.vn_kv_limits.len() > MAX_VN_KV_LIMITS {
            return Err(TopologyError::InvalidConfig(format!(
                "at most {MAX_VN_KV_LIMITS} vn_kv_limits are supported, got {}",
                self.vn_kv_limits.len()
            )));
        }
        if self
            .vn_kv_limits
            .windows(2)
            .any(|w| w[0].partial_cmp(&w[1]) != Some(Ordering::Greater))
        {
            return Err(TopologyError::InvalidConfig(format!(
                "vn_kv_limits must be strictly descending, got {:?}",
                self.vn_kv_limits
            )));
        }
        for element in &self.elements_to_convert {
            if !matches!(element, ElementType::Line | ElementType::Trafo) {
                return Err(TopologyError::UnsupportedElementType(
                    element.as_str().to_string(),
                ));
            }
        }
        for column in &self.exclude_columns_from_duplicate_detection {
            let known = self
                .elements_to_convert
                .iter()
                .any(|e| e.columns().contains(&column.as_str()));
            if !known {
                return Err(TopologyError::UnknownColumn {
                    element: self
                        .elements_to_convert
                        .iter()
                        .map(ElementType::as_str)
                        .collect::<Vec<_>>()
                        .join("/"),
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ConversionConfig::default();
        assert!(cfg.merge_parallel);
        assert!(cfg.exclude_columns_from_duplicate_detection.contains("parallel"));
        assert_eq!(cfg.vn_kv_limits, vec![145.0, 60.0, 1.0]);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_partial_json() {
        let cfg = ConversionConfig::from_json_str(
            r#"{"merge_parallel": false, "exclude_columns_from_duplicate_detection": ["name", "parallel", "max_loading_percent"]}"#,
        )
        .unwrap();
        assert!(!cfg.merge_parallel);
        assert!(cfg.include_coordinates);
        assert_eq!(cfg.exclude_columns_from_duplicate_detection.len(), 3);
        assert_eq!(cfg.elements_to_convert, vec![ElementType::Line, ElementType::Trafo]);
    }

    #[test]
    fn test_too_many_limits() {
        let limits: Vec<f64> = (0..=MAX_VN_KV_LIMITS).rev().map(|v| v as f64).collect();
        let cfg = ConversionConfig {
            vn_kv_limits: limits,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(TopologyError::InvalidConfig(_))));

        let cfg = ConversionConfig {
            vn_kv_limits: (1..=MAX_VN_KV_LIMITS).rev().map(|v| v as f64).collect(),
            ..Default::default()
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            ConversionConfig::from_json_str(r#"{"vn_kv_limits": [1.0, 60.0]}"#),
            Err(TopologyError::InvalidConfig(_))
        ));
        assert!(matches!(
            ConversionConfig::from_json_str(r#"{"elements_to_convert": ["trafo3w"]}"#),
            Err(TopologyError::UnsupportedElementType(_))
        ));
        assert!(matches!(
            ConversionConfig::from_json_str(
                r#"{"exclude_columns_from_duplicate_detection": ["colour"]}"#
            ),
            Err(TopologyError::UnknownColumn { .. })
        ));
    }
}
