use std::collections::HashSet;

use tracing::{debug, info};

use super::aux_node::{create_branch_switches, replace_branch_switches};
use super::config::ConversionConfig;
use super::coords::assign_coordinate_ids;
use super::derived::provide_derived_cols;
use super::error::Result;
use super::parallel::convert_parallel_branches;
use crate::io::pandapower::file_io::*;

/// Conversion between the compact and the expanded representation.
///
/// Compact: branches carry a `parallel` count and bus-branch switches sit
/// directly at real buses. Expanded: one row per parallel branch and every
/// branch switch on its own auxiliary bus.
pub trait TopologyConversion {
    /// Compact to expanded. Returns the bus names reserved while naming
    /// auxiliary buses.
    fn expand(&mut self, config: &ConversionConfig) -> Result<HashSet<String>>;
    /// Expanded to compact.
    fn compact(&mut self, config: &ConversionConfig) -> Result<()>;

    fn is_expanded(&self) -> bool;
    fn is_compact(&self) -> bool;
}

impl TopologyConversion for Network {
    fn expand(&mut self, config: &ConversionConfig) -> Result<HashSet<String>> {
        config.validate()?;
        provide_derived_cols(self, &config.vn_kv_limits);
        convert_parallel_branches(
            self,
            true,
            &config.elements_to_convert,
            &config.exclude_columns_from_duplicate_detection,
        )?;
        let reserved = replace_branch_switches(self, None)?;
        provide_derived_cols(self, &config.vn_kv_limits);
        if config.include_coordinates {
            assign_coordinate_ids(self);
        }
        info!(
            buses = self.bus.len(),
            lines = self.line.len(),
            trafos = self.trafo.len(),
            switches = self.switch.len(),
            "expanded network"
        );
        Ok(reserved)
    }

    fn compact(&mut self, config: &ConversionConfig) -> Result<()> {
        config.validate()?;
        create_branch_switches(self)?;
        provide_derived_cols(self, &config.vn_kv_limits);
        if config.merge_parallel {
            convert_parallel_branches(
                self,
                false,
                &config.elements_to_convert,
                &config.exclude_columns_from_duplicate_detection,
            )?;
        } else {
            debug!("parallel branches left unmerged");
        }
        info!(
            buses = self.bus.len(),
            lines = self.line.len(),
            trafos = self.trafo.len(),
            switches = self.switch.len(),
            "compacted network"
        );
        Ok(())
    }

    /// No bus-branch switch left and no line/trafo with `parallel > 1`.
    fn is_expanded(&self) -> bool {
        self.switch.iter().all(|s| s.et.branch_element().is_none())
            && self.line.iter().all(|l| l.parallel <= 1)
            && self.trafo.iter().all(|t| t.parallel <= 1)
    }

    /// No auxiliary bus left.
    fn is_compact(&self) -> bool {
        self.bus.iter().all(|b| b.type_ != BusType::Auxiliary)
    }
}
