use std::collections::BTreeMap;
use std::fmt;

use tabled::{settings::Style, Table, Tabled};

use super::volt_lvl::{get_voltlvl, LevelKey, LevelPartition, VoltLvl};
use crate::io::pandapower::file_io::*;
use crate::io::pandapower::table::ElementType;

/// Number of indices listed per bucket before the list is cut.
const MAX_LISTED: usize = 8;

/// A float printed with a fixed number of decimal places.
#[derive(Clone, Copy, PartialEq, PartialOrd)]
pub(crate) struct FloatWrapper {
    pub(crate) value: f64,
    pub(crate) precision: usize,
}

impl FloatWrapper {
    pub fn new(value: f64, precision: usize) -> Self {
        FloatWrapper { value, precision }
    }
}

impl fmt::Display for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1$}", self.value, self.precision)
    }
}

impl fmt::Debug for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1$}", self.value, self.precision)
    }
}

#[derive(Debug, Tabled)]
pub(crate) struct ElementCountTable {
    pub(crate) element: ElementType,
    pub(crate) rows: usize,
    /// Branch count with `parallel` expanded.
    pub(crate) branches: usize,
}

#[derive(Debug, Tabled)]
pub(crate) struct BusLevelTable {
    pub(crate) level: u8,
    pub(crate) name: &'static str,
    pub(crate) buses: usize,
    pub(crate) min_kv: FloatWrapper,
    pub(crate) max_kv: FloatWrapper,
}

#[derive(Debug, Tabled)]
pub(crate) struct LevelBucketTable {
    pub(crate) element: ElementType,
    pub(crate) level: LevelKey,
    pub(crate) name: &'static str,
    pub(crate) count: usize,
    pub(crate) indices: String,
}

fn level_name(key: LevelKey) -> &'static str {
    match key {
        LevelKey::Level(l) => VoltLvl::try_from(l).map_or("-", VoltLvl::name),
        LevelKey::Span(..) => "span",
        LevelKey::Unresolved => "-",
    }
}

fn list_indices<'a>(indices: impl ExactSizeIterator<Item = &'a i64>) -> String {
    let total = indices.len();
    let mut out: Vec<String> = indices.take(MAX_LISTED).map(i64::to_string).collect();
    if total > MAX_LISTED {
        out.push(format!("... ({} more)", total - MAX_LISTED));
    }
    out.join(", ")
}

/// Textual overviews of a network.
pub trait NetworkSummary {
    /// Row count per element table.
    fn summary(&self) -> String;
    /// Buses per voltage level with their nominal voltage range.
    fn bus_level_summary(&self, limits: &[f64]) -> String;
    fn print_summary(&self);
}

impl NetworkSummary for Network {
    fn summary(&self) -> String {
        let rows: Vec<ElementCountTable> = ElementType::ALL
            .iter()
            .map(|&element| {
                let rows = element.len(self);
                let branches = match element {
                    ElementType::Line => {
                        self.line.iter().map(|l| l.parallel.max(1) as usize).sum::<usize>()
                    }
                    ElementType::Trafo => {
                        self.trafo.iter().map(|t| t.parallel.max(1) as usize).sum::<usize>()
                    }
                    _ => rows,
                };
                ElementCountTable {
                    element,
                    rows,
                    branches,
                }
            })
            .collect();
        Table::new(rows).with(Style::markdown()).to_string()
    }

    fn bus_level_summary(&self, limits: &[f64]) -> String {
        let mut levels: BTreeMap<u8, Vec<f64>> = BTreeMap::new();
        for b in &self.bus {
            let level = b.volt_lvl.unwrap_or_else(|| get_voltlvl(b.vn_kv, limits));
            levels.entry(level).or_default().push(b.vn_kv);
        }
        let rows: Vec<BusLevelTable> = levels
            .into_iter()
            .map(|(level, kv)| BusLevelTable {
                level,
                name: VoltLvl::try_from(level).map_or("-", VoltLvl::name),
                buses: kv.len(),
                min_kv: FloatWrapper::new(kv.iter().copied().fold(f64::INFINITY, f64::min), 3),
                max_kv: FloatWrapper::new(kv.iter().copied().fold(f64::NEG_INFINITY, f64::max), 3),
            })
            .collect();
        Table::new(rows).with(Style::markdown()).to_string()
    }

    fn print_summary(&self) {
        println!("{}", self.summary());
    }
}

/// Renders a voltage level partition, one row per element and bucket.
pub fn level_summary(partition: &LevelPartition) -> String {
    let rows: Vec<LevelBucketTable> = partition
        .iter()
        .flat_map(|(&element, buckets)| {
            buckets.iter().map(move |(&level, indices)| LevelBucketTable {
                element,
                level,
                name: level_name(level),
                count: indices.len(),
                indices: list_indices(indices.iter()),
            })
        })
        .collect();
    Table::new(rows).with(Style::markdown()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::volt_lvl::{all_voltlvl_idx, DEFAULT_VN_KV_LIMITS};
    use crate::testcases::{multivoltage_case, split_merge_case};

    #[test]
    fn test_summary_counts() {
        let net = split_merge_case();
        let table = net.summary();
        assert!(table.contains("| element"));
        // 3 lines standing for 6 branches
        assert!(table.lines().any(|l| l.contains("line ") && l.contains("| 3 ") && l.contains("| 6 ")));
        assert!(table.lines().any(|l| l.contains("trafo ") && l.contains("| 1 ") && l.contains("| 3 ")));
    }

    #[test]
    fn test_bus_level_summary() {
        let net = multivoltage_case();
        let table = net.bus_level_summary(&DEFAULT_VN_KV_LIMITS);
        assert!(table.contains("380.000"));
        assert!(table.contains("0.400"));
        assert!(table.contains("MV"));
        assert_eq!(table.lines().count(), 2 + 4);
    }

    #[test]
    fn test_level_summary() {
        let net = multivoltage_case();
        let all = all_voltlvl_idx(&net, Some(&[ElementType::Trafo]), false, &DEFAULT_VN_KV_LIMITS);
        let table = level_summary(&all);
        assert!(table.contains("EHV-HV"));
        assert!(table.contains("3-7"));
        assert_eq!(table.lines().count(), 2 + 3);
    }

    #[test]
    fn test_list_indices_is_cut() {
        let idx: Vec<i64> = (0..10).collect();
        let s = list_indices(idx.iter());
        assert!(s.starts_with("0, 1, 2"));
        assert!(s.ends_with("... (2 more)"));
    }
}
