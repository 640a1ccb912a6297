//! Voltage level classification.
//!
//! Levels are ordinal: odd levels are pure bands between two limits, even
//! levels are the transformation boundaries between the neighbouring bands.
//! With the default limits `[145, 60, 1]` kV this gives
//! EHV(1), EHV-HV(2), HV(3), HV-MV(4), MV(5), MV-LV(6), LV(7).
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use derive_more::derive::Into;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::{Result, TopologyError};
use crate::io::pandapower::file_io::*;
use crate::io::pandapower::table::*;

pub const DEFAULT_VN_KV_LIMITS: [f64; 3] = [145.0, 60.0, 1.0];

const LEVEL_NAMES: [&str; 7] = ["EHV", "EHV-HV", "HV", "HV-MV", "MV", "MV-LV", "LV"];

/// A named voltage level in `1..=7`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Into, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct VoltLvl(u8);

impl VoltLvl {
    pub const EHV: VoltLvl = VoltLvl(1);
    pub const EHV_HV: VoltLvl = VoltLvl(2);
    pub const HV: VoltLvl = VoltLvl(3);
    pub const HV_MV: VoltLvl = VoltLvl(4);
    pub const MV: VoltLvl = VoltLvl(5);
    pub const MV_LV: VoltLvl = VoltLvl(6);
    pub const LV: VoltLvl = VoltLvl(7);

    pub fn new(level: i64) -> Result<Self> {
        if (1..=LEVEL_NAMES.len() as i64).contains(&level) {
            Ok(VoltLvl(level as u8))
        } else {
            Err(TopologyError::InvalidLevel(level.to_string()))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn name(self) -> &'static str {
        LEVEL_NAMES[self.0 as usize - 1]
    }

    /// Even levels sit between two pure bands.
    pub fn is_boundary(self) -> bool {
        self.0 % 2 == 0
    }
}

impl TryFrom<u8> for VoltLvl {
    type Error = TopologyError;
    fn try_from(value: u8) -> Result<Self> {
        VoltLvl::new(value as i64)
    }
}

impl fmt::Display for VoltLvl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VoltLvl {
    type Err = TopologyError;

    /// Accepts level names (case-insensitive, with the `UHV` aliases and
    /// dash-less spellings) and decimal integers.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return VoltLvl::new(n);
        }
        let upper = trimmed.to_ascii_uppercase();
        let level = match upper.as_str() {
            "EHV" | "UHV" => 1,
            "EHV-HV" | "UHV-HV" | "EHVHV" | "UHVHV" => 2,
            "HV" => 3,
            "HV-MV" | "HVMV" => 4,
            "MV" => 5,
            "MV-LV" | "MVLV" => 6,
            "LV" => 7,
            _ => return Err(TopologyError::InvalidLevel(s.to_string())),
        };
        Ok(VoltLvl(level))
    }
}

/// Converts level names or integer strings into levels.
pub fn convert_voltlvl_names<S: AsRef<str>>(names: &[S]) -> Result<Vec<VoltLvl>> {
    names.iter().map(|n| n.as_ref().parse()).collect()
}

/// Largest limit list whose levels still fit into a `u8`.
pub const MAX_VN_KV_LIMITS: usize = 127;

/// Ordinal level of a nominal voltage: `1 + 2 * |{lim : v <= lim}|`.
///
/// Saturates at `u8::MAX` for more than [`MAX_VN_KV_LIMITS`] limits.
pub fn get_voltlvl<T: ToPrimitive>(value: T, limits: &[f64]) -> u8 {
    let v = value.to_f64().unwrap_or(f64::NAN);
    let below = limits.iter().filter(|&&lim| v <= lim).count();
    u8::try_from(1 + 2 * below).unwrap_or(u8::MAX)
}

pub fn get_voltlvls<T: ToPrimitive + Copy>(values: &[T], limits: &[f64]) -> Vec<u8> {
    values.iter().map(|&v| get_voltlvl(v, limits)).collect()
}

/// Derived level of a transformer from its terminal levels.
pub fn trafo_voltlvl(hv: u8, lv: u8) -> u8 {
    ((hv as u16 + lv as u16) / 2) as u8
}

/// Whether `vn_kv` lies in the band of `level`.
///
/// `ext = [inf] ++ limits ++ [-inf]`, the band is `(ext[L/2 + 1], ext[(L-1)/2]]`.
fn in_level_band(vn_kv: f64, level: u8, limits: &[f64]) -> bool {
    let ext = |i: usize| -> f64 {
        if i == 0 {
            f64::INFINITY
        } else {
            limits.get(i - 1).copied().unwrap_or(f64::NEG_INFINITY)
        }
    };
    let level = level as usize;
    vn_kv <= ext((level - 1) / 2) && vn_kv > ext(level / 2 + 1)
}

fn bus_vn_kv(net: &Network) -> HashMap<i64, f64> {
    net.bus.iter().map(|b| (b.index, b.vn_kv)).collect()
}

/// Resolves the bus a measurement refers to.
///
/// `Ok(None)` marks a dangling reference, which is logged and skipped.
fn measurement_bus(net: &Network, m: &Measurement, branch_bus: &[Terminal]) -> Result<Option<i64>> {
    if m.element_type == ElementType::Bus {
        return Ok(Some(m.element));
    }
    if let Some(bus) = m.side.as_deref().and_then(|s| s.parse::<i64>().ok()) {
        return Ok(Some(bus));
    }
    let side = m.side.as_deref().and_then(Terminal::from_side);
    match m.element_type {
        ElementType::Line => branch_terminal_bus::<Line>(net, m.element, side, branch_bus),
        ElementType::Trafo => branch_terminal_bus::<Transformer>(net, m.element, side, branch_bus),
        ElementType::Trafo3w => {
            branch_terminal_bus::<Transformer3W>(net, m.element, side, branch_bus)
        }
        other => Err(TopologyError::UnsupportedElementType(format!(
            "measurement on {other}"
        ))),
    }
}

fn branch_terminal_bus<B: BranchRow>(
    net: &Network,
    element: i64,
    side: Option<Terminal>,
    branch_bus: &[Terminal],
) -> Result<Option<i64>> {
    let terminal = side
        .filter(|t| B::TERMINALS.contains(t))
        .or_else(|| B::pick_terminal(branch_bus))
        .ok_or_else(|| TopologyError::MissingTerminalSpec {
            element: B::ELEMENT,
            hint: format!("measurement side or one of {:?}", B::TERMINALS),
        })?;
    let Some(row) = B::rows(net).iter().find(|r| r.index() == element) else {
        warn!(element = %B::ELEMENT, index = element, "measured element does not exist");
        return Ok(None);
    };
    Ok(row.terminal(terminal))
}

fn branch_idx_on<B: BranchRow>(
    net: &Network,
    terminal: Terminal,
    buses: &BTreeSet<i64>,
) -> Vec<i64> {
    B::rows(net)
        .iter()
        .filter(|r| r.terminal(terminal).is_some_and(|b| buses.contains(&b)))
        .map(TableRow::index)
        .collect()
}

fn bus_element_idx_on<T: BusElement>(rows: &[T], buses: &BTreeSet<i64>) -> Vec<i64> {
    rows.iter()
        .filter(|r| buses.contains(&r.bus()))
        .map(TableRow::index)
        .collect()
}

fn voltlvl_idx_single(
    net: &Network,
    element: ElementType,
    level: VoltLvl,
    branch_bus: &[Terminal],
    limits: &[f64],
) -> Result<Vec<i64>> {
    let buses: BTreeSet<i64> = net
        .bus
        .iter()
        .filter(|b| in_level_band(b.vn_kv, level.get(), limits))
        .map(|b| b.index)
        .collect();

    let missing = |element: ElementType, terminals: &[Terminal]| TopologyError::MissingTerminalSpec {
        element,
        hint: format!("one of {terminals:?}"),
    };

    let idx = match element {
        ElementType::Bus => net
            .bus
            .iter()
            .filter(|b| buses.contains(&b.index))
            .map(|b| b.index)
            .collect(),
        ElementType::Line => {
            let t = Line::pick_terminal(branch_bus).unwrap_or(Terminal::FromBus);
            branch_idx_on::<Line>(net, t, &buses)
        }
        ElementType::Trafo => {
            let t = Transformer::pick_terminal(branch_bus)
                .ok_or_else(|| missing(ElementType::Trafo, Transformer::TERMINALS))?;
            branch_idx_on::<Transformer>(net, t, &buses)
        }
        ElementType::Trafo3w => {
            let t = Transformer3W::pick_terminal(branch_bus)
                .ok_or_else(|| missing(ElementType::Trafo3w, Transformer3W::TERMINALS))?;
            branch_idx_on::<Transformer3W>(net, t, &buses)
        }
        ElementType::Switch => net
            .switch
            .iter()
            .filter(|s| buses.contains(&s.bus))
            .map(|s| s.index)
            .collect(),
        ElementType::Measurement => {
            let mut idx = Vec::new();
            for m in &net.measurement {
                if measurement_bus(net, m, branch_bus)?.is_some_and(|b| buses.contains(&b)) {
                    idx.push(m.index);
                }
            }
            idx
        }
        ElementType::Load => bus_element_idx_on(&net.load, &buses),
        ElementType::Sgen => bus_element_idx_on(&net.sgen, &buses),
        ElementType::Gen => bus_element_idx_on(&net.r#gen, &buses),
        ElementType::ExtGrid => bus_element_idx_on(&net.ext_grid, &buses),
        ElementType::Shunt => bus_element_idx_on(&net.shunt, &buses),
    };
    Ok(idx)
}

/// Indices of `element` rows in any of the given levels.
///
/// Transformers need a terminal in `branch_bus`; lines default to `from_bus`;
/// measurements use their `side` and fall back to `branch_bus`.
pub fn voltlvl_idx(
    net: &Network,
    element: ElementType,
    levels: &[VoltLvl],
    branch_bus: &[Terminal],
    limits: &[f64],
) -> Result<Vec<i64>> {
    let mut idx = Vec::new();
    for &level in levels {
        idx.extend(voltlvl_idx_single(net, element, level, branch_bus, limits)?);
    }
    Ok(idx)
}

/// Bucket of the voltage level partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LevelKey {
    Level(u8),
    /// Transformer spanning non-adjacent levels, `hv-lv`.
    Span(u8, u8),
    /// Element whose terminal could not be resolved.
    Unresolved,
}

impl fmt::Display for LevelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelKey::Level(l) => write!(f, "{l}"),
            LevelKey::Span(hv, lv) => write!(f, "{hv}-{lv}"),
            LevelKey::Unresolved => f.write_str("unresolved"),
        }
    }
}

fn trafo_level_key(hv: u8, lv: u8) -> LevelKey {
    if hv == lv {
        LevelKey::Level(hv)
    } else if hv.abs_diff(lv) == 2 {
        LevelKey::Level(hv.min(lv) + 1)
    } else {
        LevelKey::Span(hv, lv)
    }
}

pub type LevelPartition = BTreeMap<ElementType, BTreeMap<LevelKey, BTreeSet<i64>>>;

/// Partitions all rows of the requested element types by voltage level.
///
/// `elements = None` covers every element type. Empty tables are only
/// listed when `include_empty` is set.
pub fn all_voltlvl_idx(
    net: &Network,
    elements: Option<&[ElementType]>,
    include_empty: bool,
    limits: &[f64],
) -> LevelPartition {
    let levels: HashMap<i64, u8> = bus_vn_kv(net)
        .into_iter()
        .map(|(i, v)| (i, get_voltlvl(v, limits)))
        .collect();
    let bus_key = |bus: i64| {
        levels.get(&bus).copied().map_or(LevelKey::Unresolved, LevelKey::Level)
    };

    let mut out = LevelPartition::new();
    for &element in elements.unwrap_or(&ElementType::ALL) {
        if element.len(net) == 0 && !include_empty {
            continue;
        }
        let buckets = out.entry(element).or_default();
        let mut put = |key: LevelKey, index: i64| {
            buckets.entry(key).or_default().insert(index);
        };
        match element {
            ElementType::Bus => net.bus.iter().for_each(|b| put(bus_key(b.index), b.index)),
            ElementType::Line => net
                .line
                .iter()
                .for_each(|l| put(bus_key(l.from_bus), l.index)),
            ElementType::Trafo => net.trafo.iter().for_each(|t| {
                let key = match (levels.get(&t.hv_bus), levels.get(&t.lv_bus)) {
                    (Some(&hv), Some(&lv)) => trafo_level_key(hv, lv),
                    _ => LevelKey::Unresolved,
                };
                put(key, t.index)
            }),
            ElementType::Trafo3w => net.trafo3w.iter().for_each(|t| {
                let key = match (levels.get(&t.hv_bus), levels.get(&t.lv_bus)) {
                    (Some(&hv), Some(&lv)) => trafo_level_key(hv, lv),
                    _ => LevelKey::Unresolved,
                };
                put(key, t.index)
            }),
            ElementType::Switch => net.switch.iter().for_each(|s| put(bus_key(s.bus), s.index)),
            ElementType::Measurement => net.measurement.iter().for_each(|m| {
                let key = match measurement_bus(net, m, &[]) {
                    Ok(Some(bus)) => bus_key(bus),
                    Ok(None) => LevelKey::Unresolved,
                    Err(err) => {
                        warn!(measurement = m.index, %err, "cannot resolve measurement level");
                        LevelKey::Unresolved
                    }
                };
                put(key, m.index)
            }),
            ElementType::Load => net.load.iter().for_each(|e| put(bus_key(e.bus), e.index)),
            ElementType::Sgen => net.sgen.iter().for_each(|e| put(bus_key(e.bus), e.index)),
            ElementType::Gen => net.r#gen.iter().for_each(|e| put(bus_key(e.bus), e.index)),
            ElementType::ExtGrid => net
                .ext_grid
                .iter()
                .for_each(|e| put(bus_key(e.bus), e.index)),
            ElementType::Shunt => net.shunt.iter().for_each(|e| put(bus_key(e.bus), e.index)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcases::multivoltage_case;

    #[test]
    fn test_get_voltlvl_boundaries() {
        let v = [146.0, 145.0, 144.0, 61.0, 60.0, 59.0, 2.0, 1.0, 0.8];
        assert_eq!(
            get_voltlvls(&v, &DEFAULT_VN_KV_LIMITS),
            vec![1, 3, 3, 3, 5, 5, 5, 7, 7]
        );
        assert_eq!(get_voltlvl(0.4, &DEFAULT_VN_KV_LIMITS), 7);
        assert_eq!(get_voltlvl(380_i32, &DEFAULT_VN_KV_LIMITS), 1);
    }

    #[test]
    fn test_get_voltlvl_saturates() {
        let limits: Vec<f64> = (0..200).rev().map(f64::from).collect();
        assert_eq!(get_voltlvl(-1.0, &limits), u8::MAX);
        assert_eq!(get_voltlvl(199.5, &limits), 1);
        let limits: Vec<f64> = (0..MAX_VN_KV_LIMITS).rev().map(|v| v as f64).collect();
        assert_eq!(get_voltlvl(-1.0, &limits), 255);
    }

    #[test]
    fn test_level_names_bijection() {
        for level in 1..=7 {
            let lvl = VoltLvl::new(level).unwrap();
            assert_eq!(lvl.name().parse::<VoltLvl>().unwrap(), lvl);
            assert_eq!(level.to_string().parse::<VoltLvl>().unwrap(), lvl);
        }
        let aliases = convert_voltlvl_names(&["uhv", "UHV-HV", "ehvhv", "hvmv", "MvLv"]).unwrap();
        assert_eq!(
            aliases,
            vec![VoltLvl::EHV, VoltLvl::EHV_HV, VoltLvl::EHV_HV, VoltLvl::HV_MV, VoltLvl::MV_LV]
        );
    }

    #[test]
    fn test_invalid_level() {
        assert!(matches!("XHV".parse::<VoltLvl>(), Err(TopologyError::InvalidLevel(_))));
        assert!(matches!("8".parse::<VoltLvl>(), Err(TopologyError::InvalidLevel(_))));
        assert!(VoltLvl::new(0).is_err());
    }

    #[test]
    fn test_boundary_level_is_union_of_neighbours() {
        for v in [146.0, 145.0, 100.0, 60.0, 20.0, 1.0, 0.4] {
            let lvl = get_voltlvl(v, &DEFAULT_VN_KV_LIMITS);
            assert!(in_level_band(v, lvl, &DEFAULT_VN_KV_LIMITS));
            for even in [2, 4, 6] {
                let neighbour = lvl == even - 1 || lvl == even + 1;
                assert_eq!(in_level_band(v, even, &DEFAULT_VN_KV_LIMITS), neighbour);
            }
        }
    }

    #[test]
    fn test_trafo_voltlvl() {
        assert_eq!(trafo_voltlvl(1, 3), 2);
        assert_eq!(trafo_voltlvl(3, 7), 5);
        assert_eq!(trafo_voltlvl(5, 5), 5);
    }

    #[test]
    fn test_voltlvl_idx() {
        let net = multivoltage_case();
        let hv = voltlvl_idx(&net, ElementType::Bus, &[VoltLvl::HV], &[], &DEFAULT_VN_KV_LIMITS)
            .unwrap();
        assert_eq!(hv, vec![2, 3]);
        let hv_mv =
            voltlvl_idx(&net, ElementType::Bus, &[VoltLvl::HV_MV], &[], &DEFAULT_VN_KV_LIMITS)
                .unwrap();
        assert_eq!(hv_mv, vec![2, 3, 4, 5, 6]);

        let lines =
            voltlvl_idx(&net, ElementType::Line, &[VoltLvl::MV], &[], &DEFAULT_VN_KV_LIMITS)
                .unwrap();
        assert_eq!(lines, vec![1, 2]);

        let trafos = voltlvl_idx(
            &net,
            ElementType::Trafo,
            &[VoltLvl::MV],
            &[Terminal::LvBus],
            &DEFAULT_VN_KV_LIMITS,
        )
        .unwrap();
        assert_eq!(trafos, vec![1]);

        let multi = voltlvl_idx(
            &net,
            ElementType::Load,
            &[VoltLvl::MV, VoltLvl::LV],
            &[],
            &DEFAULT_VN_KV_LIMITS,
        )
        .unwrap();
        assert_eq!(multi, vec![0, 1]);
    }

    #[test]
    fn test_voltlvl_idx_missing_terminal() {
        let net = multivoltage_case();
        let err = voltlvl_idx(&net, ElementType::Trafo, &[VoltLvl::HV], &[], &DEFAULT_VN_KV_LIMITS);
        assert!(matches!(err, Err(TopologyError::MissingTerminalSpec { .. })));
    }

    #[test]
    fn test_measurement_levels() {
        let net = multivoltage_case();
        let hv = voltlvl_idx(
            &net,
            ElementType::Measurement,
            &[VoltLvl::HV],
            &[],
            &DEFAULT_VN_KV_LIMITS,
        )
        .unwrap();
        // bus 2 measurement and the hv side of trafo 1
        assert_eq!(hv, vec![0, 1]);
    }

    #[test]
    fn test_all_voltlvl_idx() {
        let net = multivoltage_case();
        let all = all_voltlvl_idx(&net, None, false, &DEFAULT_VN_KV_LIMITS);
        assert!(!all.contains_key(&ElementType::Gen));

        let trafo = &all[&ElementType::Trafo];
        assert_eq!(trafo[&LevelKey::Level(2)], BTreeSet::from([0]));
        assert_eq!(trafo[&LevelKey::Level(4)], BTreeSet::from([1]));
        assert_eq!(trafo[&LevelKey::Span(3, 7)], BTreeSet::from([2]));

        // every bus lands in exactly one bucket
        let buses: usize = all[&ElementType::Bus].values().map(BTreeSet::len).sum();
        assert_eq!(buses, net.bus.len());

        let with_empty =
            all_voltlvl_idx(&net, Some(&[ElementType::Gen]), true, &DEFAULT_VN_KV_LIMITS);
        assert!(with_empty[&ElementType::Gen].is_empty());
    }

    #[test]
    fn test_unresolved_measurement() {
        let mut net = multivoltage_case();
        net.add_measurement(Measurement {
            element_type: ElementType::Line,
            element: 0,
            side: None,
            ..Default::default()
        });
        let idx = net.measurement.last().map(|m| m.index).unwrap();
        let all = all_voltlvl_idx(&net, Some(&[ElementType::Measurement]), false, &DEFAULT_VN_KV_LIMITS);
        assert!(all[&ElementType::Measurement][&LevelKey::Unresolved].contains(&idx));
    }
}
