use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::basic::error::TopologyError;

use super::file_io::*;

/// Runs `$body` with `$rows` bound to the element table selected by `$element`.
///
/// `|mut rows|` binds the table mutably.
macro_rules! dispatch_rows {
    ($net:expr, $element:expr, |mut $rows:ident| $body:expr) => {
        match $element {
            $crate::io::pandapower::table::ElementType::Bus => {
                let $rows = &mut $net.bus;
                $body
            }
            $crate::io::pandapower::table::ElementType::Line => {
                let $rows = &mut $net.line;
                $body
            }
            $crate::io::pandapower::table::ElementType::Trafo => {
                let $rows = &mut $net.trafo;
                $body
            }
            $crate::io::pandapower::table::ElementType::Trafo3w => {
                let $rows = &mut $net.trafo3w;
                $body
            }
            $crate::io::pandapower::table::ElementType::Switch => {
                let $rows = &mut $net.switch;
                $body
            }
            $crate::io::pandapower::table::ElementType::Measurement => {
                let $rows = &mut $net.measurement;
                $body
            }
            $crate::io::pandapower::table::ElementType::Load => {
                let $rows = &mut $net.load;
                $body
            }
            $crate::io::pandapower::table::ElementType::Sgen => {
                let $rows = &mut $net.sgen;
                $body
            }
            $crate::io::pandapower::table::ElementType::Gen => {
                let $rows = &mut $net.r#gen;
                $body
            }
            $crate::io::pandapower::table::ElementType::ExtGrid => {
                let $rows = &mut $net.ext_grid;
                $body
            }
            $crate::io::pandapower::table::ElementType::Shunt => {
                let $rows = &mut $net.shunt;
                $body
            }
        }
    };
    ($net:expr, $element:expr, |$rows:ident| $body:expr) => {
        match $element {
            $crate::io::pandapower::table::ElementType::Bus => {
                let $rows = &$net.bus;
                $body
            }
            $crate::io::pandapower::table::ElementType::Line => {
                let $rows = &$net.line;
                $body
            }
            $crate::io::pandapower::table::ElementType::Trafo => {
                let $rows = &$net.trafo;
                $body
            }
            $crate::io::pandapower::table::ElementType::Trafo3w => {
                let $rows = &$net.trafo3w;
                $body
            }
            $crate::io::pandapower::table::ElementType::Switch => {
                let $rows = &$net.switch;
                $body
            }
            $crate::io::pandapower::table::ElementType::Measurement => {
                let $rows = &$net.measurement;
                $body
            }
            $crate::io::pandapower::table::ElementType::Load => {
                let $rows = &$net.load;
                $body
            }
            $crate::io::pandapower::table::ElementType::Sgen => {
                let $rows = &$net.sgen;
                $body
            }
            $crate::io::pandapower::table::ElementType::Gen => {
                let $rows = &$net.r#gen;
                $body
            }
            $crate::io::pandapower::table::ElementType::ExtGrid => {
                let $rows = &$net.ext_grid;
                $body
            }
            $crate::io::pandapower::table::ElementType::Shunt => {
                let $rows = &$net.shunt;
                $body
            }
        }
    };
}
pub(crate) use dispatch_rows;

/// A single, hashable table value used for column-wise comparison of rows.
///
/// Missing values and `NaN` both map to [`Cell::Null`], so two rows that are
/// both missing a value compare equal on that column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Text(String),
}

/// Conversion of a field value into a [`Cell`].
pub trait IntoCell {
    fn to_cell(&self) -> Cell;
}

impl IntoCell for f64 {
    fn to_cell(&self) -> Cell {
        if self.is_nan() {
            Cell::Null
        } else {
            Cell::Float(OrderedFloat(*self))
        }
    }
}

impl IntoCell for i64 {
    fn to_cell(&self) -> Cell {
        Cell::Int(*self)
    }
}

impl IntoCell for i32 {
    fn to_cell(&self) -> Cell {
        Cell::Int(*self as i64)
    }
}

impl IntoCell for u8 {
    fn to_cell(&self) -> Cell {
        Cell::Int(*self as i64)
    }
}

impl IntoCell for bool {
    fn to_cell(&self) -> Cell {
        Cell::Bool(*self)
    }
}

impl IntoCell for String {
    fn to_cell(&self) -> Cell {
        Cell::Text(self.clone())
    }
}

impl<T: IntoCell> IntoCell for Option<T> {
    fn to_cell(&self) -> Cell {
        match self {
            Some(v) => v.to_cell(),
            None => Cell::Null,
        }
    }
}

/// Static column schema of an element table.
///
/// Implemented through `#[derive(TableRow)]`; every row type carries an
/// `index` field which is the join key between tables.
pub trait TableRow {
    const COLUMNS: &'static [&'static str];

    fn index(&self) -> i64;
    fn set_index(&mut self, index: i64);
    fn cells(&self) -> Vec<(&'static str, Cell)>;

    fn cell(&self, column: &str) -> Option<Cell> {
        self.cells()
            .into_iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v)
    }

    /// Values of every column except `index` and the excluded ones, in schema order.
    fn comparison_key(&self, excluded: &BTreeSet<String>) -> Vec<Cell> {
        self.cells()
            .into_iter()
            .filter(|(c, _)| *c != "index" && !excluded.contains(*c))
            .map(|(_, v)| v)
            .collect()
    }
}

/// Highest index of a table plus one, `0` for an empty table.
pub fn next_index<T: TableRow>(rows: &[T]) -> i64 {
    rows.iter().map(TableRow::index).max().map_or(0, |m| m + 1)
}

/// Accessors shared by all element tables carrying derived columns.
pub trait ElementRow: TableRow {
    fn name(&self) -> Option<&String>;
    fn name_mut(&mut self) -> &mut Option<String>;
    fn subnet(&self) -> Option<&String>;
    fn subnet_mut(&mut self) -> &mut Option<String>;
    fn volt_lvl(&self) -> Option<u8>;
    fn volt_lvl_mut(&mut self) -> &mut Option<u8>;
}

macro_rules! impl_element_row {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ElementRow for $ty {
                fn name(&self) -> Option<&String> {
                    self.name.as_ref()
                }
                fn name_mut(&mut self) -> &mut Option<String> {
                    &mut self.name
                }
                fn subnet(&self) -> Option<&String> {
                    self.subnet.as_ref()
                }
                fn subnet_mut(&mut self) -> &mut Option<String> {
                    &mut self.subnet
                }
                fn volt_lvl(&self) -> Option<u8> {
                    self.volt_lvl
                }
                fn volt_lvl_mut(&mut self) -> &mut Option<u8> {
                    &mut self.volt_lvl
                }
            }
        )*
    };
}

impl_element_row!(
    Bus,
    Line,
    Transformer,
    Transformer3W,
    Switch,
    Measurement,
    Load,
    SGen,
    Gen,
    ExtGrid,
    Shunt,
);

/// Elements attached to exactly one bus.
pub trait BusElement: ElementRow {
    fn bus(&self) -> i64;
}

macro_rules! impl_bus_element {
    ($($ty:ty),* $(,)?) => {
        $(
            impl BusElement for $ty {
                fn bus(&self) -> i64 {
                    self.bus
                }
            }
        )*
    };
}

impl_bus_element!(Load, SGen, Gen, ExtGrid, Shunt);

/// A named connection point of a branch element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    FromBus,
    ToBus,
    HvBus,
    MvBus,
    LvBus,
}

impl Terminal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Terminal::FromBus => "from_bus",
            Terminal::ToBus => "to_bus",
            Terminal::HvBus => "hv_bus",
            Terminal::MvBus => "mv_bus",
            Terminal::LvBus => "lv_bus",
        }
    }

    /// Terminal named by a measurement `side` value (`"from"`, `"hv"`, ...).
    pub fn from_side(side: &str) -> Option<Terminal> {
        match side.to_ascii_lowercase().as_str() {
            "from" | "from_bus" => Some(Terminal::FromBus),
            "to" | "to_bus" => Some(Terminal::ToBus),
            "hv" | "hv_bus" => Some(Terminal::HvBus),
            "mv" | "mv_bus" => Some(Terminal::MvBus),
            "lv" | "lv_bus" => Some(Terminal::LvBus),
            _ => None,
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Terminal {
    type Err = TopologyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Terminal::from_side(s).ok_or_else(|| TopologyError::UnknownColumn {
            element: "branch".into(),
            column: s.to_string(),
        })
    }
}

/// Two- or three-terminal elements that switches can anchor.
pub trait BranchRow: ElementRow + Clone {
    const ELEMENT: ElementType;
    const TERMINALS: &'static [Terminal];

    fn terminal(&self, t: Terminal) -> Option<i64>;
    fn terminal_mut(&mut self, t: Terminal) -> Option<&mut i64>;
    fn rows(net: &Network) -> &Vec<Self>;
    fn rows_mut(net: &mut Network) -> &mut Vec<Self>;

    fn switch_type() -> SwitchType {
        SwitchType::from_branch(Self::ELEMENT)
    }

    /// First terminal of this element type contained in `choices`.
    fn pick_terminal(choices: &[Terminal]) -> Option<Terminal> {
        choices.iter().copied().find(|t| Self::TERMINALS.contains(t))
    }
}

/// Two-terminal branches carrying a `parallel` multiplicity.
pub trait ParallelBranch: BranchRow {
    fn parallel(&self) -> i32;
    fn parallel_mut(&mut self) -> &mut i32;

    /// Copy with endpoints in canonical order for undirected branch types.
    fn normalized(&self) -> Self {
        self.clone()
    }
}

impl BranchRow for Line {
    const ELEMENT: ElementType = ElementType::Line;
    const TERMINALS: &'static [Terminal] = &[Terminal::FromBus, Terminal::ToBus];

    fn terminal(&self, t: Terminal) -> Option<i64> {
        match t {
            Terminal::FromBus => Some(self.from_bus),
            Terminal::ToBus => Some(self.to_bus),
            _ => None,
        }
    }
    fn terminal_mut(&mut self, t: Terminal) -> Option<&mut i64> {
        match t {
            Terminal::FromBus => Some(&mut self.from_bus),
            Terminal::ToBus => Some(&mut self.to_bus),
            _ => None,
        }
    }
    fn rows(net: &Network) -> &Vec<Self> {
        &net.line
    }
    fn rows_mut(net: &mut Network) -> &mut Vec<Self> {
        &mut net.line
    }
}

impl ParallelBranch for Line {
    fn parallel(&self) -> i32 {
        self.parallel
    }
    fn parallel_mut(&mut self) -> &mut i32 {
        &mut self.parallel
    }
    fn normalized(&self) -> Self {
        let mut line = self.clone();
        if line.from_bus > line.to_bus {
            std::mem::swap(&mut line.from_bus, &mut line.to_bus);
        }
        line
    }
}

impl BranchRow for Transformer {
    const ELEMENT: ElementType = ElementType::Trafo;
    const TERMINALS: &'static [Terminal] = &[Terminal::HvBus, Terminal::LvBus];

    fn terminal(&self, t: Terminal) -> Option<i64> {
        match t {
            Terminal::HvBus => Some(self.hv_bus),
            Terminal::LvBus => Some(self.lv_bus),
            _ => None,
        }
    }
    fn terminal_mut(&mut self, t: Terminal) -> Option<&mut i64> {
        match t {
            Terminal::HvBus => Some(&mut self.hv_bus),
            Terminal::LvBus => Some(&mut self.lv_bus),
            _ => None,
        }
    }
    fn rows(net: &Network) -> &Vec<Self> {
        &net.trafo
    }
    fn rows_mut(net: &mut Network) -> &mut Vec<Self> {
        &mut net.trafo
    }
}

impl ParallelBranch for Transformer {
    fn parallel(&self) -> i32 {
        self.parallel
    }
    fn parallel_mut(&mut self) -> &mut i32 {
        &mut self.parallel
    }
}

impl BranchRow for Transformer3W {
    const ELEMENT: ElementType = ElementType::Trafo3w;
    const TERMINALS: &'static [Terminal] = &[Terminal::HvBus, Terminal::MvBus, Terminal::LvBus];

    fn terminal(&self, t: Terminal) -> Option<i64> {
        match t {
            Terminal::HvBus => Some(self.hv_bus),
            Terminal::MvBus => Some(self.mv_bus),
            Terminal::LvBus => Some(self.lv_bus),
            _ => None,
        }
    }
    fn terminal_mut(&mut self, t: Terminal) -> Option<&mut i64> {
        match t {
            Terminal::HvBus => Some(&mut self.hv_bus),
            Terminal::MvBus => Some(&mut self.mv_bus),
            Terminal::LvBus => Some(&mut self.lv_bus),
            _ => None,
        }
    }
    fn rows(net: &Network) -> &Vec<Self> {
        &net.trafo3w
    }
    fn rows_mut(net: &mut Network) -> &mut Vec<Self> {
        &mut net.trafo3w
    }
}

/// Element tables of a [`Network`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Bus,
    Line,
    Trafo,
    Trafo3w,
    Switch,
    Measurement,
    Load,
    Sgen,
    Gen,
    ExtGrid,
    Shunt,
}

impl ElementType {
    pub const ALL: [ElementType; 11] = [
        ElementType::Bus,
        ElementType::Line,
        ElementType::Trafo,
        ElementType::Trafo3w,
        ElementType::Switch,
        ElementType::Measurement,
        ElementType::Load,
        ElementType::Sgen,
        ElementType::Gen,
        ElementType::ExtGrid,
        ElementType::Shunt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Bus => "bus",
            ElementType::Line => "line",
            ElementType::Trafo => "trafo",
            ElementType::Trafo3w => "trafo3w",
            ElementType::Switch => "switch",
            ElementType::Measurement => "measurement",
            ElementType::Load => "load",
            ElementType::Sgen => "sgen",
            ElementType::Gen => "gen",
            ElementType::ExtGrid => "ext_grid",
            ElementType::Shunt => "shunt",
        }
    }

    /// Static column schema of the element table.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            ElementType::Bus => Bus::COLUMNS,
            ElementType::Line => Line::COLUMNS,
            ElementType::Trafo => Transformer::COLUMNS,
            ElementType::Trafo3w => Transformer3W::COLUMNS,
            ElementType::Switch => Switch::COLUMNS,
            ElementType::Measurement => Measurement::COLUMNS,
            ElementType::Load => Load::COLUMNS,
            ElementType::Sgen => SGen::COLUMNS,
            ElementType::Gen => Gen::COLUMNS,
            ElementType::ExtGrid => ExtGrid::COLUMNS,
            ElementType::Shunt => Shunt::COLUMNS,
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            ElementType::Line | ElementType::Trafo | ElementType::Trafo3w
        )
    }

    pub fn len(&self, net: &Network) -> usize {
        dispatch_rows!(net, *self, |rows| rows.len())
    }

    pub fn indices(&self, net: &Network) -> Vec<i64> {
        dispatch_rows!(net, *self, |rows| rows.iter().map(TableRow::index).collect())
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = TopologyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ElementType::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| TopologyError::UnsupportedElementType(s.to_string()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_names() {
        assert!(Bus::COLUMNS.contains(&"type"));
        assert!(Line::COLUMNS.contains(&"parallel"));
        assert_eq!(Line::COLUMNS[0], "index");
        assert_eq!(ElementType::Gen.columns(), Gen::COLUMNS);
    }

    #[test]
    fn test_comparison_key_skips_index_and_excluded() {
        let a = Line {
            index: 0,
            name: Some("a".into()),
            from_bus: 1,
            to_bus: 2,
            ..Default::default()
        };
        let b = Line {
            index: 7,
            name: Some("b".into()),
            parallel: 3,
            ..a.clone()
        };
        let excluded: BTreeSet<String> = ["name", "parallel"].map(String::from).into();
        assert_eq!(a.comparison_key(&excluded), b.comparison_key(&excluded));
        assert_ne!(a.comparison_key(&BTreeSet::new()), b.comparison_key(&BTreeSet::new()));
    }

    #[test]
    fn test_nan_cells_compare_equal() {
        assert_eq!(f64::NAN.to_cell(), Cell::Null);
        assert_eq!(None::<f64>.to_cell(), f64::NAN.to_cell());
    }

    #[test]
    fn test_element_type_roundtrip() {
        for e in ElementType::ALL {
            assert_eq!(e.as_str().parse::<ElementType>().unwrap(), e);
        }
        assert!("impedance".parse::<ElementType>().is_err());
    }

    #[test]
    fn test_line_normalized() {
        let line = Line {
            from_bus: 5,
            to_bus: 2,
            ..Default::default()
        };
        let n = line.normalized();
        assert_eq!((n.from_bus, n.to_bus), (2, 5));
    }
}
