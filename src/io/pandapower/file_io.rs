use csv::{ReaderBuilder, StringRecord};
use gridtopo_proc_marco::TableRow;
use serde::de::DeserializeOwned;
use serde::Deserializer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::{fs, fs::File};

use serde_json::{Map, Value};
use tracing::debug;

use super::table::{next_index, Cell, ElementType, IntoCell, TableRow};
use crate::basic::error::{Result, TopologyError};

/// This module is used to parse pandapower network tables

/// Deserializes an optional integer that may be stored as a float (`3.0`) or be missing.
fn from_number<'de, D>(deserializer: D) -> std::result::Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Deserialize::deserialize(deserializer)?;
    let level = match val {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(level
        .filter(|v| (0.0..=f64::from(u8::MAX)).contains(v))
        .map(|v| v as u8))
}

/// Deserializes a float where `null`, empty or unparsable values become `NaN`.
fn from_float<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Deserialize::deserialize(deserializer)?;
    match val {
        Value::Number(n) => Ok(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => Ok(s.trim().parse::<f64>().unwrap_or(f64::NAN)),
        Value::Null => Ok(f64::NAN),
        other => Err(serde::de::Error::custom(format!("invalid float `{other}`"))),
    }
}

/// Deserializes an optional string, numbers are kept as their textual form.
fn from_str<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Deserialize::deserialize(deserializer)?;
    match val {
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::String(s) if !s.is_empty() && s != "nan" => Ok(Some(s)),
        _ => Ok(None),
    }
}

fn from_bus_type<'de, D>(deserializer: D) -> std::result::Result<BusType, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Deserialize::deserialize(deserializer)?;
    Ok(val.as_str().map(BusType::from).unwrap_or_default())
}

/// Kind of a bus.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusType {
    #[serde(rename = "n", alias = "node")]
    #[default]
    Node,
    #[serde(rename = "b", alias = "busbar")]
    Busbar,
    #[serde(rename = "m", alias = "muff")]
    Muff,
    #[serde(rename = "auxiliary")]
    Auxiliary,
}

impl BusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusType::Node => "n",
            BusType::Busbar => "b",
            BusType::Muff => "m",
            BusType::Auxiliary => "auxiliary",
        }
    }
}

impl From<&str> for BusType {
    fn from(s: &str) -> BusType {
        match s {
            "b" | "busbar" => BusType::Busbar,
            "m" | "muff" => BusType::Muff,
            "auxiliary" => BusType::Auxiliary,
            _ => BusType::Node,
        }
    }
}

impl IntoCell for BusType {
    fn to_cell(&self) -> Cell {
        Cell::Text(self.as_str().to_string())
    }
}

/// Represents a bus in the network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, TableRow)]
#[serde(default)]
pub struct Bus {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    #[serde(deserialize_with = "from_float")]
    pub vn_kv: f64,
    #[serde(rename = "type", deserialize_with = "from_bus_type")]
    pub type_: BusType,
    #[serde(deserialize_with = "from_str")]
    pub zone: Option<String>,
    pub in_service: bool,
    pub max_vm_pu: Option<f64>,
    pub min_vm_pu: Option<f64>,
    #[serde(deserialize_with = "from_str")]
    pub substation: Option<String>,
    #[serde(deserialize_with = "from_str")]
    pub subnet: Option<String>,
    #[serde(alias = "voltLvl", deserialize_with = "from_number")]
    pub volt_lvl: Option<u8>,
    #[serde(alias = "coordID", deserialize_with = "from_str")]
    pub coord_id: Option<String>,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            vn_kv: 0.0,
            type_: BusType::Node,
            zone: None,
            in_service: true,
            max_vm_pu: None,
            min_vm_pu: None,
            substation: None,
            subnet: None,
            volt_lvl: None,
            coord_id: None,
        }
    }
}

/// Represents a generator in the network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, TableRow)]
#[serde(default)]
pub struct Gen {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    pub bus: i64,
    #[serde(deserialize_with = "from_float")]
    pub p_mw: f64,
    #[serde(deserialize_with = "from_float")]
    pub vm_pu: f64,
    pub sn_mva: Option<f64>,
    #[serde(deserialize_with = "from_float")]
    pub scaling: f64,
    pub slack: bool,
    pub in_service: bool,
    pub max_p_mw: Option<f64>,
    pub min_p_mw: Option<f64>,
    pub max_q_mvar: Option<f64>,
    pub min_q_mvar: Option<f64>,
    #[serde(deserialize_with = "from_str")]
    pub subnet: Option<String>,
    #[serde(alias = "voltLvl", deserialize_with = "from_number")]
    pub volt_lvl: Option<u8>,
}

impl Default for Gen {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            bus: 0,
            p_mw: 0.0,
            vm_pu: 1.0,
            sn_mva: None,
            scaling: 1.0,
            slack: false,
            in_service: true,
            max_p_mw: None,
            min_p_mw: None,
            max_q_mvar: None,
            min_q_mvar: None,
            subnet: None,
            volt_lvl: None,
        }
    }
}

/// Represents a load in the network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, TableRow)]
#[serde(default)]
pub struct Load {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    pub bus: i64,
    #[serde(deserialize_with = "from_float")]
    pub p_mw: f64,
    #[serde(deserialize_with = "from_float")]
    pub q_mvar: f64,
    #[serde(deserialize_with = "from_float")]
    pub const_z_percent: f64,
    #[serde(deserialize_with = "from_float")]
    pub const_i_percent: f64,
    pub sn_mva: Option<f64>,
    #[serde(deserialize_with = "from_float")]
    pub scaling: f64,
    pub in_service: bool,
    #[serde(rename = "type", deserialize_with = "from_str")]
    pub type_: Option<String>,
    #[serde(deserialize_with = "from_str")]
    pub subnet: Option<String>,
    #[serde(alias = "voltLvl", deserialize_with = "from_number")]
    pub volt_lvl: Option<u8>,
}

impl Default for Load {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            bus: 0,
            p_mw: 0.0,
            q_mvar: 0.0,
            const_z_percent: 0.0,
            const_i_percent: 0.0,
            sn_mva: None,
            scaling: 1.0,
            in_service: true,
            type_: None,
            subnet: None,
            volt_lvl: None,
        }
    }
}

/// Represents a line in the network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, TableRow)]
#[serde(default)]
pub struct Line {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    #[serde(deserialize_with = "from_str")]
    pub std_type: Option<String>,
    pub from_bus: i64,
    pub to_bus: i64,
    #[serde(deserialize_with = "from_float")]
    pub length_km: f64,
    #[serde(deserialize_with = "from_float")]
    pub r_ohm_per_km: f64,
    #[serde(deserialize_with = "from_float")]
    pub x_ohm_per_km: f64,
    #[serde(deserialize_with = "from_float")]
    pub c_nf_per_km: f64,
    #[serde(deserialize_with = "from_float")]
    pub g_us_per_km: f64,
    #[serde(deserialize_with = "from_float")]
    pub max_i_ka: f64,
    #[serde(deserialize_with = "from_float")]
    pub df: f64,
    pub parallel: i32,
    #[serde(rename = "type", deserialize_with = "from_str")]
    pub type_: Option<String>,
    pub in_service: bool,
    pub max_loading_percent: Option<f64>,
    #[serde(deserialize_with = "from_str")]
    pub subnet: Option<String>,
    #[serde(alias = "voltLvl", deserialize_with = "from_number")]
    pub volt_lvl: Option<u8>,
}

impl Default for Line {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            std_type: None,
            from_bus: 0,
            to_bus: 0,
            length_km: 1.0,
            r_ohm_per_km: 0.0,
            x_ohm_per_km: 0.0,
            c_nf_per_km: 0.0,
            g_us_per_km: 0.0,
            max_i_ka: 0.0,
            df: 1.0,
            parallel: 1,
            type_: None,
            in_service: true,
            max_loading_percent: None,
            subnet: None,
            volt_lvl: None,
        }
    }
}

/// Represents a two-winding transformer in the network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, TableRow)]
#[serde(default)]
pub struct Transformer {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    #[serde(deserialize_with = "from_str")]
    pub std_type: Option<String>,
    pub hv_bus: i64,
    pub lv_bus: i64,
    #[serde(deserialize_with = "from_float")]
    pub sn_mva: f64,
    #[serde(deserialize_with = "from_float")]
    pub vn_hv_kv: f64,
    #[serde(deserialize_with = "from_float")]
    pub vn_lv_kv: f64,
    #[serde(deserialize_with = "from_float")]
    pub vk_percent: f64,
    #[serde(deserialize_with = "from_float")]
    pub vkr_percent: f64,
    #[serde(deserialize_with = "from_float")]
    pub pfe_kw: f64,
    #[serde(deserialize_with = "from_float")]
    pub i0_percent: f64,
    #[serde(deserialize_with = "from_float")]
    pub shift_degree: f64,
    #[serde(deserialize_with = "from_str")]
    pub tap_side: Option<String>,
    pub tap_neutral: Option<f64>,
    pub tap_min: Option<f64>,
    pub tap_max: Option<f64>,
    pub tap_pos: Option<f64>,
    pub tap_step_percent: Option<f64>,
    pub tap_step_degree: Option<f64>,
    pub tap_phase_shifter: bool,
    pub parallel: i32,
    #[serde(deserialize_with = "from_float")]
    pub df: f64,
    pub in_service: bool,
    pub max_loading_percent: Option<f64>,
    #[serde(deserialize_with = "from_str")]
    pub substation: Option<String>,
    #[serde(deserialize_with = "from_str")]
    pub subnet: Option<String>,
    #[serde(alias = "voltLvl", deserialize_with = "from_number")]
    pub volt_lvl: Option<u8>,
}

impl Default for Transformer {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            std_type: None,
            hv_bus: 0,
            lv_bus: 0,
            sn_mva: 0.0,
            vn_hv_kv: 0.0,
            vn_lv_kv: 0.0,
            vk_percent: 0.0,
            vkr_percent: 0.0,
            pfe_kw: 0.0,
            i0_percent: 0.0,
            shift_degree: 0.0,
            tap_side: None,
            tap_neutral: None,
            tap_min: None,
            tap_max: None,
            tap_pos: None,
            tap_step_percent: None,
            tap_step_degree: None,
            tap_phase_shifter: false,
            parallel: 1,
            df: 1.0,
            in_service: true,
            max_loading_percent: None,
            substation: None,
            subnet: None,
            volt_lvl: None,
        }
    }
}

/// Represents a three-winding transformer in the network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, TableRow)]
#[serde(default)]
pub struct Transformer3W {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    #[serde(deserialize_with = "from_str")]
    pub std_type: Option<String>,
    pub hv_bus: i64,
    pub mv_bus: i64,
    pub lv_bus: i64,
    #[serde(deserialize_with = "from_float")]
    pub sn_hv_mva: f64,
    #[serde(deserialize_with = "from_float")]
    pub sn_mv_mva: f64,
    #[serde(deserialize_with = "from_float")]
    pub sn_lv_mva: f64,
    #[serde(deserialize_with = "from_float")]
    pub vn_hv_kv: f64,
    #[serde(deserialize_with = "from_float")]
    pub vn_mv_kv: f64,
    #[serde(deserialize_with = "from_float")]
    pub vn_lv_kv: f64,
    #[serde(deserialize_with = "from_float")]
    pub vk_hv_percent: f64,
    #[serde(deserialize_with = "from_float")]
    pub vk_mv_percent: f64,
    #[serde(deserialize_with = "from_float")]
    pub vk_lv_percent: f64,
    #[serde(deserialize_with = "from_float")]
    pub vkr_hv_percent: f64,
    #[serde(deserialize_with = "from_float")]
    pub vkr_mv_percent: f64,
    #[serde(deserialize_with = "from_float")]
    pub vkr_lv_percent: f64,
    #[serde(deserialize_with = "from_float")]
    pub pfe_kw: f64,
    #[serde(deserialize_with = "from_float")]
    pub i0_percent: f64,
    #[serde(deserialize_with = "from_float")]
    pub shift_mv_degree: f64,
    #[serde(deserialize_with = "from_float")]
    pub shift_lv_degree: f64,
    #[serde(deserialize_with = "from_str")]
    pub tap_side: Option<String>,
    pub tap_pos: Option<f64>,
    pub in_service: bool,
    pub max_loading_percent: Option<f64>,
    #[serde(deserialize_with = "from_str")]
    pub substation: Option<String>,
    #[serde(deserialize_with = "from_str")]
    pub subnet: Option<String>,
    #[serde(alias = "voltLvl", deserialize_with = "from_number")]
    pub volt_lvl: Option<u8>,
}

impl Default for Transformer3W {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            std_type: None,
            hv_bus: 0,
            mv_bus: 0,
            lv_bus: 0,
            sn_hv_mva: 0.0,
            sn_mv_mva: 0.0,
            sn_lv_mva: 0.0,
            vn_hv_kv: 0.0,
            vn_mv_kv: 0.0,
            vn_lv_kv: 0.0,
            vk_hv_percent: 0.0,
            vk_mv_percent: 0.0,
            vk_lv_percent: 0.0,
            vkr_hv_percent: 0.0,
            vkr_mv_percent: 0.0,
            vkr_lv_percent: 0.0,
            pfe_kw: 0.0,
            i0_percent: 0.0,
            shift_mv_degree: 0.0,
            shift_lv_degree: 0.0,
            tap_side: None,
            tap_pos: None,
            in_service: true,
            max_loading_percent: None,
            substation: None,
            subnet: None,
            volt_lvl: None,
        }
    }
}

/// Represents an external grid in the network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, TableRow)]
#[serde(default)]
pub struct ExtGrid {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    pub bus: i64,
    #[serde(deserialize_with = "from_float")]
    pub vm_pu: f64,
    #[serde(deserialize_with = "from_float")]
    pub va_degree: f64,
    #[serde(deserialize_with = "from_float")]
    pub slack_weight: f64,
    pub in_service: bool,
    pub max_p_mw: Option<f64>,
    pub min_p_mw: Option<f64>,
    pub max_q_mvar: Option<f64>,
    pub min_q_mvar: Option<f64>,
    #[serde(deserialize_with = "from_str")]
    pub subnet: Option<String>,
    #[serde(alias = "voltLvl", deserialize_with = "from_number")]
    pub volt_lvl: Option<u8>,
}

impl Default for ExtGrid {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            bus: 0,
            vm_pu: 1.0,
            va_degree: 0.0,
            slack_weight: 1.0,
            in_service: true,
            max_p_mw: None,
            min_p_mw: None,
            max_q_mvar: None,
            min_q_mvar: None,
            subnet: None,
            volt_lvl: None,
        }
    }
}

/// Represents the data from the sgen.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, TableRow)]
#[serde(default)]
pub struct SGen {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    pub bus: i64,
    #[serde(deserialize_with = "from_float")]
    pub p_mw: f64,
    #[serde(deserialize_with = "from_float")]
    pub q_mvar: f64,
    pub sn_mva: Option<f64>,
    #[serde(deserialize_with = "from_float")]
    pub scaling: f64,
    pub in_service: bool,
    #[serde(rename = "type", deserialize_with = "from_str")]
    pub type_: Option<String>,
    pub current_source: bool,
    #[serde(deserialize_with = "from_str")]
    pub subnet: Option<String>,
    #[serde(alias = "voltLvl", deserialize_with = "from_number")]
    pub volt_lvl: Option<u8>,
}

impl Default for SGen {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            bus: 0,
            p_mw: 0.0,
            q_mvar: 0.0,
            sn_mva: None,
            scaling: 1.0,
            in_service: true,
            type_: None,
            current_source: true,
            subnet: None,
            volt_lvl: None,
        }
    }
}

/// Represents a shunt in the network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, TableRow)]
#[serde(default)]
pub struct Shunt {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    pub bus: i64,
    #[serde(deserialize_with = "from_float")]
    pub q_mvar: f64,
    #[serde(deserialize_with = "from_float")]
    pub p_mw: f64,
    #[serde(deserialize_with = "from_float")]
    pub vn_kv: f64,
    pub step: i32,
    pub max_step: i32,
    pub in_service: bool,
    #[serde(deserialize_with = "from_str")]
    pub subnet: Option<String>,
    #[serde(alias = "voltLvl", deserialize_with = "from_number")]
    pub volt_lvl: Option<u8>,
}

impl Default for Shunt {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            bus: 0,
            q_mvar: 0.0,
            p_mw: 0.0,
            vn_kv: 0.0,
            step: 1,
            max_step: 1,
            in_service: true,
            subnet: None,
            volt_lvl: None,
        }
    }
}

/// Element kind a switch `element` column refers to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwitchType {
    #[serde(rename = "l")]
    SwitchBusLine,
    #[serde(rename = "t")]
    SwitchBusTransformer,
    #[serde(rename = "t3")]
    SwitchBusTransformer3w,
    #[serde(rename = "b")]
    #[default]
    SwitchTwoBuses,
    Unknown,
}

impl SwitchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchType::SwitchBusLine => "l",
            SwitchType::SwitchBusTransformer => "t",
            SwitchType::SwitchBusTransformer3w => "t3",
            SwitchType::SwitchTwoBuses => "b",
            SwitchType::Unknown => "Unknown",
        }
    }

    /// Branch table referenced by a bus-branch switch.
    pub fn branch_element(&self) -> Option<ElementType> {
        match self {
            SwitchType::SwitchBusLine => Some(ElementType::Line),
            SwitchType::SwitchBusTransformer => Some(ElementType::Trafo),
            SwitchType::SwitchBusTransformer3w => Some(ElementType::Trafo3w),
            _ => None,
        }
    }

    pub fn from_branch(element: ElementType) -> SwitchType {
        match element {
            ElementType::Line => SwitchType::SwitchBusLine,
            ElementType::Trafo => SwitchType::SwitchBusTransformer,
            ElementType::Trafo3w => SwitchType::SwitchBusTransformer3w,
            ElementType::Bus => SwitchType::SwitchTwoBuses,
            _ => SwitchType::Unknown,
        }
    }
}

impl From<&str> for SwitchType {
    fn from(s: &str) -> SwitchType {
        match s {
            "l" => SwitchType::SwitchBusLine,
            "t" => SwitchType::SwitchBusTransformer,
            "t3" => SwitchType::SwitchBusTransformer3w,
            "b" => SwitchType::SwitchTwoBuses,
            _ => SwitchType::Unknown,
        }
    }
}

impl IntoCell for SwitchType {
    fn to_cell(&self) -> Cell {
        Cell::Text(self.as_str().to_string())
    }
}

/// Represents a switch in the network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, TableRow)]
#[serde(default)]
pub struct Switch {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    pub bus: i64,
    pub element: i64,
    pub et: SwitchType,
    #[serde(rename = "type", deserialize_with = "from_str")]
    pub type_: Option<String>,
    pub closed: bool,
    #[serde(deserialize_with = "from_float")]
    pub z_ohm: f64,
    #[serde(deserialize_with = "from_str")]
    pub substation: Option<String>,
    #[serde(deserialize_with = "from_str")]
    pub subnet: Option<String>,
    #[serde(alias = "voltLvl", deserialize_with = "from_number")]
    pub volt_lvl: Option<u8>,
}

impl Default for Switch {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            bus: 0,
            element: 0,
            et: SwitchType::SwitchTwoBuses,
            type_: None,
            closed: true,
            z_ohm: 0.0,
            substation: None,
            subnet: None,
            volt_lvl: None,
        }
    }
}

/// Represents a measurement attached to a bus or a branch terminal.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, TableRow)]
#[serde(default)]
pub struct Measurement {
    pub index: i64,
    #[serde(deserialize_with = "from_str")]
    pub name: Option<String>,
    pub measurement_type: String,
    pub element_type: ElementType,
    pub element: i64,
    /// `from`/`to`/`hv`/`mv`/`lv` or a bus index, empty for bus measurements.
    #[serde(deserialize_with = "from_str")]
    pub side: Option<String>,
    #[serde(deserialize_with = "from_float")]
    pub value: f64,
    #[serde(deserialize_with = "from_float")]
    pub std_dev: f64,
    #[serde(deserialize_with = "from_str")]
    pub substation: Option<String>,
    #[serde(deserialize_with = "from_str")]
    pub subnet: Option<String>,
    #[serde(alias = "voltLvl", deserialize_with = "from_number")]
    pub volt_lvl: Option<u8>,
}

impl Default for Measurement {
    fn default() -> Self {
        Self {
            index: 0,
            name: None,
            measurement_type: "v".to_string(),
            element_type: ElementType::Bus,
            element: 0,
            side: None,
            value: 0.0,
            std_dev: 0.0,
            substation: None,
            subnet: None,
            volt_lvl: None,
        }
    }
}

impl IntoCell for ElementType {
    fn to_cell(&self) -> Cell {
        Cell::Text(self.as_str().to_string())
    }
}

/// Geographical position of a bus, `index` is the bus index.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, TableRow)]
#[serde(default)]
pub struct BusGeodata {
    pub index: i64,
    #[serde(deserialize_with = "from_float")]
    pub x: f64,
    #[serde(deserialize_with = "from_float")]
    pub y: f64,
}

impl Default for BusGeodata {
    fn default() -> Self {
        Self {
            index: 0,
            x: f64::NAN,
            y: f64::NAN,
        }
    }
}

/// Deduplicated coordinate shared by all buses carrying its id.
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Coordinate {
    pub id: String,
    #[serde(deserialize_with = "from_float")]
    pub x: f64,
    #[serde(deserialize_with = "from_float")]
    pub y: f64,
    pub subnet: Option<String>,
    pub volt_lvl: Option<u8>,
}

/// Bus result row of an earlier calculation.
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, TableRow)]
#[serde(default)]
pub struct BusResult {
    pub index: i64,
    #[serde(deserialize_with = "from_float")]
    pub vm_pu: f64,
    #[serde(deserialize_with = "from_float")]
    pub va_degree: f64,
    #[serde(deserialize_with = "from_float")]
    pub p_mw: f64,
    #[serde(deserialize_with = "from_float")]
    pub q_mvar: f64,
}

/// Represents a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub bus: Vec<Bus>,
    pub line: Vec<Line>,
    pub trafo: Vec<Transformer>,
    pub trafo3w: Vec<Transformer3W>,
    pub switch: Vec<Switch>,
    pub measurement: Vec<Measurement>,
    pub load: Vec<Load>,
    pub sgen: Vec<SGen>,
    pub r#gen: Vec<Gen>,
    pub ext_grid: Vec<ExtGrid>,
    pub shunt: Vec<Shunt>,
    pub bus_geodata: Vec<BusGeodata>,
    pub coordinates: Vec<Coordinate>,
    pub res_bus: Vec<BusResult>,
    #[serde(deserialize_with = "from_float")]
    pub f_hz: f64,
    #[serde(deserialize_with = "from_float")]
    pub sn_mva: f64,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            bus: Vec::new(),
            line: Vec::new(),
            trafo: Vec::new(),
            trafo3w: Vec::new(),
            switch: Vec::new(),
            measurement: Vec::new(),
            load: Vec::new(),
            sgen: Vec::new(),
            r#gen: Vec::new(),
            ext_grid: Vec::new(),
            shunt: Vec::new(),
            bus_geodata: Vec::new(),
            coordinates: Vec::new(),
            res_bus: Vec::new(),
            f_hz: 50.0,
            sn_mva: 1.0,
        }
    }
}

macro_rules! add_row_fns {
    ($($fn_name:ident => $field:ident: $ty:ty),* $(,)?) => {
        $(
            /// Appends the row under the next free index and returns that index.
            pub fn $fn_name(&mut self, mut row: $ty) -> i64 {
                let index = next_index(&self.$field);
                row.index = index;
                self.$field.push(row);
                index
            }
        )*
    };
}


impl Network {
    add_row_fns!(
        add_bus => bus: Bus,
        add_line => line: Line,
        add_trafo => trafo: Transformer,
        add_trafo3w => trafo3w: Transformer3W,
        add_switch => switch: Switch,
        add_measurement => measurement: Measurement,
        add_load => load: Load,
        add_sgen => sgen: SGen,
        add_gen => r#gen: Gen,
        add_ext_grid => ext_grid: ExtGrid,
        add_shunt => shunt: Shunt,
    );

    pub fn create_bus(&mut self, vn_kv: f64, name: &str) -> i64 {
        self.add_bus(Bus {
            name: Some(name.to_string()),
            vn_kv,
            ..Default::default()
        })
    }

    pub fn create_line(&mut self, from_bus: i64, to_bus: i64, length_km: f64, name: &str) -> i64 {
        self.add_line(Line {
            name: Some(name.to_string()),
            from_bus,
            to_bus,
            length_km,
            ..Default::default()
        })
    }

    pub fn create_switch(
        &mut self,
        bus: i64,
        element: i64,
        et: SwitchType,
        closed: bool,
        name: &str,
    ) -> i64 {
        self.add_switch(Switch {
            name: Some(name.to_string()),
            bus,
            element,
            et,
            closed,
            ..Default::default()
        })
    }

    pub fn set_bus_geodata(&mut self, bus: i64, x: f64, y: f64) {
        match self.bus_geodata.iter_mut().find(|g| g.index == bus) {
            Some(g) => {
                g.x = x;
                g.y = y;
            }
            None => self.bus_geodata.push(BusGeodata { index: bus, x, y }),
        }
    }

    pub fn bus_by_index(&self, index: i64) -> Option<&Bus> {
        self.bus.iter().find(|b| b.index == index)
    }

    /// Serializes the whole network as a JSON snapshot.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }
}

/// Parses one pandapower CSV table.
///
/// `True`/`False` are lowered for serde. A pandas index column (empty header)
/// becomes `index`; without any index column rows are numbered by position.
fn parse_csv_table<T: DeserializeOwned + TableRow>(content: &str) -> Result<Vec<T>> {
    let content = content.replace("True", "true").replace("False", "false");
    let mut rdr = ReaderBuilder::new().from_reader(content.as_bytes());
    let raw_headers = rdr.headers()?.to_owned();
    let positional = !raw_headers
        .iter()
        .enumerate()
        .any(|(i, h)| h == "index" || (i == 0 && h.is_empty()));
    let headers: StringRecord = raw_headers
        .iter()
        .enumerate()
        .map(|(i, h)| if i == 0 && h.is_empty() { "index" } else { h })
        .collect();

    let mut records: Vec<T> = Vec::new();
    for (pos, record) in rdr.records().enumerate() {
        let mut row: T = record?.deserialize(Some(&headers))?;
        if positional {
            row.set_index(pos as i64);
        }
        records.push(row);
    }
    Ok(records)
}

/// Loads a pandapower CSV file into a vector of the specified type.
/// A missing file yields an empty table.
fn load_pandapower_csv<T: DeserializeOwned + TableRow>(name: &Path) -> Result<Vec<T>> {
    if !name.exists() {
        return Ok(Vec::new());
    }
    parse_csv_table(&read_csv(name)?)
}

fn read_csv(name: &Path) -> Result<String> {
    let mut file = File::open(name)?;
    let mut buffer = String::new();
    file.read_to_string(&mut buffer)?;
    Ok(buffer)
}

/// Reads a CSV table from the given map, a missing entry yields an empty table.
fn csv_from_map<T: DeserializeOwned + TableRow>(
    map: &HashMap<String, String>,
    key: &str,
) -> Result<Vec<T>> {
    match map.get(key) {
        Some(s) => parse_csv_table(s),
        None => Ok(Vec::new()),
    }
}

/// Macro to read network tables from an in-memory map of CSV files.
macro_rules! read_csv_network {
    ($net:ident, $map:ident, { $($field:ident: $file:expr),* $(,)? }) => {
        $(
            $net.$field = csv_from_map(&$map, $file)?;
        )*
    };
}

/// Macro to read network tables from a folder of CSV files.
macro_rules! read_csv_network_folder {
    ($net:ident, $folder:ident, { $($field:ident: $file:expr),* $(,)? }) => {
        $(
            $net.$field = load_pandapower_csv(&$folder.join($file))?;
        )*
    };
}

/// Macro to read network tables from a pandapower JSON object.
macro_rules! read_json_network {
    ($net:ident, $map:ident, { $($field:ident: $file:expr),* $(,)? }) => {
        $(
            $net.$field = load_pandapower_element_json(&$map, $file)?;
        )*
    };
}

/// Loads a CSV folder into a Network structure.
pub fn load_csv_folder(folder: impl AsRef<Path>) -> Result<Network> {
    let folder = folder.as_ref();
    let mut net = Network::default();
    read_csv_network_folder!(net, folder, {
        bus: "bus.csv",
        line: "line.csv",
        trafo: "trafo.csv",
        trafo3w: "trafo3w.csv",
        switch: "switch.csv",
        measurement: "measurement.csv",
        load: "load.csv",
        sgen: "sgen.csv",
        r#gen: "gen.csv",
        ext_grid: "ext_grid.csv",
        shunt: "shunt.csv",
        bus_geodata: "bus_geodata.csv",
        res_bus: "res_bus.csv",
    });
    debug!(folder = %folder.display(), buses = net.bus.len(), "loaded csv folder");
    Ok(net)
}

/// Loads a network from a ZIP file containing CSV files.
#[cfg(feature = "zip")]
pub fn load_csv_zip(name: impl AsRef<Path>) -> Result<Network> {
    let f = File::open(name.as_ref())?;
    let mut zip = zip::ZipArchive::new(f)?;
    let mut map = HashMap::new();
    for i in 0..zip.len() {
        let mut file = zip.by_index(i)?;

        if file.is_file() {
            let mut s = String::with_capacity(file.size() as usize);
            file.read_to_string(&mut s)?;
            let key = file
                .name()
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_owned();
            map.insert(key, s);
        }
    }

    let mut net = Network::default();
    read_csv_network!(net, map, {
        bus: "bus.csv",
        line: "line.csv",
        trafo: "trafo.csv",
        trafo3w: "trafo3w.csv",
        switch: "switch.csv",
        measurement: "measurement.csv",
        load: "load.csv",
        sgen: "sgen.csv",
        r#gen: "gen.csv",
        ext_grid: "ext_grid.csv",
        shunt: "shunt.csv",
        bus_geodata: "bus_geodata.csv",
        res_bus: "res_bus.csv",
    });
    Ok(net)
}

fn load_json_from_str(file_content: &str) -> Result<Map<String, Value>> {
    let parsed: Value = serde_json::from_str(file_content)?;
    match parsed {
        Value::Object(obj) => Ok(obj),
        _ => Err(TopologyError::MalformedTable {
            table: "network".into(),
            reason: "top level is not a JSON object".into(),
        }),
    }
}

fn malformed(table: &str, reason: &str) -> TopologyError {
    TopologyError::MalformedTable {
        table: table.to_string(),
        reason: reason.to_string(),
    }
}

/// Reads one DataFrame (`split` orientation) of a pandapower JSON file.
fn load_pandapower_element_json<T: DeserializeOwned>(
    object: &Map<String, Value>,
    key: &str,
) -> Result<Vec<T>> {
    let Some(element) = object
        .get(key)
        .and_then(|v| v.as_object())
        .and_then(|v| v.get("_object"))
    else {
        return Ok(Vec::new());
    };
    let map = match element {
        Value::String(s) => load_json_from_str(s)?,
        Value::Object(o) => o.clone(),
        _ => return Err(malformed(key, "`_object` is neither a string nor an object")),
    };

    let headers = map
        .get("columns")
        .and_then(|v| v.as_array())
        .ok_or_else(|| malformed(key, "missing `columns`"))?;
    let rows = map
        .get("data")
        .and_then(|v| v.as_array())
        .ok_or_else(|| malformed(key, "missing `data`"))?;
    let index = map.get("index").and_then(|v| v.as_array());

    let mut elements = Vec::with_capacity(rows.len());
    for (pos, row) in rows.iter().enumerate() {
        let values = row
            .as_array()
            .ok_or_else(|| malformed(key, "row is not an array"))?;
        let mut obj: Map<String, Value> = headers
            .iter()
            .zip(values.iter())
            .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.clone())))
            .collect();

        let idx = index
            .and_then(|ix| ix.get(pos))
            .cloned()
            .unwrap_or_else(|| Value::Number(serde_json::Number::from(pos as i64)));
        obj.insert("index".to_string(), idx);

        elements.push(serde_json::from_value(Value::Object(obj))?);
    }

    Ok(elements)
}

/// Loads the element tables of a pandapower JSON file.
pub fn load_pandapower_json(file_path: impl AsRef<Path>) -> Result<Network> {
    let map = load_json_from_str(&fs::read_to_string(file_path)?)?;
    let object = map
        .get("_object")
        .and_then(|v| v.as_object())
        .ok_or_else(|| malformed("network", "missing `_object`"))?;

    let mut net = Network::default();
    read_json_network!(net, object, {
        bus: "bus",
        line: "line",
        trafo: "trafo",
        trafo3w: "trafo3w",
        switch: "switch",
        measurement: "measurement",
        load: "load",
        sgen: "sgen",
        r#gen: "gen",
        ext_grid: "ext_grid",
        shunt: "shunt",
        bus_geodata: "bus_geodata",
        res_bus: "res_bus",
    });
    if let Some(f_hz) = object.get("f_hz").and_then(Value::as_f64) {
        net.f_hz = f_hz;
    }
    if let Some(sn_mva) = object.get("sn_mva").and_then(Value::as_f64) {
        net.sn_mva = sn_mva;
    }

    Ok(net)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BUS_CSV: &str = ",name,vn_kv,type,zone,in_service,voltLvl\n\
        0,Bus 0,110.0,b,north,True,\n\
        1,Bus 1,20.0,n,,True,5.0\n\
        4,Bus 4,20.0,auxiliary,north,False,\n";

    #[test]
    fn test_parse_bus_csv() {
        let buses: Vec<Bus> = parse_csv_table(BUS_CSV).unwrap();
        assert_eq!(buses.len(), 3);
        assert_eq!(buses[2].index, 4);
        assert_eq!(buses[0].type_, BusType::Busbar);
        assert_eq!(buses[2].type_, BusType::Auxiliary);
        assert_eq!(buses[0].zone.as_deref(), Some("north"));
        assert_eq!(buses[1].zone, None);
        assert_eq!(buses[1].volt_lvl, Some(5));
        assert!(!buses[2].in_service);
    }

    #[test]
    fn test_positional_index() {
        let csv = "name,vn_kv\na,0.4\nb,0.4\n";
        let buses: Vec<Bus> = parse_csv_table(csv).unwrap();
        assert_eq!(buses.iter().map(|b| b.index).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_switch_type_csv() {
        let csv = "index,bus,element,et,closed\n0,1,3,l,True\n1,1,2,b,False\n2,0,0,t3,true\n";
        let switches: Vec<Switch> = parse_csv_table(csv).unwrap();
        assert_eq!(switches[0].et, SwitchType::SwitchBusLine);
        assert_eq!(switches[1].et, SwitchType::SwitchTwoBuses);
        assert!(!switches[1].closed);
        assert_eq!(switches[2].et, SwitchType::SwitchBusTransformer3w);
        assert_eq!(SwitchType::from("x"), SwitchType::Unknown);
    }

    #[test]
    fn test_load_csv_folder() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bus.csv"), BUS_CSV).unwrap();
        fs::write(
            dir.path().join("line.csv"),
            ",name,from_bus,to_bus,length_km,parallel\n0,L0,0,1,2.5,2\n",
        )
        .unwrap();
        let net = load_csv_folder(dir.path()).unwrap();
        assert_eq!(net.bus.len(), 3);
        assert_eq!(net.line[0].parallel, 2);
        assert!(net.trafo.is_empty());
    }

    #[cfg(feature = "zip")]
    #[test]
    fn test_load_csv_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.zip");
        {
            let file = File::create(&path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("net/bus.csv", options).unwrap();
            writer.write_all(BUS_CSV.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        let net = load_csv_zip(&path).unwrap();
        assert_eq!(net.bus.len(), 3);
    }

    #[test]
    fn test_load_pandapower_json() {
        let bus_frame = serde_json::json!({
            "columns": ["name", "vn_kv", "type", "zone", "in_service"],
            "index": [3, 7],
            "data": [["a", 110.0, "b", null, true], ["b", 20.0, "n", 1, true]]
        });
        let net_json = serde_json::json!({
            "_module": "pandapower.auxiliary",
            "_class": "pandapowerNet",
            "_object": {
                "bus": {"_module": "pandas.core.frame", "_class": "DataFrame",
                        "_object": bus_frame.to_string()},
                "f_hz": 50.0,
                "sn_mva": 1.0
            }
        });
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(net_json.to_string().as_bytes()).unwrap();
        let net = load_pandapower_json(file.path()).unwrap();
        assert_eq!(net.bus.iter().map(|b| b.index).collect::<Vec<_>>(), vec![3, 7]);
        assert_eq!(net.bus[1].zone.as_deref(), Some("1"));
        assert_eq!(net.f_hz, 50.0);
    }

    #[test]
    fn test_json_snapshot() {
        let mut net = Network::default();
        let b0 = net.create_bus(20.0, "a");
        let b1 = net.create_bus(20.0, "b");
        net.create_line(b0, b1, 1.0, "l");
        net.set_bus_geodata(b0, 1.0, 2.0);
        let s = net.to_json_string().unwrap();
        let back = Network::from_json_str(&s).unwrap();
        assert_eq!(back, net);

        // NaN is written as null and must come back as NaN
        net.bus_geodata.push(BusGeodata {
            index: b1,
            x: f64::NAN,
            y: 1.0,
        });
        net.line[0].max_i_ka = f64::NAN;
        let s = net.to_json_string().unwrap();
        let back = Network::from_json_str(&s).unwrap();
        assert_eq!(back.bus, net.bus);
        assert_eq!(back.bus_geodata[0], net.bus_geodata[0]);
        assert!(back.bus_geodata[1].x.is_nan());
        assert_eq!(back.bus_geodata[1].y, 1.0);
        assert!(back.line[0].max_i_ka.is_nan());
        assert_eq!(back.line[0].length_km, 1.0);
    }

    #[test]
    fn test_out_of_range_levels_are_dropped() {
        let level = |v: &str| {
            let bus: Bus = serde_json::from_str(&format!(r#"{{"vn_kv": 20.0, "volt_lvl": {v}}}"#)).unwrap();
            bus.volt_lvl
        };
        assert_eq!(level("5.0"), Some(5));
        assert_eq!(level("\"7\""), Some(7));
        assert_eq!(level("300.0"), None);
        assert_eq!(level("-1.0"), None);
        assert_eq!(level("null"), None);
    }

    #[test]
    fn test_empty_float_cell_is_nan() {
        let csv = ",x,y\n0,1.5,\n1,,2.0\n";
        let geo: Vec<BusGeodata> = parse_csv_table(csv).unwrap();
        assert_eq!(geo[0].x, 1.5);
        assert!(geo[0].y.is_nan());
        assert!(geo[1].x.is_nan());
        assert_eq!(geo[1].y, 2.0);
    }

    #[test]
    fn test_add_rows_take_next_index() {
        let mut net = Network::default();
        net.add_bus(Bus {
            index: 10,
            ..Default::default()
        });
        assert_eq!(net.bus[0].index, 0);
        net.bus[0].index = 10;
        assert_eq!(net.create_bus(0.4, "x"), 11);
    }
}
