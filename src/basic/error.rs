use thiserror::Error;

use crate::io::pandapower::table::{ElementType, Terminal};

/// Errors raised by the topology conversion passes and the loaders.
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("invalid voltage level `{0}`")]
    InvalidLevel(String),

    #[error("{element} needs an explicit terminal to resolve its voltage level ({hint})")]
    MissingTerminalSpec {
        element: ElementType,
        hint: String,
    },

    #[error(
        "auxiliary bus {bus} has {switches} bus-bus switches and {terminals} branch terminals attached, expected exactly one of each"
    )]
    MalformedAuxiliaryNode {
        bus: i64,
        switches: usize,
        terminals: usize,
    },

    #[error("bus-branch switch {switch} is malformed: {reason}")]
    MalformedBranchSwitch { switch: i64, reason: String },

    #[error(
        "{element} {member} duplicates {representative} but has more than one switch at {terminal}"
    )]
    AmbiguousMerge {
        element: ElementType,
        representative: i64,
        member: i64,
        terminal: Terminal,
    },

    #[error("element type `{0}` is not supported by this operation")]
    UnsupportedElementType(String),

    #[error("unknown column `{column}` for {element}")]
    UnknownColumn { element: String, column: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed table `{table}`: {reason}")]
    MalformedTable { table: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "zip")]
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, TopologyError>;
