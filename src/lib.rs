mod basic;
pub mod io;
pub mod testcases;
pub mod prelude {
    use crate::basic;
    pub use crate::io::pandapower;
    pub use basic::*;

    pub use basic::aux_node::{create_branch_switches, replace_branch_switches};
    pub use basic::coords::{assign_coordinate_ids, merge_busbar_coordinates};
    pub use basic::derived::provide_derived_cols;
    pub use basic::parallel::convert_parallel_branches;
    pub use basic::summary::{level_summary, NetworkSummary};
    pub use basic::volt_lvl::{
        all_voltlvl_idx, get_voltlvl, voltlvl_idx, LevelKey, LevelPartition, VoltLvl,
        DEFAULT_VN_KV_LIMITS, MAX_VN_KV_LIMITS,
    };
}
