use std::env;

use gridtopo::{io::pandapower::*, prelude::*, testcases::multivoltage_case};

/// Expands a network and compacts it again, printing the element counts
/// after each step.
///
/// Usage: `cargo run --example expand_compact [csv_folder]`. Without a folder
/// the bundled 380/110/20/0.4 kV case is used.
fn main() {
    let mut net = match env::args().nth(1) {
        Some(folder) => load_csv_folder(&folder).unwrap(),
        None => multivoltage_case(),
    };
    let cfg = ConversionConfig::default();
    println!("input:\n{}", net.summary());

    let reserved = net.expand(&cfg).unwrap();
    println!(
        "expanded ({} bus names reserved):\n{}",
        reserved.len(),
        net.summary()
    );
    println!("{}", net.bus_level_summary(&cfg.vn_kv_limits));

    net.compact(&cfg).unwrap();
    assert!(net.is_compact());
    println!("compacted:\n{}", net.summary());
}
