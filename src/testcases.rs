//! Small networks used by the unit tests and for experimenting with the
//! conversion steps.

use crate::io::pandapower::file_io::*;
use crate::io::pandapower::table::ElementType;

struct TrafoType {
    sn_mva: f64,
    vn_hv_kv: f64,
    vn_lv_kv: f64,
    vk_percent: f64,
    vkr_percent: f64,
    pfe_kw: f64,
    i0_percent: f64,
    shift_degree: f64,
}

struct LineType {
    r_ohm_per_km: f64,
    x_ohm_per_km: f64,
    c_nf_per_km: f64,
    max_i_ka: f64,
}

fn trafo_type(std_type: &str) -> TrafoType {
    match std_type {
        "160 MVA 380/110 kV" => TrafoType {
            sn_mva: 160.0,
            vn_hv_kv: 380.0,
            vn_lv_kv: 110.0,
            vk_percent: 12.2,
            vkr_percent: 0.25,
            pfe_kw: 60.0,
            i0_percent: 0.06,
            shift_degree: 0.0,
        },
        "25 MVA 110/20 kV" => TrafoType {
            sn_mva: 25.0,
            vn_hv_kv: 110.0,
            vn_lv_kv: 20.0,
            vk_percent: 12.0,
            vkr_percent: 0.41,
            pfe_kw: 14.0,
            i0_percent: 0.07,
            shift_degree: 150.0,
        },
        "0.63 MVA 110/0.4 kV" => TrafoType {
            sn_mva: 0.63,
            vn_hv_kv: 110.0,
            vn_lv_kv: 0.4,
            vk_percent: 6.0,
            vkr_percent: 1.0,
            pfe_kw: 1.1,
            i0_percent: 0.3,
            shift_degree: 150.0,
        },
        // "40 MVA 110/20 kV"
        _ => TrafoType {
            sn_mva: 40.0,
            vn_hv_kv: 110.0,
            vn_lv_kv: 20.0,
            vk_percent: 16.2,
            vkr_percent: 0.34,
            pfe_kw: 18.0,
            i0_percent: 0.05,
            shift_degree: 150.0,
        },
    }
}

fn line_type(std_type: &str) -> LineType {
    match std_type {
        "149-AL1/24-ST1A 110.0" => LineType {
            r_ohm_per_km: 0.194,
            x_ohm_per_km: 0.41,
            c_nf_per_km: 8.75,
            max_i_ka: 0.47,
        },
        "48-AL1/8-ST1A 20.0" => LineType {
            r_ohm_per_km: 0.5939,
            x_ohm_per_km: 0.372,
            c_nf_per_km: 9.5,
            max_i_ka: 0.21,
        },
        // "94-AL1/15-ST1A 20.0"
        _ => LineType {
            r_ohm_per_km: 0.306,
            x_ohm_per_km: 0.335,
            c_nf_per_km: 10.0,
            max_i_ka: 0.35,
        },
    }
}

fn std_trafo(hv_bus: i64, lv_bus: i64, std_type: &str, name: &str) -> Transformer {
    let t = trafo_type(std_type);
    Transformer {
        name: Some(name.to_string()),
        std_type: Some(std_type.to_string()),
        hv_bus,
        lv_bus,
        sn_mva: t.sn_mva,
        vn_hv_kv: t.vn_hv_kv,
        vn_lv_kv: t.vn_lv_kv,
        vk_percent: t.vk_percent,
        vkr_percent: t.vkr_percent,
        pfe_kw: t.pfe_kw,
        i0_percent: t.i0_percent,
        shift_degree: t.shift_degree,
        tap_side: Some("hv".to_string()),
        tap_neutral: Some(0.0),
        tap_min: Some(-9.0),
        tap_max: Some(9.0),
        tap_pos: Some(0.0),
        tap_step_percent: Some(1.5),
        ..Default::default()
    }
}

fn std_line(from_bus: i64, to_bus: i64, length_km: f64, std_type: &str, name: &str) -> Line {
    let l = line_type(std_type);
    Line {
        name: Some(name.to_string()),
        std_type: Some(std_type.to_string()),
        from_bus,
        to_bus,
        length_km,
        r_ohm_per_km: l.r_ohm_per_km,
        x_ohm_per_km: l.x_ohm_per_km,
        c_nf_per_km: l.c_nf_per_km,
        max_i_ka: l.max_i_ka,
        type_: Some("ol".to_string()),
        ..Default::default()
    }
}

fn plain_bus(net: &mut Network, vn_kv: f64) -> i64 {
    net.add_bus(Bus {
        vn_kv,
        ..Default::default()
    })
}

/// 380/110/20/0.4 kV network with zones, a substation, geodata and
/// measurements.
///
/// ```text
/// bus 0 (380) -b- bus 1 (380)
/// bus 0 =trafo 0= bus 2 (110, busbar) -line 0- [l] bus 3 (110)
/// bus 3 [t] =trafo 1= bus 4 (20) -line 1- bus 5 -line 2- bus 6
/// bus 3 =trafo 2= bus 7 (0.4)
/// ```
///
/// Buses 0..=3 lie in zone `north`, 4..=7 in `south`; buses 2 and 3 belong
/// to substation `S1`.
pub fn multivoltage_case() -> Network {
    let mut net = Network::default();
    for (vn_kv, zone) in [
        (380.0, "north"),
        (380.0, "north"),
        (110.0, "north"),
        (110.0, "north"),
        (20.0, "south"),
        (20.0, "south"),
        (20.0, "south"),
        (0.4, "south"),
    ] {
        let i = net.bus.len();
        net.add_bus(Bus {
            name: Some(format!("Bus {i}")),
            vn_kv,
            zone: Some(zone.to_string()),
            ..Default::default()
        });
    }
    net.bus[2].type_ = BusType::Busbar;
    for b in [2, 3] {
        net.bus[b].substation = Some("S1".to_string());
    }

    net.add_ext_grid(ExtGrid {
        name: Some("grid".to_string()),
        bus: 0,
        ..Default::default()
    });
    net.add_load(Load {
        name: Some("mv load".to_string()),
        bus: 6,
        p_mw: 2.0,
        q_mvar: 0.5,
        ..Default::default()
    });
    net.add_load(Load {
        name: Some("lv load".to_string()),
        bus: 7,
        p_mw: 0.1,
        q_mvar: 0.02,
        ..Default::default()
    });
    net.add_sgen(SGen {
        name: Some("pv".to_string()),
        bus: 5,
        p_mw: 1.0,
        ..Default::default()
    });

    net.add_line(std_line(2, 3, 12.0, "149-AL1/24-ST1A 110.0", "HV line"));
    net.add_line(std_line(4, 5, 1.5, "94-AL1/15-ST1A 20.0", "MV line 1"));
    net.add_line(std_line(5, 6, 2.0, "94-AL1/15-ST1A 20.0", "MV line 2"));

    net.add_trafo(std_trafo(0, 2, "160 MVA 380/110 kV", "EHV-HV"));
    net.add_trafo(std_trafo(3, 4, "40 MVA 110/20 kV", "HV-MV"));
    net.add_trafo(std_trafo(3, 7, "0.63 MVA 110/0.4 kV", "HV-LV"));

    net.create_switch(0, 1, SwitchType::SwitchTwoBuses, true, "coupler");
    net.create_switch(3, 0, SwitchType::SwitchBusLine, true, "line switch");
    net.create_switch(3, 1, SwitchType::SwitchBusTransformer, true, "trafo switch");

    net.add_measurement(Measurement {
        name: Some("v busbar".to_string()),
        measurement_type: "v".to_string(),
        element_type: ElementType::Bus,
        element: 2,
        value: 1.01,
        std_dev: 0.01,
        ..Default::default()
    });
    net.add_measurement(Measurement {
        name: Some("i trafo".to_string()),
        measurement_type: "i".to_string(),
        element_type: ElementType::Trafo,
        element: 1,
        side: Some("hv".to_string()),
        value: 0.1,
        std_dev: 0.005,
        ..Default::default()
    });
    net.add_measurement(Measurement {
        name: Some("p feeder".to_string()),
        measurement_type: "p".to_string(),
        element_type: ElementType::Line,
        element: 1,
        side: Some("from".to_string()),
        value: 1.0,
        std_dev: 0.05,
        ..Default::default()
    });

    for (bus, x, y) in [
        (0, 0.0, 0.0),
        (1, 0.0, 0.0),
        (2, 1.0, 1.0),
        (3, 1.0, 2.0),
        (4, 2.0, 2.0),
        (5, 3.0, 3.0),
        (6, 3.0, 3.0),
        (7, 4.0, 4.0),
    ] {
        net.set_bus_geodata(bus, x, y);
    }
    net
}

/// One 110 kV bus feeding two 20 kV buses through eight transformers and
/// nine lines, with every way two branches can fail to be parallel: another
/// loading limit, an open or missing switch, another standard type or an
/// extra switch on the other terminal.
pub fn parallel_branch_case() -> Network {
    let mut net = Network::default();
    plain_bus(&mut net, 110.0);
    plain_bus(&mut net, 20.0);
    plain_bus(&mut net, 20.0);

    let t = SwitchType::SwitchBusTransformer;
    let trafos: [(&str, &str, Option<f64>, i32); 8] = [
        ("40 MVA 110/20 kV", "Trafo 1", None, 1),
        ("40 MVA 110/20 kV", "Trafo 2", None, 1),
        ("40 MVA 110/20 kV", "Trafo 1", Some(50.0), 1),
        ("40 MVA 110/20 kV", "Trafo 1", None, 1),
        ("40 MVA 110/20 kV", "Trafo 1", None, 1),
        ("25 MVA 110/20 kV", "Trafo 3", None, 1),
        ("40 MVA 110/20 kV", "Trafo 4", None, 1),
        // only name and parallel differ
        ("40 MVA 110/20 kV", "Trafo 5", None, 2),
    ];
    for (std_type, name, max_loading_percent, parallel) in trafos {
        net.add_trafo(Transformer {
            max_loading_percent,
            parallel,
            ..std_trafo(0, 1, std_type, name)
        });
    }
    net.create_switch(1, 0, t, true, "Tr-Switch 1");
    net.create_switch(1, 1, t, true, "Tr-Switch 2");
    net.create_switch(1, 2, t, true, "Tr-Switch 1");
    net.create_switch(1, 3, t, false, "Tr-Switch 1");
    net.create_switch(1, 5, t, true, "Tr-Switch 3");
    net.create_switch(1, 6, t, true, "Tr-Switch 4a");
    net.create_switch(0, 6, t, true, "Tr-Switch 4b");
    net.create_switch(1, 7, t, true, "Tr-Switch 5");

    let l = SwitchType::SwitchBusLine;
    let lines: [(i64, i64, &str, &str, Option<f64>, i32); 9] = [
        (1, 2, "94-AL1/15-ST1A 20.0", "Line 1", None, 1),
        (1, 2, "94-AL1/15-ST1A 20.0", "Line 2", None, 1),
        (1, 2, "94-AL1/15-ST1A 20.0", "Line 1", Some(50.0), 1),
        (1, 2, "94-AL1/15-ST1A 20.0", "Line 1", None, 1),
        (1, 2, "94-AL1/15-ST1A 20.0", "Line 1", None, 1),
        (1, 2, "48-AL1/8-ST1A 20.0", "Line 3", None, 1),
        (1, 2, "94-AL1/15-ST1A 20.0", "Line 4", None, 1),
        (1, 2, "94-AL1/15-ST1A 20.0", "Line 5", None, 2),
        // reversed direction
        (2, 1, "94-AL1/15-ST1A 20.0", "Line 6", None, 1),
    ];
    for (from_bus, to_bus, std_type, name, max_loading_percent, parallel) in lines {
        net.add_line(Line {
            max_loading_percent,
            parallel,
            ..std_line(from_bus, to_bus, 1.11, std_type, name)
        });
    }
    net.create_switch(2, 0, l, true, "L-Switch 1");
    net.create_switch(2, 1, l, true, "L-Switch 2");
    net.create_switch(2, 2, l, true, "L-Switch 1");
    net.create_switch(2, 3, l, false, "L-Switch 1");
    net.create_switch(2, 5, l, true, "L-Switch 3");
    net.create_switch(2, 6, l, true, "L-Switch 4a");
    net.create_switch(1, 6, l, true, "L-Switch 4b");
    net.create_switch(2, 7, l, true, "L-Switch 5");
    net.create_switch(2, 8, l, true, "L-Switch 6");
    net
}

/// A 110/20 kV feeder whose transformer and lines carry `parallel > 1`.
///
/// ```text
/// bus 0 =sd (3x)= [t] bus 1 -sdh (2x)- [l] bus 2 -swed- bus 3 [l] -sdhj (3x)- [l, open] bus 4
/// ```
pub fn split_merge_case() -> Network {
    let mut net = Network::default();
    plain_bus(&mut net, 110.0);
    for _ in 0..4 {
        plain_bus(&mut net, 20.0);
    }
    net.add_ext_grid(ExtGrid {
        bus: 0,
        ..Default::default()
    });
    net.add_load(Load {
        bus: 4,
        p_mw: 1e3,
        q_mvar: 4e2,
        ..Default::default()
    });

    net.add_trafo(Transformer {
        parallel: 3,
        ..std_trafo(0, 1, "40 MVA 110/20 kV", "sd")
    });
    net.create_switch(1, 0, SwitchType::SwitchBusTransformer, true, "dfjk");

    let std_type = "94-AL1/15-ST1A 20.0";
    net.add_line(Line {
        parallel: 2,
        ..std_line(1, 2, 1.11, std_type, "sdh")
    });
    net.create_switch(2, 0, SwitchType::SwitchBusLine, true, "dfsdf");
    net.add_line(std_line(2, 3, 1.11, std_type, "swed"));
    net.add_line(Line {
        parallel: 3,
        ..std_line(3, 4, 1.11, std_type, "sdhj")
    });
    net.create_switch(3, 2, SwitchType::SwitchBusLine, true, "dfdfg");
    net.create_switch(4, 2, SwitchType::SwitchBusLine, false, "dfhgj");
    net
}
