use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, error};

use super::error::{Result, TopologyError};
use super::naming::append_str_by_underline_count;
use crate::io::pandapower::file_io::*;
use crate::io::pandapower::table::*;

/// Where a bus-branch switch hits its branch.
#[derive(Debug, Clone, Copy)]
struct TerminalMatch {
    switch_pos: usize,
    element: ElementType,
    branch_pos: usize,
    terminal: Terminal,
    anchor: i64,
}

fn malformed_switch(switch: i64, reason: String) -> TopologyError {
    error!(switch, %reason, "malformed bus-branch switch");
    TopologyError::MalformedBranchSwitch { switch, reason }
}

fn match_terminal<B: BranchRow>(
    net: &Network,
    positions: &HashMap<i64, usize>,
    switch_pos: usize,
) -> Result<TerminalMatch> {
    let sw = &net.switch[switch_pos];
    let Some(&branch_pos) = positions.get(&sw.element) else {
        return Err(malformed_switch(
            sw.index,
            format!("{} {} does not exist", B::ELEMENT, sw.element),
        ));
    };
    let branch = &B::rows(net)[branch_pos];
    let Some(terminal) = B::TERMINALS
        .iter()
        .copied()
        .find(|&t| branch.terminal(t) == Some(sw.bus))
    else {
        return Err(malformed_switch(
            sw.index,
            format!("bus {} is no terminal of {} {}", sw.bus, B::ELEMENT, sw.element),
        ));
    };
    Ok(TerminalMatch {
        switch_pos,
        element: B::ELEMENT,
        branch_pos,
        terminal,
        anchor: sw.bus,
    })
}

fn positions<T: TableRow>(rows: &[T]) -> HashMap<i64, usize> {
    rows.iter().enumerate().map(|(i, r)| (r.index(), i)).collect()
}

fn set_terminal(net: &mut Network, element: ElementType, pos: usize, t: Terminal, bus: i64) {
    let slot = match element {
        ElementType::Line => net.line[pos].terminal_mut(t),
        ElementType::Trafo => net.trafo[pos].terminal_mut(t),
        ElementType::Trafo3w => net.trafo3w[pos].terminal_mut(t),
        _ => None,
    };
    if let Some(slot) = slot {
        *slot = bus;
    }
}

fn branch_index(net: &Network, element: ElementType, pos: usize) -> i64 {
    match element {
        ElementType::Line => net.line[pos].index,
        ElementType::Trafo => net.trafo[pos].index,
        ElementType::Trafo3w => net.trafo3w[pos].index,
        _ => -1,
    }
}

/// Puts every bus-branch switch onto its own auxiliary bus.
///
/// For each line/trafo/trafo3w switch, in switch index order, a new bus of
/// type `auxiliary` is created from the anchor bus. The branch terminal at the
/// anchor moves to the auxiliary bus and the switch becomes a bus-bus switch
/// between anchor and auxiliary bus.
///
/// Auxiliary bus names are resolved against all bus names and `reserved`;
/// the grown reservation set is returned. All switches are validated before
/// anything is rewritten.
pub fn replace_branch_switches(
    net: &mut Network,
    reserved: Option<HashSet<String>>,
) -> Result<HashSet<String>> {
    let mut order: Vec<usize> = (0..net.switch.len())
        .filter(|&i| net.switch[i].et.branch_element().is_some())
        .collect();
    order.sort_by_key(|&i| net.switch[i].index);

    let line_pos = positions(&net.line);
    let trafo_pos = positions(&net.trafo);
    let trafo3w_pos = positions(&net.trafo3w);
    let bus_pos = positions(&net.bus);

    let mut matches = Vec::with_capacity(order.len());
    let mut taken: HashMap<(ElementType, usize, Terminal), i64> = HashMap::new();
    for pos in order {
        let m = match net.switch[pos].et.branch_element() {
            Some(ElementType::Line) => match_terminal::<Line>(net, &line_pos, pos)?,
            Some(ElementType::Trafo) => match_terminal::<Transformer>(net, &trafo_pos, pos)?,
            _ => match_terminal::<Transformer3W>(net, &trafo3w_pos, pos)?,
        };
        if !bus_pos.contains_key(&m.anchor) {
            return Err(malformed_switch(
                net.switch[pos].index,
                format!("anchor bus {} does not exist", m.anchor),
            ));
        }
        if let Some(other) = taken.insert((m.element, m.branch_pos, m.terminal), net.switch[pos].index)
        {
            return Err(malformed_switch(
                net.switch[pos].index,
                format!("{} of {} is already switched by switch {other}", m.terminal, m.element),
            ));
        }
        matches.push(m);
    }

    let mut reserved = reserved.unwrap_or_default();
    reserved.extend(net.bus.iter().filter_map(|b| b.name.clone()));
    let candidates: Vec<String> = matches
        .iter()
        .map(|m| {
            net.bus[bus_pos[&m.anchor]]
                .name
                .clone()
                .unwrap_or_else(|| format!("bus {}", m.anchor))
        })
        .collect();
    let (names, reserved) = append_str_by_underline_count(candidates, Some(reserved));

    let geodata: HashMap<i64, (f64, f64)> = net
        .bus_geodata
        .iter()
        .map(|g| (g.index, (g.x, g.y)))
        .collect();
    let mut next_bus = next_index(&net.bus);
    for (m, name) in matches.iter().zip(names) {
        let anchor = &net.bus[bus_pos[&m.anchor]];
        let sw = &net.switch[m.switch_pos];
        let zone = sw.subnet.clone().or_else(|| anchor.zone.clone());
        let aux = Bus {
            index: next_bus,
            name: Some(name),
            vn_kv: anchor.vn_kv,
            type_: BusType::Auxiliary,
            zone: zone.clone(),
            in_service: anchor.in_service,
            max_vm_pu: anchor.max_vm_pu,
            min_vm_pu: anchor.min_vm_pu,
            substation: anchor.substation.clone(),
            subnet: zone.or_else(|| anchor.subnet.clone()),
            volt_lvl: anchor.volt_lvl,
            coord_id: anchor.coord_id.clone(),
        };
        if let Some(&(x, y)) = geodata.get(&m.anchor) {
            net.bus_geodata.push(BusGeodata { index: next_bus, x, y });
        }
        net.bus.push(aux);

        set_terminal(net, m.element, m.branch_pos, m.terminal, next_bus);
        let sw = &mut net.switch[m.switch_pos];
        sw.element = next_bus;
        sw.et = SwitchType::SwitchTwoBuses;
        next_bus += 1;
    }

    debug!(auxiliary = matches.len(), "replaced branch switches");
    Ok(reserved)
}

/// Removes auxiliary buses and reconnects their switches to the branches.
///
/// Every auxiliary bus needs exactly one bus-bus switch touching it and
/// exactly one branch terminal pointing at it. The switch becomes a
/// bus-branch switch at the real bus, the auxiliary bus is dropped together
/// with its geodata and result rows.
pub fn create_branch_switches(net: &mut Network) -> Result<()> {
    let aux: BTreeMap<i64, usize> = net
        .bus
        .iter()
        .enumerate()
        .filter(|(_, b)| b.type_ == BusType::Auxiliary)
        .map(|(i, b)| (b.index, i))
        .collect();
    if aux.is_empty() {
        return Ok(());
    }

    // aux bus -> (switch position, real bus)
    let mut switches: HashMap<i64, Vec<(usize, i64)>> = HashMap::new();
    for (pos, s) in net.switch.iter().enumerate() {
        if s.et != SwitchType::SwitchTwoBuses {
            continue;
        }
        if aux.contains_key(&s.element) {
            switches.entry(s.element).or_default().push((pos, s.bus));
        } else if aux.contains_key(&s.bus) {
            switches.entry(s.bus).or_default().push((pos, s.element));
        }
    }

    let mut terminals: HashMap<i64, Vec<(ElementType, usize, Terminal)>> = HashMap::new();
    collect_terminals::<Line>(net, &aux, &mut terminals);
    collect_terminals::<Transformer>(net, &aux, &mut terminals);
    collect_terminals::<Transformer3W>(net, &aux, &mut terminals);

    let mut plan = Vec::with_capacity(aux.len());
    for &bus in aux.keys() {
        let sw = switches.get(&bus).map_or(&[][..], Vec::as_slice);
        let tm = terminals.get(&bus).map_or(&[][..], Vec::as_slice);
        match (sw, tm) {
            ([s], [t]) => plan.push((bus, *s, *t)),
            _ => {
                error!(
                    bus,
                    switches = sw.len(),
                    terminals = tm.len(),
                    "malformed auxiliary bus"
                );
                return Err(TopologyError::MalformedAuxiliaryNode {
                    bus,
                    switches: sw.len(),
                    terminals: tm.len(),
                });
            }
        }
    }

    for &(_, (switch_pos, real), (element, branch_pos, terminal)) in &plan {
        set_terminal(net, element, branch_pos, terminal, real);
        let branch = branch_index(net, element, branch_pos);
        let sw = &mut net.switch[switch_pos];
        sw.bus = real;
        sw.element = branch;
        sw.et = SwitchType::from_branch(element);
    }

    net.bus.retain(|b| !aux.contains_key(&b.index));
    net.bus_geodata.retain(|g| !aux.contains_key(&g.index));
    net.res_bus.retain(|r| !aux.contains_key(&r.index));

    debug!(auxiliary = plan.len(), "created branch switches");
    Ok(())
}

fn collect_terminals<B: BranchRow>(
    net: &Network,
    aux: &BTreeMap<i64, usize>,
    out: &mut HashMap<i64, Vec<(ElementType, usize, Terminal)>>,
) {
    for (pos, row) in B::rows(net).iter().enumerate() {
        for &t in B::TERMINALS {
            if let Some(bus) = row.terminal(t).filter(|b| aux.contains_key(b)) {
                out.entry(bus).or_default().push((B::ELEMENT, pos, t));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcases::multivoltage_case;

    #[test]
    fn test_replace_branch_switches() {
        let mut net = multivoltage_case();
        let buses = net.bus.len();
        let branch_switches = net
            .switch
            .iter()
            .filter(|s| s.et.branch_element().is_some())
            .count();
        let reserved = replace_branch_switches(&mut net, None).unwrap();

        assert_eq!(net.bus.len(), buses + branch_switches);
        assert!(net.switch.iter().all(|s| s.et == SwitchType::SwitchTwoBuses));
        for aux in net.bus.iter().filter(|b| b.type_ == BusType::Auxiliary) {
            assert!(reserved.contains(aux.name.as_ref().unwrap()));
            let sw: Vec<_> = net.switch.iter().filter(|s| s.element == aux.index).collect();
            assert_eq!(sw.len(), 1);
            let anchor = net.bus_by_index(sw[0].bus).unwrap();
            assert_eq!(anchor.vn_kv, aux.vn_kv);
            assert_ne!(anchor.name, aux.name);
        }
        // line 0 ran 2 -> 3 with a switch at bus 3
        let line = &net.line[0];
        assert_eq!(line.from_bus, 2);
        assert_eq!(net.bus_by_index(line.to_bus).unwrap().type_, BusType::Auxiliary);
    }

    #[test]
    fn test_aux_name_collisions() {
        let mut net = multivoltage_case();
        let reserved: HashSet<String> = ["Bus 3_1".to_string()].into();
        let reserved = replace_branch_switches(&mut net, Some(reserved)).unwrap();
        let aux: Vec<_> = net
            .bus
            .iter()
            .filter(|b| b.type_ == BusType::Auxiliary)
            .filter_map(|b| b.name.clone())
            .collect();
        assert_eq!(aux, vec!["Bus 3_2", "Bus 3_3"]);
        assert!(reserved.contains("Bus 3_1") && reserved.contains("Bus 0"));
    }

    #[test]
    fn test_expand_contract_roundtrip() {
        let orig = multivoltage_case();
        let mut net = orig.clone();
        net.res_bus.push(BusResult {
            index: 100,
            ..Default::default()
        });
        let mut orig_with_res = orig.clone();
        orig_with_res.res_bus = net.res_bus.clone();

        replace_branch_switches(&mut net, None).unwrap();
        let aux: Vec<i64> = net
            .bus
            .iter()
            .filter(|b| b.type_ == BusType::Auxiliary)
            .map(|b| b.index)
            .collect();
        for &a in &aux {
            net.res_bus.push(BusResult {
                index: a,
                ..Default::default()
            });
        }
        create_branch_switches(&mut net).unwrap();
        assert_eq!(net, orig_with_res);
    }

    #[test]
    fn test_malformed_branch_switch() {
        let mut net = multivoltage_case();
        // bus 7 is no terminal of line 1
        net.create_switch(7, 1, SwitchType::SwitchBusLine, true, "bad");
        let before = net.clone();
        let err = replace_branch_switches(&mut net, None);
        assert!(matches!(err, Err(TopologyError::MalformedBranchSwitch { .. })));
        assert_eq!(net, before);

        let mut net = multivoltage_case();
        net.create_switch(3, 0, SwitchType::SwitchBusLine, false, "twice");
        assert!(matches!(
            replace_branch_switches(&mut net, None),
            Err(TopologyError::MalformedBranchSwitch { .. })
        ));

        let mut net = multivoltage_case();
        net.create_switch(3, 42, SwitchType::SwitchBusLine, false, "missing");
        assert!(matches!(
            replace_branch_switches(&mut net, None),
            Err(TopologyError::MalformedBranchSwitch { .. })
        ));
    }

    #[test]
    fn test_malformed_auxiliary_node() {
        let mut net = multivoltage_case();
        replace_branch_switches(&mut net, None).unwrap();
        let aux = net
            .bus
            .iter()
            .find(|b| b.type_ == BusType::Auxiliary)
            .map(|b| b.index)
            .unwrap();
        // a second switch at the same auxiliary bus
        net.create_switch(aux, 0, SwitchType::SwitchTwoBuses, true, "extra");
        let before = net.clone();
        let err = create_branch_switches(&mut net);
        assert!(matches!(
            err,
            Err(TopologyError::MalformedAuxiliaryNode { switches: 2, terminals: 1, .. })
        ));
        assert_eq!(net, before);
    }

    #[test]
    fn test_switch_subnet_becomes_aux_zone() {
        let mut net = multivoltage_case();
        let pos = net
            .switch
            .iter()
            .position(|s| s.et == SwitchType::SwitchBusLine)
            .unwrap();
        net.switch[pos].subnet = Some("feeder".into());
        replace_branch_switches(&mut net, None).unwrap();
        let aux = net.bus_by_index(net.switch[pos].element).unwrap();
        assert_eq!(aux.zone.as_deref(), Some("feeder"));
        assert_eq!(aux.subnet.as_deref(), Some("feeder"));
    }
}
