use std::collections::{BTreeSet, HashMap, HashSet};

use ordered_float::OrderedFloat;
use tracing::debug;

use super::naming::get_unique_duplicated_dict;
use crate::io::pandapower::file_io::*;

const COORD_PREFIX: &str = "coord_";

fn coord_number(id: &str) -> Option<u64> {
    id.strip_prefix(COORD_PREFIX)?.parse().ok()
}

/// Buses reachable in one hop over closed bus-bus switches and in-service transformers.
fn connected_buses(net: &Network, bus: i64) -> BTreeSet<i64> {
    let mut out = BTreeSet::new();
    for s in &net.switch {
        if s.et != SwitchType::SwitchTwoBuses || !s.closed {
            continue;
        }
        if s.bus == bus {
            out.insert(s.element);
        } else if s.element == bus {
            out.insert(s.bus);
        }
    }
    let open_trafos: HashSet<i64> = net
        .switch
        .iter()
        .filter(|s| s.et == SwitchType::SwitchBusTransformer && !s.closed)
        .map(|s| s.element)
        .collect();
    for t in &net.trafo {
        if !t.in_service || open_trafos.contains(&t.index) {
            continue;
        }
        if t.hv_bus == bus {
            out.insert(t.lv_bus);
        } else if t.lv_bus == bus {
            out.insert(t.hv_bus);
        }
    }
    out.remove(&bus);
    out
}

/// Moves buses next to a busbar onto the busbar's coordinate.
///
/// Busbars are visited in index order; a busbar already pulled onto another
/// busbar is skipped. Only one hop is followed.
pub fn merge_busbar_coordinates(net: &mut Network) {
    let busbars: BTreeSet<i64> = net
        .bus
        .iter()
        .filter(|b| b.type_ == BusType::Busbar)
        .map(|b| b.index)
        .collect();
    let mut all_connected = BTreeSet::new();
    let mut moved = 0usize;
    for bb in busbars {
        if all_connected.contains(&bb) {
            continue;
        }
        let Some((x, y)) = net
            .bus_geodata
            .iter()
            .find(|g| g.index == bb)
            .map(|g| (g.x, g.y))
        else {
            continue;
        };
        let connected = connected_buses(net, bb);
        for &bus in &connected {
            net.set_bus_geodata(bus, x, y);
            moved += 1;
        }
        all_connected.extend(connected);
    }
    debug!(moved, "merged busbar coordinates");
}

/// Groups identical bus coordinates under one `coord_<n>` id.
///
/// Geodata rows without any coordinate are dropped. A group keeps an id it
/// already had in the `coordinates` table; new groups are numbered above the
/// highest existing id. The `coordinates` table is rebuilt from the groups.
pub fn assign_coordinate_ids(net: &mut Network) {
    net.bus_geodata.retain(|g| !(g.x.is_nan() && g.y.is_nan()));

    let groups = get_unique_duplicated_dict(
        net.bus_geodata
            .iter()
            .map(|g| (g.index, (OrderedFloat(g.x), OrderedFloat(g.y)))),
    );
    let positions: HashMap<i64, (f64, f64)> =
        net.bus_geodata.iter().map(|g| (g.index, (g.x, g.y))).collect();
    let bus_pos: HashMap<i64, usize> = net
        .bus
        .iter()
        .enumerate()
        .map(|(i, b)| (b.index, i))
        .collect();
    let known: HashMap<&str, (f64, f64)> = net
        .coordinates
        .iter()
        .map(|c| (c.id.as_str(), (c.x, c.y)))
        .collect();
    let mut next = net
        .coordinates
        .iter()
        .filter_map(|c| coord_number(&c.id))
        .chain(
            net.bus
                .iter()
                .filter_map(|b| b.coord_id.as_deref().and_then(coord_number)),
        )
        .max()
        .map_or(0, |n| n + 1);

    let mut coordinates = Vec::with_capacity(groups.len());
    let mut assignment: Vec<(Vec<i64>, String)> = Vec::with_capacity(groups.len());
    for (rep, members) in groups {
        let Some(&(x, y)) = positions.get(&rep) else {
            continue;
        };
        let reused = members.iter().find_map(|m| {
            let id = net.bus.get(*bus_pos.get(m)?)?.coord_id.as_deref()?;
            (known.get(id) == Some(&(x, y))).then(|| id.to_string())
        });
        let id = reused.unwrap_or_else(|| {
            let id = format!("{COORD_PREFIX}{next}");
            next += 1;
            id
        });
        let rep_bus = bus_pos.get(&rep).and_then(|&i| net.bus.get(i));
        coordinates.push(Coordinate {
            id: id.clone(),
            x,
            y,
            subnet: rep_bus.and_then(|b| b.subnet.clone()),
            volt_lvl: rep_bus.and_then(|b| b.volt_lvl),
        });
        assignment.push((members, id));
    }

    for (members, id) in assignment {
        for m in members {
            if let Some(&i) = bus_pos.get(&m) {
                net.bus[i].coord_id = Some(id.clone());
            }
        }
    }
    debug!(coordinates = coordinates.len(), "assigned coordinate ids");
    net.coordinates = coordinates;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcases::multivoltage_case;

    #[test]
    fn test_assign_coordinate_ids() {
        let mut net = multivoltage_case();
        net.bus_geodata.push(BusGeodata {
            index: 99,
            ..Default::default()
        });
        assign_coordinate_ids(&mut net);
        assert!(net.bus_geodata.iter().all(|g| g.index != 99));

        let b0 = net.bus_by_index(0).unwrap().coord_id.clone();
        let b1 = net.bus_by_index(1).unwrap().coord_id.clone();
        assert!(b0.is_some());
        assert_eq!(b0, b1);
        let ids: BTreeSet<_> = net.coordinates.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids.len(), net.coordinates.len());
        assert_eq!(net.coordinates.len(), 6);
    }

    #[test]
    fn test_coordinate_ids_are_stable() {
        let mut net = multivoltage_case();
        assign_coordinate_ids(&mut net);
        let first = net.clone();
        assign_coordinate_ids(&mut net);
        assert_eq!(net, first);

        // a new position gets a number above the existing ones
        net.set_bus_geodata(7, 50.0, 50.0);
        assign_coordinate_ids(&mut net);
        let id = net.bus_by_index(7).unwrap().coord_id.clone().unwrap();
        assert_eq!(coord_number(&id), Some(first.coordinates.len() as u64));
    }

    #[test]
    fn test_merge_busbar_coordinates() {
        let mut net = multivoltage_case();
        merge_busbar_coordinates(&mut net);
        let geo = |net: &Network, bus: i64| {
            net.bus_geodata
                .iter()
                .find(|g| g.index == bus)
                .map(|g| (g.x, g.y))
        };
        // bus 0 reaches busbar 2 through trafo 0
        assert_eq!(geo(&net, 0), geo(&net, 2));
        // bus 3 is only connected by a line and keeps its position
        assert_ne!(geo(&net, 3), geo(&net, 2));
    }
}
