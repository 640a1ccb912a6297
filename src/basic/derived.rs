use std::collections::HashMap;

use tracing::warn;

use super::volt_lvl::{get_voltlvl, trafo_voltlvl};
use crate::io::pandapower::file_io::*;
use crate::io::pandapower::table::*;

type Source<V> = HashMap<i64, Option<V>>;

/// Fills `slot` of every row where it is missing with `source[key(row)]`.
fn fill_missing<T: TableRow, V: Clone>(
    rows: &mut [T],
    element: ElementType,
    column: &'static str,
    source: &Source<V>,
    key: impl Fn(&T) -> i64,
    slot: impl Fn(&mut T) -> &mut Option<V>,
) {
    for row in rows.iter_mut() {
        let k = key(row);
        let index = row.index();
        let value = slot(row);
        if value.is_some() {
            continue;
        }
        match source.get(&k) {
            Some(v) => *value = v.clone(),
            None => warn!(%element, index, reference = k, column, "cannot derive value, reference does not exist"),
        }
    }
}

fn source_of<T: TableRow, V: Clone>(rows: &[T], value: impl Fn(&T) -> Option<V>) -> Source<V> {
    rows.iter().map(|r| (r.index(), value(r))).collect()
}

/// Picks the table a switch or measurement points to.
fn pick<'a, V>(
    element: ElementType,
    bus: &'a Source<V>,
    line: &'a Source<V>,
    trafo: &'a Source<V>,
    trafo3w: &'a Source<V>,
) -> Option<&'a Source<V>> {
    match element {
        ElementType::Bus => Some(bus),
        ElementType::Line => Some(line),
        ElementType::Trafo => Some(trafo),
        ElementType::Trafo3w => Some(trafo3w),
        _ => None,
    }
}

/// Fills missing `subnet` values.
///
/// Buses take their zone; single-bus elements their bus; lines the from bus;
/// transformers the lv bus; bus-bus switches the anchor bus; bus-branch
/// switches the branch; measurements the measured element.
pub fn provide_subnet_col(net: &mut Network) {
    for b in net.bus.iter_mut() {
        if b.subnet.is_none() {
            b.subnet = b.zone.clone();
        }
    }
    let bus = source_of(&net.bus, |b| b.subnet.clone());

    macro_rules! from_bus {
        ($($field:ident => $element:expr),* $(,)?) => {
            $(
                fill_missing(&mut net.$field, $element, "subnet", &bus, |e| e.bus, ElementRow::subnet_mut);
            )*
        };
    }
    from_bus!(
        load => ElementType::Load,
        sgen => ElementType::Sgen,
        r#gen => ElementType::Gen,
        ext_grid => ElementType::ExtGrid,
        shunt => ElementType::Shunt,
    );
    fill_missing(&mut net.line, ElementType::Line, "subnet", &bus, |l| l.from_bus, ElementRow::subnet_mut);
    fill_missing(&mut net.trafo, ElementType::Trafo, "subnet", &bus, |t| t.lv_bus, ElementRow::subnet_mut);
    fill_missing(&mut net.trafo3w, ElementType::Trafo3w, "subnet", &bus, |t| t.lv_bus, ElementRow::subnet_mut);

    let line = source_of(&net.line, |r| r.subnet.clone());
    let trafo = source_of(&net.trafo, |r| r.subnet.clone());
    let trafo3w = source_of(&net.trafo3w, |r| r.subnet.clone());

    for s in net.switch.iter_mut().filter(|s| s.subnet.is_none()) {
        let (source, key) = match s.et.branch_element() {
            Some(e) => (pick(e, &bus, &line, &trafo, &trafo3w), s.element),
            None => (Some(&bus), s.bus),
        };
        match source.and_then(|src| src.get(&key)) {
            Some(v) => s.subnet = v.clone(),
            None => warn!(switch = s.index, reference = key, "cannot derive subnet of switch"),
        }
    }
    for m in net.measurement.iter_mut().filter(|m| m.subnet.is_none()) {
        match pick(m.element_type, &bus, &line, &trafo, &trafo3w).and_then(|src| src.get(&m.element)) {
            Some(v) => m.subnet = v.clone(),
            None => warn!(measurement = m.index, element = m.element, "cannot derive subnet of measurement"),
        }
    }
}

/// Fills missing `volt_lvl` values.
///
/// Buses are classified by `vn_kv`; transformers take the truncated mean of
/// their hv and lv bus levels; lines use the to bus; everything else the
/// bus it is attached to or the element it measures.
pub fn provide_voltlvl_col(net: &mut Network, limits: &[f64]) {
    for b in net.bus.iter_mut() {
        if b.volt_lvl.is_none() {
            b.volt_lvl = Some(get_voltlvl(b.vn_kv, limits));
        }
    }
    let bus = source_of(&net.bus, |b| b.volt_lvl);

    macro_rules! from_bus {
        ($($field:ident => $element:expr),* $(,)?) => {
            $(
                fill_missing(&mut net.$field, $element, "volt_lvl", &bus, |e| e.bus, ElementRow::volt_lvl_mut);
            )*
        };
    }
    from_bus!(
        load => ElementType::Load,
        sgen => ElementType::Sgen,
        r#gen => ElementType::Gen,
        ext_grid => ElementType::ExtGrid,
        shunt => ElementType::Shunt,
        switch => ElementType::Switch,
    );
    fill_missing(&mut net.line, ElementType::Line, "volt_lvl", &bus, |l| l.to_bus, ElementRow::volt_lvl_mut);

    let level = |b: i64| bus.get(&b).copied().flatten();
    for t in net.trafo.iter_mut().filter(|t| t.volt_lvl.is_none()) {
        match (level(t.hv_bus), level(t.lv_bus)) {
            (Some(hv), Some(lv)) => t.volt_lvl = Some(trafo_voltlvl(hv, lv)),
            _ => warn!(trafo = t.index, "cannot derive voltage level of trafo"),
        }
    }
    for t in net.trafo3w.iter_mut().filter(|t| t.volt_lvl.is_none()) {
        match (level(t.hv_bus), level(t.lv_bus)) {
            (Some(hv), Some(lv)) => t.volt_lvl = Some(trafo_voltlvl(hv, lv)),
            _ => warn!(trafo3w = t.index, "cannot derive voltage level of trafo3w"),
        }
    }

    let line = source_of(&net.line, |r| r.volt_lvl);
    let trafo = source_of(&net.trafo, |r| r.volt_lvl);
    let trafo3w = source_of(&net.trafo3w, |r| r.volt_lvl);
    for m in net.measurement.iter_mut().filter(|m| m.volt_lvl.is_none()) {
        match pick(m.element_type, &bus, &line, &trafo, &trafo3w).and_then(|src| src.get(&m.element)) {
            Some(v) => m.volt_lvl = *v,
            None => warn!(measurement = m.index, element = m.element, "cannot derive voltage level of measurement"),
        }
    }
}

/// Fills missing `substation` values of switches, transformers and measurements.
pub fn provide_substation_cols(net: &mut Network) {
    if net.bus.iter().all(|b| b.substation.is_none()) {
        return;
    }
    let bus = source_of(&net.bus, |b| b.substation.clone());
    fill_missing(&mut net.switch, ElementType::Switch, "substation", &bus, |s| s.bus, |s| &mut s.substation);
    fill_missing(&mut net.trafo, ElementType::Trafo, "substation", &bus, |t| t.lv_bus, |t| &mut t.substation);
    fill_missing(&mut net.trafo3w, ElementType::Trafo3w, "substation", &bus, |t| t.lv_bus, |t| &mut t.substation);

    let trafo = source_of(&net.trafo, |t| t.substation.clone());
    let trafo3w = source_of(&net.trafo3w, |t| t.substation.clone());
    for m in net.measurement.iter_mut().filter(|m| m.substation.is_none()) {
        let source = match m.element_type {
            ElementType::Bus => &bus,
            ElementType::Trafo => &trafo,
            ElementType::Trafo3w => &trafo3w,
            _ => continue,
        };
        if let Some(v) = source.get(&m.element) {
            m.substation = v.clone();
        }
    }
}

/// Refreshes every derived column: subnet, voltage level and substation.
pub fn provide_derived_cols(net: &mut Network, limits: &[f64]) {
    provide_subnet_col(net);
    provide_voltlvl_col(net, limits);
    provide_substation_cols(net);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::volt_lvl::DEFAULT_VN_KV_LIMITS;
    use crate::testcases::multivoltage_case;

    #[test]
    fn test_provide_derived_cols() {
        let mut net = multivoltage_case();
        provide_derived_cols(&mut net, &DEFAULT_VN_KV_LIMITS);

        assert_eq!(net.bus[0].subnet.as_deref(), Some("north"));
        assert_eq!(net.bus[7].volt_lvl, Some(7));
        // trafo 0: 380 kV (1) / 110 kV (3)
        assert_eq!(net.trafo[0].volt_lvl, Some(2));
        // trafo 2: 110 kV (3) / 0.4 kV (7)
        assert_eq!(net.trafo[2].volt_lvl, Some(5));
        assert_eq!(net.trafo[1].subnet.as_deref(), Some("south"));
        assert_eq!(net.line[1].volt_lvl, Some(5));
        assert_eq!(net.load[1].subnet.as_deref(), Some("south"));

        // the trafo switch sits in the north but takes the trafo's subnet
        let sw = net
            .switch
            .iter()
            .find(|s| s.et == SwitchType::SwitchBusTransformer)
            .unwrap();
        assert_eq!(sw.subnet.as_deref(), Some("south"));
        assert_eq!(sw.volt_lvl, Some(3));

        let m = &net.measurement[1];
        assert_eq!(m.element_type, ElementType::Trafo);
        assert_eq!(m.volt_lvl, net.trafo[1].volt_lvl);
        assert_eq!(net.trafo[1].substation.as_deref(), None);
        assert_eq!(net.switch[1].substation.as_deref(), Some("S1"));
    }

    #[test]
    fn test_propagation_is_idempotent() {
        let mut net = multivoltage_case();
        provide_derived_cols(&mut net, &DEFAULT_VN_KV_LIMITS);
        let once = net.clone();
        provide_derived_cols(&mut net, &DEFAULT_VN_KV_LIMITS);
        assert_eq!(net, once);
    }

    #[test]
    fn test_existing_values_are_kept() {
        let mut net = multivoltage_case();
        net.line[0].subnet = Some("manual".into());
        net.bus[3].volt_lvl = Some(1);
        provide_derived_cols(&mut net, &DEFAULT_VN_KV_LIMITS);
        assert_eq!(net.line[0].subnet.as_deref(), Some("manual"));
        assert_eq!(net.bus[3].volt_lvl, Some(1));
    }

    #[test]
    fn test_dangling_bus_is_skipped() {
        let mut net = multivoltage_case();
        net.add_load(Load {
            bus: 999,
            ..Default::default()
        });
        provide_derived_cols(&mut net, &DEFAULT_VN_KV_LIMITS);
        let load = net.load.last().unwrap();
        assert_eq!(load.subnet, None);
        assert_eq!(load.volt_lvl, None);
    }
}
