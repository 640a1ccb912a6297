use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, error};

use super::error::{Result, TopologyError};
use crate::io::pandapower::file_io::*;
use crate::io::pandapower::table::*;

/// Cached columns filled by propagation; they never tell twins apart.
const DERIVED_COLUMNS: [&str; 3] = ["subnet", "volt_lvl", "substation"];

/// Splits (`multiple_entries`) or merges parallel branches of the given element types.
///
/// Only lines and transformers carry a `parallel` column; anything else is
/// rejected before the network is touched.
pub fn convert_parallel_branches(
    net: &mut Network,
    multiple_entries: bool,
    elements: &[ElementType],
    excluded: &BTreeSet<String>,
) -> Result<()> {
    if let Some(e) = elements
        .iter()
        .find(|e| !matches!(e, ElementType::Line | ElementType::Trafo))
    {
        return Err(TopologyError::UnsupportedElementType(e.as_str().to_string()));
    }
    for element in elements {
        match (element, multiple_entries) {
            (ElementType::Line, true) => split_parallel_branches::<Line>(net),
            (ElementType::Trafo, true) => split_parallel_branches::<Transformer>(net),
            (ElementType::Line, false) => merge_parallel_branches::<Line>(net, excluded)?,
            (ElementType::Trafo, false) => merge_parallel_branches::<Transformer>(net, excluded)?,
            (other, _) => return Err(TopologyError::UnsupportedElementType(other.to_string())),
        }
    }
    Ok(())
}

fn append_suffix(name: &mut Option<String>, n: i32) {
    if let Some(name) = name.as_mut() {
        name.push('_');
        name.push_str(&n.to_string());
    }
}

/// Expands every branch with `parallel > 1` into single branches.
///
/// Each pass decrements all multi-branches (in index order) and appends one
/// copy named `<name>_<remaining>` per branch, switches of the branch are
/// copied onto the new one.
pub fn split_parallel_branches<B: ParallelBranch>(net: &mut Network) {
    let switch_type = B::switch_type();
    let mut created = 0usize;
    loop {
        let rows = B::rows_mut(net);
        let mut parallels: Vec<usize> = (0..rows.len())
            .filter(|&i| rows[i].parallel() > 1)
            .collect();
        if parallels.is_empty() {
            break;
        }
        parallels.sort_by_key(|&i| rows[i].index());

        let first_new = next_index(rows);
        let mut copies = Vec::with_capacity(parallels.len());
        let mut new_rows = Vec::with_capacity(parallels.len());
        for (i, pos) in parallels.into_iter().enumerate() {
            let row = &mut rows[pos];
            *row.parallel_mut() -= 1;
            let remaining = row.parallel();
            let mut copy = row.clone();
            *copy.parallel_mut() = 1;
            copy.set_index(first_new + i as i64);
            append_suffix(copy.name_mut(), remaining);
            copies.push((row.index(), copy.index(), remaining));
            new_rows.push(copy);
        }
        created += new_rows.len();
        rows.extend(new_rows);

        for (orig, new, remaining) in copies {
            let mut attached: Vec<Switch> = net
                .switch
                .iter()
                .filter(|s| s.et == switch_type && s.element == orig)
                .cloned()
                .collect();
            attached.sort_by_key(|s| s.index);
            let mut next_sw = next_index(&net.switch);
            for mut s in attached {
                s.index = next_sw;
                s.element = new;
                append_suffix(&mut s.name, remaining);
                net.switch.push(s);
                next_sw += 1;
            }
        }
    }
    if created > 0 {
        debug!(element = %B::ELEMENT, created, "split parallel branches");
    }
}

/// Switch positions anchored at `(branch, bus)` for one switch type.
type SwitchLookup = HashMap<(i64, i64), Vec<usize>>;

fn switches_at<'a, B: BranchRow>(lookup: &'a SwitchLookup, row: &B, t: Terminal) -> &'a [usize] {
    row.terminal(t)
        .and_then(|bus| lookup.get(&(row.index(), bus)))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Switches of `member` duplicating those of `rep`, `None` if they differ.
fn duplicated_switches<B: ParallelBranch>(
    switches: &[Switch],
    lookup: &SwitchLookup,
    rep: &B,
    member: &B,
) -> Result<Option<Vec<usize>>> {
    let at = |row: &B, t: Terminal| switches_at(lookup, row, t);

    for &t in B::TERMINALS {
        if at(rep, t).len() > 1 || at(member, t).len() > 1 {
            error!(
                element = %B::ELEMENT,
                representative = rep.index(),
                member = member.index(),
                terminal = %t,
                "more than one switch at a branch terminal"
            );
            return Err(TopologyError::AmbiguousMerge {
                element: B::ELEMENT,
                representative: rep.index(),
                member: member.index(),
                terminal: t,
            });
        }
    }

    let mut dups = Vec::new();
    for &t in B::TERMINALS {
        match (at(rep, t).first(), at(member, t).first()) {
            (None, None) => {}
            (Some(&r), Some(&m)) => {
                let (rs, ms) = (&switches[r], &switches[m]);
                if rs.closed != ms.closed || rs.type_ != ms.type_ {
                    return Ok(None);
                }
                dups.push(m);
            }
            _ => return Ok(None),
        }
    }
    Ok(Some(dups))
}

/// Folds structurally identical branches into the lowest-index one.
///
/// Rows are compared on all columns except `index` and `excluded`, with line
/// endpoints ordered. A member is only folded when the switches at each of its
/// terminals match the representative's in count, state and type. The pass is
/// computed on the unmodified tables and applied afterwards.
pub fn merge_parallel_branches<B: ParallelBranch>(
    net: &mut Network,
    excluded: &BTreeSet<String>,
) -> Result<()> {
    let switch_type = B::switch_type();
    let normalized: Vec<B> = B::rows(net).iter().map(ParallelBranch::normalized).collect();
    let mut excluded = excluded.clone();
    excluded.extend(DERIVED_COLUMNS.map(String::from));

    let mut groups: HashMap<Vec<Cell>, Vec<usize>> = HashMap::new();
    for (pos, row) in normalized.iter().enumerate() {
        groups.entry(row.comparison_key(&excluded)).or_default().push(pos);
    }
    let mut groups: Vec<Vec<usize>> = groups.into_values().filter(|g| g.len() > 1).collect();
    for g in groups.iter_mut() {
        g.sort_by_key(|&p| normalized[p].index());
    }
    groups.sort_by_key(|g| normalized[g[0]].index());

    let mut lookup = SwitchLookup::new();
    for (pos, s) in net.switch.iter().enumerate() {
        if s.et == switch_type {
            lookup.entry((s.element, s.bus)).or_default().push(pos);
        }
    }

    let mut added: HashMap<usize, i32> = HashMap::new();
    let mut drop_rows = HashSet::new();
    let mut drop_switches = HashSet::new();
    for group in &groups {
        let rep = &normalized[group[0]];
        for &m in &group[1..] {
            let member = &normalized[m];
            if let Some(dups) = duplicated_switches(&net.switch, &lookup, rep, member)? {
                *added.entry(group[0]).or_default() += member.parallel();
                drop_rows.insert(m);
                drop_switches.extend(dups);
            }
        }
    }

    let rows = B::rows_mut(net);
    for (pos, n) in added {
        *rows[pos].parallel_mut() += n;
    }
    let mut pos = 0;
    rows.retain(|_| {
        pos += 1;
        !drop_rows.contains(&(pos - 1))
    });
    let mut pos = 0;
    net.switch.retain(|_| {
        pos += 1;
        !drop_switches.contains(&(pos - 1))
    });

    if !drop_rows.is_empty() {
        debug!(
            element = %B::ELEMENT,
            merged = drop_rows.len(),
            switches = drop_switches.len(),
            "merged parallel branches"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcases::{parallel_branch_case, split_merge_case};

    fn default_excluded() -> BTreeSet<String> {
        ["name", "parallel"].map(String::from).into()
    }

    fn indices<T: TableRow>(rows: &[T]) -> Vec<i64> {
        let mut idx: Vec<i64> = rows.iter().map(TableRow::index).collect();
        idx.sort();
        idx
    }

    #[test]
    fn test_merge_parallel_branch_case() {
        let mut net = parallel_branch_case();
        let elements = [ElementType::Line, ElementType::Trafo];
        convert_parallel_branches(&mut net, false, &elements, &default_excluded()).unwrap();
        assert_eq!(indices(&net.trafo), vec![0, 2, 3, 4, 5, 6]);
        assert_eq!(indices(&net.line), vec![0, 2, 3, 4, 5, 6]);
        assert_eq!(
            net.trafo.iter().map(|t| t.parallel).collect::<Vec<_>>(),
            vec![4, 1, 1, 1, 1, 1]
        );
        assert_eq!(
            net.line.iter().map(|l| l.parallel).collect::<Vec<_>>(),
            vec![5, 1, 1, 1, 1, 1]
        );
    }

    #[test]
    fn test_merge_only_lines() {
        let orig = parallel_branch_case();
        let mut both = orig.clone();
        let mut lines = orig.clone();
        convert_parallel_branches(
            &mut both,
            false,
            &[ElementType::Line, ElementType::Trafo],
            &default_excluded(),
        )
        .unwrap();
        convert_parallel_branches(&mut lines, false, &[ElementType::Line], &default_excluded())
            .unwrap();
        assert_eq!(lines.line, both.line);
        assert_eq!(lines.trafo, orig.trafo);
    }

    #[test]
    fn test_merge_with_extra_exclusion() {
        let mut net = parallel_branch_case();
        let mut excluded = default_excluded();
        excluded.insert("max_loading_percent".to_string());
        convert_parallel_branches(
            &mut net,
            false,
            &[ElementType::Line, ElementType::Trafo],
            &excluded,
        )
        .unwrap();
        assert_eq!(indices(&net.trafo), vec![0, 3, 4, 5, 6]);
        assert_eq!(indices(&net.line), vec![0, 3, 4, 5, 6]);
        assert_eq!(
            net.trafo.iter().map(|t| t.parallel).collect::<Vec<_>>(),
            vec![5, 1, 1, 1, 1]
        );
        assert_eq!(
            net.line.iter().map(|l| l.parallel).collect::<Vec<_>>(),
            vec![6, 1, 1, 1, 1]
        );
    }

    #[test]
    fn test_split_and_merge() {
        let mut net = split_merge_case();
        let elements = [ElementType::Line, ElementType::Trafo];
        assert_eq!((net.trafo.len(), net.line.len(), net.switch.len()), (1, 3, 4));

        convert_parallel_branches(&mut net, true, &elements, &default_excluded()).unwrap();
        assert_eq!((net.trafo.len(), net.line.len(), net.switch.len()), (3, 6, 11));
        assert!(net.line.iter().all(|l| l.parallel == 1));
        assert_eq!(net.line[5].name.as_deref(), Some("sdhj_1"));
        assert_eq!(net.trafo[1].name.as_deref(), Some("sd_2"));

        let mut opened = net.clone();
        opened.switch[4].closed = false;

        convert_parallel_branches(&mut net, false, &elements, &default_excluded()).unwrap();
        convert_parallel_branches(&mut opened, false, &elements, &default_excluded()).unwrap();
        assert_eq!((net.trafo.len(), net.line.len(), net.switch.len()), (1, 3, 4));
        assert_eq!(
            (opened.trafo.len(), opened.line.len(), opened.switch.len()),
            (1, 4, 5)
        );
        assert_eq!(net, split_merge_case());
    }

    #[test]
    fn test_switch_type_keeps_twins_apart() {
        let elements = [ElementType::Line, ElementType::Trafo];
        let mut split = split_merge_case();
        convert_parallel_branches(&mut split, true, &elements, &default_excluded()).unwrap();
        assert_eq!(split.switch[4].name.as_deref(), Some("dfsdf_1"));
        assert_eq!((split.switch[1].type_.as_ref(), split.switch[4].type_.as_ref()), (None, None));

        let mut differing = split.clone();
        differing.switch[1].type_ = Some("CB".to_string());
        differing.switch[4].type_ = Some("LS".to_string());
        convert_parallel_branches(&mut differing, false, &elements, &default_excluded()).unwrap();
        assert_eq!(
            (differing.trafo.len(), differing.line.len(), differing.switch.len()),
            (1, 4, 5)
        );

        let mut same = split.clone();
        same.switch[1].type_ = Some("CB".to_string());
        same.switch[4].type_ = Some("CB".to_string());
        convert_parallel_branches(&mut same, false, &elements, &default_excluded()).unwrap();
        assert_eq!((same.trafo.len(), same.line.len(), same.switch.len()), (1, 3, 4));
        assert_eq!(same.switch[1].type_.as_deref(), Some("CB"));
    }

    #[test]
    fn test_derived_columns_do_not_split_groups() {
        let mut net = split_merge_case();
        convert_parallel_branches(&mut net, true, &[ElementType::Line], &default_excluded())
            .unwrap();
        net.line[0].volt_lvl = Some(5);
        net.line[0].subnet = Some("MV1".to_string());
        convert_parallel_branches(&mut net, false, &[ElementType::Line], &default_excluded())
            .unwrap();
        assert_eq!(net.line.len(), 3);
        assert_eq!(net.line[0].volt_lvl, Some(5));
    }

    #[test]
    fn test_multiplicity_is_conserved() {
        let mut net = parallel_branch_case();
        let total = |net: &Network| -> i32 { net.line.iter().map(|l| l.parallel).sum() };
        let before = total(&net);
        convert_parallel_branches(&mut net, true, &[ElementType::Line], &default_excluded())
            .unwrap();
        assert_eq!(net.line.len() as i32, before);
        convert_parallel_branches(&mut net, false, &[ElementType::Line], &default_excluded())
            .unwrap();
        assert_eq!(total(&net), before);
    }

    #[test]
    fn test_ambiguous_merge() {
        let mut net = split_merge_case();
        // a second switch on the lv terminal of the only trafo
        net.create_switch(1, 0, SwitchType::SwitchBusTransformer, true, "extra");
        convert_parallel_branches(&mut net, true, &[ElementType::Trafo], &default_excluded())
            .unwrap();
        let before = net.clone();
        let err = convert_parallel_branches(
            &mut net,
            false,
            &[ElementType::Trafo],
            &default_excluded(),
        );
        assert!(matches!(err, Err(TopologyError::AmbiguousMerge { .. })));
        assert_eq!(net, before);
    }

    #[test]
    fn test_trafo3w_unsupported() {
        let mut net = split_merge_case();
        let before = net.clone();
        let err = convert_parallel_branches(
            &mut net,
            true,
            &[ElementType::Line, ElementType::Trafo3w],
            &default_excluded(),
        );
        assert!(matches!(err, Err(TopologyError::UnsupportedElementType(_))));
        assert_eq!(net, before);
    }
}
