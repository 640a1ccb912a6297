use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

use tracing::debug;

use crate::io::pandapower::file_io::*;
use crate::io::pandapower::table::*;

/// Hands out `_N` suffixes, remembering the last used N per base name.
#[derive(Debug, Default)]
struct SuffixCounter {
    reserved: HashSet<String>,
    next: HashMap<String, usize>,
}

impl SuffixCounter {
    fn new(reserved: HashSet<String>) -> Self {
        Self {
            reserved,
            next: HashMap::new(),
        }
    }

    fn resolve(&mut self, base: &str) -> String {
        if self.reserved.insert(base.to_string()) {
            return base.to_string();
        }
        let n = self.next.entry(base.to_string()).or_insert(1);
        loop {
            let candidate = format!("{base}_{n}");
            *n += 1;
            if self.reserved.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// Makes `candidates` collision free against `reserved` and against each other.
///
/// Non-colliding names pass unchanged, colliding names get the smallest free
/// `_N` suffix with `N >= 1`. Returns the names and the grown reservation set.
pub fn append_str_by_underline_count<I, S>(
    candidates: I,
    reserved: Option<HashSet<String>>,
) -> (Vec<String>, HashSet<String>)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut counter = SuffixCounter::new(reserved.unwrap_or_default());
    let names = candidates
        .into_iter()
        .map(|c| counter.resolve(c.as_ref()))
        .collect();
    (names, counter.reserved)
}

/// Maps each representative (lowest id) to all ids sharing exactly its value.
///
/// Singletons map to themselves, so every id appears exactly once.
pub fn get_unique_duplicated_dict<K, I>(rows: I) -> BTreeMap<i64, Vec<i64>>
where
    K: Hash + Eq,
    I: IntoIterator<Item = (i64, K)>,
{
    let mut groups: HashMap<K, Vec<i64>> = HashMap::new();
    for (id, key) in rows {
        groups.entry(key).or_default().push(id);
    }
    groups
        .into_values()
        .filter_map(|mut ids| {
            ids.sort_unstable();
            Some((*ids.first()?, ids))
        })
        .collect()
}

/// Fills missing names with `<element> <index>`.
pub fn ensure_names(net: &mut Network, element: ElementType) {
    let prefix = element.as_str();
    let filled = dispatch_rows!(net, element, |mut rows| {
        let mut filled = 0usize;
        for row in rows.iter_mut() {
            let index = row.index();
            let name = row.name_mut();
            if name.is_none() {
                *name = Some(format!("{prefix} {index}"));
                filled += 1;
            }
        }
        filled
    });
    if filled > 0 {
        debug!(%element, filled, "filled missing names");
    }
}

/// Renames repeated names of `element`; the first occurrence keeps its name.
pub fn avoid_duplicates_in_column(net: &mut Network, element: ElementType) {
    let renamed = dispatch_rows!(net, element, |mut rows| {
        let reserved: HashSet<String> = rows.iter().filter_map(|r| r.name().cloned()).collect();
        let mut counter = SuffixCounter::new(reserved);
        let mut seen = HashSet::new();
        let mut renamed = 0usize;
        for row in rows.iter_mut() {
            let name = row.name_mut();
            let Some(current) = name.clone() else {
                continue;
            };
            if seen.insert(current.clone()) {
                continue;
            }
            *name = Some(counter.resolve(&current));
            renamed += 1;
        }
        renamed
    });
    if renamed > 0 {
        debug!(%element, renamed, "renamed duplicated names");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_str_by_underline_count() {
        let reserved: HashSet<String> = ["Bus_A", "Bus_A_1"].map(String::from).into();
        let (names, reserved) = append_str_by_underline_count(["Bus_A"], Some(reserved));
        assert_eq!(names, vec!["Bus_A_2"]);
        assert!(reserved.contains("Bus_A_2"));
    }

    #[test]
    fn test_candidates_collide_with_each_other() {
        let (names, reserved) = append_str_by_underline_count(["x", "y", "x", "x"], None);
        assert_eq!(names, vec!["x", "y", "x_1", "x_2"]);
        assert_eq!(reserved.len(), 4);
    }

    #[test]
    fn test_unique_duplicated_dict() {
        let rows = vec![(5, (1, 2)), (2, (1, 2)), (3, (0, 0)), (9, (1, 2))];
        let dict = get_unique_duplicated_dict(rows);
        assert_eq!(dict.len(), 2);
        assert_eq!(dict[&2], vec![2, 5, 9]);
        assert_eq!(dict[&3], vec![3]);
    }

    #[test]
    fn test_ensure_and_dedup_names() {
        let mut net = Network::default();
        net.create_bus(20.0, "a");
        net.add_bus(Bus::default());
        net.create_bus(20.0, "a");
        net.create_bus(20.0, "a_1");
        ensure_names(&mut net, ElementType::Bus);
        assert_eq!(net.bus[1].name.as_deref(), Some("bus 1"));
        avoid_duplicates_in_column(&mut net, ElementType::Bus);
        let names: Vec<_> = net.bus.iter().filter_map(|b| b.name.clone()).collect();
        assert_eq!(names, vec!["a", "bus 1", "a_2", "a_1"]);
    }
}
