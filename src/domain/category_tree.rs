use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::domain::analysis::IntegrityWarning;
use crate::domain::record::Record;

/// Walk up from every id in `starts` and report each distinct parent cycle once.
///
/// A cycle's members are listed starting from its smallest id so the same
/// loop found from different starting points compares equal.
pub fn find_parent_cycles<'a>(
    by_id: &HashMap<&'a str, &'a Record>,
    starts: impl IntoIterator<Item = &'a str>,
) -> Vec<Vec<String>> {
    let mut seen: BTreeSet<Vec<String>> = BTreeSet::new();
    let mut cycles = Vec::new();

    for start in starts {
        let mut path: Vec<&str> = Vec::new();
        let mut on_path: HashSet<&str> = HashSet::new();
        let mut current = Some(start);

        while let Some(id) = current {
            if !on_path.insert(id) {
                let from = path.iter().position(|p| *p == id).unwrap_or(0);
                let mut members: Vec<String> = path[from..].iter().map(|s| s.to_string()).collect();
                if let Some(min_at) = members
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, m)| m.as_str())
                    .map(|(i, _)| i)
                {
                    members.rotate_left(min_at);
                }
                if seen.insert(members.clone()) {
                    cycles.push(members);
                }
                break;
            }
            path.push(id);
            current = by_id.get(id).copied().and_then(|r| r.parent_id());
        }
    }
    cycles
}

/// Whether giving `child` the parent `new_parent` would close a loop.
pub fn would_create_cycle(by_id: &HashMap<&str, &Record>, child: &str, new_parent: &str) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = Some(new_parent);
    while let Some(id) = current {
        if id == child {
            return true;
        }
        if !visited.insert(id) {
            // Pre-existing loop above `new_parent` that does not include `child`.
            return false;
        }
        current = by_id.get(id).copied().and_then(|r| r.parent_id());
    }
    false
}

// ─── CategoryTree ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CategoryNode {
    pub id: String,
    pub name: String,
    pub depth: usize,
    pub children: Vec<CategoryNode>,
}

/// Parent → children forest of categories, children sorted by name.
///
/// Categories whose parent does not exist are shown as roots. Categories
/// caught in a parent cycle are unreachable from any root and are reported
/// in `warnings` instead.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryTree {
    pub roots: Vec<CategoryNode>,
    pub warnings: Vec<IntegrityWarning>,
}

impl CategoryTree {
    pub fn build(categories: &[Record]) -> Self {
        let by_id: HashMap<&str, &Record> = categories.iter().map(|c| (c.id(), c)).collect();
        let mut children: HashMap<&str, Vec<&Record>> = HashMap::new();
        let mut roots: Vec<&Record> = Vec::new();

        for cat in categories {
            match cat.parent_id() {
                Some(parent) if by_id.contains_key(parent) => {
                    children.entry(parent).or_default().push(cat)
                }
                _ => roots.push(cat),
            }
        }
        roots.sort_by(|a, b| a.name().cmp(b.name()));
        for list in children.values_mut() {
            list.sort_by(|a, b| a.name().cmp(b.name()));
        }

        let mut placed: HashSet<&str> = HashSet::new();
        let root_nodes = roots
            .iter()
            .map(|r| build_node(r, 0, &children, &mut placed))
            .collect();

        let unplaced: Vec<&str> = categories
            .iter()
            .map(|c| c.id())
            .filter(|id| !placed.contains(id))
            .collect();
        let warnings = find_parent_cycles(&by_id, unplaced)
            .into_iter()
            .map(|members| IntegrityWarning::ParentCycle { members })
            .collect();

        Self {
            roots: root_nodes,
            warnings,
        }
    }

    /// Depth-first listing as `(id, indented name)`, four spaces per level.
    pub fn flatten(&self) -> Vec<(String, String)> {
        fn walk(node: &CategoryNode, out: &mut Vec<(String, String)>) {
            out.push((
                node.id.clone(),
                format!("{}{}", "    ".repeat(node.depth), node.name),
            ));
            for child in &node.children {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        for root in &self.roots {
            walk(root, &mut out);
        }
        out
    }

    pub fn depth_of(&self, id: &str) -> Option<usize> {
        fn find(node: &CategoryNode, id: &str) -> Option<usize> {
            if node.id == id {
                return Some(node.depth);
            }
            node.children.iter().find_map(|c| find(c, id))
        }
        self.roots.iter().find_map(|r| find(r, id))
    }
}

fn build_node<'a>(
    record: &'a Record,
    depth: usize,
    children: &HashMap<&'a str, Vec<&'a Record>>,
    placed: &mut HashSet<&'a str>,
) -> CategoryNode {
    placed.insert(record.id());
    let mut kids = Vec::new();
    if let Some(list) = children.get(record.id()) {
        for child in list {
            if !placed.contains(child.id()) {
                kids.push(build_node(child, depth + 1, children, placed));
            }
        }
    }
    CategoryNode {
        id: record.id().to_string(),
        name: record.name().to_string(),
        depth,
        children: kids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(id: &str, parent: &str, name: &str) -> Record {
        Record::from_pairs(&[("local_id", id), ("parent_local_id", parent), ("name_uk", name)])
    }

    #[test]
    fn builds_sorted_forest_with_depths() {
        let cats = vec![
            cat("cat_1", "", "Home"),
            cat("cat_2", "cat_1", "Kitchen"),
            cat("cat_3", "cat_1", "Bath"),
            cat("cat_4", "cat_2", "Knives"),
            cat("cat_5", "cat_missing", "Orphan"),
        ];
        let tree = CategoryTree::build(&cats);
        assert!(tree.warnings.is_empty());
        let flat: Vec<String> = tree.flatten().into_iter().map(|(_, l)| l).collect();
        assert_eq!(
            flat,
            vec!["Home", "    Bath", "    Kitchen", "        Knives", "Orphan"]
        );
        assert_eq!(tree.depth_of("cat_4"), Some(2));
    }

    #[test]
    fn cycle_is_reported_not_followed() {
        let cats = vec![
            cat("cat_a", "cat_b", "A"),
            cat("cat_b", "cat_a", "B"),
            cat("cat_c", "", "C"),
        ];
        let tree = CategoryTree::build(&cats);
        assert_eq!(tree.roots.len(), 1);
        assert_eq!(
            tree.warnings,
            vec![IntegrityWarning::ParentCycle {
                members: vec!["cat_a".into(), "cat_b".into()]
            }]
        );
    }

    #[test]
    fn reparenting_under_descendant_is_a_cycle() {
        let cats = vec![cat("c1", "", "1"), cat("c2", "c1", "2"), cat("c3", "c2", "3")];
        let by_id: HashMap<&str, &Record> = cats.iter().map(|c| (c.id(), c)).collect();
        assert!(would_create_cycle(&by_id, "c1", "c3"));
        assert!(!would_create_cycle(&by_id, "c3", "c1"));
        assert!(would_create_cycle(&by_id, "c2", "c2"));
    }
}
