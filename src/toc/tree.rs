//! Flat TOC records to a heading tree
//!
//! Records are grouped by `(level, sub_level)`. `(1, 0)` headings are roots.
//! Every other group is visited in ascending key order; each of its headings
//! hangs under the last heading (by id, not after it) of the nearest lower
//! group that has one, or becomes a root when no lower group does.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

type LevelKey = (i64, i64);

const ROOT_KEY: LevelKey = (1, 0);

/// One row of `t{book}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocFlatRecord {
    pub id: i64,
    pub title: String,
    pub level: i64,
    pub sub_level: i64,
}

/// A heading with its nested headings
///
/// `end_id` is the last content id covered by this heading: the id of the
/// next heading in flat order minus one, or `i64::MAX` for the final one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocNode {
    pub id: i64,
    pub title: String,
    pub level: i64,
    pub sub_level: i64,
    pub end_id: i64,
    pub children: Vec<TocNode>,
}

impl TocNode {
    /// Number of nodes in this subtree, self included
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(TocNode::len).sum::<usize>()
    }

    /// Depth-first walk yielding (depth, node)
    pub fn walk(&self) -> Vec<(usize, &TocNode)> {
        let mut out = Vec::new();
        let mut stack = vec![(0, self)];
        while let Some((depth, node)) = stack.pop() {
            out.push((depth, node));
            for child in node.children.iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        out
    }
}

/// Build the heading forest for one book
pub fn build_tree(records: &[TocFlatRecord]) -> Vec<TocNode> {
    let mut flat: Vec<&TocFlatRecord> = records.iter().collect();
    flat.sort_by_key(|r| r.id);

    let mut groups: BTreeMap<LevelKey, Vec<usize>> = BTreeMap::new();
    for (i, record) in flat.iter().enumerate() {
        groups
            .entry((record.level, record.sub_level))
            .or_default()
            .push(i);
    }

    let mut parent: Vec<Option<usize>> = vec![None; flat.len()];
    let keys: Vec<LevelKey> = groups.keys().copied().collect();

    for (k, key) in keys.iter().enumerate() {
        if *key == ROOT_KEY {
            continue;
        }
        for &node in &groups[key] {
            let id = flat[node].id;
            parent[node] = keys[..k].iter().rev().find_map(|lower| {
                let members = &groups[lower];
                // Members are in id order; take the last one with id <= node's
                let upto = members.partition_point(|&m| flat[m].id <= id);
                upto.checked_sub(1).map(|p| members[p])
            });
        }
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); flat.len()];
    let mut roots = Vec::new();
    for (node, p) in parent.iter().enumerate() {
        match p {
            Some(p) => children[*p].push(node),
            None => roots.push(node),
        }
    }

    // Indices follow id order, so pushing in index order keeps siblings sorted
    roots
        .into_iter()
        .map(|root| assemble(root, &flat, &children))
        .collect()
}

fn assemble(node: usize, flat: &[&TocFlatRecord], children: &[Vec<usize>]) -> TocNode {
    let record = flat[node];
    let end_id = flat
        .get(node + 1)
        .map_or(i64::MAX, |next| next.id.saturating_sub(1));

    TocNode {
        id: record.id,
        title: record.title.clone(),
        level: record.level,
        sub_level: record.sub_level,
        end_id,
        children: children[node]
            .iter()
            .map(|&child| assemble(child, flat, children))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: i64, level: i64, sub_level: i64) -> TocFlatRecord {
        TocFlatRecord {
            id,
            title: format!("h{}", id),
            level,
            sub_level,
        }
    }

    fn shape(nodes: &[TocNode]) -> Vec<(i64, Vec<i64>)> {
        nodes
            .iter()
            .map(|n| (n.id, n.children.iter().map(|c| c.id).collect()))
            .collect()
    }

    fn assert_invariants(forest: &[TocNode], flat_ids: &[i64]) {
        for root in forest {
            for (_, node) in root.walk() {
                for child in &node.children {
                    assert!(node.id <= child.id, "parent {} after child {}", node.id, child.id);
                }
                let pos = flat_ids.iter().position(|&id| id == node.id).unwrap();
                let expected = flat_ids
                    .get(pos + 1)
                    .map_or(i64::MAX, |next| next.saturating_sub(1));
                assert_eq!(node.end_id, expected, "end_id of {}", node.id);
            }
        }
        let total: usize = forest.iter().map(TocNode::len).sum();
        assert_eq!(total, flat_ids.len());
    }

    #[test]
    fn test_chapters_and_sections() {
        let records = vec![
            rec(1, 1, 0),
            rec(5, 2, 0),
            rec(9, 2, 0),
            rec(20, 1, 0),
            rec(22, 2, 0),
            rec(23, 3, 0),
        ];
        let forest = build_tree(&records);

        assert_eq!(shape(&forest), vec![(1, vec![5, 9]), (20, vec![22])]);
        assert_eq!(shape(&forest[1].children), vec![(22, vec![23])]);
        assert_eq!(forest[0].end_id, 4);
        assert_eq!(forest[0].children[1].end_id, 19);
        assert_eq!(forest[1].children[0].children[0].end_id, i64::MAX);
        assert_invariants(&forest, &[1, 5, 9, 20, 22, 23]);
    }

    #[test]
    fn test_heading_before_any_lower_group_becomes_root() {
        // Section 2 precedes the first chapter, so nothing can hold it
        let records = vec![rec(2, 2, 0), rec(3, 1, 0), rec(4, 2, 0)];
        let forest = build_tree(&records);
        assert_eq!(shape(&forest), vec![(2, vec![]), (3, vec![4])]);
        assert_invariants(&forest, &[2, 3, 4]);
    }

    #[test]
    fn test_sub_level_nests_under_nearest_lower_key() {
        let records = vec![rec(1, 1, 0), rec(2, 1, 1), rec(3, 2, 0), rec(4, 1, 1)];
        let forest = build_tree(&records);
        // (1,1) hangs under (1,0); (2,0) finds (1,1) id 2 first
        assert_eq!(shape(&forest), vec![(1, vec![2, 4])]);
        assert_eq!(shape(&forest[0].children), vec![(2, vec![3]), (4, vec![])]);
        assert_invariants(&forest, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_skipped_level_attaches_to_nearest_present() {
        let records = vec![rec(1, 1, 0), rec(2, 3, 0), rec(3, 3, 0)];
        let forest = build_tree(&records);
        assert_eq!(shape(&forest), vec![(1, vec![2, 3])]);
    }

    #[test]
    fn test_unordered_input_is_sorted_by_id() {
        let records = vec![rec(30, 2, 0), rec(10, 1, 0), rec(20, 2, 0)];
        let forest = build_tree(&records);
        assert_eq!(shape(&forest), vec![(10, vec![20, 30])]);
        assert_invariants(&forest, &[10, 20, 30]);
    }

    #[test]
    fn test_extreme_ids_do_not_overflow() {
        let records = vec![rec(i64::MIN, 1, 0), rec(i64::MIN, 2, 0), rec(0, 1, 0)];
        let forest = build_tree(&records);
        assert_eq!(forest[0].end_id, i64::MIN);
        assert_eq!(forest[0].children[0].end_id, -1);
        assert_eq!(forest[1].end_id, i64::MAX);
    }

    #[test]
    fn test_empty_input() {
        assert!(build_tree(&[]).is_empty());
    }
}
