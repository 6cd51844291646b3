//! Per-line content hashes

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::fingerprint::line_hash;

/// 1-based line number -> hash of that line's text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineHashMap(BTreeMap<usize, String>);

impl LineHashMap {
    pub fn from_code(code: &str) -> Self {
        Self(
            code.lines()
                .enumerate()
                .map(|(i, line)| (i + 1, line_hash(line)))
                .collect(),
        )
    }

    pub fn get(&self, line: usize) -> Option<&str> {
        self.0.get(&line).map(String::as_str)
    }

    /// Number of lines
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lines whose hash differs, including lines present on only one side
    pub fn changed_lines(&self, other: &LineHashMap) -> BTreeSet<usize> {
        let mut changed: BTreeSet<usize> = self
            .0
            .iter()
            .filter(|(line, hash)| other.0.get(line) != Some(hash))
            .map(|(line, _)| *line)
            .collect();
        changed.extend(other.0.keys().filter(|line| !self.0.contains_key(line)));
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_numbers_are_one_based() {
        let map = LineHashMap::from_code("a\nb\n");
        assert_eq!(map.len(), 2);
        assert!(map.get(0).is_none());
        assert_eq!(map.get(1), Some(line_hash("a").as_str()));
    }

    #[test]
    fn test_changed_lines_includes_tail_growth_and_shrink() {
        let old = LineHashMap::from_code("a\nb\nc");
        let edited = LineHashMap::from_code("a\nB\nc\nd");
        assert_eq!(
            old.changed_lines(&edited).into_iter().collect::<Vec<_>>(),
            vec![2, 4]
        );
        assert_eq!(edited.changed_lines(&old), old.changed_lines(&edited));

        let shorter = LineHashMap::from_code("a");
        assert_eq!(
            old.changed_lines(&shorter).into_iter().collect::<Vec<_>>(),
            vec![2, 3]
        );
    }
}
