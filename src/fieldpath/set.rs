//! Sets of field paths, stored as a tree.

use super::path::{Path, PathElement};
use std::collections::{BTreeMap, BTreeSet};

/// Set is a set of paths. Each node keeps the elements that end a path at
/// this depth (`members`) and the subtrees of longer paths (`children`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Set {
    pub members: BTreeSet<PathElement>,
    pub children: BTreeMap<PathElement, Set>,
}

impl Set {
    pub fn new() -> Self {
        Set::default()
    }

    /// Builds a set from a list of paths.
    pub fn from_paths<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Self {
        let mut set = Set::new();
        for path in paths {
            set.insert(path);
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty() && self.children.values().all(Set::is_empty)
    }

    /// Number of paths in the set.
    pub fn len(&self) -> usize {
        self.members.len() + self.children.values().map(Set::len).sum::<usize>()
    }

    pub fn insert(&mut self, path: &Path) {
        let Some((last, parents)) = path.as_slice().split_last() else {
            return;
        };
        let mut node = self;
        for element in parents {
            node = node.children.entry(element.clone()).or_default();
        }
        node.members.insert(last.clone());
    }

    /// Returns true if exactly `path` is in the set.
    pub fn has(&self, path: &Path) -> bool {
        let Some((last, parents)) = path.as_slice().split_last() else {
            return false;
        };
        let mut node = self;
        for element in parents {
            match node.children.get(element) {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.members.contains(last)
    }

    /// Returns true if `path` or any path below it is in the set.
    pub fn has_prefix(&self, path: &Path) -> bool {
        let Some((last, parents)) = path.as_slice().split_last() else {
            return !self.is_empty();
        };
        let mut node = self;
        for element in parents {
            match node.children.get(element) {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.members.contains(last) || node.children.get(last).is_some_and(|c| !c.is_empty())
    }

    /// Returns true if `path`, one of its ancestors, or one of its
    /// descendants is in the set.
    pub fn overlaps(&self, path: &Path) -> bool {
        let mut node = self;
        for element in path {
            if node.members.contains(element) {
                return true;
            }
            match node.children.get(element) {
                Some(child) => node = child,
                None => return false,
            }
        }
        !node.is_empty()
    }

    /// Returns true if `path` or one of its ancestors is in the set.
    pub fn covers(&self, path: &Path) -> bool {
        let mut node = self;
        for element in path {
            if node.members.contains(element) {
                return true;
            }
            match node.children.get(element) {
                Some(child) => node = child,
                None => return false,
            }
        }
        false
    }

    /// Returns the subtree rooted at `path`, with paths relative to it.
    pub fn subtree(&self, path: &Path) -> Set {
        let mut node = self;
        for element in path {
            match node.children.get(element) {
                Some(child) => node = child,
                None => return Set::new(),
            }
        }
        node.clone()
    }

    pub fn union(&self, other: &Set) -> Set {
        let mut result = self.clone();
        result.union_in_place(other);
        result
    }

    fn union_in_place(&mut self, other: &Set) {
        self.members.extend(other.members.iter().cloned());
        for (element, child) in &other.children {
            self.children
                .entry(element.clone())
                .or_default()
                .union_in_place(child);
        }
    }

    pub fn intersection(&self, other: &Set) -> Set {
        let members = self.members.intersection(&other.members).cloned().collect();
        let children = self
            .children
            .iter()
            .filter_map(|(element, child)| {
                let common = child.intersection(other.children.get(element)?);
                (!common.is_empty()).then(|| (element.clone(), common))
            })
            .collect();
        Set { members, children }
    }

    /// Returns the paths of self that are not in other.
    pub fn difference(&self, other: &Set) -> Set {
        let members = self.members.difference(&other.members).cloned().collect();
        let children = self
            .children
            .iter()
            .filter_map(|(element, child)| {
                let rest = match other.children.get(element) {
                    Some(other_child) => child.difference(other_child),
                    None => child.clone(),
                };
                (!rest.is_empty()).then(|| (element.clone(), rest))
            })
            .collect();
        Set { members, children }
    }

    /// Keeps only the paths for which `keep` returns true.
    pub fn filter(&self, mut keep: impl FnMut(&Path) -> bool) -> Set {
        let mut result = Set::new();
        self.iterate(|path| {
            if keep(path) {
                result.insert(path);
            }
        });
        result
    }

    /// Visits every path in the set, shortest paths of a subtree first.
    pub fn iterate<F>(&self, mut f: F)
    where
        F: FnMut(&Path),
    {
        self.walk(&mut Path::new(), &mut f);
    }

    fn walk<F>(&self, prefix: &mut Path, f: &mut F)
    where
        F: FnMut(&Path),
    {
        for member in &self.members {
            prefix.push(member.clone());
            f(prefix);
            prefix.pop();
        }
        for (element, child) in &self.children {
            prefix.push(element.clone());
            child.walk(prefix, f);
            prefix.pop();
        }
    }

    /// Collects every path in the set.
    pub fn paths(&self) -> Vec<Path> {
        let mut paths = Vec::new();
        self.iterate(|path| paths.push(path.clone()));
        paths.sort();
        paths
    }
}
