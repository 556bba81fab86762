//! Destination tree built from a flat listing
//!
//! Object stores have no directories, so the folder hierarchy is recovered
//! from explicit folder markers and from the ancestors of every file key.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::path::{TRASH_PREFIX, key_name};
use crate::traits::ObjectRef;

/// Display name of the root node
pub const ROOT_NAME: &str = "Root";

/// A folder in the destination tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderNode {
    /// Last path segment ("Root" for the root)
    pub name: String,
    /// Prefix with trailing slash ("" for the root)
    pub path: String,
    /// Child folders, sorted by name
    pub children: Vec<FolderNode>,
}

impl FolderNode {
    fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            children: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Find the node for `path` in this subtree
    pub fn find(&self, path: &str) -> Option<&FolderNode> {
        if self.path == path {
            return Some(self);
        }
        self.children
            .iter()
            .filter(|child| path.starts_with(&child.path))
            .find_map(|child| child.find(path))
    }

    /// Every node in depth-first order, with its depth (root is 0)
    pub fn walk(&self) -> Vec<(usize, &FolderNode)> {
        let mut out = Vec::new();
        self.walk_into(0, &mut out);
        out
    }

    fn walk_into<'a>(&'a self, depth: usize, out: &mut Vec<(usize, &'a FolderNode)>) {
        out.push((depth, self));
        for child in &self.children {
            child.walk_into(depth + 1, out);
        }
    }

    /// Number of folders below this node
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.descendant_count())
            .sum()
    }
}

/// Builds a [`FolderNode`] tree rooted at `""`
///
/// Pure: holds no expand/collapse state and performs no I/O.
#[derive(Debug, Clone, Default)]
pub struct FolderTreeBuilder {
    hide_trash: bool,
}

impl FolderTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave the `.trash/` subtree out of the result
    pub fn hide_trash(mut self, hide: bool) -> Self {
        self.hide_trash = hide;
        self
    }

    pub fn build(&self, objects: &[ObjectRef]) -> FolderNode {
        let folders = self.collect_folders(objects);

        // parent path -> child paths; BTreeSet dedups and keeps a stable order
        let mut children: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for folder in &folders {
            children
                .entry(parent_of(folder))
                .or_default()
                .insert(folder.as_str());
        }

        assemble(FolderNode::new(ROOT_NAME, ""), &children)
    }

    /// Every folder path, explicit markers and implicit ancestors alike
    fn collect_folders(&self, objects: &[ObjectRef]) -> BTreeSet<String> {
        let mut folders = BTreeSet::new();
        for obj in objects {
            let segments: Vec<&str> = obj.key.split('/').collect();
            // A folder key ends in '/', so its last split segment is empty;
            // for a file the last segment is the file name. Either way every
            // segment before the last one names an ancestor folder.
            let mut current = String::new();
            for segment in &segments[..segments.len().saturating_sub(1)] {
                if segment.is_empty() {
                    continue;
                }
                current.push_str(segment);
                current.push('/');
                folders.insert(current.clone());
            }
        }
        if self.hide_trash {
            folders.retain(|f| !f.starts_with(TRASH_PREFIX));
        }
        folders
    }
}

fn parent_of(folder: &str) -> &str {
    let trimmed = &folder[..folder.len() - 1];
    match trimmed.rfind('/') {
        Some(pos) => &folder[..=pos],
        None => "",
    }
}

fn assemble(mut node: FolderNode, children: &BTreeMap<&str, BTreeSet<&str>>) -> FolderNode {
    if let Some(paths) = children.get(node.path.as_str()) {
        node.children = paths
            .iter()
            .map(|path| assemble(FolderNode::new(key_name(path), *path), children))
            .collect();
        node.children.sort_by(|a, b| a.name.cmp(&b.name));
    }
    node
}

/// Names of the immediate children of `prefix` in a recursive listing
pub fn child_names(objects: &[ObjectRef], prefix: &str) -> HashSet<String> {
    objects
        .iter()
        .filter_map(|obj| obj.key.strip_prefix(prefix))
        .filter_map(|rest| rest.split('/').next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Direct children of `prefix`, with implicit folders materialized
///
/// This is what a browsing view shows: one level, folders first, and the
/// trash marker hidden at the bucket root.
pub fn visible_entries(objects: &[ObjectRef], prefix: &str) -> Vec<ObjectRef> {
    let mut folders: BTreeMap<String, ObjectRef> = BTreeMap::new();
    let mut files: BTreeMap<String, ObjectRef> = BTreeMap::new();

    for obj in objects {
        let Some(rest) = obj.key.strip_prefix(prefix) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        match rest.split_once('/') {
            Some((name, _)) => {
                let key = format!("{prefix}{name}/");
                if prefix.is_empty() && key == TRASH_PREFIX {
                    continue;
                }
                folders
                    .entry(name.to_string())
                    .or_insert_with(|| ObjectRef::folder(key));
            }
            None => {
                files.insert(rest.to_string(), obj.clone());
            }
        }
    }

    folders.into_values().chain(files.into_values()).collect()
}
