//! Playlist tree model.
//!
//! Builds a folder/track tree from flat `/`-separated paths and classifies
//! rows for rendering against the current track and loop mode.  Pure: the
//! tree is rebuilt from the catalog on every pass and carries no identity.
//!
//! Classification rules:
//!   - a track is highlighted iff its path equals the current track
//!   - with loop mode `list`, a track in the same folder as the current
//!     track (but not the current track) is dimmed, and so is every folder
//!     that contains the current track
//!   - other loop modes never dim

use std::collections::HashSet;

use dmdj_proto::protocol::LoopMode;
use tracing::debug;

pub const SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Folder(Folder),
    /// Leaf holding the full original path.
    Track(String),
}

/// Children in first-seen order; names are unique within a folder.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Folder {
    children: Vec<(String, TreeNode)>,
}

impl Folder {
    pub fn children(&self) -> &[(String, TreeNode)] {
        &self.children
    }

    pub fn get(&self, name: &str) -> Option<&TreeNode> {
        self.children.iter().find(|(n, _)| n == name).map(|(_, node)| node)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn entry(&mut self, name: &str) -> Option<usize> {
        self.children.iter().position(|(n, _)| n == name)
    }

    /// Insert `segments` under this folder.  Returns `false` when an
    /// existing node of the other kind already owns one of the names.
    fn insert(&mut self, segments: &[&str], full_path: &str) -> bool {
        let Some((head, rest)) = segments.split_first() else {
            return false;
        };

        match (self.entry(head), rest.is_empty()) {
            (None, true) => {
                self.children
                    .push((head.to_string(), TreeNode::Track(full_path.to_string())));
                true
            }
            (None, false) => {
                let mut folder = Folder::default();
                let inserted = folder.insert(rest, full_path);
                self.children.push((head.to_string(), TreeNode::Folder(folder)));
                inserted
            }
            (Some(idx), true) => matches!(&self.children[idx].1, TreeNode::Track(p) if p == full_path),
            (Some(idx), false) => match &mut self.children[idx].1 {
                TreeNode::Folder(folder) => folder.insert(rest, full_path),
                TreeNode::Track(_) => false,
            },
        }
    }
}

/// Build the tree for `paths`, in input order.  On a folder/track name
/// collision the first-seen node wins and the later path is skipped.
pub fn build_tree<S: AsRef<str>>(paths: &[S]) -> Folder {
    let mut root = Folder::default();
    for path in paths {
        let path = path.as_ref();
        let segments: Vec<&str> = path.split(SEPARATOR).collect();
        if !root.insert(&segments, path) {
            debug!("playlist: skipping colliding path {:?}", path);
        }
    }
    root
}

// ── Classification ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeClass {
    pub highlighted: bool,
    pub dimmed: bool,
}

fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once(SEPARATOR).map(|(parent, _)| parent)
}

pub fn classify_track(path: &str, current: Option<&str>, loop_mode: Option<LoopMode>) -> NodeClass {
    let Some(current) = current else {
        return NodeClass::default();
    };
    let highlighted = path == current;
    let dimmed = !highlighted
        && loop_mode == Some(LoopMode::List)
        && matches!((parent_of(path), parent_of(current)), (Some(a), Some(b)) if a == b);
    NodeClass { highlighted, dimmed }
}

pub fn classify_folder(
    folder_path: &str,
    current: Option<&str>,
    loop_mode: Option<LoopMode>,
) -> NodeClass {
    let dimmed = loop_mode == Some(LoopMode::List)
        && current
            .and_then(|c| c.strip_prefix(folder_path))
            .map(|rest| rest.starts_with(SEPARATOR))
            .unwrap_or(false);
    NodeClass {
        highlighted: false,
        dimmed,
    }
}

// ── View ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum RowKind {
    Folder { expanded: bool },
    Track,
}

/// One visible line of the explorer.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub depth: usize,
    pub name: String,
    /// Folder path (joined segments) or the track's full path.
    pub path: String,
    pub kind: RowKind,
    pub class: NodeClass,
}

/// Tree plus per-folder expansion state.  Folders start collapsed and
/// `rebuild` collapses everything again.
#[derive(Debug, Clone, Default)]
pub struct PlaylistView {
    root: Folder,
    expanded: HashSet<String>,
}

impl PlaylistView {
    pub fn new<S: AsRef<str>>(paths: &[S]) -> Self {
        Self {
            root: build_tree(paths),
            expanded: HashSet::new(),
        }
    }

    pub fn rebuild<S: AsRef<str>>(&mut self, paths: &[S]) {
        self.root = build_tree(paths);
        self.expanded.clear();
    }

    pub fn root(&self) -> &Folder {
        &self.root
    }

    pub fn is_expanded(&self, folder_path: &str) -> bool {
        self.expanded.contains(folder_path)
    }

    /// Flip a folder open/closed.  Returns the new state.
    pub fn toggle(&mut self, folder_path: &str) -> bool {
        if self.expanded.remove(folder_path) {
            false
        } else {
            self.expanded.insert(folder_path.to_string());
            true
        }
    }

    /// Visible rows, depth-first, descending only into expanded folders.
    pub fn rows(&self, current: Option<&str>, loop_mode: Option<LoopMode>) -> Vec<Row> {
        let mut rows = Vec::new();
        self.collect(&self.root, "", 0, current, loop_mode, &mut rows);
        rows
    }

    fn collect(
        &self,
        folder: &Folder,
        parent_path: &str,
        depth: usize,
        current: Option<&str>,
        loop_mode: Option<LoopMode>,
        rows: &mut Vec<Row>,
    ) {
        for (name, node) in folder.children() {
            match node {
                TreeNode::Track(path) => rows.push(Row {
                    depth,
                    name: name.clone(),
                    path: path.clone(),
                    kind: RowKind::Track,
                    class: classify_track(path, current, loop_mode),
                }),
                TreeNode::Folder(child) => {
                    let path = if parent_path.is_empty() {
                        name.clone()
                    } else {
                        format!("{}{}{}", parent_path, SEPARATOR, name)
                    };
                    let expanded = self.is_expanded(&path);
                    rows.push(Row {
                        depth,
                        name: name.clone(),
                        path: path.clone(),
                        kind: RowKind::Folder { expanded },
                        class: classify_folder(&path, current, loop_mode),
                    });
                    if expanded {
                        self.collect(child, &path, depth + 1, current, loop_mode, rows);
                    }
                }
            }
        }
    }
}
