//! Converting between the index's flat path list and hierarchical tree
//! objects, in both directions.
//!
//! A tree object's content is a run of `"<mode> <name>\0"` records each
//! followed by a raw 20-byte id, with no padding and no separators.
//! Child order is the encounter order while walking the index, which is
//! raw path-component byte order because the index is kept sorted.
//!
//! Writing happens in a single post-order pass: every directory child
//! is written first to obtain its id, the node is updated in place, and
//! then the directory's own record list is serialized and stored.

use crate::codec::{ByteReader, ByteWriter};
use crate::error::{Error, Result};
use crate::index::{Index, IndexEntry};
use crate::object::{load_object, store_object, Object};
use crate::repository::Repository;
use crate::types::{ObjectId, ObjectKind};

/// the ASCII mode of a directory entry inside a tree object
pub const DIR_MODE: &str = "40000";

/// recursion bound for adversarially deep trees
const MAX_DEPTH: usize = 512;

/// In-memory tree node; never persisted as such.
///
/// A node with children is a directory, a node without is a file
/// pointing at a blob. `object_id` stays unset on directories until
/// [`write_tree`] computes it bottom-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub mode: String,
    pub object_id: Option<ObjectId>,
    children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn new(name: impl Into<String>, mode: impl Into<String>, object_id: Option<ObjectId>) -> Self {
        Self {
            name: name.into(),
            mode: mode.into(),
            object_id,
            children: Vec::new(),
        }
    }

    /// an unnamed directory node to build under
    pub fn root() -> Self {
        Self::new("", DIR_MODE, None)
    }

    pub fn is_branch(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn children(&self) -> &[TreeNode] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&TreeNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// add a child, replacing an existing child with the same name
    pub fn add(&mut self, child: TreeNode) {
        match self.children.iter().position(|c| c.name == child.name) {
            Some(i) => self.children[i] = child,
            None => self.children.push(child),
        }
    }

    /// find or create a directory child, preserving encounter order
    fn ensure_dir(&mut self, name: &str) -> &mut TreeNode {
        if let Some(i) = self.children.iter().position(|c| c.name == name) {
            &mut self.children[i]
        } else {
            self.children.push(TreeNode::new(name, DIR_MODE, None));
            let last = self.children.len() - 1;
            &mut self.children[last]
        }
    }
}

/// Build a tree of nodes from the index's flat path list.
///
/// Directories are de-duplicated by name at each level; leaves carry
/// the entry's permission mode and object id.
pub fn build_from_index(index: &Index) -> TreeNode {
    let mut root = TreeNode::root();

    for entry in index.entries() {
        let mut parts: Vec<&str> = entry.path.split('/').collect();
        let filename = parts.pop().unwrap_or_default();

        let mut current = &mut root;
        for dirname in parts {
            current = current.ensure_dir(dirname);
        }

        current.add(TreeNode::new(
            filename,
            entry.tree_mode(),
            Some(entry.object_id),
        ));
    }

    root
}

/// Write a node and its subtree to the object store, post-order,
/// returning the root tree's id.
///
/// Directory nodes are mutated in place to hold their computed ids.
pub fn write_tree(repo: &Repository, root: &mut TreeNode) -> Result<ObjectId> {
    write_tree_at(repo, root, 0)
}

fn write_tree_at(repo: &Repository, node: &mut TreeNode, depth: usize) -> Result<ObjectId> {
    if depth > MAX_DEPTH {
        return Err(Error::TreeDepthExceeded);
    }

    let mut writer = ByteWriter::new();
    for child in &mut node.children {
        if child.is_branch() {
            let id = write_tree_at(repo, child, depth + 1)?;
            child.object_id = Some(id);
        }

        let id = child.object_id.ok_or_else(|| {
            Error::MalformedTree(format!("node {} has no object id", child.name))
        })?;

        writer.write_cstring(&format!("{} {}", child.mode, child.name));
        writer.write_sha1(&id);
    }

    let obj = Object::new(ObjectKind::Tree, writer.into_bytes());
    store_object(repo, &obj)
}

/// Convenience: build from the index and write, returning the root id.
pub fn write_tree_from_index(repo: &Repository, index: &Index) -> Result<ObjectId> {
    let mut root = build_from_index(index);
    write_tree(repo, &mut root)
}

/// Read a stored tree back into nodes, pre-order.
pub fn read_tree(repo: &Repository, id: &ObjectId) -> Result<TreeNode> {
    let mut root = TreeNode::root();
    root.object_id = Some(*id);
    read_tree_into(repo, &mut root, 0)?;
    Ok(root)
}

fn read_tree_into(repo: &Repository, node: &mut TreeNode, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::TreeDepthExceeded);
    }

    let id = node
        .object_id
        .ok_or_else(|| Error::MalformedTree("directory node without an id".to_string()))?;

    let obj = load_object(repo, &id.to_hex())?;
    if obj.kind != ObjectKind::Tree {
        return Err(Error::NotATree(id.to_hex()));
    }

    let mut reader = ByteReader::new(&obj.content);
    while !reader.is_eof() {
        let info = reader.read_cstring()?;
        let (mode, name) = info
            .split_once(' ')
            .ok_or_else(|| Error::MalformedTree(format!("bad entry record: {}", info)))?;
        let child_id = reader.read_sha1()?;

        node.add(TreeNode::new(name, mode, Some(child_id)));
    }

    for child in &mut node.children {
        if child.mode == DIR_MODE {
            read_tree_into(repo, child, depth + 1)?;
        }
    }

    Ok(())
}

/// One step of a tree walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeItem<'a> {
    pub mode: &'a str,
    pub kind: ObjectKind,
    pub object_id: Option<ObjectId>,
    pub path: String,
}

/// Lazy depth-first walk over an in-memory tree.
///
/// Restartable: each call to [`walk`] yields a fresh iterator. When not
/// recursive, directories are reported as themselves without
/// descending.
pub struct TreeWalk<'a> {
    stack: Vec<(&'a TreeNode, String)>,
    recursive: bool,
}

pub fn walk(root: &TreeNode, recursive: bool) -> TreeWalk<'_> {
    let mut stack = Vec::new();
    for child in root.children().iter().rev() {
        stack.push((child, child.name.clone()));
    }

    TreeWalk { stack, recursive }
}

impl<'a> Iterator for TreeWalk<'a> {
    type Item = TreeItem<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (node, path) = self.stack.pop()?;

        if node.is_branch() && self.recursive {
            for child in node.children().iter().rev() {
                self.stack.push((child, format!("{}/{}", path, child.name)));
            }
        }

        Some(TreeItem {
            mode: &node.mode,
            kind: if node.is_branch() {
                ObjectKind::Tree
            } else {
                ObjectKind::Blob
            },
            object_id: node.object_id,
            path,
        })
    }
}

/// Flatten a stored tree back into an index with zeroed stat fields.
pub fn index_from_tree(repo: &Repository, id: &ObjectId) -> Result<Index> {
    let root = read_tree(repo, id)?;
    let mut index = Index::new();

    for item in walk(&root, true) {
        if item.kind == ObjectKind::Tree {
            continue;
        }

        let object_id = item
            .object_id
            .ok_or_else(|| Error::MalformedTree(format!("leaf {} has no object id", item.path)))?;
        index.add(IndexEntry::from_cacheinfo(item.mode, object_id, item.path)?);
    }

    Ok(index)
}
