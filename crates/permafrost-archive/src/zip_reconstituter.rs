//! Container reader: reconstitutes the named tree from a mapped ZIP.
//!
//! The central directory is parsed exactly once, into an ordered tree of
//! nodes whose leaf regions are zero-copy sub-slices of the container
//! mapping. Lookups never touch the archive bytes again, and every
//! region returned shares the container's ownership handle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use permafrost_core::{map_file, FrozenRegion};

use crate::error::{ArchiveError, Result};
use crate::path::{Path, PathElement};
use crate::structured::{
    DirectoryEntry, RegionGetter, StructureGetter, StructuredReconstituter,
};
use crate::zip::read_directory;

/// One node of the reconstituted tree. A node may hold a payload,
/// children, or both (a leaf and a sub-tree may share a name).
struct Node {
    path: Path,
    region: Option<FrozenRegion>,
    children: BTreeMap<PathElement, Arc<Node>>,
}

/// Mutable tree used only while indexing the directory.
#[derive(Default)]
struct BuildNode {
    region: Option<FrozenRegion>,
    children: BTreeMap<PathElement, BuildNode>,
}

impl BuildNode {
    fn insert(&mut self, elements: &[PathElement], region: FrozenRegion) {
        match elements {
            [] => self.region = Some(region),
            [first, rest @ ..] => self
                .children
                .entry(first.clone())
                .or_default()
                .insert(rest, region),
        }
    }

    fn freeze(self, path: Path) -> Arc<Node> {
        let children = self
            .children
            .into_iter()
            .map(|(name, child)| {
                let frozen = child.freeze(path.child(name.clone()));
                (name, frozen)
            })
            .collect();
        Arc::new(Node {
            path,
            region: self.region,
            children,
        })
    }
}

/// [`StructuredReconstituter`] over an uncompressed ZIP container.
///
/// Read-only after construction and freely shareable; sub-structures are
/// views into the same `Arc`-shared tree.
pub struct ZipStructuredReconstituter {
    node: Arc<Node>,
}

impl ZipStructuredReconstituter {
    /// Map a container from a `file://` URL and index it.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::Region`] for mapping failures (including
    /// non-`file://` schemes), or any error of
    /// [`from_region`](ZipStructuredReconstituter::from_region).
    pub fn open(url: &str) -> Result<Self> {
        Self::from_region(map_file(url, 0, None)?)
    }

    /// Index an already frozen region containing the ZIP bytes.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::UnsupportedContainer`] when the bytes are not a
    /// stored-only ZIP, or [`ArchiveError::InvalidPath`] when an entry
    /// name does not parse.
    pub fn from_region(container: FrozenRegion) -> Result<Self> {
        let started = Instant::now();
        let raw = read_directory(container.data())?;

        let mut root = BuildNode::default();
        for entry in &raw {
            let path = Path::parse(&entry.name)?;
            if path.is_empty() {
                return Err(ArchiveError::UnsupportedContainer(
                    "container holds an entry with an empty name".to_string(),
                ));
            }
            let region = container.range(entry.data_offset, entry.data_offset + entry.size)?;
            root.insert(path.elements(), region);
        }

        debug!(
            entries = raw.len(),
            elapsed = ?started.elapsed(),
            "indexed container directory"
        );
        Ok(Self {
            node: root.freeze(Path::root()),
        })
    }

    fn view(node: Arc<Node>) -> Box<dyn StructuredReconstituter> {
        Box::new(Self { node })
    }
}

impl StructuredReconstituter for ZipStructuredReconstituter {
    fn context(&self) -> String {
        format!("zip://{}", self.node.path)
    }

    fn get_directory(&self) -> Vec<DirectoryEntry> {
        self.node
            .children
            .iter()
            .map(|(name, child)| {
                let region = child.region.clone().map(|region| -> RegionGetter {
                    Box::new(move || region.clone())
                });
                let structure = (!child.children.is_empty()).then(|| -> StructureGetter {
                    let child = Arc::clone(child);
                    Box::new(move || Self::view(Arc::clone(&child)))
                });
                DirectoryEntry::new(name.clone(), region, structure)
            })
            .collect()
    }

    fn get_region(&self, name: &PathElement) -> Result<FrozenRegion> {
        self.node
            .children
            .get(name)
            .and_then(|child| child.region.clone())
            .ok_or_else(|| ArchiveError::NotFound {
                name: name.to_string(),
                context: self.context(),
            })
    }

    fn get_structure(&self, name: &PathElement) -> Result<Box<dyn StructuredReconstituter>> {
        match self.node.children.get(name) {
            Some(child) if !child.children.is_empty() => Ok(Self::view(Arc::clone(child))),
            _ => Err(ArchiveError::NotFound {
                name: name.to_string(),
                context: self.context(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured::StructuredSerializer;
    use crate::zip_serializer::ZipStructuredSerializer;

    fn el(text: &str) -> PathElement {
        PathElement::new(text).unwrap()
    }

    fn container(entries: &[(&str, &[u8])]) -> ZipStructuredReconstituter {
        let mut bytes = Vec::new();
        {
            let mut writer = crate::zip::ZipWriter::new(&mut bytes);
            for (name, data) in entries {
                writer.add_entry(name, data).unwrap();
            }
            writer.finish().unwrap();
        }
        ZipStructuredReconstituter::from_region(FrozenRegion::from_vec(bytes)).unwrap()
    }

    #[test]
    fn test_lookup() {
        let reader = container(&[("a", b"hello"), ("b/c", b"world"), ("b/d", b"")]);

        assert_eq!(reader.get_region(&el("a")).unwrap().data(), b"hello");
        let b = reader.get_structure(&el("b")).unwrap();
        assert_eq!(b.get_region(&el("c")).unwrap().data(), b"world");
        assert!(b.get_region(&el("d")).unwrap().is_empty());
    }

    #[test]
    fn test_recursive_lookup() {
        let reader = container(&[("x/y/z", b"deep")]);
        let path: Path = [el("x"), el("y"), el("z")].into_iter().collect();
        assert_eq!(reader.get_region_recursive(&path).unwrap().data(), b"deep");

        let dir_path: Path = [el("x"), el("y")].into_iter().collect();
        let y = reader.get_structure_recursive(&dir_path).unwrap();
        assert_eq!(y.get_region(&el("z")).unwrap().data(), b"deep");
    }

    #[test]
    fn test_not_found() {
        let reader = container(&[("a", b"x"), ("b/c", b"y")]);

        assert!(matches!(
            reader.get_region(&el("missing")),
            Err(ArchiveError::NotFound { .. })
        ));
        // `b` has children but no payload of its own.
        assert!(matches!(
            reader.get_region(&el("b")),
            Err(ArchiveError::NotFound { .. })
        ));
        // `a` is a leaf, not a structure.
        assert!(matches!(
            reader.get_structure(&el("a")),
            Err(ArchiveError::NotFound { .. })
        ));
    }

    #[test]
    fn test_directory_listing_ordered_by_name() {
        let reader = container(&[("zz", b"1"), ("aa", b"2"), ("mm/x", b"3")]);
        let names: Vec<String> = reader
            .get_directory()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, ["aa", "mm", "zz"]);
    }

    #[test]
    fn test_name_as_both_leaf_and_structure() {
        let reader = container(&[("b", b"leaf"), ("b/c", b"child")]);

        let listing = reader.get_directory();
        assert_eq!(listing.len(), 1);
        assert!(listing[0].is_leaf());
        assert!(listing[0].has_children());

        assert_eq!(reader.get_region(&el("b")).unwrap().data(), b"leaf");
        let sub = reader.get_structure(&el("b")).unwrap();
        assert_eq!(sub.get_region(&el("c")).unwrap().data(), b"child");
    }

    #[test]
    fn test_regions_are_zero_copy() {
        let bytes = {
            let mut bytes = Vec::new();
            let mut writer = crate::zip::ZipWriter::new(&mut bytes);
            writer.add_entry("a", b"hello").unwrap();
            writer.finish().unwrap();
            bytes
        };
        let container = FrozenRegion::from_vec(bytes);
        let base = container.data().as_ptr() as usize;
        let len = container.len();

        let reader = ZipStructuredReconstituter::from_region(container).unwrap();
        let region = reader.get_region(&el("a")).unwrap();
        let ptr = region.data().as_ptr() as usize;
        assert!(ptr >= base && ptr + region.len() <= base + len);
    }

    #[test]
    fn test_roundtrip_through_serializer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.zip");

        let serializer = ZipStructuredSerializer::create(&path).unwrap();
        serializer
            .add_region(&el("a"), &FrozenRegion::from_vec(b"alpha".to_vec()))
            .unwrap();
        let sub = serializer.new_structure(&el("nested")).unwrap();
        sub.add_region(&el("b"), &FrozenRegion::from_vec(b"beta".to_vec()))
            .unwrap();
        drop(sub);
        serializer.commit().unwrap();
        drop(serializer);

        let reader =
            ZipStructuredReconstituter::open(&format!("file://{}", path.display())).unwrap();
        assert_eq!(reader.get_region(&el("a")).unwrap().data(), b"alpha");
        assert_eq!(
            reader
                .get_structure(&el("nested"))
                .unwrap()
                .get_region(&el("b"))
                .unwrap()
                .data(),
            b"beta"
        );
    }
}
