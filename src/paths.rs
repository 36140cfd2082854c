use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the single document in the `expenses` root that is treated
/// as the legacy expenses project.
pub const LEGACY_EXPENSES_PROJECT_ID: &str = "B91ZvtvPvg2GGoKixLS0";

/// The two disjoint top-level collections holding project-shaped documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionRoot {
    Projects,
    Expenses,
}

impl CollectionRoot {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionRoot::Projects => "projects",
            CollectionRoot::Expenses => "expenses",
        }
    }

    pub fn collection(&self) -> CollectionPath {
        CollectionPath(self.as_str().to_string())
    }
}

impl fmt::Display for CollectionRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide which root a project's sections and items live under.
///
/// This is the only place the legacy identifier is compared; every path the
/// tracker builds goes through [`ProjectPaths::resolve`] which calls it.
pub fn resolve_collection_root(project_id: &str) -> CollectionRoot {
    if project_id == LEGACY_EXPENSES_PROJECT_ID {
        CollectionRoot::Expenses
    } else {
        CollectionRoot::Projects
    }
}

fn validate_segment(segment: &str) -> Result<&str, StoreError> {
    if segment.is_empty() || segment.contains('/') {
        return Err(StoreError::InvalidPath(segment.to_string()));
    }
    Ok(segment)
}

/// Slash-separated path of a collection, e.g. `projects/abc/sections`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn doc(&self, id: &str) -> Result<DocPath, StoreError> {
        let id = validate_segment(id)?;
        Ok(DocPath {
            collection: self.clone(),
            id: id.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path of a single document: its parent collection plus its identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocPath {
    collection: CollectionPath,
    id: String,
}

impl DocPath {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn sub_collection(&self, name: &str) -> Result<CollectionPath, StoreError> {
        let name = validate_segment(name)?;
        Ok(CollectionPath(format!("{}/{}", self, name)))
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Builds every store path under one project.
#[derive(Clone, Debug)]
pub struct ProjectPaths {
    root: CollectionRoot,
    project: DocPath,
}

impl ProjectPaths {
    /// Paths for a project whose root is decided by [`resolve_collection_root`].
    pub fn resolve(project_id: &str) -> Result<Self, StoreError> {
        Self::in_root(resolve_collection_root(project_id), project_id)
    }

    /// Paths for a project listed from a known root (the dashboard case).
    pub fn in_root(root: CollectionRoot, project_id: &str) -> Result<Self, StoreError> {
        Ok(ProjectPaths {
            root,
            project: root.collection().doc(project_id)?,
        })
    }

    pub fn root(&self) -> CollectionRoot {
        self.root
    }

    pub fn project(&self) -> &DocPath {
        &self.project
    }

    pub fn sections(&self) -> Result<CollectionPath, StoreError> {
        self.project.sub_collection("sections")
    }

    pub fn section(&self, section_id: &str) -> Result<DocPath, StoreError> {
        self.sections()?.doc(section_id)
    }

    pub fn items(&self, section_id: &str) -> Result<CollectionPath, StoreError> {
        self.section(section_id)?.sub_collection("items")
    }

    pub fn item(&self, section_id: &str, item_id: &str) -> Result<DocPath, StoreError> {
        self.items(section_id)?.doc(item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_id_resolves_to_expenses() {
        assert_eq!(
            resolve_collection_root(LEGACY_EXPENSES_PROJECT_ID),
            CollectionRoot::Expenses
        );
        assert_eq!(resolve_collection_root("abc"), CollectionRoot::Projects);
        assert_eq!(resolve_collection_root(""), CollectionRoot::Projects);
    }

    #[test]
    fn builds_nested_item_path() {
        let paths = ProjectPaths::resolve("p1").unwrap();
        assert_eq!(
            paths.item("s1", "i1").unwrap().to_string(),
            "projects/p1/sections/s1/items/i1"
        );

        let legacy = ProjectPaths::resolve(LEGACY_EXPENSES_PROJECT_ID).unwrap();
        assert_eq!(
            legacy.items("s1").unwrap().to_string(),
            format!("expenses/{}/sections/s1/items", LEGACY_EXPENSES_PROJECT_ID)
        );
    }

    #[test]
    fn rejects_segments_with_separators() {
        assert!(matches!(
            ProjectPaths::resolve("a/b"),
            Err(StoreError::InvalidPath(_))
        ));
        let paths = ProjectPaths::resolve("p1").unwrap();
        assert!(paths.section("").is_err());
    }
}
