/// A locally edited copy of a record next to the last value confirmed persisted.
///
/// A save should only be offered (and issued) while [`Draft::is_modified`]
/// holds; after a successful save the snapshot is replaced by what the server
/// returned, not by the local draft.
#[derive(Clone, Debug, PartialEq)]
pub struct Draft<T> {
    snapshot: T,
    draft: T,
}

impl<T: Clone + PartialEq> Draft<T> {
    pub fn new(snapshot: T) -> Self {
        Draft {
            draft: snapshot.clone(),
            snapshot,
        }
    }

    /// Rebuild a draft from a snapshot and edited values carried by a form.
    pub fn from_parts(snapshot: T, draft: T) -> Self {
        Draft { snapshot, draft }
    }

    pub fn snapshot(&self) -> &T {
        &self.snapshot
    }

    pub fn draft(&self) -> &T {
        &self.draft
    }

    pub fn edit(&mut self, f: impl FnOnce(&mut T)) {
        f(&mut self.draft);
    }

    pub fn is_modified(&self) -> bool {
        self.draft != self.snapshot
    }

    /// Discard local edits.
    pub fn reset(&mut self) {
        self.draft = self.snapshot.clone();
    }

    /// Accept the persisted value as both snapshot and draft.
    pub fn commit(&mut self, persisted: T) {
        self.draft = persisted.clone();
        self.snapshot = persisted;
    }
}
