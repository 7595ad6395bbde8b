//! Document store seam.
//!
//! The workflow only talks to [`Repository`]. [`SledRepository`] keeps one sled
//! tree per collection with CBOR-encoded documents keyed by id.
use crate::error::{Result, ValidationError, WorkflowError};
use sled::Db;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    ExpenseReports,
    Advances,
    Expenses,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::ExpenseReports => "expense_reports",
            Collection::Advances => "advances",
            Collection::Expenses => "expenses",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed, versioned document living in one collection.
pub trait Document: Clone + minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()> {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);

    /// Checks run on every document read back from the store.
    fn check(&self) -> std::result::Result<(), ValidationError> {
        Ok(())
    }
}

pub trait Repository {
    fn get_by_id<D: Document>(&self, id: &str) -> Result<Option<D>>;

    fn query<D, P>(&self, predicate: P) -> Result<Vec<D>>
    where
        D: Document,
        P: Fn(&D) -> bool;

    /// Stores a new document. Fails with `Conflict` if the id is taken.
    fn create<D: Document>(&self, doc: &D) -> Result<String>;

    /// Writes the whole next state of `doc` in one step, provided the stored
    /// version still equals `doc.version()`. Bumps the version on success.
    fn update<D: Document>(&self, doc: &mut D) -> Result<()>;

    fn delete<D: Document>(&self, doc: &D) -> Result<()>;

    fn get_required<D: Document>(&self, id: &str) -> Result<D> {
        self.get_by_id(id)?
            .ok_or_else(|| WorkflowError::not_found(D::COLLECTION, id))
    }
}

pub struct SledRepository {
    instance: Arc<Db>,
    flush_on_write: bool,
}

impl SledRepository {
    pub fn new(instance: Arc<Db>) -> Self {
        Self {
            instance,
            flush_on_write: false,
        }
    }

    pub fn with_flush_on_write(mut self, flush: bool) -> Self {
        self.flush_on_write = flush;
        self
    }

    fn tree(&self, collection: Collection) -> Result<sled::Tree> {
        Ok(self.instance.open_tree(collection.name())?)
    }

    fn encode<D: Document>(doc: &D) -> Result<Vec<u8>> {
        minicbor::to_vec(doc).map_err(|e| WorkflowError::Encoding(e.to_string()))
    }

    // malformed documents are rejected, never defaulted
    fn decode<D: Document>(id: &str, bytes: &[u8]) -> Result<D> {
        let malformed = |reason: String| WorkflowError::MalformedDocument {
            collection: D::COLLECTION,
            id: id.to_string(),
            reason,
        };
        let doc: D = minicbor::decode(bytes).map_err(|e| malformed(e.to_string()))?;
        doc.check().map_err(|e| malformed(e.to_string()))?;
        if doc.id() != id {
            return Err(malformed(format!("stored under mismatched id '{}'", doc.id())));
        }
        Ok(doc)
    }

    fn flush(&self, tree: &sled::Tree) -> Result<()> {
        if self.flush_on_write {
            tree.flush()?;
        }
        Ok(())
    }
}

impl Repository for SledRepository {
    fn get_by_id<D: Document>(&self, id: &str) -> Result<Option<D>> {
        debug!(collection = %D::COLLECTION, id, "get_by_id");
        match self.tree(D::COLLECTION)?.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(id, &bytes)?)),
            None => Ok(None),
        }
    }

    fn query<D, P>(&self, predicate: P) -> Result<Vec<D>>
    where
        D: Document,
        P: Fn(&D) -> bool,
    {
        debug!(collection = %D::COLLECTION, "query");
        let mut found = vec![];
        for item in self.tree(D::COLLECTION)?.iter() {
            let (key, bytes) = item?;
            let id = String::from_utf8_lossy(&key);
            let doc: D = Self::decode(&id, &bytes)?;
            if predicate(&doc) {
                found.push(doc);
            }
        }
        Ok(found)
    }

    fn create<D: Document>(&self, doc: &D) -> Result<String> {
        let tree = self.tree(D::COLLECTION)?;
        let bytes = Self::encode(doc)?;

        tree.compare_and_swap(doc.id().as_bytes(), None::<&[u8]>, Some(bytes))?
            .map_err(|_| WorkflowError::Conflict {
                collection: D::COLLECTION,
                id: doc.id().to_string(),
            })?;
        self.flush(&tree)?;

        debug!(collection = %D::COLLECTION, id = doc.id(), "created");
        Ok(doc.id().to_string())
    }

    fn update<D: Document>(&self, doc: &mut D) -> Result<()> {
        let tree = self.tree(D::COLLECTION)?;
        let conflict = || WorkflowError::Conflict {
            collection: D::COLLECTION,
            id: doc.id().to_string(),
        };

        let stored = tree
            .get(doc.id().as_bytes())?
            .ok_or_else(|| WorkflowError::not_found(D::COLLECTION, doc.id()))?;
        let current: D = Self::decode(doc.id(), &stored)?;
        if current.version() != doc.version() {
            return Err(conflict());
        }

        let mut next = doc.clone();
        next.set_version(doc.version() + 1);
        let bytes = Self::encode(&next)?;

        // the swap only lands if nobody wrote since `stored` was read
        tree.compare_and_swap(doc.id().as_bytes(), Some(stored), Some(bytes))?
            .map_err(|_| conflict())?;
        self.flush(&tree)?;

        debug!(collection = %D::COLLECTION, id = doc.id(), version = next.version(), "updated");
        *doc = next;
        Ok(())
    }

    fn delete<D: Document>(&self, doc: &D) -> Result<()> {
        let tree = self.tree(D::COLLECTION)?;
        let stored = tree
            .get(doc.id().as_bytes())?
            .ok_or_else(|| WorkflowError::not_found(D::COLLECTION, doc.id()))?;
        let current: D = Self::decode(doc.id(), &stored)?;
        if current.version() != doc.version() {
            return Err(WorkflowError::Conflict {
                collection: D::COLLECTION,
                id: doc.id().to_string(),
            });
        }

        tree.compare_and_swap(doc.id().as_bytes(), Some(stored), None::<Vec<u8>>)?
            .map_err(|_| WorkflowError::Conflict {
                collection: D::COLLECTION,
                id: doc.id().to_string(),
            })?;
        self.flush(&tree)?;

        debug!(collection = %D::COLLECTION, id = doc.id(), "deleted");
        Ok(())
    }
}
