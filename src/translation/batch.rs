/*!
 * Batches of pending catalog entries.
 *
 * A batch is immutable once built. Degrading a failed batch produces new
 * size-1 batches instead of mutating the original.
 */

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::catalog::CatalogEntry;

/// Default number of entries per batch
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Ordered, immutable slice of entries sent to a backend in one call
#[derive(Debug, Clone)]
pub struct Batch {
    /// Position of the batch in the run (0-based)
    index: usize,
    /// Entries, shared between the batch and the singles derived from it
    entries: Arc<[CatalogEntry]>,
}

impl Batch {
    /// Create a batch from entries
    pub fn new(index: usize, entries: Vec<CatalogEntry>) -> Self {
        Self {
            index,
            entries: entries.into(),
        }
    }

    /// Split pending entries into batches of at most `batch_size`; the last one may be smaller
    pub fn partition(entries: Vec<CatalogEntry>, batch_size: usize) -> Vec<Batch> {
        let size = batch_size.max(1);
        let mut batches = Vec::with_capacity(entries.len().div_ceil(size));
        let mut current = Vec::with_capacity(size.min(entries.len()));

        for entry in entries {
            current.push(entry);
            if current.len() == size {
                let index = batches.len();
                batches.push(Batch::new(index, std::mem::take(&mut current)));
            }
        }
        if !current.is_empty() {
            let index = batches.len();
            batches.push(Batch::new(index, current));
        }

        batches
    }

    /// Size-1 batches for per-entry fallback, keeping the parent index
    pub fn singles(&self) -> Vec<Batch> {
        self.entries
            .iter()
            .map(|entry| Batch::new(self.index, vec![entry.clone()]))
            .collect()
    }

    /// Position of the batch in the run
    pub fn index(&self) -> usize {
        self.index
    }

    /// Entries in order
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Entry ids in order; results are matched against these
    pub fn keys(&self) -> impl Iterator<Item = Cow<'_, str>> {
        self.entries.iter().map(|e| e.id())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether this is a single-entry batch
    pub fn is_single(&self) -> bool {
        self.entries.len() == 1
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch #{} ({} entries)", self.index + 1, self.entries.len())
    }
}
