//! Pending reverse links, keyed by target node index.

const NIL: u32 = u32::MAX;

/// Multimap from target node to the sources of its pending reverse links.
///
/// Entries are chained per target with the newest first, so
/// [`ReverseLinkIndex::sources`] yields sources in reverse registration
/// order. All storage is reused across [`ReverseLinkIndex::reset`] calls.
#[derive(Debug, Default, Clone)]
pub struct ReverseLinkIndex {
    heads: Vec<u32>,
    next: Vec<u32>,
    sources: Vec<u32>,
}

impl ReverseLinkIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all entries and sizes the index for `nodes` targets.
    pub fn reset(&mut self, nodes: usize) {
        if self.heads.capacity() < nodes {
            self.heads = vec![NIL; nodes];
        } else {
            self.heads.clear();
            self.heads.resize(nodes, NIL);
        }
        self.next.clear();
        self.sources.clear();
    }

    /// Registers a reverse link from `target` back to `source`.
    pub fn add(&mut self, target: usize, source: usize) {
        let entry = self.sources.len() as u32;
        self.sources.push(source as u32);
        self.next.push(self.heads[target]);
        self.heads[target] = entry;
    }

    /// Total number of registered entries.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no entry is registered.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Sources registered for `target`, newest first.
    pub fn sources(&self, target: usize) -> Sources<'_> {
        Sources {
            index: self,
            cursor: self.heads.get(target).copied().unwrap_or(NIL),
        }
    }
}

/// Iterator returned by [`ReverseLinkIndex::sources`].
#[derive(Debug)]
pub struct Sources<'a> {
    index: &'a ReverseLinkIndex,
    cursor: u32,
}

impl Iterator for Sources<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.cursor == NIL {
            return None;
        }
        let entry = self.cursor as usize;
        self.cursor = self.index.next[entry];
        Some(self.index.sources[entry] as usize)
    }
}
