//! Series carry-forward.
//!
//! Parts of a multi-part entry (episodes) are sorted directly after their
//! top-level entry, because the part's key extends the root's key. A part
//! whose partial key equals the most recent root's partial key inherits the
//! root's identity linkage and attached data instead of relying on its own
//! secondary matches alone.
//!
//! The remembered root is only ever compared with the record in hand. A part
//! with a different partial key forgets the root, so later parts of the same
//! series inherit nothing until a new root is seen. Records outside any
//! series never touch the remembered root.

/// Position of a composite record within a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lineage {
    /// Not part of a series.
    Standalone,
    /// Top-level series entry.
    SeriesRoot,
    /// Part of a series, such as an episode.
    SeriesPart,
}

/// A composite record that can take part in carry-forward.
pub trait Composite: Clone {
    /// Where this record sits in a series.
    fn lineage(&self) -> Lineage {
        Lineage::Standalone
    }

    /// Key with the part qualifiers removed.
    fn partial_key(&self) -> &[u8] {
        &[]
    }

    /// Copies linkage and attached data from the series root.
    fn inherit(&mut self, _root: &Self) {}
}

/// Remembers the last series root seen by the join.
#[derive(Debug)]
pub struct CarryForward<J> {
    root: Option<J>,
    inherited: u64,
}

impl<J: Composite> CarryForward<J> {
    /// Creates an empty carry-forward state.
    pub fn new() -> Self {
        Self { root: None, inherited: 0 }
    }

    /// Applies inheritance to `record` before its own secondaries attach.
    /// Returns true if it inherited from the remembered root.
    pub fn before_join(&mut self, record: &mut J) -> bool {
        if record.lineage() != Lineage::SeriesPart {
            return false;
        }
        let Some(root) = &self.root else {
            return false;
        };

        if record.partial_key() == root.partial_key() {
            record.inherit(root);
            self.inherited += 1;
            true
        } else {
            self.root = None;
            false
        }
    }

    /// Remembers `record` once fully joined if it is a series root.
    pub fn after_join(&mut self, record: &J) {
        if record.lineage() == Lineage::SeriesRoot {
            self.root = Some(record.clone());
        }
    }

    /// The remembered root, if any.
    pub fn root(&self) -> Option<&J> {
        self.root.as_ref()
    }

    /// Records that inherited from a root so far.
    pub fn inherited(&self) -> u64 {
        self.inherited
    }
}

impl<J: Composite> Default for CarryForward<J> {
    fn default() -> Self {
        Self::new()
    }
}
