//! Read-group reconciliation across input files.
//!
//! Every input file numbers its read groups from zero. Before records from
//! several files can share one output, each local index must be mapped to a
//! canonical index in a single namespace where one run identifier appears
//! exactly once.
//!
//! The [`ReadGroupRegistry`] is filled during a single-threaded discovery pass.
//! [`ReadGroupRegistry::freeze`] then consumes it and publishes an immutable
//! [`FrozenRegistry`] that workers share without locking.

use std::fmt;
use std::sync::Arc;

use crate::{AuxField, Header, ReadGroup, Result, S5Error};

/// Index of a read group in the merged namespace
pub type CanonicalId = u32;

/// Per-file mapping from local read-group index to [`CanonicalId`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemapTable {
    ids: Vec<CanonicalId>,
}
impl RemapTable {
    pub fn len(&self) -> usize {
        self.ids.len()
    }
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
    pub fn as_slice(&self) -> &[CanonicalId] {
        &self.ids
    }

    /// Maps a local read-group index, rejecting indices the file never declared.
    pub fn remap(&self, local: u32) -> Result<CanonicalId> {
        self.ids
            .get(local as usize)
            .copied()
            .ok_or(S5Error::InvalidReadGroup {
                idx: local,
                max: self.ids.len(),
            })
    }
}
impl From<Vec<CanonicalId>> for RemapTable {
    fn from(ids: Vec<CanonicalId>) -> Self {
        Self { ids }
    }
}

/// How an incoming read group differs from the canonical group sharing its run id
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DivergenceKind {
    /// Different number of attributes
    KeyCount { canonical: usize, incoming: usize },
    /// Same number of attributes under different keys
    KeySet,
    /// Same keys, first differing value
    Value { key: String },
}

/// A read group that was folded into an existing canonical group although its
/// other attributes differ. The canonical group keeps its first values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeDivergence {
    pub run_id: String,
    pub canonical_id: CanonicalId,
    pub source: String,
    pub local_group: usize,
    pub kind: DivergenceKind,
}
impl fmt::Display for AttributeDivergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read group {} of {} shares run_id {} with read group {} but ",
            self.local_group, self.source, self.run_id, self.canonical_id
        )?;
        match &self.kind {
            DivergenceKind::KeyCount {
                canonical,
                incoming,
            } => write!(f, "has {incoming} attributes instead of {canonical}"),
            DivergenceKind::KeySet => write!(f, "has a different attribute set"),
            DivergenceKind::Value { key } => write!(f, "differs in attribute {key}"),
        }
    }
}

fn compare(canonical: &ReadGroup, incoming: &ReadGroup) -> Option<DivergenceKind> {
    if canonical.attrs.len() != incoming.attrs.len() {
        return Some(DivergenceKind::KeyCount {
            canonical: canonical.attrs.len(),
            incoming: incoming.attrs.len(),
        });
    }
    if !canonical.attrs.keys().eq(incoming.attrs.keys()) {
        return Some(DivergenceKind::KeySet);
    }
    canonical
        .attrs
        .iter()
        .zip(incoming.attrs.values())
        .find(|((_, a), b)| a != b)
        .map(|((key, _), _)| DivergenceKind::Value { key: key.clone() })
}

/// Mutable registry used during discovery.
///
/// # Examples
///
/// ```rust
/// use s5tools::{Header, ReadGroup, ReadGroupRegistry};
///
/// # fn main() -> s5tools::Result<()> {
/// let mut a = Header::new();
/// a.add_read_group(ReadGroup::with_run_id("r1"));
/// a.add_read_group(ReadGroup::with_run_id("r1"));
/// let mut b = Header::new();
/// b.add_read_group(ReadGroup::with_run_id("r1x"));
///
/// let mut registry = ReadGroupRegistry::new();
/// assert_eq!(registry.register_header(&a, "a.blow5")?.as_slice(), &[0, 0]);
/// assert_eq!(registry.register_header(&b, "b.blow5")?.as_slice(), &[1]);
///
/// let frozen = registry.freeze();
/// assert_eq!(frozen.num_groups(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct ReadGroupRegistry {
    groups: Vec<ReadGroup>,
    remaps: Vec<RemapTable>,
    divergences: Vec<AttributeDivergence>,
}
impl ReadGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical id for a read group, appending it when its run id
    /// has not been seen before.
    pub fn insert(&mut self, attrs: &ReadGroup) -> Result<CanonicalId> {
        self.insert_from(attrs, "-", 0)
    }

    fn insert_from(
        &mut self,
        attrs: &ReadGroup,
        source: &str,
        local_group: usize,
    ) -> Result<CanonicalId> {
        let run_id = attrs.run_id().ok_or_else(|| S5Error::MissingRunId {
            path: source.to_string(),
            group: local_group,
        })?;

        // linear scan, the number of distinct runs is small
        if let Some(id) = self.groups.iter().position(|rg| rg.run_id() == Some(run_id)) {
            if let Some(kind) = compare(&self.groups[id], attrs) {
                self.divergences.push(AttributeDivergence {
                    run_id: run_id.to_string(),
                    canonical_id: id as CanonicalId,
                    source: source.to_string(),
                    local_group,
                    kind,
                });
            }
            return Ok(id as CanonicalId);
        }

        self.groups.push(attrs.clone());
        Ok((self.groups.len() - 1) as CanonicalId)
    }

    /// Builds and records the [`RemapTable`] of one file.
    ///
    /// The header is rejected as a whole, before any of its groups are
    /// registered, when one of them lacks a run id.
    pub fn register_header(&mut self, header: &Header, source: &str) -> Result<RemapTable> {
        if let Some(group) = header.read_groups.iter().position(|rg| rg.run_id().is_none()) {
            return Err(S5Error::MissingRunId {
                path: source.to_string(),
                group,
            });
        }
        let ids = header
            .read_groups
            .iter()
            .enumerate()
            .map(|(local, rg)| self.insert_from(rg, source, local))
            .collect::<Result<Vec<_>>>()?;
        let table = RemapTable::from(ids);
        self.remaps.push(table.clone());
        Ok(table)
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }
    pub fn groups(&self) -> &[ReadGroup] {
        &self.groups
    }
    /// Remap tables in registration order.
    pub fn remaps(&self) -> &[RemapTable] {
        &self.remaps
    }
    pub fn divergences(&self) -> &[AttributeDivergence] {
        &self.divergences
    }

    /// Ends discovery and publishes the immutable snapshot.
    pub fn freeze(self) -> FrozenRegistry {
        FrozenRegistry {
            groups: self.groups.into(),
            remaps: self.remaps.into(),
            divergences: self.divergences.into(),
        }
    }
}

/// Read-only registry shared by workers. Cloning is cheap.
#[derive(Clone, Debug)]
pub struct FrozenRegistry {
    groups: Arc<[ReadGroup]>,
    remaps: Arc<[RemapTable]>,
    divergences: Arc<[AttributeDivergence]>,
}
impl FrozenRegistry {
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }
    pub fn groups(&self) -> &[ReadGroup] {
        &self.groups
    }
    pub fn num_files(&self) -> usize {
        self.remaps.len()
    }
    /// Remap table of the `idx`-th registered file.
    pub fn remap_table(&self, idx: usize) -> Option<&RemapTable> {
        self.remaps.get(idx)
    }
    pub fn divergences(&self) -> &[AttributeDivergence] {
        &self.divergences
    }

    /// Builds the output header from the canonical read groups.
    pub fn header(&self, aux_fields: Vec<AuxField>) -> Header {
        let mut header = Header::new();
        header.read_groups = self.groups.to_vec();
        header.aux_fields = aux_fields;
        header
    }
}
