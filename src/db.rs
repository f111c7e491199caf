//! The criminal corpus as seen by the matcher: read-only records with up to
//! one enrolled template per finger.

use crate::error::RidgeprintError;
use crate::template::{FingerPosition, FingerprintTemplate};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier assigned by the record store. Lower ids win confidence ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CriminalId(pub u64);

impl fmt::Display for CriminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseMetadata {
    pub case_id: Option<String>,
    pub crime: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Deactivated records stay stored but are excluded by [`CorpusFilter::active_only`].
    pub active: bool,
}

impl Default for CaseMetadata {
    fn default() -> Self {
        Self { case_id: None, crime: None, first_name: None, last_name: None, active: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CriminalRecord {
    pub id: CriminalId,
    pub name: String,
    pub case: CaseMetadata,
    templates: BTreeMap<FingerPosition, FingerprintTemplate>,
}

impl CriminalRecord {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self { id: CriminalId(id), name: name.into(), case: CaseMetadata::default(), templates: BTreeMap::new() }
    }

    pub fn with_case(mut self, case: CaseMetadata) -> Self {
        self.case = case;
        self
    }

    /// Stores `template` for `finger`, replacing any earlier enrollment.
    pub fn enroll(&mut self, finger: FingerPosition, template: FingerprintTemplate) -> &mut Self {
        self.templates.insert(finger, template);
        self
    }

    pub fn with_template(mut self, finger: FingerPosition, template: FingerprintTemplate) -> Self {
        self.enroll(finger, template);
        self
    }

    pub fn template(&self, finger: FingerPosition) -> Option<&FingerprintTemplate> {
        self.templates.get(&finger)
    }

    /// Enrolled templates in ANSI/NIST finger order.
    pub fn templates(&self) -> impl Iterator<Item = (FingerPosition, &FingerprintTemplate)> {
        self.templates.iter().map(|(finger, template)| (*finger, template))
    }

    pub fn finger_count(&self) -> usize {
        self.templates.len()
    }

    pub fn is_active(&self) -> bool {
        self.case.active
    }
}

/// Narrows a corpus snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorpusFilter {
    pub active_only: bool,
    /// Keep only records holding a template for this finger.
    pub finger: Option<FingerPosition>,
}

impl CorpusFilter {
    pub fn accepts(&self, record: &CriminalRecord) -> bool {
        (!self.active_only || record.is_active()) && self.finger.map_or(true, |f| record.template(f).is_some())
    }
}

/// Supplier of read-only corpus snapshots.
pub trait CorpusSource {
    /// # Errors
    /// `RidgeprintError::CorpusUnavailable` when the store cannot be read.
    fn snapshot(&self) -> Result<Vec<CriminalRecord>, RidgeprintError>;

    fn snapshot_filtered(&self, filter: &CorpusFilter) -> Result<Vec<CriminalRecord>, RidgeprintError> {
        let mut records = self.snapshot()?;
        records.retain(|r| filter.accepts(r));
        Ok(records)
    }
}

impl CorpusSource for Vec<CriminalRecord> {
    fn snapshot(&self) -> Result<Vec<CriminalRecord>, RidgeprintError> {
        Ok(self.clone())
    }
}

impl CorpusSource for [CriminalRecord] {
    fn snapshot(&self) -> Result<Vec<CriminalRecord>, RidgeprintError> {
        Ok(self.to_vec())
    }
}

/// Adapts a closure into a [`CorpusSource`].
pub struct CorpusFn<F>(pub F);

impl<F> CorpusSource for CorpusFn<F>
where
    F: Fn() -> Result<Vec<CriminalRecord>, RidgeprintError>,
{
    fn snapshot(&self) -> Result<Vec<CriminalRecord>, RidgeprintError> {
        (self.0)()
    }
}
