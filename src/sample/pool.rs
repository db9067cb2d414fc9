//! Read-only microdata pool indexed by sampling region.

use std::collections::BTreeMap;

use crate::domain::{MicrodataRecord, RegionId};
use crate::sample::query::MatchQuery;

#[derive(Debug, Clone, Default)]
pub struct MicrodataPool {
    records: Vec<MicrodataRecord>,
    by_region: BTreeMap<RegionId, Vec<usize>>,
}

impl MicrodataPool {
    pub fn new(records: Vec<MicrodataRecord>) -> Self {
        let mut by_region: BTreeMap<RegionId, Vec<usize>> = BTreeMap::new();
        for (idx, record) in records.iter().enumerate() {
            by_region.entry(record.region.clone()).or_default().push(idx);
        }
        Self { records, by_region }
    }

    pub fn records(&self) -> &[MicrodataRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Regions with at least one record, sorted.
    pub fn regions(&self) -> impl Iterator<Item = &RegionId> {
        self.by_region.keys()
    }

    pub fn region_records<'a>(&'a self, region: &RegionId) -> impl Iterator<Item = &'a MicrodataRecord> + 'a {
        self.by_region
            .get(region)
            .into_iter()
            .flatten()
            .map(|&idx| &self.records[idx])
    }

    /// Records satisfying `query`, scanning only the query's region when it has one.
    pub fn select(&self, query: &MatchQuery) -> Vec<&MicrodataRecord> {
        match query.region() {
            Some(region) => self
                .region_records(region)
                .filter(|r| query.matches(r))
                .collect(),
            None => self.records.iter().filter(|r| query.matches(r)).collect(),
        }
    }
}
