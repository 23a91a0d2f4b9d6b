// ── Reactive storage ──

mod data_store;
mod guards;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use data_store::DataStore;
pub use guards::{MutationGuards, MutationLease, MutationState};

/// The three independently fetched inputs of a key session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DataSource {
    Relations,
    Telemetry,
    Presence,
}

/// Fetch health of one data source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFreshness {
    pub last_success_at: Option<DateTime<Utc>>,
    /// Last fetch failed; the data shown is from an earlier success.
    pub stale: bool,
    pub last_error: Option<String>,
}

/// Fetch health of every source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Freshness {
    pub relations: SourceFreshness,
    pub telemetry: SourceFreshness,
    pub presence: SourceFreshness,
}

impl Freshness {
    pub fn get(&self, source: DataSource) -> &SourceFreshness {
        match source {
            DataSource::Relations => &self.relations,
            DataSource::Telemetry => &self.telemetry,
            DataSource::Presence => &self.presence,
        }
    }

    fn get_mut(&mut self, source: DataSource) -> &mut SourceFreshness {
        match source {
            DataSource::Relations => &mut self.relations,
            DataSource::Telemetry => &mut self.telemetry,
            DataSource::Presence => &mut self.presence,
        }
    }

    pub fn any_stale(&self) -> bool {
        self.relations.stale || self.telemetry.stale || self.presence.stale
    }
}
