// ── Row projection ──
//
// Builds access-key rows from relations plus fused presence, then filters
// and sorts them for display. Projection is a pure function; the store
// re-runs it whenever any input changes.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::model::{AccessKeyRow, UserInboundRelation};
use crate::presence::PresenceFusion;

/// Project every relation into a row, preserving fetched order.
pub fn project_rows(
    relations: &[UserInboundRelation],
    fusion: &PresenceFusion,
    expiration_days: Option<i64>,
) -> Vec<AccessKeyRow> {
    relations
        .iter()
        .enumerate()
        .map(|(index, relation)| {
            let presence = fusion.relation_presence(relation);
            let inbound = relation.inbound.as_ref();
            AccessKeyRow {
                index,
                relation_id: relation.id,
                inbound_id: relation.inbound_id,
                label: relation.label(),
                protocol: inbound.map(|i| i.protocol.clone()).unwrap_or_default(),
                network: inbound.and_then(|i| i.network.clone()),
                security: inbound.and_then(|i| i.security.clone()),
                port: inbound.map_or(0, |i| i.port),
                priority: relation.priority,
                enabled: relation.enabled,
                online: presence.online,
                last_seen_at: presence.last_seen_at,
                online_devices: presence.online_devices,
                seen_devices: presence.seen_devices,
                expiration_days,
            }
        })
        .collect()
}

// ── Filter ──────────────────────────────────────────────────────────

/// Row filter predicate.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KeyFilter {
    #[default]
    All,
    Enabled,
    Disabled,
    Online,
    Offline,
}

impl KeyFilter {
    pub fn matches(self, row: &AccessKeyRow) -> bool {
        match self {
            Self::All => true,
            Self::Enabled => row.enabled,
            Self::Disabled => !row.enabled,
            Self::Online => row.online,
            Self::Offline => !row.online,
        }
    }
}

// ── Sort ────────────────────────────────────────────────────────────

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortField {
    Key,
    Protocol,
    Port,
    #[default]
    Priority,
    Enabled,
    Online,
    Expiration,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortField {
    fn compare(self, a: &AccessKeyRow, b: &AccessKeyRow) -> Ordering {
        match self {
            Self::Key => a.label.to_lowercase().cmp(&b.label.to_lowercase()),
            Self::Protocol => a.protocol.to_lowercase().cmp(&b.protocol.to_lowercase()),
            Self::Port => a.port.cmp(&b.port),
            Self::Priority => a.priority.cmp(&b.priority),
            Self::Enabled => a.enabled.cmp(&b.enabled),
            Self::Online => a.online.cmp(&b.online),
            // Unlimited sorts after any finite expiry.
            Self::Expiration => match (a.expiration_days, b.expiration_days) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        }
    }
}

// ── ViewSpec ────────────────────────────────────────────────────────

/// Filter plus sort applied to the projected rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSpec {
    pub filter: KeyFilter,
    pub sort: SortField,
    pub direction: SortDirection,
}

impl ViewSpec {
    /// Drag reordering is only meaningful on the full list in priority order.
    pub fn allows_drag(&self) -> bool {
        self.filter == KeyFilter::All
            && self.sort == SortField::Priority
            && self.direction == SortDirection::Asc
    }

    /// Reason drag reordering is unavailable, if any.
    pub fn drag_blocker(&self) -> Option<String> {
        if self.filter != KeyFilter::All {
            return Some(format!("filter is '{}', clear it to reorder", self.filter));
        }
        if self.sort != SortField::Priority || self.direction != SortDirection::Asc {
            return Some(format!(
                "sorted by {} {}, sort by priority ascending to reorder",
                self.sort, self.direction
            ));
        }
        None
    }

    /// Filter and sort rows. Ties always fall back to original index order,
    /// whatever the direction.
    pub fn apply(&self, rows: &[AccessKeyRow]) -> Vec<AccessKeyRow> {
        let mut out: Vec<AccessKeyRow> = rows
            .iter()
            .filter(|r| self.filter.matches(r))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            let primary = self.sort.compare(a, b);
            let primary = match self.direction {
                SortDirection::Asc => primary,
                SortDirection::Desc => primary.reverse(),
            };
            primary.then_with(|| a.index.cmp(&b.index))
        });
        out
    }
}
