// ── Presence fusion ──
//
// Derives per-key "online / last seen" from two imperfect sources:
// device telemetry (per key, but may be missing) and the coarse per-user
// presence snapshot (always available, says nothing about which key).

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{DeviceTelemetrySample, InboundId, PresenceSnapshot, UserInboundRelation};

/// Device counts for one inbound across all telemetry samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboundPresenceAggregate {
    pub online_devices: u32,
    pub seen_devices: u32,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl InboundPresenceAggregate {
    fn absorb(&mut self, sample: &DeviceTelemetrySample) {
        self.seen_devices += 1;
        if sample.online {
            self.online_devices += 1;
        }
        if let Some(seen) = sample.last_seen_at {
            self.last_seen_at = Some(self.last_seen_at.map_or(seen, |cur| cur.max(seen)));
        }
    }
}

/// Fused presence of a single relation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationPresence {
    pub online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub online_devices: u32,
    pub seen_devices: u32,
}

/// Result of fusing telemetry and presence for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceFusion {
    aggregates: HashMap<InboundId, InboundPresenceAggregate>,
    /// User is online and has exactly one key, so that key must be the one in use.
    allow_single_key_fallback: bool,
    fallback_last_seen_at: Option<DateTime<Utc>>,
}

impl PresenceFusion {
    /// Aggregate samples by inbound and decide whether the single-key
    /// fallback applies.
    ///
    /// Samples without an inbound id are ignored.
    pub fn compute(
        samples: &[DeviceTelemetrySample],
        presence: Option<&PresenceSnapshot>,
        relations: &[UserInboundRelation],
    ) -> Self {
        let mut aggregates: HashMap<InboundId, InboundPresenceAggregate> = HashMap::new();
        for sample in samples {
            let Some(inbound) = sample.inbound_id else {
                continue;
            };
            aggregates.entry(inbound).or_default().absorb(sample);
        }

        let user_online = presence.is_some_and(|p| p.online);
        let allow_single_key_fallback = user_online && relations.len() == 1;

        Self {
            aggregates,
            allow_single_key_fallback,
            fallback_last_seen_at: presence.and_then(|p| p.last_seen_at),
        }
    }

    pub fn aggregate(&self, inbound: InboundId) -> Option<&InboundPresenceAggregate> {
        self.aggregates.get(&inbound)
    }

    pub fn allows_single_key_fallback(&self) -> bool {
        self.allow_single_key_fallback
    }

    /// Fused presence of one relation.
    ///
    /// Disabled relations are never online. Otherwise a relation is online
    /// when a device on its inbound is online, or when the single-key
    /// fallback applies.
    pub fn relation_presence(&self, relation: &UserInboundRelation) -> RelationPresence {
        let aggregate = relation
            .inbound_id
            .and_then(|id| self.aggregates.get(&id))
            .copied()
            .unwrap_or_default();

        let by_devices = aggregate.online_devices > 0;
        let fallback = relation.enabled && self.allow_single_key_fallback;
        let online = relation.enabled && (by_devices || self.allow_single_key_fallback);

        let last_seen_at = aggregate
            .last_seen_at
            .or_else(|| self.fallback_last_seen_at.filter(|_| fallback));

        RelationPresence {
            online,
            last_seen_at,
            online_devices: aggregate.online_devices,
            seen_devices: aggregate.seen_devices,
        }
    }
}
