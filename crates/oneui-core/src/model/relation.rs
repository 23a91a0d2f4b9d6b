// ── Users and their access keys ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{InboundId, RelationId, UserId};

const SECONDS_PER_DAY: i64 = 86_400;

/// Descriptive metadata of the inbound a relation points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMeta {
    pub id: InboundId,
    pub protocol: String,
    pub network: Option<String>,
    pub security: Option<String>,
    pub port: u16,
    pub tag: Option<String>,
    pub remark: Option<String>,
}

impl InboundMeta {
    /// Human label: remark, then tag, then `protocol:port`.
    pub fn label(&self) -> String {
        non_blank(self.remark.as_deref())
            .or_else(|| non_blank(self.tag.as_deref()))
            .map_or_else(|| format!("{}:{}", self.protocol, self.port), str::to_owned)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// One user-to-inbound edge: an "access key".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInboundRelation {
    pub id: RelationId,
    /// `None` when the panel reported a missing or non-positive inbound id.
    pub inbound_id: Option<InboundId>,
    pub enabled: bool,
    pub priority: i32,
    pub inbound: Option<InboundMeta>,
}

impl UserInboundRelation {
    pub fn label(&self) -> String {
        self.inbound
            .as_ref()
            .map_or_else(|| format!("#{}", self.id), InboundMeta::label)
    }
}

/// A user and all of its access keys, as last fetched from the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetail {
    pub id: UserId,
    pub username: Option<String>,
    pub email: Option<String>,
    /// `None` means the account never expires.
    pub expires_at: Option<DateTime<Utc>>,
    pub relations: Vec<UserInboundRelation>,
}

impl UserDetail {
    /// Whole days until expiry, rounded up. Negative once expired.
    pub fn expiration_days(&self, now: DateTime<Utc>) -> Option<i64> {
        let remaining = (self.expires_at? - now).num_seconds();
        let days = remaining.div_euclid(SECONDS_PER_DAY);
        Some(if remaining.rem_euclid(SECONDS_PER_DAY) > 0 {
            days + 1
        } else {
            days
        })
    }

    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(self.id.as_str())
    }

    pub fn relation(&self, id: RelationId) -> Option<&UserInboundRelation> {
        self.relations.iter().find(|r| r.id == id)
    }

    pub fn relation_by_inbound(&self, inbound: InboundId) -> Option<&UserInboundRelation> {
        self.relations
            .iter()
            .find(|r| r.inbound_id == Some(inbound))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn meta(remark: Option<&str>, tag: Option<&str>) -> InboundMeta {
        InboundMeta {
            id: InboundId::new(10).unwrap(),
            protocol: "vless".into(),
            network: Some("ws".into()),
            security: Some("tls".into()),
            port: 443,
            tag: tag.map(Into::into),
            remark: remark.map(Into::into),
        }
    }

    fn user(expires_at: Option<DateTime<Utc>>) -> UserDetail {
        UserDetail {
            id: "1".into(),
            username: None,
            email: None,
            expires_at,
            relations: Vec::new(),
        }
    }

    #[test]
    fn label_prefers_remark_then_tag() {
        assert_eq!(meta(Some("SG Edge"), Some("sg-1")).label(), "SG Edge");
        assert_eq!(meta(Some("  "), Some("sg-1")).label(), "sg-1");
        assert_eq!(meta(None, None).label(), "vless:443");
    }

    #[test]
    fn relation_without_inbound_uses_id_label() {
        let rel = UserInboundRelation {
            id: RelationId::new(5),
            inbound_id: None,
            enabled: true,
            priority: 100,
            inbound: None,
        };
        assert_eq!(rel.label(), "#5");
    }

    #[test]
    fn expiration_rounds_up_partial_days() {
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let u = user(Some(now + Duration::hours(36)));
        assert_eq!(u.expiration_days(now), Some(2));

        let u = user(Some(now + Duration::days(3)));
        assert_eq!(u.expiration_days(now), Some(3));
    }

    #[test]
    fn expiration_is_negative_once_expired() {
        let now = Utc.with_ymd_and_hms(2026, 10, 10, 0, 0, 0).unwrap();
        let u = user(Some(now - Duration::days(2)));
        assert_eq!(u.expiration_days(now), Some(-2));
    }

    #[test]
    fn unlimited_has_no_expiration() {
        assert_eq!(user(None).expiration_days(Utc::now()), None);
    }
}
