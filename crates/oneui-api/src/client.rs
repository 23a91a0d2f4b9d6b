// Hand-crafted async HTTP client for the One-UI panel REST API.
//
// Base path: /api/
// Auth: `Authorization: Bearer <token>`

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::Error;
use crate::presence_stream::{PresenceStreamHandle, ReconnectConfig};
use crate::transport::TransportConfig;
use crate::types::{
    BulkPatternBody, BulkQualityBody, BulkReorderResponse, DeviceSampleResponse, Envelope,
    PatternReorderBody, PatternReorderResponse, PresenceResponse, PriorityAssignmentBody,
    QualityReorderBody, QualityReorderResponse, RelationPatch, ReorderBatchBody, UserResponse,
};

// ── Error response shape ─────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the One-UI panel API.
///
/// Cheap to clone: the inner `reqwest::Client` is reference-counted.
#[derive(Clone)]
pub struct PanelClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl PanelClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from a bearer token and transport config.
    ///
    /// Injects `Authorization: Bearer …` as a default header on every request.
    pub fn new(
        base_url: &str,
        token: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer_header(token)?);

        let http = transport.build_client_with_headers(headers)?;
        let base_url = Self::normalize_base_url(base_url)?;

        Ok(Self {
            http,
            base_url,
            token: Some(token.clone()),
        })
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let base_url = Self::normalize_base_url(base_url)?;
        Ok(Self {
            http,
            base_url,
            token: None,
        })
    }

    /// Ensure the base URL ends with exactly one `/` so joins append.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Append percent-encoded path segments onto the base URL.
    fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        params: &[(&str, String)],
    ) -> Result<T, Error> {
        let url = self.url(segments)?;
        debug!("GET {url} params={params:?}");

        let resp = self.http.get(url).query(params).send().await?;
        self.handle_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(segments)?;
        debug!("POST {url}");

        let resp = self.http.post(url).json(body).send().await?;
        self.handle_response(resp).await
    }

    async fn put_no_response<B: Serialize + Sync>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<(), Error> {
        let url = self.url(segments)?;
        debug!("PUT {url}");

        let resp = self.http.put(url).json(body).send().await?;
        self.handle_empty(resp).await
    }

    async fn patch_no_response<B: Serialize + Sync>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<(), Error> {
        let url = self.url(segments)?;
        debug!("PATCH {url}");

        let resp = self.http.patch(url).json(body).send().await?;
        self.handle_empty(resp).await
    }

    async fn delete(&self, segments: &[&str]) -> Result<(), Error> {
        let url = self.url(segments)?;
        debug!("DELETE {url}");

        let resp = self.http.delete(url).send().await?;
        self.handle_empty(resp).await
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();
        if !status.is_success() {
            return Err(self.parse_error(status, resp).await);
        }

        let body = resp.text().await?;
        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })?;

        if !envelope.success {
            return Err(Error::Rejected {
                message: envelope
                    .message
                    .unwrap_or_else(|| "request was not successful".into()),
            });
        }

        envelope.data.ok_or_else(|| Error::Deserialization {
            message: "response envelope has no `data` field".into(),
            body,
        })
    }

    /// Accept an empty body or an envelope without data.
    async fn handle_empty(&self, resp: reqwest::Response) -> Result<(), Error> {
        let status = resp.status();
        if !status.is_success() {
            return Err(self.parse_error(status, resp).await);
        }

        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Ok(());
        }
        match serde_json::from_str::<Envelope<serde_json::Value>>(&body) {
            Ok(envelope) if !envelope.success => Err(Error::Rejected {
                message: envelope
                    .message
                    .unwrap_or_else(|| "request was not successful".into()),
            }),
            _ => Ok(()),
        }
    }

    async fn parse_error(&self, status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
        let raw = resp.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<ErrorResponse>(&raw)
            .ok()
            .and_then(|e| e.message.or(e.error));

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Error::Authentication {
                message: parsed.unwrap_or_else(|| status.to_string()),
            };
        }

        Error::Panel {
            status: status.as_u16(),
            message: parsed.unwrap_or_else(|| {
                if raw.is_empty() {
                    status.to_string()
                } else {
                    raw
                }
            }),
        }
    }

    // ── Users & telemetry ────────────────────────────────────────────

    /// Fetch a user with its inbound relations.
    pub async fn get_user(&self, user_id: &str) -> Result<UserResponse, Error> {
        self.get(&["api", "users", user_id], &[]).await
    }

    /// Fetch per-device telemetry for a user over the given window.
    pub async fn list_devices(
        &self,
        user_id: &str,
        window_minutes: u32,
    ) -> Result<Vec<DeviceSampleResponse>, Error> {
        self.get(
            &["api", "users", user_id, "devices"],
            &[("windowMinutes", window_minutes.to_string())],
        )
        .await
    }

    /// Poll the coarse per-user presence snapshot.
    pub async fn list_presence(
        &self,
        user_ids: &[String],
        include_offline: bool,
    ) -> Result<Vec<PresenceResponse>, Error> {
        self.get(
            &["api", "users", "online"],
            &[
                ("userIds", user_ids.join(",")),
                ("includeOffline", include_offline.to_string()),
            ],
        )
        .await
    }

    // ── Relation mutations ───────────────────────────────────────────

    pub async fn patch_relation(
        &self,
        user_id: &str,
        inbound_id: i64,
        patch: &RelationPatch,
    ) -> Result<(), Error> {
        let inbound = inbound_id.to_string();
        self.patch_no_response(&["api", "users", user_id, "inbounds", &inbound], patch)
            .await
    }

    /// Submit a full priority assignment in one request.
    pub async fn reorder_relations(
        &self,
        user_id: &str,
        assignments: Vec<PriorityAssignmentBody>,
    ) -> Result<(), Error> {
        self.put_no_response(
            &["api", "users", user_id, "inbounds", "reorder"],
            &ReorderBatchBody { assignments },
        )
        .await
    }

    pub async fn reorder_by_pattern(
        &self,
        user_id: &str,
        pattern: &str,
        dry_run: bool,
    ) -> Result<PatternReorderResponse, Error> {
        self.post(
            &["api", "users", user_id, "inbounds", "reorder-pattern"],
            &PatternReorderBody {
                pattern: pattern.to_owned(),
                dry_run,
            },
        )
        .await
    }

    pub async fn reorder_by_quality(
        &self,
        user_id: &str,
        window_minutes: u32,
        dry_run: bool,
    ) -> Result<QualityReorderResponse, Error> {
        self.post(
            &["api", "users", user_id, "inbounds", "reorder-quality"],
            &QualityReorderBody {
                window_minutes,
                dry_run,
            },
        )
        .await
    }

    pub async fn bulk_reorder_by_pattern(
        &self,
        user_ids: &[String],
        pattern: &str,
        dry_run: bool,
    ) -> Result<BulkReorderResponse, Error> {
        self.post(
            &["api", "users", "bulk", "reorder-pattern"],
            &BulkPatternBody {
                user_ids: user_ids.to_vec(),
                pattern: pattern.to_owned(),
                dry_run,
            },
        )
        .await
    }

    pub async fn bulk_reorder_by_quality(
        &self,
        user_ids: &[String],
        window_minutes: u32,
        dry_run: bool,
    ) -> Result<BulkReorderResponse, Error> {
        self.post(
            &["api", "users", "bulk", "reorder-quality"],
            &BulkQualityBody {
                user_ids: user_ids.to_vec(),
                window_minutes,
                dry_run,
            },
        )
        .await
    }

    // ── Devices ──────────────────────────────────────────────────────

    pub async fn revoke_device(&self, user_id: &str, fingerprint: &str) -> Result<(), Error> {
        self.delete(&["api", "users", user_id, "devices", fingerprint])
            .await
    }

    // ── Presence stream ──────────────────────────────────────────────

    /// WebSocket URL of the live presence stream.
    pub fn presence_stream_url(
        &self,
        user_ids: &[String],
        include_offline: bool,
    ) -> Result<Url, Error> {
        let mut url = self.url(&["api", "users", "online", "stream"])?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| Error::WebSocketConnect(format!("cannot use {scheme} for {url}")))?;
        url.query_pairs_mut()
            .append_pair("userIds", &user_ids.join(","))
            .append_pair("includeOffline", &include_offline.to_string());
        Ok(url)
    }

    /// Open the live presence stream for the given users.
    ///
    /// Returns immediately; the connection is established in the background
    /// and its progress is observable via [`PresenceStreamHandle::status`].
    pub fn stream_presence(
        &self,
        user_ids: &[String],
        include_offline: bool,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Result<PresenceStreamHandle, Error> {
        let url = self.presence_stream_url(user_ids, include_offline)?;
        let auth = self
            .token
            .as_ref()
            .map(|t| format!("Bearer {}", t.expose_secret()));
        Ok(PresenceStreamHandle::connect(url, reconnect, cancel, auth))
    }
}

fn bearer_header(token: &SecretString) -> Result<HeaderValue, Error> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
        .map_err(|e| Error::Authentication {
            message: format!("invalid token header value: {e}"),
        })?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> PanelClient {
        PanelClient::from_reqwest(base, reqwest::Client::new()).unwrap()
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let c = client("https://panel.example.com/admin");
        assert_eq!(c.base_url().as_str(), "https://panel.example.com/admin/");
    }

    #[test]
    fn url_segments_are_encoded() {
        let c = client("https://panel.example.com/");
        let url = c.url(&["api", "users", "7", "devices", "ab/cd"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://panel.example.com/api/users/7/devices/ab%2Fcd"
        );
    }

    #[test]
    fn presence_stream_url_uses_websocket_scheme() {
        let c = client("https://panel.example.com");
        let url = c
            .presence_stream_url(&["1".into(), "2".into()], true)
            .unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/api/users/online/stream");
        assert_eq!(url.query(), Some("userIds=1%2C2&includeOffline=true"));
    }
}
