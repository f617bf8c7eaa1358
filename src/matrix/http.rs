//! [`MatrixClient`] over the client-server HTTP API.

use super::{CreateRoomOptions, MatrixClient, RegisterRequest, StateEvent};
use crate::config::Config;
use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client-server API client authenticated with the `as_token`.
#[derive(Debug, Clone)]
pub struct HttpMatrixClient {
    http: Client,
    base: Url,
    as_token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    errcode: String,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct UserIdBody {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct RoomIdBody {
    room_id: String,
}

impl HttpMatrixClient {
    pub fn new(homeserver_url: &str, as_token: impl Into<String>) -> BridgeResult<Self> {
        let base = Url::parse(homeserver_url)
            .map_err(|e| BridgeError::Internal(format!("invalid homeserver url {homeserver_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(BridgeError::Internal(format!(
                "invalid homeserver url {homeserver_url}"
            )));
        }
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BridgeError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base,
            as_token: as_token.into(),
        })
    }

    pub fn from_config(config: &Config) -> BridgeResult<Self> {
        Self::new(&config.homeserver.url, config.appservice.as_token.clone())
    }

    /// `{base}/_matrix/client/v3/{segments..}`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str], as_user: Option<&str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["_matrix", "client", "v3"])
                .extend(segments);
        }
        if let Some(user) = as_user {
            url.query_pairs_mut().append_pair("user_id", user);
        }
        url
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> BridgeResult<T> {
        let response = request
            .bearer_auth(&self.as_token)
            .send()
            .await
            .map_err(|e| BridgeError::HomeserverUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => BridgeError::rejected(body.errcode, body.error),
                Err(_) => BridgeError::rejected("M_UNKNOWN", format!("HTTP {status}: {text}")),
            };
            debug!(status = %status, error = %err, "Homeserver rejected request");
            return Err(err);
        }

        response
            .json()
            .await
            .map_err(|e| BridgeError::HomeserverUnreachable(format!("unreadable response: {e}")))
    }
}

#[async_trait]
impl MatrixClient for HttpMatrixClient {
    async fn register(&self, request: &RegisterRequest) -> BridgeResult<String> {
        let mut url = self.endpoint(&["register"], None);
        url.query_pairs_mut().append_pair("kind", "user");
        let body = json!({ "type": request.login_type, "username": request.user });
        let reply: UserIdBody = self.execute(self.http.post(url).json(&body)).await?;
        Ok(reply.user_id)
    }

    async fn join_room(&self, room_id: &str, as_user: Option<&str>) -> BridgeResult<()> {
        let url = self.endpoint(&["rooms", room_id, "join"], as_user);
        let _: RoomIdBody = self.execute(self.http.post(url).json(&json!({}))).await?;
        Ok(())
    }

    async fn room_state(&self, room_id: &str, as_user: Option<&str>) -> BridgeResult<Vec<StateEvent>> {
        let url = self.endpoint(&["rooms", room_id, "state"], as_user);
        self.execute(self.http.get(url)).await
    }

    async fn create_room(&self, options: &CreateRoomOptions) -> BridgeResult<String> {
        let url = self.endpoint(&["createRoom"], None);
        let reply: RoomIdBody = self.execute(self.http.post(url).json(options)).await?;
        Ok(reply.room_id)
    }
}
