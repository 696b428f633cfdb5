//! Matrix client-server API client used to enumerate rooms and members.

use async_trait::async_trait;
use federation::{ChatClient, ClientError, GroupAttribute, GroupId};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Split `@localpart:server` into its parts
pub fn parse_user_id(user: &str) -> Result<(&str, &str), ClientError> {
    user.strip_prefix('@')
        .and_then(|rest| rest.split_once(':'))
        .filter(|(localpart, server)| !localpart.is_empty() && !server.is_empty())
        .ok_or_else(|| ClientError::InvalidUserId(user.to_string()))
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    identifier: UserIdentifier<'a>,
    password: &'a str,
}

#[derive(Serialize)]
struct UserIdentifier<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    user: &'a str,
}

/// Successful login response
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user_id: String,
}

#[derive(Deserialize)]
struct JoinedRooms {
    joined_rooms: Vec<GroupId>,
}

#[derive(Deserialize)]
struct JoinedMembers {
    joined: HashMap<String, serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct MatrixErrorBody {
    #[serde(default)]
    errcode: String,
    #[serde(default)]
    error: String,
}

/// Client for a single homeserver account
pub struct MatrixClient {
    http: reqwest::Client,
    homeserver: Url,
    access_token: Option<String>,
}

impl MatrixClient {
    /// Create a client for `homeserver` (e.g. `https://matrix.example.org`)
    pub fn new(homeserver: &str, request_timeout: Duration) -> Result<Self, ClientError> {
        let homeserver = Url::parse(homeserver.trim_end_matches('/'))
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", homeserver, e)))?;
        if homeserver.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(homeserver.to_string()));
        }

        let http = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            http,
            homeserver,
            access_token: None,
        })
    }

    /// Use an existing access token instead of logging in
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn is_logged_in(&self) -> bool {
        self.access_token.is_some()
    }

    /// Log in with a password and keep the access token
    pub async fn login(&mut self, user: &str, password: &str) -> Result<LoginResponse, ClientError> {
        parse_user_id(user)?;

        let request = LoginRequest {
            kind: "m.login.password",
            identifier: UserIdentifier {
                kind: "m.id.user",
                user,
            },
            password,
        };

        let url = self.endpoint(&["login"]);
        let response = self.http.post(url).json(&request).send().await?;
        let login: LoginResponse = Self::decode(response).await?;

        info!(user_id = %login.user_id, "Logged in");
        self.access_token = Some(login.access_token.clone());
        Ok(login)
    }

    /// `<homeserver>/_matrix/client/v3/<segments...>` with each segment escaped
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.homeserver.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(["_matrix", "client", "v3"]);
            path.extend(segments);
        }
        url
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ClientError> {
        let token = self.access_token.as_deref().ok_or(ClientError::NotLoggedIn)?;
        let response = self
            .http
            .get(self.endpoint(segments))
            .bearer_auth(token)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let error: MatrixErrorBody = serde_json::from_slice(&body).unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: format!("{}: {}", error.errcode, error.error),
            });
        }

        Ok(serde_json::from_slice(&body)?)
    }

    /// Content of a room state event, `None` when the room has no such state
    async fn state_event(
        &self,
        room: &str,
        event_type: &str,
    ) -> Result<Option<serde_json::Value>, ClientError> {
        match self
            .get::<serde_json::Value>(&["rooms", room, "state", event_type, ""])
            .await
        {
            Ok(content) => Ok(Some(content)),
            Err(ClientError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ChatClient for MatrixClient {
    async fn list_joined_groups(&self) -> Result<Vec<GroupId>, ClientError> {
        let rooms: JoinedRooms = self.get(&["joined_rooms"]).await?;
        Ok(rooms.joined_rooms)
    }

    async fn list_members(&self, group: &str) -> Result<Vec<String>, ClientError> {
        let members: JoinedMembers = self.get(&["rooms", group, "joined_members"]).await?;
        Ok(members.joined.into_keys().collect())
    }

    async fn read_group_attribute(
        &self,
        group: &str,
        attribute: GroupAttribute,
    ) -> Result<Option<String>, ClientError> {
        let (event_type, field) = match attribute {
            GroupAttribute::Title => ("m.room.name", "name"),
            GroupAttribute::CanonicalAlias => ("m.room.canonical_alias", "alias"),
            GroupAttribute::Avatar => ("m.room.avatar", "url"),
        };

        let value = self
            .state_event(group, event_type)
            .await?
            .and_then(|content| content.get(field).and_then(|v| v.as_str()).map(str::to_string))
            .filter(|v| !v.is_empty());

        debug!(group, event_type, found = value.is_some(), "Read room state");
        Ok(value)
    }

    fn media_url(&self, reference: &str) -> Option<String> {
        let (server, media_id) = reference.strip_prefix("mxc://")?.split_once('/')?;
        if server.is_empty() || media_id.is_empty() {
            return None;
        }
        Some(format!(
            "{}/_matrix/media/v3/download/{}/{}",
            self.homeserver.as_str().trim_end_matches('/'),
            server,
            media_id
        ))
    }
}
