use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::api::backend::Backend;
use crate::api::events::{ChannelSpec, RealtimeClient, Subscription};
use crate::api::models::{AuthResponse, AuthTokens, Group, GroupMember, Message, ProfileUpdate, User};
use crate::config::BackendConfig;
use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// HTTP client for the managed backend's auth and row APIs.
pub struct ApiClient {
    pub http: HttpClient,
    base_url: Url,
    anon_key: String,
    realtime: RealtimeClient,
    tokens: RwLock<Option<AuthTokens>>,
}

impl ApiClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = HttpClient::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            realtime: RealtimeClient::new(&config.url, &config.anon_key)?,
            tokens: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|e| Error::Config(e.to_string()))
    }

    fn auth_endpoint(&self, path: &str) -> Result<Url> {
        self.endpoint(&format!("auth/v1/{path}"))
    }

    /// `/rest/v1/<table>?<filters>`
    pub fn table_endpoint(&self, table: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn access_token(&self) -> Option<String> {
        self.tokens
            .read()
            .ok()
            .and_then(|t| t.as_ref().map(|t| t.access_token.clone()))
    }

    fn set_tokens(&self, tokens: Option<AuthTokens>) {
        if let Ok(mut guard) = self.tokens.write() {
            *guard = tokens;
        }
    }

    /// Adds the project key and the session bearer (anon key when signed out).
    fn with_auth(&self, req: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token().unwrap_or_else(|| self.anon_key.clone());
        req.header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let resp = self.with_auth(req).send().await?;
        check_status(resp).await
    }

    async fn fetch<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        log::debug!("GET {}", url.path());
        let resp = self.send(self.http.get(url)).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn fetch_one<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        log::debug!("GET {} (single)", url.path());
        let req = self.with_auth(self.http.get(url).header("Accept", SINGLE_OBJECT));
        let resp = req.send().await?;
        // PostgREST answers 406 when a single-object request matches no row.
        if resp.status() == StatusCode::NOT_ACCEPTABLE {
            return Ok(None);
        }
        let resp = check_status(resp).await?;
        Ok(Some(resp.json::<T>().await?))
    }

    async fn insert<T: serde::Serialize + ?Sized>(&self, table: &str, row: &T) -> Result<()> {
        let url = self.table_endpoint(table, &[])?;
        log::debug!("POST {}", url.path());
        let req = self.http.post(url).header("Prefer", "return=minimal").json(row);
        self.send(req).await?;
        Ok(())
    }

    async fn patch<T: serde::Serialize + ?Sized>(&self, table: &str, id: &str, body: &T) -> Result<()> {
        let filter = format!("eq.{id}");
        let url = self.table_endpoint(table, &[("id", &filter)])?;
        log::debug!("PATCH {}", url.path());
        let req = self.http.patch(url).header("Prefer", "return=minimal").json(body);
        self.send(req).await?;
        Ok(())
    }

    async fn authenticate(&self, url: Url, email: &str, password: &str) -> Result<User> {
        let body = serde_json::json!({ "email": email, "password": password });
        let resp = self.send(self.http.post(url).json(&body)).await?;
        let json: Value = resp.json().await?;
        let auth = parse_auth_response(&json)?;
        self.set_tokens(auth.tokens);
        Ok(auth.user)
    }
}

async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Rejected { status: status.as_u16(), message: error_message(&body, status) })
}

/// Pulls a human readable message out of an auth or row API error body.
pub fn error_message(body: &str, status: StatusCode) -> String {
    let fallback = || format!("HTTP {}", status);
    match serde_json::from_str::<Value>(body) {
        Ok(json) => json
            .get("msg")
            .or_else(|| json.get("message"))
            .or_else(|| json.get("error_description"))
            .or_else(|| json.get("error"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(fallback),
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => fallback(),
    }
}

/// Sign-in returns a session (`access_token` + `user`); sign-up returns either
/// a session or, when e-mail confirmation is pending, the bare user.
pub fn parse_auth_response(json: &Value) -> Result<AuthResponse> {
    let user_json = json.get("user").filter(|u| !u.is_null()).unwrap_or(json);
    if user_json.get("id").and_then(|v| v.as_str()).is_none() {
        return Err(Error::InvalidResponse("no user in auth response".into()));
    }
    let user: User = serde_json::from_value(user_json.clone())?;
    let tokens = json
        .get("access_token")
        .and_then(|v| v.as_str())
        .map(|access| AuthTokens {
            access_token: access.to_string(),
            refresh_token: json.get("refresh_token").and_then(|v| v.as_str()).map(str::to_string),
        });
    Ok(AuthResponse { user, tokens })
}

#[async_trait]
impl Backend for ApiClient {
    async fn sign_up(&self, email: &str, password: &str) -> Result<User> {
        let url = self.auth_endpoint("signup")?;
        self.authenticate(url, email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        let mut url = self.auth_endpoint("token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        self.authenticate(url, email, password).await
    }

    async fn sign_out(&self) -> Result<()> {
        let url = self.auth_endpoint("logout")?;
        let result = self.send(self.http.post(url)).await;
        self.set_tokens(None);
        result.map(|_| ())
    }

    async fn reset_password(&self, email: &str) -> Result<()> {
        let url = self.auth_endpoint("recover")?;
        let body = serde_json::json!({ "email": email });
        self.send(self.http.post(url).json(&body)).await?;
        Ok(())
    }

    async fn session_user(&self) -> Result<User> {
        if self.access_token().is_none() {
            return Err(Error::UserNotFound);
        }
        let url = self.auth_endpoint("user")?;
        self.fetch(url).await
    }

    fn tokens(&self) -> Option<AuthTokens> {
        self.tokens.read().ok().and_then(|t| t.clone())
    }

    fn restore_tokens(&self, tokens: Option<AuthTokens>) {
        self.set_tokens(tokens);
    }

    async fn get_profile(&self, user_id: &str) -> Result<User> {
        let filter = format!("eq.{user_id}");
        let url = self.table_endpoint("profiles", &[("select", "*"), ("id", &filter)])?;
        self.fetch_one(url).await?.ok_or(Error::UserNotFound)
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<()> {
        self.patch("profiles", user_id, update).await
    }

    async fn list_profiles(&self) -> Result<Vec<User>> {
        let url = self.table_endpoint("profiles", &[("select", "*")])?;
        self.fetch(url).await
    }

    async fn insert_group(&self, group: &Group) -> Result<()> {
        self.insert("groups", group).await
    }

    async fn get_group(&self, group_id: &str) -> Result<Group> {
        let filter = format!("eq.{group_id}");
        let url = self.table_endpoint("groups", &[("select", "*"), ("id", &filter)])?;
        self.fetch_one(url)
            .await?
            .ok_or_else(|| Error::InvalidResponse(format!("group {group_id} not found")))
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        let url = self.table_endpoint("groups", &[("select", "*"), ("order", "created_at.desc")])?;
        self.fetch(url).await
    }

    async fn groups_for_member(&self, user_id: &str) -> Result<Vec<Group>> {
        let filter = format!("eq.{user_id}");
        let url = self.table_endpoint(
            "groups",
            &[("select", "*,group_members!inner(user_id)"), ("group_members.user_id", &filter)],
        )?;
        self.fetch(url).await
    }

    async fn update_group_members(&self, group_id: &str, members: &[String]) -> Result<()> {
        let body = serde_json::json!({ "members": members });
        self.patch("groups", group_id, &body).await
    }

    async fn insert_group_member(&self, member: &GroupMember) -> Result<()> {
        self.insert("group_members", member).await
    }

    async fn insert_message(&self, message: &Message) -> Result<()> {
        self.insert("messages", message).await
    }

    async fn messages_for_group(&self, group_id: &str) -> Result<Vec<Message>> {
        let filter = format!("eq.{group_id}");
        let url = self.table_endpoint(
            "messages",
            &[("select", "*"), ("group_id", &filter), ("order", "created_at.asc")],
        )?;
        self.fetch(url).await
    }

    async fn subscribe_messages(&self, group_id: &str) -> Result<Subscription<Message>> {
        let token = self.access_token();
        self.realtime.subscribe(ChannelSpec::group_messages(group_id), token.as_deref()).await
    }

    async fn subscribe_group_updates(&self, group_id: &str) -> Result<Subscription<Group>> {
        let token = self.access_token();
        self.realtime.subscribe(ChannelSpec::group_updates(group_id), token.as_deref()).await
    }
}
