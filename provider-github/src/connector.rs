//! GitHub Git Data API connector
//!
//! Implements the `GitDataProvider` trait for one repository.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::git::{
    AuthenticatedUser, BlobEncoding, GitDataProvider, NewCommit, RepositoryInfo, TreeEntry,
};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CachedResponse, TtlCache};
use crate::error::GitHubError;
use crate::rate_limit::{GovernorDecision, RateLimitGovernor};
use crate::retry::retry_with_policy;
use crate::types::{
    ApiErrorBody, CreateBlobRequest, CreateCommitRequest, CreateRefRequest, CreateTreeRequest,
    RateLimitResponse, RefResponse, RepositoryResponse, ShaResponse, TreeItem, UpdateRefRequest,
    UserResponse,
};

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("git-push-sync/", env!("CARGO_PKG_VERSION"));
const ETAG_TTL: Duration = Duration::from_secs(60 * 60);
const EMPTY_REPOSITORY_MARKER: &str = "git repository is empty";
/// Used when a throttled response carries no hint at all
const DEFAULT_RATE_LIMIT_WAIT_SECS: u64 = 60;

/// Connection settings for one repository.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_base_url: String,
    pub owner: String,
    pub repo: String,
    pub timeout: Duration,
    pub retry_policy: RetryPolicy,
}

/// How the token is presented in the `Authorization` header.
///
/// Classic and fine-grained tokens accept both forms, but some proxies and
/// GitHub Enterprise versions only take one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Bearer,
    Token,
}

impl AuthScheme {
    fn header_value(&self, token: &str) -> String {
        match self {
            AuthScheme::Bearer => format!("Bearer {}", token),
            AuthScheme::Token => format!("token {}", token),
        }
    }

    fn alternate(&self) -> Self {
        match self {
            AuthScheme::Bearer => AuthScheme::Token,
            AuthScheme::Token => AuthScheme::Bearer,
        }
    }
}

/// GitHub API connector
///
/// Every attempt of every call except the rate-limit probe goes through the
/// governor: checked before it goes out, fed the response after.
/// GETs are conditional: an ETag cached from an earlier response is sent as
/// `If-None-Match` and a 304 is answered from the cache.
///
/// # Example
///
/// ```ignore
/// use provider_github::{GitHubConnector, GitHubConfig, TtlCache};
/// use bridge_traits::git::GitDataProvider;
///
/// let connector = GitHubConnector::new(http_client, config, token, cache, governor);
/// let head = connector.get_branch_head("main").await?;
/// ```
pub struct GitHubConnector {
    http_client: Arc<dyn HttpClient>,
    config: GitHubConfig,
    token: String,
    cache: TtlCache,
    governor: RateLimitGovernor,
    auth_scheme: Mutex<AuthScheme>,
}

/// Method, path and optional JSON body of one API call.
struct ApiCall {
    method: HttpMethod,
    path: String,
    body: Option<serde_json::Value>,
}

impl GitHubConnector {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        config: GitHubConfig,
        token: String,
        cache: TtlCache,
        governor: RateLimitGovernor,
    ) -> Self {
        Self {
            http_client,
            config,
            token,
            cache,
            governor,
            auth_scheme: Mutex::new(AuthScheme::Bearer),
        }
    }

    /// The scheme the next request will use.
    pub fn auth_scheme(&self) -> AuthScheme {
        self.auth_scheme
            .lock()
            .map(|scheme| *scheme)
            .unwrap_or(AuthScheme::Bearer)
    }

    fn remember_auth_scheme(&self, scheme: AuthScheme) {
        if let Ok(mut current) = self.auth_scheme.lock() {
            *current = scheme;
        }
    }

    fn repo_path(&self, suffix: &str) -> String {
        format!("/repos/{}/{}{}", self.config.owner, self.config.repo, suffix)
    }

    /// Percent-encode a branch name segment by segment so `feature/x` keeps its slash.
    fn encode_branch(branch: &str) -> String {
        branch
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn json_call<T: Serialize>(method: HttpMethod, path: String, body: &T) -> Result<ApiCall> {
        let body = serde_json::to_value(body).map_err(|e| {
            BridgeError::OperationFailed(format!("Failed to encode request body: {}", e))
        })?;
        Ok(ApiCall {
            method,
            path,
            body: Some(body),
        })
    }

    fn etag_key(path: &str) -> String {
        format!("etag.{}", path)
    }

    fn build_request(
        &self,
        call: &ApiCall,
        scheme: AuthScheme,
        etag: Option<&str>,
    ) -> Result<HttpRequest> {
        let mut request = HttpRequest::new(
            call.method,
            format!("{}{}", self.config.api_base_url, call.path),
        )
        .header("Authorization", scheme.header_value(&self.token))
        .header("Accept", ACCEPT)
        .header("X-GitHub-Api-Version", API_VERSION)
        .header("User-Agent", USER_AGENT)
        .timeout(self.config.timeout);

        if let Some(etag) = etag {
            request = request.header("If-None-Match", etag);
        }
        if let Some(body) = &call.body {
            request = request.json(body)?;
        }
        Ok(request)
    }

    /// One exchange under one authorization scheme, retried per the policy.
    ///
    /// When `governed`, every attempt's response is fed to the governor and
    /// every retry waits for its go-ahead.
    async fn send_with_scheme(
        &self,
        call: &ApiCall,
        scheme: AuthScheme,
        etag: Option<&str>,
        governed: bool,
    ) -> Result<HttpResponse> {
        let url = format!("{}{}", self.config.api_base_url, call.path);
        retry_with_policy(
            &self.config.retry_policy,
            &url,
            || async move {
                let response = self
                    .http_client
                    .execute(self.build_request(call, scheme, etag)?)
                    .await?;
                if governed {
                    self.governor.record_response(&response).await?;
                }
                Ok(response)
            },
            || async move {
                if governed {
                    self.obey(self.governor.pre_call_check().await?).await?;
                }
                Ok(())
            },
        )
        .await
    }

    /// Send a call, falling back to the alternate authorization scheme once on 401.
    async fn send(
        &self,
        call: &ApiCall,
        etag: Option<&str>,
        governed: bool,
    ) -> Result<HttpResponse> {
        let scheme = self.auth_scheme();
        let response = self.send_with_scheme(call, scheme, etag, governed).await?;
        if response.status != 401 {
            return Ok(response);
        }

        let alternate = scheme.alternate();
        debug!(?scheme, ?alternate, "401 received, retrying with alternate scheme");
        let retried = self.send_with_scheme(call, alternate, etag, governed).await?;
        if retried.status != 401 {
            info!(?alternate, "Switching authorization scheme for this session");
            self.remember_auth_scheme(alternate);
        }
        Ok(retried)
    }

    /// Refresh the quota with `GET /rate_limit`. Not governed and not counted.
    async fn probe_rate_limit(&self) -> Result<GovernorDecision> {
        let call = ApiCall {
            method: HttpMethod::Get,
            path: "/rate_limit".to_string(),
            body: None,
        };
        let response = self.send(&call, None, false).await?;

        if !response.is_success() {
            // GHE with rate limiting disabled answers 404 here
            warn!(status = response.status, "Rate limit probe failed, proceeding");
            return Ok(GovernorDecision::Proceed);
        }

        let quota: RateLimitResponse = Self::parse(&response)?;
        self.governor
            .after_probe(quota.rate.remaining, quota.rate.reset)
            .await
    }

    /// Gate before the first attempt of a call, probing a stale quota.
    async fn govern(&self) -> Result<()> {
        let mut decision = self.governor.pre_call_check().await?;
        if decision == GovernorDecision::Probe {
            decision = self.probe_rate_limit().await?;
        }
        self.obey(decision).await
    }

    /// Sleep through a wait the governor asked for, or fail when it is too long.
    ///
    /// `Probe` is let through: between retries the quota was just refreshed
    /// from the previous response.
    async fn obey(&self, decision: GovernorDecision) -> Result<()> {
        match decision {
            GovernorDecision::Proceed | GovernorDecision::Probe => Ok(()),
            GovernorDecision::Wait {
                duration,
                raw,
                exceeded,
                reason,
            } => {
                if exceeded {
                    warn!(
                        ?reason,
                        wait_secs = raw.as_secs(),
                        "Rate limit wait too long for this chunk"
                    );
                    return Err(GitHubError::RateLimited {
                        retry_after_seconds: raw.as_secs().max(1),
                    }
                    .into());
                }
                info!(
                    ?reason,
                    wait_ms = duration.as_millis() as u64,
                    "Waiting for rate limit"
                );
                tokio::time::sleep(duration).await;
                Ok(())
            }
        }
    }

    /// Governed call with conditional-GET handling. Non-2xx responses are returned as-is.
    async fn call(&self, call: ApiCall) -> Result<HttpResponse> {
        self.govern().await?;

        let cacheable = call.method == HttpMethod::Get;
        let cached = if cacheable {
            self.cache
                .get::<CachedResponse>(&Self::etag_key(&call.path))
                .await?
        } else {
            None
        };

        let etag = cached.as_ref().map(|entry| entry.etag.as_str());
        let response = self.send(&call, etag, true).await?;

        if response.status == 304 {
            if let Some(entry) = cached {
                debug!(path = %call.path, "Not modified, replaying cached body");
                return entry.to_response();
            }
        }

        if cacheable && response.is_success() {
            if let Some(etag) = response.header("etag") {
                let entry = CachedResponse::from_response(etag, &response);
                self.cache
                    .set(&Self::etag_key(&call.path), &entry, ETAG_TTL)
                    .await?;
            }
        }

        Ok(response)
    }

    fn parse<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
        serde_json::from_slice(&response.body).map_err(|e| {
            GitHubError::ParseError(format!("status {}: {}", response.status, e)).into()
        })
    }

    fn error_message(response: &HttpResponse) -> String {
        serde_json::from_slice::<ApiErrorBody>(&response.body)
            .map(|body| body.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).into_owned())
    }

    fn rate_limit_wait(response: &HttpResponse) -> u64 {
        response
            .header("retry-after")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_WAIT_SECS)
    }

    /// Translate a non-success response into a classified error.
    fn error_for(response: &HttpResponse, what: &str) -> BridgeError {
        let message = Self::error_message(response);

        let error = if response.status == 401 {
            GitHubError::AuthenticationFailed(message)
        } else if message.to_ascii_lowercase().contains(EMPTY_REPOSITORY_MARKER) {
            GitHubError::RepositoryEmpty
        } else if response.status == 404 {
            GitHubError::NotFound(what.to_string())
        } else if response.is_rate_limited() {
            GitHubError::RateLimited {
                retry_after_seconds: Self::rate_limit_wait(response),
            }
        } else {
            GitHubError::ApiError {
                status_code: response.status,
                message,
            }
        };

        warn!(status = response.status, what = what, error = %error, "GitHub API call failed");
        error.into()
    }

    /// Like [`error_for`](Self::error_for), for reads of the repository or a
    /// ref. A bare 409 there means the repository has no commits yet.
    fn lookup_error_for(response: &HttpResponse, what: &str) -> BridgeError {
        if response.status == 409 {
            debug!(what = what, "409 on lookup, repository is empty");
            return GitHubError::RepositoryEmpty.into();
        }
        Self::error_for(response, what)
    }

    async fn create_object<B: Serialize>(
        &self,
        suffix: &str,
        body: &B,
        what: &str,
    ) -> Result<String> {
        let call = Self::json_call(HttpMethod::Post, self.repo_path(suffix), body)?;
        let response = self.call(call).await?;
        if !response.is_success() {
            return Err(Self::error_for(&response, what));
        }
        Ok(Self::parse::<ShaResponse>(&response)?.sha)
    }
}

#[async_trait]
impl GitDataProvider for GitHubConnector {
    #[instrument(skip(self))]
    async fn verify_credentials(&self) -> Result<AuthenticatedUser> {
        let response = self
            .call(ApiCall {
                method: HttpMethod::Get,
                path: "/user".to_string(),
                body: None,
            })
            .await?;

        if !response.is_success() {
            return Err(Self::error_for(&response, "authenticated user"));
        }

        let user: UserResponse = Self::parse(&response)?;
        info!(login = %user.login, "Credentials verified");
        Ok(AuthenticatedUser { login: user.login })
    }

    #[instrument(skip(self), fields(repo = %self.config.repo))]
    async fn get_repository(&self) -> Result<RepositoryInfo> {
        let response = self
            .call(ApiCall {
                method: HttpMethod::Get,
                path: self.repo_path(""),
                body: None,
            })
            .await?;

        if !response.is_success() {
            let what = format!("repository {}/{}", self.config.owner, self.config.repo);
            return Err(Self::lookup_error_for(&response, &what));
        }

        let repo: RepositoryResponse = Self::parse(&response)?;
        Ok(RepositoryInfo {
            full_name: repo.full_name,
            default_branch: repo.default_branch,
            private: repo.private,
            can_push: repo.permissions.map(|p| p.push),
        })
    }

    #[instrument(skip(self))]
    async fn get_branch_head(&self, branch: &str) -> Result<Option<String>> {
        let path = self.repo_path(&format!("/git/ref/heads/{}", Self::encode_branch(branch)));
        let response = self
            .call(ApiCall {
                method: HttpMethod::Get,
                path,
                body: None,
            })
            .await?;

        if response.status == 404 {
            debug!(branch = branch, "Branch does not exist yet");
            return Ok(None);
        }
        if !response.is_success() {
            return Err(Self::lookup_error_for(&response, &format!("branch {}", branch)));
        }

        let reference: RefResponse = Self::parse(&response)?;
        Ok(Some(reference.object.sha))
    }

    #[instrument(skip(self, content), fields(size = content.len(), encoding = encoding.as_str()))]
    async fn create_blob(&self, content: &[u8], encoding: BlobEncoding) -> Result<String> {
        let encoded;
        let content = match encoding {
            BlobEncoding::Base64 => {
                encoded = STANDARD.encode(content);
                encoded.as_str()
            }
            BlobEncoding::Utf8 => std::str::from_utf8(content).map_err(|e| {
                BridgeError::OperationFailed(format!("Blob is not valid UTF-8: {}", e))
            })?,
        };

        self.create_object("/git/blobs", &CreateBlobRequest { content, encoding }, "blob")
            .await
    }

    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    async fn create_tree(&self, entries: &[TreeEntry]) -> Result<String> {
        let request = CreateTreeRequest {
            tree: entries.iter().map(TreeItem::from).collect(),
        };
        self.create_object("/git/trees", &request, "tree").await
    }

    #[instrument(
        skip(self, commit),
        fields(tree = %commit.tree_sha, parents = commit.parents.len())
    )]
    async fn create_commit(&self, commit: &NewCommit) -> Result<String> {
        let request = CreateCommitRequest {
            message: &commit.message,
            tree: &commit.tree_sha,
            parents: &commit.parents,
        };
        self.create_object("/git/commits", &request, "commit").await
    }

    #[instrument(skip(self))]
    async fn create_ref(&self, branch: &str, sha: &str) -> Result<()> {
        let request = CreateRefRequest {
            reference: format!("refs/heads/{}", branch),
            sha,
        };
        let call = Self::json_call(HttpMethod::Post, self.repo_path("/git/refs"), &request)?;
        let response = self.call(call).await?;
        if !response.is_success() {
            return Err(Self::error_for(&response, &format!("ref {}", branch)));
        }
        info!(branch = branch, sha = sha, "Created branch");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_ref(&self, branch: &str, sha: &str, force: bool) -> Result<()> {
        let path = self.repo_path(&format!("/git/refs/heads/{}", Self::encode_branch(branch)));
        let call = Self::json_call(HttpMethod::Patch, path, &UpdateRefRequest { sha, force })?;
        let response = self.call(call).await?;
        if !response.is_success() {
            return Err(Self::error_for(&response, &format!("ref {}", branch)));
        }
        info!(branch = branch, sha = sha, "Updated branch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::SqliteSettingsStore;
    use bridge_traits::time::SystemClock;
    use bytes::Bytes;
    use mockall::mock;
    use mockall::predicate::function;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        let mut headers = HashMap::new();
        headers.insert("X-RateLimit-Remaining".to_string(), "4999".to_string());
        headers.insert("X-RateLimit-Reset".to_string(), "4102444800".to_string());
        HttpResponse {
            status,
            headers,
            body: Bytes::from(body.to_string()),
        }
    }

    fn with_header(mut response: HttpResponse, key: &str, value: &str) -> HttpResponse {
        response.headers.insert(key.to_string(), value.to_string());
        response
    }

    fn is_quota_request(request: &HttpRequest) -> bool {
        request.url.ends_with("/rate_limit")
    }

    fn quota_response() -> HttpResponse {
        response(
            200,
            r#"{"rate":{"limit":5000,"remaining":4999,"reset":4102444800}}"#,
        )
    }

    async fn connector(mock: MockHttpClient) -> GitHubConnector {
        connector_with_max_wait(mock, Duration::from_secs(60)).await
    }

    async fn connector_with_max_wait(mock: MockHttpClient, max_wait: Duration) -> GitHubConnector {
        let store = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        let cache = TtlCache::new(store, Arc::new(SystemClock));
        let governor = RateLimitGovernor::new(cache.clone(), 10, max_wait);
        let config = GitHubConfig {
            api_base_url: "https://api.github.com".to_string(),
            owner: "acme".to_string(),
            repo: "site".to_string(),
            timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
            },
        };
        GitHubConnector::new(Arc::new(mock), config, "ghp_test".to_string(), cache, governor)
    }

    /// Expect exactly one quota refresh before the first governed call.
    fn expect_quota_refresh(mock: &mut MockHttpClient) {
        mock.expect_execute()
            .with(function(is_quota_request))
            .times(1)
            .returning(|_| Ok(quota_response()));
    }

    #[tokio::test]
    async fn test_verify_credentials_refreshes_quota_once() {
        let mut mock = MockHttpClient::new();
        expect_quota_refresh(&mut mock);
        mock.expect_execute()
            .with(function(|r: &HttpRequest| r.url.ends_with("/user")))
            .times(2)
            .returning(|req| {
                assert_eq!(
                    req.headers.get("Authorization").map(String::as_str),
                    Some("Bearer ghp_test")
                );
                Ok(response(200, r#"{"login":"octocat"}"#))
            });

        let connector = connector(mock).await;
        assert_eq!(connector.verify_credentials().await.unwrap().login, "octocat");
        // Quota is now cached, no second refresh
        assert_eq!(connector.verify_credentials().await.unwrap().login, "octocat");
    }

    #[tokio::test]
    async fn test_alternate_auth_scheme_is_remembered() {
        let mut mock = MockHttpClient::new();
        expect_quota_refresh(&mut mock);
        mock.expect_execute()
            .with(function(|r: &HttpRequest| !is_quota_request(r)))
            .returning(|req| {
                match req.headers.get("Authorization").map(String::as_str) {
                    Some("token ghp_test") => Ok(response(200, r#"{"login":"octocat"}"#)),
                    _ => Ok(response(401, r#"{"message":"Bad credentials"}"#)),
                }
            });

        let connector = connector(mock).await;
        connector.verify_credentials().await.unwrap();
        assert_eq!(connector.auth_scheme(), AuthScheme::Token);
    }

    #[tokio::test]
    async fn test_unauthorized_under_both_schemes() {
        let mut mock = MockHttpClient::new();
        expect_quota_refresh(&mut mock);
        mock.expect_execute()
            .with(function(|r: &HttpRequest| !is_quota_request(r)))
            .times(2)
            .returning(|_| Ok(response(401, r#"{"message":"Bad credentials"}"#)));

        let connector = connector(mock).await;
        let err = connector.verify_credentials().await.unwrap_err();
        assert!(matches!(err, BridgeError::Unauthorized(_)));
        assert_eq!(connector.auth_scheme(), AuthScheme::Bearer);
    }

    #[tokio::test]
    async fn test_empty_repository_and_missing_branch() {
        let mut mock = MockHttpClient::new();
        expect_quota_refresh(&mut mock);
        mock.expect_execute()
            .with(function(|r: &HttpRequest| r.url.ends_with("/git/ref/heads/main")))
            .times(1)
            .returning(|_| Ok(response(409, r#"{"message":"Git Repository is empty."}"#)));
        mock.expect_execute()
            .with(function(|r: &HttpRequest| {
                r.url.ends_with("/git/ref/heads/feature/new%20ui")
            }))
            .times(1)
            .returning(|_| Ok(response(404, r#"{"message":"Not Found"}"#)));

        let connector = connector(mock).await;
        assert!(matches!(
            connector.get_branch_head("main").await,
            Err(BridgeError::RepositoryEmpty)
        ));
        assert_eq!(connector.get_branch_head("feature/new ui").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_repository_is_not_found() {
        let mut mock = MockHttpClient::new();
        expect_quota_refresh(&mut mock);
        mock.expect_execute()
            .with(function(|r: &HttpRequest| r.url.ends_with("/repos/acme/site")))
            .returning(|_| Ok(response(404, r#"{"message":"Not Found"}"#)));

        let connector = connector(mock).await;
        assert!(matches!(
            connector.get_repository().await,
            Err(BridgeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_conditional_get_replays_cached_body() {
        let original = r#"{"full_name":"acme/site","private":false,"permissions":{"push":true}}"#;
        let mut mock = MockHttpClient::new();
        expect_quota_refresh(&mut mock);
        let mut seq = mockall::Sequence::new();
        mock.expect_execute()
            .with(function(|r: &HttpRequest| {
                r.url.ends_with("/repos/acme/site") && !r.headers.contains_key("If-None-Match")
            }))
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(with_header(response(200, original), "ETag", "\"v1\"")));
        mock.expect_execute()
            .with(function(|r: &HttpRequest| {
                r.headers.get("If-None-Match").map(String::as_str) == Some("\"v1\"")
            }))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(304, "")));

        let connector = connector(mock).await;
        let first = connector.get_repository().await.unwrap();
        let second = connector.get_repository().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.can_push, Some(true));
    }

    #[tokio::test]
    async fn test_create_objects_and_refs() {
        let mut mock = MockHttpClient::new();
        expect_quota_refresh(&mut mock);
        mock.expect_execute()
            .with(function(|r: &HttpRequest| !is_quota_request(r)))
            .returning(|req| {
                let body: serde_json::Value = req
                    .body
                    .as_ref()
                    .map(|b| serde_json::from_slice(b).unwrap())
                    .unwrap_or(serde_json::Value::Null);
                let reply = match (req.method, req.url.rsplit("/repos/acme/site").next()) {
                    (HttpMethod::Post, Some("/git/blobs")) => {
                        assert_eq!(body["encoding"], "base64");
                        assert_eq!(body["content"], "AAEC");
                        response(201, r#"{"sha":"blob1"}"#)
                    }
                    (HttpMethod::Post, Some("/git/trees")) => {
                        assert_eq!(body["tree"][0]["type"], "blob");
                        response(201, r#"{"sha":"tree1"}"#)
                    }
                    (HttpMethod::Post, Some("/git/commits")) => {
                        assert_eq!(body["parents"], serde_json::json!([]));
                        response(201, r#"{"sha":"commit1"}"#)
                    }
                    (HttpMethod::Post, Some("/git/refs")) => {
                        assert_eq!(body["ref"], "refs/heads/main");
                        response(201, r#"{"ref":"refs/heads/main","object":{"sha":"commit1"}}"#)
                    }
                    (HttpMethod::Patch, Some("/git/refs/heads/main")) => {
                        assert_eq!(body["force"], true);
                        response(200, r#"{"ref":"refs/heads/main","object":{"sha":"commit1"}}"#)
                    }
                    other => panic!("unexpected call {:?}", other),
                };
                Ok(reply)
            });

        let connector = connector(mock).await;
        let blob = connector
            .create_blob(&[0, 1, 2], BlobEncoding::Base64)
            .await
            .unwrap();
        let tree = connector
            .create_tree(&[TreeEntry::blob("a.bin", blob)])
            .await
            .unwrap();
        let commit = connector
            .create_commit(&NewCommit {
                message: "sync".to_string(),
                tree_sha: tree,
                parents: vec![],
            })
            .await
            .unwrap();
        assert_eq!(commit, "commit1");
        connector.create_ref("main", &commit).await.unwrap();
        connector.update_ref("main", &commit, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_exhausted_quota_fails_fast_without_calling() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .with(function(is_quota_request))
            .times(1)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"rate":{"limit":5000,"remaining":0,"reset":4102444800}}"#,
                ))
            });

        let connector = connector(mock).await;
        let err = connector
            .create_blob(b"hello", BlobEncoding::Utf8)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_validation_error_is_http() {
        let mut mock = MockHttpClient::new();
        expect_quota_refresh(&mut mock);
        mock.expect_execute()
            .with(function(|r: &HttpRequest| !is_quota_request(r)))
            .returning(|_| Ok(response(422, r#"{"message":"Invalid tree info"}"#)));

        let connector = connector(mock).await;
        match connector.create_tree(&[]).await {
            Err(BridgeError::Http { status, message }) => {
                assert_eq!(status, 422);
                assert_eq!(message, "Invalid tree info");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    fn is_blob_upload(request: &HttpRequest) -> bool {
        request.url.ends_with("/git/blobs")
    }

    const SECONDARY_LIMIT: &str = r#"{"message":"You have exceeded a secondary rate limit."}"#;

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let mut mock = MockHttpClient::new();
        expect_quota_refresh(&mut mock);
        let mut seq = mockall::Sequence::new();
        mock.expect_execute()
            .with(function(is_blob_upload))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(502, "Bad Gateway")));
        mock.expect_execute()
            .with(function(is_blob_upload))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(201, r#"{"sha":"blob1"}"#)));

        let connector = connector(mock).await;
        let sha = connector
            .create_blob(b"hello", BlobEncoding::Utf8)
            .await
            .unwrap();
        assert_eq!(sha, "blob1");
    }

    #[tokio::test]
    async fn test_secondary_limit_blocks_retry_inside_window() {
        let mut mock = MockHttpClient::new();
        expect_quota_refresh(&mut mock);
        mock.expect_execute()
            .with(function(is_blob_upload))
            .times(1)
            .returning(|_| Ok(response(403, SECONDARY_LIMIT)));

        // The first backoff is at least a second, longer than this chunk may sleep
        let connector = connector_with_max_wait(mock, Duration::from_millis(100)).await;
        let err = connector
            .create_blob(b"hello", BlobEncoding::Utf8)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::RateLimited { .. }));

        let record = connector.governor.load().await.unwrap();
        assert_eq!(record.backoff_attempt, 1);
        assert!(record.secondary_backoff_until_ms.is_some());
    }

    #[tokio::test]
    async fn test_throttled_attempt_waits_out_retry_after() {
        let sent = Arc::new(Mutex::new(Vec::<std::time::Instant>::new()));
        let log = sent.clone();

        let mut mock = MockHttpClient::new();
        expect_quota_refresh(&mut mock);
        mock.expect_execute()
            .with(function(is_blob_upload))
            .times(2)
            .returning(move |_| {
                let mut log = log.lock().unwrap();
                log.push(std::time::Instant::now());
                if log.len() == 1 {
                    Ok(with_header(response(403, SECONDARY_LIMIT), "Retry-After", "1"))
                } else {
                    Ok(response(201, r#"{"sha":"blob1"}"#))
                }
            });

        let connector = connector(mock).await;
        let sha = connector
            .create_blob(b"hello", BlobEncoding::Utf8)
            .await
            .unwrap();
        assert_eq!(sha, "blob1");

        let gap = {
            let sent = sent.lock().unwrap();
            assert_eq!(sent.len(), 2);
            sent[1].duration_since(sent[0])
        };
        assert!(gap >= Duration::from_millis(950), "retried after {:?}", gap);
        assert_eq!(connector.governor.load().await.unwrap().backoff_attempt, 0);
    }

    #[tokio::test]
    async fn test_conflict_on_write_is_not_an_empty_repository() {
        let mut mock = MockHttpClient::new();
        expect_quota_refresh(&mut mock);
        mock.expect_execute()
            .with(function(|r: &HttpRequest| r.url.ends_with("/git/commits")))
            .times(1)
            .returning(|_| Ok(response(409, r#"{"message":"Conflict"}"#)));
        mock.expect_execute()
            .with(function(|r: &HttpRequest| r.url.ends_with("/git/refs")))
            .times(1)
            .returning(|_| Ok(response(409, r#"{"message":"Git Repository is empty."}"#)));

        let connector = connector(mock).await;
        let err = connector
            .create_commit(&NewCommit {
                message: "sync".to_string(),
                tree_sha: "tree1".to_string(),
                parents: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Http { status: 409, .. }));

        // The message still identifies an empty repository on any call
        assert!(matches!(
            connector.create_ref("main", "commit1").await,
            Err(BridgeError::RepositoryEmpty)
        ));
    }

    #[test]
    fn test_encode_branch_keeps_slashes() {
        assert_eq!(GitHubConnector::encode_branch("main"), "main");
        assert_eq!(
            GitHubConnector::encode_branch("release/2024 q1"),
            "release/2024%20q1"
        );
    }
}
