//! OAuth2 Authorization Code + PKCE
//!
//! Interactive login runs a one-shot loopback HTTP listener on an ephemeral
//! port, sends the user's browser to the authorization endpoint, and waits
//! (bounded by [`AUTH_TIMEOUT`]) for the redirect carrying the authorization
//! code. The code is exchanged at the token endpoint discovered from the
//! issuer's `/.well-known/openid-configuration`.
//!
//! Nothing here retries; every failure surfaces as an [`AuthError`].

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::credentials::TokenSet;
use super::Authenticator;
use crate::api::{ApiClient, ControlPlane};
use crate::error::{AuthError, Result};

/// How long to wait for the browser redirect
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(60);

/// Public client ID registered for this CLI
pub const DEFAULT_CLIENT_ID: &str = "neonctl";

/// Per-connection bound on receiving the request head
const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Path the browser is redirected to on the loopback listener
pub const CALLBACK_PATH: &str = "/callback";

/// Scopes requested on every login
const ALWAYS_PRESENT_SCOPES: &[&str] = &["openid", "offline", "offline_access"];

const CLI_SCOPES: &[&str] = &[
    "urn:neoncloud:projects:create",
    "urn:neoncloud:projects:read",
    "urn:neoncloud:projects:update",
    "urn:neoncloud:projects:delete",
    "urn:neoncloud:orgs:create",
    "urn:neoncloud:orgs:read",
    "urn:neoncloud:orgs:update",
    "urn:neoncloud:orgs:delete",
    "urn:neoncloud:orgs:permission",
];

const SUCCESS_PAGE: &str = "<html><body><h1>Authentication successful</h1>\
<p>You can close this window and return to the terminal.</p></body></html>";

const FAILURE_PAGE: &str = "<html><body><h1>Authentication failed</h1>\
<p>Return to the terminal for details.</p></body></html>";

/// Endpoints advertised by the issuer
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
}

/// PKCE verifier and its S256 challenge
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

/// Query parameters of the redirect back to the loopback listener
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token_set(self, now: i64) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            id_token: self.id_token,
            token_type: self.token_type,
            scope: self.scope,
            expires_at: self.expires_in.map(|secs| now + secs),
            user_id: None,
        }
    }
}

#[derive(Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn random_urlsafe(num_bytes: usize) -> String {
    let mut bytes = vec![0u8; num_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a PKCE verifier (43 chars) and its S256 challenge
#[must_use]
pub fn generate_pkce() -> Pkce {
    let verifier = random_urlsafe(32);
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
    Pkce { verifier, challenge }
}

/// Per-session anti-CSRF `state`
#[must_use]
pub fn generate_state() -> String {
    random_urlsafe(16)
}

#[must_use]
pub fn redirect_uri(port: u16) -> String {
    format!("http://127.0.0.1:{port}{CALLBACK_PATH}")
}

/// Space-separated scope list sent with the authorization request
#[must_use]
pub fn requested_scopes() -> String {
    ALWAYS_PRESENT_SCOPES.iter().chain(CLI_SCOPES).copied().collect::<Vec<_>>().join(" ")
}

/// Build the browser URL for the authorization request
pub fn authorization_url(
    metadata: &ProviderMetadata,
    client_id: &str,
    redirect_uri: &str,
    pkce: &Pkce,
    state: &str,
) -> std::result::Result<String, AuthError> {
    let mut url = url::Url::parse(&metadata.authorization_endpoint)
        .map_err(|e| AuthError::Discovery(format!("invalid authorization endpoint: {e}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", &requested_scopes())
        .append_pair("state", state)
        .append_pair("code_challenge", &pkce.challenge)
        .append_pair("code_challenge_method", "S256");
    Ok(url.to_string())
}

/// Fetch the issuer's OpenID configuration
pub async fn discover(
    http: &reqwest::Client,
    issuer: &str,
) -> std::result::Result<ProviderMetadata, AuthError> {
    let url = format!("{}/.well-known/openid-configuration", issuer.trim_end_matches('/'));
    debug!(%url, "discovering oauth endpoints");

    let response =
        http.get(&url).send().await.map_err(|e| AuthError::Discovery(e.to_string()))?;
    if !response.status().is_success() {
        return Err(AuthError::Discovery(format!("{url} answered {}", response.status())));
    }
    response.json().await.map_err(|e| AuthError::Discovery(e.to_string()))
}

async fn token_request(
    http: &reqwest::Client,
    token_endpoint: &str,
    form: &[(&str, &str)],
) -> std::result::Result<TokenSet, String> {
    let response =
        http.post(token_endpoint).form(form).send().await.map_err(|e| e.to_string())?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<TokenErrorBody>(&body) {
            Ok(err) => match err.error_description {
                Some(description) => format!("{}: {description}", err.error),
                None => err.error,
            },
            Err(_) => body,
        };
        return Err(format!("HTTP {status}: {detail}"));
    }

    let tokens: TokenResponse = response.json().await.map_err(|e| e.to_string())?;
    Ok(tokens.into_token_set(Utc::now().timestamp()))
}

/// Exchange an authorization code for a token set
pub async fn exchange_code(
    http: &reqwest::Client,
    metadata: &ProviderMetadata,
    client_id: &str,
    redirect_uri: &str,
    code: &str,
    code_verifier: &str,
) -> std::result::Result<TokenSet, AuthError> {
    token_request(
        http,
        &metadata.token_endpoint,
        &[
            ("grant_type", "authorization_code"),
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("code", code),
            ("code_verifier", code_verifier),
        ],
    )
    .await
    .map_err(AuthError::TokenExchange)
}

/// Trade a refresh token for a new token set
pub async fn refresh_token_set(
    http: &reqwest::Client,
    metadata: &ProviderMetadata,
    client_id: &str,
    refresh_token: &str,
) -> std::result::Result<TokenSet, AuthError> {
    token_request(
        http,
        &metadata.token_endpoint,
        &[
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("refresh_token", refresh_token),
        ],
    )
    .await
    .map_err(AuthError::Refresh)
}

/// Parse `code=...&state=...` style query strings
#[must_use]
pub fn parse_callback_query(query: &str) -> CallbackParams {
    let mut params = CallbackParams::default();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = Some(value.into_owned());
        match key.as_ref() {
            "code" => params.code = value,
            "state" => params.state = value,
            "error" => params.error = value,
            "error_description" => params.error_description = value,
            _ => {}
        }
    }
    params
}

/// Check the redirect against the expected `state` and extract the code
pub fn validate_callback(
    params: CallbackParams,
    expected_state: &str,
) -> std::result::Result<String, AuthError> {
    if let Some(error) = params.error {
        let detail = match params.error_description {
            Some(description) => format!("{error}: {description}"),
            None => error,
        };
        return Err(AuthError::Callback(detail));
    }
    if params.state.as_deref() != Some(expected_state) {
        return Err(AuthError::StateMismatch);
    }
    params.code.ok_or_else(|| AuthError::Callback("no authorization code received".into()))
}

/// Read the request head (up to the blank line or 16 KiB)
async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") || buffer.len() >= 16 * 1024 {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

async fn respond(stream: &mut TcpStream, status: &str, extra_headers: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\n{extra_headers}Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!("failed writing callback response: {e}");
    }
    let _ = stream.shutdown().await;
}

/// Serve the loopback listener until `/callback` arrives.
///
/// Each connection is handled on its own task so an idle socket (a browser
/// preconnect, say) cannot hold up the redirect. Preflight `OPTIONS`
/// requests get a permissive CORS 200 and unrelated paths a 404; both keep
/// the listener waiting.
async fn serve_until_callback(
    listener: &TcpListener,
) -> std::result::Result<CallbackParams, AuthError> {
    let (tx, mut rx) = mpsc::channel::<CallbackParams>(1);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.map_err(|e| AuthError::Listener(e.to_string()))?;
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(params) = handle_connection(stream, peer).await {
                        let _ = tx.send(params).await;
                    }
                });
            }
            Some(params) = rx.recv() => return Ok(params),
        }
    }
}

/// Answer one loopback connection; yields the parameters of a `/callback` hit
async fn handle_connection(mut stream: TcpStream, peer: SocketAddr) -> Option<CallbackParams> {
    let head = match tokio::time::timeout(CONNECTION_READ_TIMEOUT, read_request_head(&mut stream))
        .await
    {
        Ok(Ok(head)) => head,
        Ok(Err(e)) => {
            debug!(%peer, "dropping unreadable callback connection: {e}");
            return None;
        }
        Err(_) => {
            debug!(%peer, "dropping idle callback connection");
            return None;
        }
    };

    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default();
    let target = request_line.next().unwrap_or_default();

    if method == "OPTIONS" {
        respond(
            &mut stream,
            "200 OK",
            "Access-Control-Allow-Origin: *\r\n\
             Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
             Access-Control-Allow-Headers: Content-Type\r\n",
            "",
        )
        .await;
        return None;
    }

    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    if path != CALLBACK_PATH {
        respond(&mut stream, "404 Not Found", "", "").await;
        return None;
    }

    let params = parse_callback_query(query);
    let page =
        if params.error.is_some() || params.code.is_none() { FAILURE_PAGE } else { SUCCESS_PAGE };
    respond(&mut stream, "200 OK", "", page).await;
    Some(params)
}

/// Wait for the browser redirect, bounded by `timeout`
pub async fn wait_for_callback(
    listener: &TcpListener,
    expected_state: &str,
    timeout: Duration,
) -> std::result::Result<String, AuthError> {
    let params = tokio::time::timeout(timeout, serve_until_callback(listener))
        .await
        .map_err(|_| AuthError::Timeout { seconds: timeout.as_secs() })??;
    validate_callback(params, expected_state)
}

/// Function used to hand the authorization URL to a browser
pub type BrowserOpener = Box<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

/// Production [`Authenticator`] talking to the OAuth issuer and control plane
pub struct OAuthAuthenticator {
    http: reqwest::Client,
    oauth_host: String,
    client_id: String,
    api_host: String,
    callback_timeout: Duration,
    opener: BrowserOpener,
}

impl OAuthAuthenticator {
    pub fn new(
        oauth_host: impl Into<String>,
        client_id: impl Into<String>,
        api_host: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            oauth_host: oauth_host.into(),
            client_id: client_id.into(),
            api_host: api_host.into(),
            callback_timeout: AUTH_TIMEOUT,
            opener: Box::new(|url: &str| open::that(url)),
        }
    }

    /// Replace the browser launcher
    #[must_use]
    pub fn with_opener(mut self, opener: BrowserOpener) -> Self {
        self.opener = opener;
        self
    }

    #[must_use]
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    async fn interactive_login(&self) -> std::result::Result<TokenSet, AuthError> {
        let metadata = discover(&self.http, &self.oauth_host).await?;

        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| AuthError::Listener(e.to_string()))?;
        let port =
            listener.local_addr().map_err(|e| AuthError::Listener(e.to_string()))?.port();
        let redirect = redirect_uri(port);

        let pkce = generate_pkce();
        let state = generate_state();
        let auth_url = authorization_url(&metadata, &self.client_id, &redirect, &pkce, &state)?;

        info!("Awaiting authentication in web browser.");
        info!("Auth Url: {auth_url}");
        (self.opener)(&auth_url).map_err(|e| {
            warn!("Failed to open web browser. Please copy & paste the auth url into a browser.");
            AuthError::BrowserOpen(e.to_string())
        })?;

        let code = wait_for_callback(&listener, &state, self.callback_timeout).await?;
        drop(listener);
        debug!("received authorization code, exchanging for tokens");

        exchange_code(&self.http, &metadata, &self.client_id, &redirect, &code, &pkce.verifier)
            .await
    }
}

#[async_trait]
impl Authenticator for OAuthAuthenticator {
    async fn login(&self) -> Result<TokenSet> {
        Ok(self.interactive_login().await?)
    }

    async fn refresh(&self, tokens: &TokenSet) -> Result<TokenSet> {
        let refresh_token = tokens
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::Refresh("no refresh token stored".into()))?;
        let metadata = discover(&self.http, &self.oauth_host).await?;
        Ok(refresh_token_set(&self.http, &metadata, &self.client_id, refresh_token).await?)
    }

    async fn user_id(&self, access_token: &str) -> Result<String> {
        let api = ApiClient::new(&self.api_host, access_token)?;
        Ok(api.current_user().await?.id)
    }
}
