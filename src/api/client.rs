//! HTTP implementation of [`ControlPlane`]
//!
//! Thin `reqwest` wrapper over the v2 REST API. Every request carries the
//! bearer token the auth layer produced; a 401 surfaces as
//! [`CtlError::Unauthorized`] so the top-level handler can discard stale
//! credentials.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{Branch, ControlPlane, Database, Endpoint, Project, RestoreRequest, Role, User};
use crate::error::{CtlError, Result};

const USER_AGENT: &str = concat!("neonctl/", env!("CARGO_PKG_VERSION"));

/// Control-plane API client
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ProjectsResponse {
    projects: Vec<Project>,
}

#[derive(Deserialize)]
struct BranchesResponse {
    branches: Vec<Branch>,
}

#[derive(Deserialize)]
struct BranchResponse {
    branch: Branch,
}

#[derive(Deserialize)]
struct EndpointsResponse {
    endpoints: Vec<Endpoint>,
}

#[derive(Deserialize)]
struct RolesResponse {
    roles: Vec<Role>,
}

#[derive(Deserialize)]
struct DatabasesResponse {
    databases: Vec<Database>,
}

#[derive(Deserialize)]
struct PasswordResponse {
    password: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `https://console.neon.tech/api/v2`)
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        debug!(path, "GET");
        self.http.get(self.url(path)).bearer_auth(&self.api_key)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        debug!(path, "POST");
        self.http.post(self.url(path)).bearer_auth(&self.api_key)
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = request.header("Accept", "application/json").send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Map non-success responses onto the error taxonomy
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.message)
        .unwrap_or_else(|_| if body.is_empty() { status.to_string() } else { body });

    if status == StatusCode::UNAUTHORIZED {
        return Err(CtlError::Unauthorized(message));
    }
    Err(CtlError::Api { status: status.as_u16(), message })
}

#[async_trait]
impl ControlPlane for ApiClient {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        let body: ProjectsResponse = Self::send(self.get("/projects")).await?;
        Ok(body.projects)
    }

    async fn list_branches(&self, project_id: &str) -> Result<Vec<Branch>> {
        let path = format!("/projects/{}/branches", urlencoding::encode(project_id));
        let body: BranchesResponse = Self::send(self.get(&path)).await?;
        Ok(body.branches)
    }

    async fn get_branch(&self, project_id: &str, branch_id: &str) -> Result<Branch> {
        let path = format!(
            "/projects/{}/branches/{}",
            urlencoding::encode(project_id),
            urlencoding::encode(branch_id)
        );
        let body: BranchResponse = Self::send(self.get(&path)).await?;
        Ok(body.branch)
    }

    async fn list_endpoints(&self, project_id: &str, branch_id: &str) -> Result<Vec<Endpoint>> {
        let path = format!(
            "/projects/{}/branches/{}/endpoints",
            urlencoding::encode(project_id),
            urlencoding::encode(branch_id)
        );
        let body: EndpointsResponse = Self::send(self.get(&path)).await?;
        Ok(body.endpoints)
    }

    async fn list_roles(&self, project_id: &str, branch_id: &str) -> Result<Vec<Role>> {
        let path = format!(
            "/projects/{}/branches/{}/roles",
            urlencoding::encode(project_id),
            urlencoding::encode(branch_id)
        );
        let body: RolesResponse = Self::send(self.get(&path)).await?;
        Ok(body.roles)
    }

    async fn list_databases(&self, project_id: &str, branch_id: &str) -> Result<Vec<Database>> {
        let path = format!(
            "/projects/{}/branches/{}/databases",
            urlencoding::encode(project_id),
            urlencoding::encode(branch_id)
        );
        let body: DatabasesResponse = Self::send(self.get(&path)).await?;
        Ok(body.databases)
    }

    async fn get_role_password(
        &self,
        project_id: &str,
        branch_id: &str,
        role_name: &str,
    ) -> Result<String> {
        let path = format!(
            "/projects/{}/branches/{}/roles/{}/reveal_password",
            urlencoding::encode(project_id),
            urlencoding::encode(branch_id),
            urlencoding::encode(role_name)
        );
        let body: PasswordResponse = Self::send(self.get(&path)).await?;
        Ok(body.password)
    }

    async fn current_user(&self) -> Result<User> {
        Self::send(self.get("/users/me")).await
    }

    async fn restore_branch(
        &self,
        project_id: &str,
        branch_id: &str,
        request: &RestoreRequest,
    ) -> Result<Branch> {
        let path = format!(
            "/projects/{}/branches/{}/restore",
            urlencoding::encode(project_id),
            urlencoding::encode(branch_id)
        );
        let body: BranchResponse = Self::send(self.post(&path).json(request)).await?;
        Ok(body.branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_list_branches_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/proj-1/branches"))
            .and(header("Authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "branches": [
                    {"id": "br-wispy-meadow-118737", "name": "main", "default": true},
                    {"id": "br-aged-salad-637688", "name": "dev", "parent_id": "br-wispy-meadow-118737"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "secret-token").unwrap();
        let branches = client.list_branches("proj-1").await.unwrap();

        assert_eq!(branches.len(), 2);
        assert!(branches[0].is_default());
        assert_eq!(branches[1].parent_id.as_deref(), Some("br-wispy-meadow-118737"));
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_unauthorized_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"message": "token expired"})),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "stale").unwrap();
        let err = client.current_user().await.unwrap_err();

        assert!(err.is_unauthorized());
        assert!(err.message().contains("token expired"));
    }

    #[tokio::test]
    async fn test_other_failures_keep_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/proj-1/branches/br-aged-salad-637688"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(serde_json::json!({"message": "not found"})),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "t").unwrap();
        let err = client.get_branch("proj-1", "br-aged-salad-637688").await.unwrap_err();

        match err {
            CtlError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_restore_posts_request_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/proj-1/branches/br-aged-salad-637688/restore"))
            .and(body_json(serde_json::json!({
                "source_branch_id": "br-wispy-meadow-118737",
                "source_lsn": "0/1F56000"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "branch": {"id": "br-aged-salad-637688", "name": "dev"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri(), "t").unwrap();
        let request = RestoreRequest {
            source_branch_id: "br-wispy-meadow-118737".into(),
            source_lsn: Some("0/1F56000".into()),
            ..Default::default()
        };
        let branch =
            client.restore_branch("proj-1", "br-aged-salad-637688", &request).await.unwrap();
        assert_eq!(branch.name, "dev");
    }

    #[tokio::test]
    async fn test_reveal_password() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/proj-1/branches/br-aged-salad-637688/roles/alex/reveal_password"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"password": "s3cret"})),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(format!("{}/", server.uri()), "t").unwrap();
        let password =
            client.get_role_password("proj-1", "br-aged-salad-637688", "alex").await.unwrap();
        assert_eq!(password, "s3cret");
    }
}
