//! In-process control-plane double shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::api::{
    Branch, ControlPlane, Database, Endpoint, EndpointType, Project, RestoreRequest, Role, User,
};
use crate::error::{CtlError, Result};

#[derive(Default)]
pub struct FakeControlPlane {
    projects: Vec<Project>,
    branches: Vec<Branch>,
    endpoints: Vec<Endpoint>,
    roles: Vec<Role>,
    databases: Vec<Database>,
    passwords: HashMap<String, String>,
    calls: AtomicUsize,
    list_branches_calls: AtomicUsize,
    get_branch_calls: AtomicUsize,
    restores: Mutex<Vec<(String, RestoreRequest)>>,
}

impl FakeControlPlane {
    pub fn branch(id: &str, name: &str, parent_id: Option<&str>) -> Branch {
        Branch {
            id: id.into(),
            name: name.into(),
            default: false,
            primary: false,
            parent_id: parent_id.map(Into::into),
            created_at: None,
        }
    }

    pub fn endpoint(id: &str, branch_id: &str, endpoint_type: EndpointType) -> Endpoint {
        Endpoint {
            id: id.into(),
            host: format!("{id}.us-east-2.aws.neon.tech"),
            branch_id: branch_id.into(),
            endpoint_type,
        }
    }

    /// `main` (default) and `dev` (child of `main`)
    pub fn with_sample_branches() -> Self {
        let mut main = Self::branch("br-wispy-meadow-118737", "main", None);
        main.default = true;
        let dev = Self::branch("br-aged-salad-637688", "dev", Some("br-wispy-meadow-118737"));
        Self::default().branches(vec![main, dev])
    }

    pub fn projects(mut self, projects: Vec<Project>) -> Self {
        self.projects = projects;
        self
    }

    pub fn branches(mut self, branches: Vec<Branch>) -> Self {
        self.branches = branches;
        self
    }

    pub fn endpoints(mut self, endpoints: Vec<Endpoint>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn roles(mut self, names: &[&str]) -> Self {
        self.roles = names.iter().map(|n| Role { name: (*n).into(), protected: false }).collect();
        self
    }

    pub fn databases(mut self, names: &[&str]) -> Self {
        self.databases =
            names.iter().map(|n| Database { name: (*n).into(), owner_name: None }).collect();
        self
    }

    pub fn password(mut self, role: &str, password: &str) -> Self {
        self.passwords.insert(role.into(), password.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn list_branches_calls(&self) -> usize {
        self.list_branches_calls.load(Ordering::SeqCst)
    }

    pub fn get_branch_calls(&self) -> usize {
        self.get_branch_calls.load(Ordering::SeqCst)
    }

    /// `(target branch, request)` for every restore issued
    pub fn restores(&self) -> Vec<(String, RestoreRequest)> {
        self.restores.lock().unwrap().clone()
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.hit();
        Ok(self.projects.clone())
    }

    async fn list_branches(&self, _project_id: &str) -> Result<Vec<Branch>> {
        self.hit();
        self.list_branches_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.branches.clone())
    }

    async fn get_branch(&self, _project_id: &str, branch_id: &str) -> Result<Branch> {
        self.hit();
        self.get_branch_calls.fetch_add(1, Ordering::SeqCst);
        self.branches
            .iter()
            .find(|b| b.id == branch_id)
            .cloned()
            .ok_or_else(|| CtlError::Api { status: 404, message: "branch not found".into() })
    }

    async fn list_endpoints(&self, _project_id: &str, branch_id: &str) -> Result<Vec<Endpoint>> {
        self.hit();
        Ok(self.endpoints.iter().filter(|e| e.branch_id == branch_id).cloned().collect())
    }

    async fn list_roles(&self, _project_id: &str, _branch_id: &str) -> Result<Vec<Role>> {
        self.hit();
        Ok(self.roles.clone())
    }

    async fn list_databases(&self, _project_id: &str, _branch_id: &str) -> Result<Vec<Database>> {
        self.hit();
        Ok(self.databases.clone())
    }

    async fn get_role_password(
        &self,
        _project_id: &str,
        _branch_id: &str,
        role_name: &str,
    ) -> Result<String> {
        self.hit();
        self.passwords
            .get(role_name)
            .cloned()
            .ok_or_else(|| CtlError::Api { status: 404, message: "role not found".into() })
    }

    async fn current_user(&self) -> Result<User> {
        self.hit();
        Ok(User { id: "user-1".into(), email: None })
    }

    async fn restore_branch(
        &self,
        project_id: &str,
        branch_id: &str,
        request: &RestoreRequest,
    ) -> Result<Branch> {
        self.restores.lock().unwrap().push((branch_id.to_string(), request.clone()));
        self.get_branch(project_id, branch_id).await
    }
}
