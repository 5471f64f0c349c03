//! GitHub implementation of the Remote Provider Port.
//!
//! [`GithubProvider`] carries the provider-level logic (personal vs
//! organization creation, not-found mapping, credential validation) over a
//! narrow [`GithubApi`] surface; [`GithubRestApi`] binds that surface to
//! the REST API with a blocking HTTP client.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::{GitError, Result};
use super::types::{CreateRepoOpts, DeleteRepoOpts, Repository};
use super::ProviderClient;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The token scope required to manage repositories.
const REPO_SCOPE: &str = "repo";

/// Raw REST surface consumed by [`GithubProvider`].
#[cfg_attr(test, mockall::automock)]
pub trait GithubApi {
    /// Describes a repository; `Ok(None)` when it does not exist.
    fn repo(&self, owner: &str, repo: &str) -> Result<Option<Repository>>;
    /// Creates a repository under the authenticated user (`org` is `None`)
    /// or under an organization.
    fn create_repo(
        &self,
        org: Option<String>,
        name: &str,
        description: &str,
        private: bool,
    ) -> Result<Repository>;
    /// Deletes a repository.
    fn delete_repo(&self, owner: &str, repo: &str) -> Result<()>;
    /// Checks whether `path` exists at `reference`; a missing owner,
    /// repository or branch also reports `false`.
    fn contents_exist(&self, owner: &str, repo: &str, path: &str, reference: &str)
        -> Result<bool>;
    /// Returns the OAuth scopes granted to the configured token.
    fn token_scopes(&self) -> Result<Vec<String>>;
}

/// Remote Provider Port bound to a GitHub repository.
pub struct GithubProvider {
    api: Box<dyn GithubApi>,
    owner: String,
    repository: String,
    personal: bool,
}

impl GithubProvider {
    pub fn new(
        api: Box<dyn GithubApi>,
        owner: impl Into<String>,
        repository: impl Into<String>,
        personal: bool,
    ) -> Self {
        Self {
            api,
            owner: owner.into(),
            repository: repository.into(),
            personal,
        }
    }
}

impl ProviderClient for GithubProvider {
    fn get_repo(&self) -> Result<Option<Repository>> {
        log::debug!(
            "describing GitHub repository {}/{}",
            self.owner,
            self.repository
        );
        self.api.repo(&self.owner, &self.repository)
    }

    fn create_repo(&self, opts: CreateRepoOpts) -> Result<Repository> {
        // Personal repositories are created under the authenticated user;
        // anything else goes through the organization endpoint.
        let org = if opts.personal {
            None
        } else {
            Some(opts.owner.clone())
        };
        log::debug!("creating GitHub repository {}/{}", opts.owner, opts.name);
        self.api
            .create_repo(org, &opts.name, &opts.description, opts.privacy)
    }

    fn delete_repo(&self, opts: DeleteRepoOpts) -> Result<()> {
        log::debug!(
            "deleting GitHub repository {}/{}",
            opts.owner,
            opts.repository
        );
        self.api.delete_repo(&opts.owner, &opts.repository)
    }

    fn validate(&self) -> Result<()> {
        let scopes = self.api.token_scopes()?;
        if scopes.iter().any(|s| s == REPO_SCOPE) {
            return Ok(());
        }
        Err(GitError::AuthFailed(format!(
            "github access token does not have {REPO_SCOPE} permissions"
        )))
    }

    fn path_exists(&self, owner: &str, repo: &str, branch: &str, path: &str) -> Result<bool> {
        self.api.contents_exist(owner, repo, path, branch)
    }
}

#[derive(Deserialize)]
struct RepoResponse {
    name: String,
    clone_url: String,
    #[serde(default)]
    owner: Option<LoginResponse>,
    #[serde(default)]
    organization: Option<LoginResponse>,
}

#[derive(Deserialize)]
struct LoginResponse {
    login: String,
}

impl From<RepoResponse> for Repository {
    fn from(r: RepoResponse) -> Self {
        Repository {
            name: r.name,
            clone_url: r.clone_url,
            owner: r.owner.map(|o| o.login).unwrap_or_default(),
            organization: r.organization.map(|o| o.login).unwrap_or_default(),
        }
    }
}

/// [`GithubApi`] over the GitHub REST API.
pub struct GithubRestApi {
    http: reqwest::blocking::Client,
    base_url: String,
    token: SecretString,
}

impl GithubRestApi {
    pub fn new(token: SecretString) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_API_BASE)
    }

    pub fn with_base_url(token: SecretString, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("fluxboot")
            .build()
            .map_err(|e| GitError::Provider(format!("building http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            token,
        })
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> reqwest::blocking::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(self.token.expose_secret())
    }

    fn send(&self, builder: reqwest::blocking::RequestBuilder) -> Result<reqwest::blocking::Response> {
        builder
            .send()
            .map_err(|e| GitError::Network(e.to_string()))
    }
}

impl GithubApi for GithubRestApi {
    fn repo(&self, owner: &str, repo: &str) -> Result<Option<Repository>> {
        let response = self.send(self.request(
            reqwest::Method::GET,
            &format!("/repos/{owner}/{repo}"),
        ))?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: RepoResponse = response
                    .json()
                    .map_err(|e| GitError::Provider(format!("decoding repository: {e}")))?;
                Ok(Some(body.into()))
            }
            status => Err(GitError::Provider(format!(
                "describing repository {owner}/{repo}: HTTP {status}"
            ))),
        }
    }

    fn create_repo(
        &self,
        org: Option<String>,
        name: &str,
        description: &str,
        private: bool,
    ) -> Result<Repository> {
        let path = match org {
            Some(org) => format!("/orgs/{org}/repos"),
            None => "/user/repos".to_string(),
        };
        let body = serde_json::json!({
            "name": name,
            "description": description,
            "private": private,
        });

        let response = self.send(self.request(reqwest::Method::POST, &path).json(&body))?;
        let status = response.status();
        if !status.is_success() {
            return Err(GitError::Provider(format!(
                "creating repository {name}: HTTP {status}"
            )));
        }
        let body: RepoResponse = response
            .json()
            .map_err(|e| GitError::Provider(format!("decoding created repository: {e}")))?;
        Ok(body.into())
    }

    fn delete_repo(&self, owner: &str, repo: &str) -> Result<()> {
        let response = self.send(self.request(
            reqwest::Method::DELETE,
            &format!("/repos/{owner}/{repo}"),
        ))?;
        let status = response.status();
        if !status.is_success() {
            return Err(GitError::Provider(format!(
                "deleting repository {owner}/{repo}: HTTP {status}"
            )));
        }
        Ok(())
    }

    fn contents_exist(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        reference: &str,
    ) -> Result<bool> {
        let response = self.send(
            self.request(
                reqwest::Method::GET,
                &format!("/repos/{owner}/{repo}/contents/{path}"),
            )
            .query(&[("ref", reference)]),
        )?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(GitError::Provider(format!(
                "checking path {path} in {owner}/{repo}: HTTP {status}"
            ))),
        }
    }

    fn token_scopes(&self) -> Result<Vec<String>> {
        let response = self.send(self.request(reqwest::Method::GET, "/user"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(GitError::AuthFailed(format!(
                "validating github credentials: HTTP {status}"
            )));
        }
        let scopes = response
            .headers()
            .get("x-oauth-scopes")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(scopes)
    }
}
