//! Command Line Interface
//!
//! clap definitions and the command handlers behind them.
//!
//! # Commands
//! - `auth` - Interactive browser login
//! - `set-context` - Write `.neon` defaults for the current directory
//! - `branches list | get | restore` - Branch catalog operations
//! - `connection-string` - Build a URI, print its parts, or hand it to `psql`
//!
//! Every command except `auth` and `set-context` first passes through
//! [`ensure_auth`]. A 401 from the control plane while using a token from the
//! credential file removes that file so the next run starts clean.

use std::io::Write;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};

use crate::api::{ApiClient, ControlPlane, EndpointType, RestoreRequest};
use crate::auth::{
    ensure_auth, login_and_persist, AuthContext, Authenticator, Credential, CredentialStore,
    OAuthAuthenticator, TokenSet,
};
use crate::auth::oauth::DEFAULT_CLIENT_ID;
use crate::config::{
    ensure_config_dir, ContextFile, Settings, CONTEXT_FILE, DEFAULT_API_HOST, DEFAULT_OAUTH_HOST,
};
use crate::connection_string::{connection_target, ConnectionOptions, SslMode};
use crate::error::{CtlError, Result};
use crate::output::{write_records, OutputFormat};
use crate::point_in_time::resolve_point_in_time;
use crate::psql::run_psql;
use crate::resolve::{branch_id_resolve, project_id_resolve};

const BRANCH_FIELDS: &[&str] = &["id", "name", "default", "parent_id", "created_at"];
const DETAIL_FIELDS: &[&str] = &["host", "user", "password", "database", "connection_string"];

/// neonctl - command-line client for the Neon control plane
#[derive(Parser, Debug)]
#[command(name = "neonctl")]
#[command(about = "Command-line client for the Neon serverless Postgres control plane")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags accepted by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// API key, skips the stored credentials entirely
    #[arg(long, global = true, env = "NEON_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, global = true, env = "NEON_API_HOST", default_value = DEFAULT_API_HOST)]
    pub api_host: String,

    #[arg(long, global = true, env = "NEON_OAUTH_HOST", default_value = DEFAULT_OAUTH_HOST)]
    pub oauth_host: String,

    #[arg(long, global = true, env = "NEON_CLIENT_ID", default_value = DEFAULT_CLIENT_ID)]
    pub client_id: String,

    /// Directory holding credentials.json
    #[arg(long, global = true, env = "NEON_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Context file written by set-context
    #[arg(long, global = true, default_value = CONTEXT_FILE)]
    pub context_file: PathBuf,

    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

impl GlobalArgs {
    pub fn settings(&self) -> Result<Settings> {
        Ok(Settings {
            api_key: self.api_key.clone(),
            api_host: self.api_host.clone(),
            oauth_host: self.oauth_host.clone(),
            client_id: self.client_id.clone(),
            config_dir: ensure_config_dir(self.config_dir.as_deref())?,
            context_file: self.context_file.clone(),
            ci: std::env::var_os("CI").is_some(),
        })
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate in the browser and store the credentials
    Auth,

    /// Remember a project (and organization) for the current directory
    SetContext {
        #[arg(long)]
        project_id: Option<String>,

        #[arg(long)]
        org_id: Option<String>,
    },

    /// Manage branches
    Branches {
        #[command(subcommand)]
        command: BranchesCommand,
    },

    /// Get a connection string for a branch
    ConnectionString(ConnectionStringArgs),
}

impl Commands {
    /// Name used in error envelopes
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::SetContext { .. } => "set-context",
            Self::Branches { .. } => "branches",
            Self::ConnectionString(_) => "connection-string",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum BranchesCommand {
    /// List the project's branches
    List {
        #[arg(long)]
        project_id: Option<String>,
    },

    /// Show one branch by name or ID
    Get {
        branch: String,

        #[arg(long)]
        project_id: Option<String>,
    },

    /// Restore a branch to a point in time of itself or another branch
    Restore {
        /// Branch to restore (name or ID)
        target: String,

        /// Source: `name`, `id`, `^self` or `^parent`, optionally `@lsn` or `@timestamp`
        source: String,

        /// Keep the pre-restore state as a new branch with this name
        #[arg(long)]
        preserve_under_name: Option<String>,

        #[arg(long)]
        project_id: Option<String>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionStringArgs {
    /// Branch name or ID, optionally with `@lsn` or `@timestamp`; default branch when omitted
    pub branch: Option<String>,

    #[arg(long)]
    pub project_id: Option<String>,

    #[arg(long)]
    pub role_name: Option<String>,

    #[arg(long)]
    pub database_name: Option<String>,

    /// Connect through the connection pooler
    #[arg(long)]
    pub pooled: bool,

    /// Add Prisma-specific query parameters
    #[arg(long)]
    pub prisma: bool,

    #[arg(long, value_enum)]
    pub endpoint_type: Option<EndpointType>,

    #[arg(long, value_enum, default_value_t = SslMode::Require)]
    pub ssl: SslMode,

    /// Print host, user, password and database separately
    #[arg(long)]
    pub extended: bool,

    /// Open psql with the connection string
    #[arg(long)]
    pub psql: bool,

    /// Arguments passed to psql after `--`
    #[arg(last = true)]
    pub psql_args: Vec<String>,
}

impl ConnectionStringArgs {
    fn options(&self) -> ConnectionOptions {
        ConnectionOptions {
            endpoint_type: self.endpoint_type,
            role_name: self.role_name.clone(),
            database_name: self.database_name.clone(),
            pooled: self.pooled,
            prisma: self.prisma,
            ssl: self.ssl,
        }
    }
}

/// Authenticated state shared by the API-backed commands
struct Session {
    api: ApiClient,
    credential: Credential,
    store: CredentialStore,
    context: ContextFile,
}

impl Session {
    async fn open(settings: &Settings) -> Result<Self> {
        let store = settings.credentials();
        let authenticator = authenticator(settings);
        let ctx = AuthContext {
            api_key: settings.api_key.as_deref(),
            is_auth_command: false,
            ci: settings.ci,
        };

        let credential = ensure_auth(&ctx, &store, &authenticator).await?;
        let token = credential
            .token()
            .ok_or_else(|| CtlError::Unauthorized("no credentials available".into()))?;
        let api = ApiClient::new(&settings.api_host, token)?;
        let context = settings.context()?;

        Ok(Self { api, credential, store, context })
    }

    /// Invalidate stored credentials the control plane rejected
    fn finish(self, result: Result<i32>) -> Result<i32> {
        match result {
            Err(CtlError::Unauthorized(detail)) if self.credential.from_credentials_file() => {
                Err(invalidate_credentials(&self.store, &detail))
            }
            other => other,
        }
    }
}

fn authenticator(settings: &Settings) -> OAuthAuthenticator {
    OAuthAuthenticator::new(&settings.oauth_host, &settings.client_id, &settings.api_host)
}

/// `neonctl auth`: always a fresh browser login, whatever the credential file holds
pub async fn auth_command(
    settings: &Settings,
    store: &CredentialStore,
    authenticator: &dyn Authenticator,
) -> Result<TokenSet> {
    let ctx = AuthContext {
        api_key: settings.api_key.as_deref(),
        is_auth_command: true,
        ci: settings.ci,
    };
    let credential = ensure_auth(&ctx, store, authenticator).await?;
    debug!(?credential, "running auth command");
    login_and_persist(store, authenticator).await
}

/// Delete the credential file after a 401 and build the re-run instruction
pub fn invalidate_credentials(store: &CredentialStore, detail: &str) -> CtlError {
    let removed = match store.delete() {
        Ok(removed) => removed,
        Err(e) => {
            debug!("{}", e.message());
            false
        }
    };
    let note = if removed { " Stored credentials were removed." } else { "" };
    CtlError::Unauthorized(format!("{detail}.{note} Please re-run `neonctl auth` to log in again"))
}

/// Run the parsed command; returns the process exit code
pub async fn run(cli: Cli) -> Result<i32> {
    let settings = cli.global.settings()?;
    let format = cli.global.output;
    let mut out = std::io::stdout();

    match cli.command {
        Commands::Auth => {
            let store = settings.credentials();
            auth_command(&settings, &store, &authenticator(&settings)).await?;
            info!("Saved credentials to {}", store.path().display());
            Ok(0)
        }
        Commands::SetContext { project_id, org_id } => {
            let context = ContextFile { project_id, org_id };
            context.save(&settings.context_file)?;
            info!("Context saved to {}", settings.context_file.display());
            Ok(0)
        }
        Commands::Branches { command } => {
            let session = Session::open(&settings).await?;
            let result =
                branches(&session.api, session.context.project_id.as_deref(), command, format, &mut out)
                    .await;
            session.finish(result)
        }
        Commands::ConnectionString(args) => {
            let session = Session::open(&settings).await?;
            let result = connection_string(
                &session.api,
                session.context.project_id.as_deref(),
                &args,
                format,
                &mut out,
            )
            .await;
            session.finish(result)
        }
    }
}

/// `branches` subcommands
pub async fn branches(
    api: &dyn ControlPlane,
    context_project_id: Option<&str>,
    command: BranchesCommand,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<i32> {
    match command {
        BranchesCommand::List { project_id } => {
            let project_id = project_id_resolve(api, project_id.as_deref(), context_project_id).await?;
            let branches = api.list_branches(&project_id).await?;
            write_records(out, format, &branches, BRANCH_FIELDS)?;
        }
        BranchesCommand::Get { branch, project_id } => {
            let project_id = project_id_resolve(api, project_id.as_deref(), context_project_id).await?;
            let branch_id = branch_id_resolve(api, &project_id, &branch).await?;
            let branch = api.get_branch(&project_id, &branch_id).await?;
            write_records(out, format, &branch, BRANCH_FIELDS)?;
        }
        BranchesCommand::Restore { target, source, preserve_under_name, project_id } => {
            let project_id = project_id_resolve(api, project_id.as_deref(), context_project_id).await?;
            let target_id = branch_id_resolve(api, &project_id, &target).await?;
            let resolved = resolve_point_in_time(api, &project_id, &target_id, &source).await?;
            if resolved.branch_id == target_id && resolved.point.is_head() {
                return Err(CtlError::invalid_input(
                    "Restoring a branch to its own head changes nothing, add @lsn or @timestamp",
                ));
            }

            let request = RestoreRequest {
                source_branch_id: resolved.branch_id,
                source_lsn: resolved.point.lsn().map(str::to_string),
                source_timestamp: resolved.point.timestamp().map(str::to_string),
                preserve_under_name,
            };
            debug!(target = %target_id, source = %request.source_branch_id, "restoring branch");
            let branch = api.restore_branch(&project_id, &target_id, &request).await?;
            write_records(out, format, &branch, BRANCH_FIELDS)?;
        }
    }
    Ok(0)
}

/// `connection-string`
pub async fn connection_string(
    api: &dyn ControlPlane,
    context_project_id: Option<&str>,
    args: &ConnectionStringArgs,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<i32> {
    let project_id = project_id_resolve(api, args.project_id.as_deref(), context_project_id).await?;
    let target =
        connection_target(api, &project_id, args.branch.as_deref(), &args.options()).await?;

    if args.psql {
        return run_psql(&target.to_uri()?, &args.psql_args).await;
    }

    if args.extended {
        write_records(out, format, &target.details()?, DETAIL_FIELDS)?;
    } else {
        writeln!(out, "{}", target.to_uri()?)
            .map_err(|e| CtlError::process(format!("Could not write output: {e}")))?;
    }
    Ok(0)
}
