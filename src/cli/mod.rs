//! `fieldops` command line
//! -----------------------
//! Argument parsing and command dispatch for the binary. Flags are hand-parsed; every
//! command runs against one gateway built from `ClientConfig` and a file-backed session.

pub mod outputformatter;

pub use outputformatter::{page_footer, print_page, render_table};

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

use crate::config::ClientConfig;
use crate::files::DirectorySaver;
use crate::gateway::Gateway;
use crate::identity::{display_name, home_for, AuthService, LoginRequest, NavigationDecision, NavigationGuard, SessionStore};
use crate::local_store::FileStore;
use crate::resources::{Resource, ResourceClient};

pub fn usage(program: &str) -> String {
    format!(
        "Usage:\n  {program} [flags] <command> [args]\n\nCommands:\n  login <email> <password>     authenticate and store the session\n  logout                       forget the stored session\n  whoami                       show the current session\n  list <resource>              list records (proposals, work-orders, invoices, customers, users)\n  get <resource> <id>          fetch one record\n  download <resource> <id>     save the PDF of a proposal or invoice\n  route <path>                 show how navigation to <path> would be gated\n\nFlags:\n  --api-url <url>              API base URL (env FIELDOPS_API_URL)\n  --state-dir <dir>            session directory (env FIELDOPS_STATE_DIR)\n  --out <dir>                  download directory (env FIELDOPS_DOWNLOAD_DIR)\n  --page <n>                   page index for list\n  --size <n>                   page size for list\n  -h, --help                   show this help\n\nSet FIELDOPS_OUTPUT=json to print lists as JSON."
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { email: String, password: String },
    Logout,
    WhoAmI,
    List { resource: Resource, page: Option<u64>, size: Option<u64> },
    Get { resource: Resource, id: String },
    Download { resource: Resource, id: String },
    Route { path: String },
    Help,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(&self, mut cfg: ClientConfig) -> Result<ClientConfig> {
        if let Some(u) = &self.api_url { cfg = cfg.with_base_url(u)?; }
        if let Some(d) = &self.state_dir { cfg.state_dir = d.clone(); }
        if let Some(d) = &self.download_dir { cfg.download_dir = d.clone(); }
        Ok(cfg)
    }
}

fn take_value(args: &[String], i: usize, flag: &str) -> Result<String> {
    args.get(i + 1).cloned().ok_or_else(|| anyhow!("{} requires a value", flag))
}

fn parse_number(v: &str, flag: &str) -> Result<u64> {
    v.trim().parse::<u64>().with_context(|| format!("{} expects a non-negative number, got '{}'", flag, v))
}

fn resource_arg(v: Option<&String>) -> Result<Resource> {
    let raw = v.ok_or_else(|| anyhow!("missing resource name"))?;
    raw.parse::<Resource>().map_err(|e| anyhow!(e))
}

fn id_arg(v: Option<&String>) -> Result<String> {
    v.cloned().ok_or_else(|| anyhow!("missing record id"))
}

/// Parse the arguments after the program name.
pub fn parse_args(args: &[String]) -> Result<(Overrides, Command)> {
    let mut ov = Overrides::default();
    let mut page: Option<u64> = None;
    let mut size: Option<u64> = None;
    let mut positional: Vec<String> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--api-url" => { ov.api_url = Some(take_value(args, i, "--api-url")?); i += 2; }
            "--state-dir" => { ov.state_dir = Some(PathBuf::from(take_value(args, i, "--state-dir")?)); i += 2; }
            "--out" => { ov.download_dir = Some(PathBuf::from(take_value(args, i, "--out")?)); i += 2; }
            "--page" => { page = Some(parse_number(&take_value(args, i, "--page")?, "--page")?); i += 2; }
            "--size" => { size = Some(parse_number(&take_value(args, i, "--size")?, "--size")?); i += 2; }
            "-h" | "--help" => return Ok((ov, Command::Help)),
            other if other.starts_with("--") => bail!("unknown flag: {}", other),
            other => { positional.push(other.to_string()); i += 1; }
        }
    }

    let Some(name) = positional.first() else { return Ok((ov, Command::Help)); };
    let cmd = match name.to_ascii_lowercase().as_str() {
        "login" => {
            let email = positional.get(1).cloned().ok_or_else(|| anyhow!("login requires <email> <password>"))?;
            let password = positional.get(2).cloned().ok_or_else(|| anyhow!("login requires <email> <password>"))?;
            Command::Login { email, password }
        }
        "logout" => Command::Logout,
        "whoami" => Command::WhoAmI,
        "list" => Command::List { resource: resource_arg(positional.get(1))?, page, size },
        "get" => Command::Get { resource: resource_arg(positional.get(1))?, id: id_arg(positional.get(2))? },
        "download" => Command::Download { resource: resource_arg(positional.get(1))?, id: id_arg(positional.get(2))? },
        "route" => Command::Route { path: positional.get(1).cloned().ok_or_else(|| anyhow!("route requires <path>"))? },
        "help" => Command::Help,
        other => bail!("unknown command: {}", other),
    };
    Ok((ov, cmd))
}

/// Everything a command needs, wired from configuration.
pub struct CliContext {
    pub config: ClientConfig,
    pub session: Arc<SessionStore>,
    pub gateway: Arc<Gateway>,
}

impl CliContext {
    pub fn open(config: ClientConfig) -> Result<Self> {
        let store = FileStore::open(&config.state_dir)?;
        let session = SessionStore::open(Arc::new(store));
        let gateway = Arc::new(Gateway::from_config(&config, session.clone())?);
        debug!(target: "session", "state in {}", config.state_dir.display());
        Ok(Self { config, session, gateway })
    }
}

pub async fn run(ctx: &CliContext, cmd: Command, program: &str) -> Result<()> {
    match cmd {
        Command::Help => println!("{}", usage(program)),
        Command::Login { email, password } => {
            let auth = AuthService::new(ctx.gateway.clone());
            let s = auth.login(&LoginRequest { email, password }).await?;
            let who = s.profile().and_then(display_name).unwrap_or_else(|| "user".to_string());
            let role = s.role().map(|r| r.as_str()).unwrap_or("unknown");
            println!("logged in as {} (role: {}); home: {}", who, role, home_for(s.role()));
        }
        Command::Logout => {
            AuthService::new(ctx.gateway.clone()).logout()?;
            println!("logged out");
        }
        Command::WhoAmI => {
            let s = ctx.session.snapshot();
            if !s.is_authenticated() {
                println!("not logged in");
            } else {
                let who = s.profile().and_then(display_name).unwrap_or_else(|| "<unknown>".to_string());
                println!("user: {}", who);
                println!("role: {}", s.role().map(|r| r.as_str()).unwrap_or("<none>"));
                println!("tenant: {}", s.tenant_id().unwrap_or("<none>"));
                if let Some(exp) = s.claims.expiry() {
                    println!("expires: {}", exp.to_rfc3339());
                }
            }
        }
        Command::List { resource, page, size } => {
            let client = ResourceClient::new(ctx.gateway.clone(), resource);
            let p = client.list(page, size).await?;
            print_page(&p);
        }
        Command::Get { resource, id } => {
            let client = ResourceClient::new(ctx.gateway.clone(), resource);
            let v = client.get(&id).await?;
            println!("{}", serde_json::to_string_pretty(&v)?);
        }
        Command::Download { resource, id } => {
            let client = ResourceClient::new(ctx.gateway.clone(), resource);
            let saver = DirectorySaver::new(ctx.config.download_dir.clone());
            let saved = client.download_document(&id, &saver).await?;
            println!("saved {} ({} bytes, {})", saved.path.display(), saved.size, saved.media_type);
        }
        Command::Route { path } => {
            match NavigationGuard::platform_default().navigate(&ctx.session, &path) {
                NavigationDecision::Allow => println!("allow {}", path),
                NavigationDecision::RedirectToLogin { login_path, return_to: Some(r) } => {
                    println!("redirect {}?returnTo={}", login_path, urlencoding::encode(&r))
                }
                NavigationDecision::RedirectToLogin { login_path, return_to: None } => println!("redirect {}", login_path),
                NavigationDecision::Blocked { notice } => println!("blocked: {}", notice),
            }
        }
    }
    Ok(())
}
