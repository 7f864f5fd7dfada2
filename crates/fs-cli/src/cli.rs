use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser};
use fs_types::{
    CustomerId, ServerId, config::{ConsoleEndpoint, DEFAULT_WS_PORT, SessionPolicy}, validation::validate_host
};
use secrecy::SecretString;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Reported as the client address when `--direct` bypasses the console.
pub const DIRECT_CLIENT_IP: &str = "127.0.0.1";

#[derive(Debug, Parser)]
#[command(name = "fleetssh", about = "Open an SSH terminal to a fleet console server")]
pub struct Args {
    /// Server id as known to the console
    #[arg(value_name = "SERVER_ID")]
    server: String,
    /// Console API base URL (defaults to FLEETSSH_API, then http://127.0.0.1:8000)
    #[arg(long = "api", value_name = "URL", help_heading = "Console Options")]
    api: Option<String>,
    /// Bearer token for the API and the terminal channel (defaults to FLEETSSH_TOKEN)
    #[arg(long, value_name = "TOKEN", help_heading = "Console Options")]
    token: Option<String>,
    /// Customer whose server list to return to when the session ends
    #[arg(long = "customer", value_name = "ID", help_heading = "Console Options")]
    customer: Option<String>,
    /// SSH bridge host (defaults to the API host)
    #[arg(long = "ws-host", value_name = "HOST", help_heading = "Console Options")]
    ws_host: Option<String>,
    /// SSH bridge port (default 8000)
    #[arg(long = "ws-port", value_name = "PORT", help_heading = "Console Options")]
    ws_port: Option<u16>,
    /// Use wss:// for the bridge; implied by an https API URL
    #[arg(long, action = ArgAction::SetTrue, help_heading = "Console Options")]
    secure: bool,
    /// Log in to [user@]host[:port] directly instead of revealing a console credential
    #[arg(long, value_name = "TARGET", help_heading = "Direct Options")]
    direct: Option<String>,
    /// Password for --direct (defaults to FLEETSSH_PASSWORD)
    #[arg(short = 'p', long, value_name = "PASSWORD", requires = "direct", help_heading = "Direct Options")]
    password: Option<String>,
    /// Display name shown in the status line for --direct targets
    #[arg(long, value_name = "NAME", requires = "direct", help_heading = "Direct Options")]
    hostname: Option<String>,
    /// Idle seconds before the session warns (default 900)
    #[arg(long = "idle-warning", value_name = "SECONDS", help_heading = "Session Options")]
    idle_warning: Option<u64>,
    /// Idle seconds before the session is closed (default 1200)
    #[arg(long = "auto-logout", value_name = "SECONDS", help_heading = "Session Options")]
    auto_logout: Option<u64>,
    /// Scrollback lines kept for copying (default 10000)
    #[arg(long, value_name = "LINES", help_heading = "Session Options")]
    scrollback: Option<usize>,
    /// Write logs to this file instead of stderr
    #[arg(long = "log-file", value_name = "PATH")]
    log_file: Option<PathBuf>,
    /// Raise log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    pub fn parse_config() -> Result<Config> {
        let args = Args::parse();
        Config::try_from(args)
    }
}

/// How the session finds its SSH target.
#[derive(Debug)]
pub enum Target {
    /// Reveal the server's credential through the console API.
    Console,
    /// Bootstrap with a target given on the command line.
    Direct {
        host: String,
        port: u16,
        username: String,
        password: Option<SecretString>,
        hostname: Option<String>,
    },
}

#[derive(Debug)]
pub struct Config {
    pub server_id: ServerId,
    pub customer_id: Option<CustomerId>,
    pub token: Option<SecretString>,
    pub endpoint: ConsoleEndpoint,
    pub policy: SessionPolicy,
    pub target: Target,
    pub log_file: Option<PathBuf>,
    pub verbosity: u8,
}

impl TryFrom<Args> for Config {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self> {
        let Args {
            server,
            api,
            token,
            customer,
            ws_host,
            ws_port,
            secure,
            direct,
            password,
            hostname,
            idle_warning,
            auto_logout,
            scrollback,
            log_file,
            verbose,
        } = args;

        let server_id = server.trim().to_string();
        if server_id.is_empty() {
            bail!("SERVER_ID must not be empty");
        }

        let api = api
            .or_else(|| non_empty_env("FLEETSSH_API"))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = Url::parse(&api).with_context(|| format!("invalid --api URL {api}"))?;
        let ws_host = match ws_host {
            Some(host) => host,
            None => api_url
                .host_str()
                .map(str::to_string)
                .ok_or_else(|| anyhow!("--api URL {api} has no host; pass --ws-host"))?,
        };
        validate_host(&ws_host).context("invalid --ws-host")?;
        let endpoint = ConsoleEndpoint {
            api_base_url: api,
            ws_host,
            ws_port: ws_port.unwrap_or(DEFAULT_WS_PORT),
            secure: secure || api_url.scheme() == "https",
        };

        let token = token.or_else(|| non_empty_env("FLEETSSH_TOKEN")).map(SecretString::from);
        let policy = build_policy(idle_warning, auto_logout, scrollback)?;

        let target = match direct {
            None => Target::Console,
            Some(direct) => {
                let parts = parse_target(&direct)?;
                let username = parts
                    .inferred_username
                    .or_else(fallback_username)
                    .ok_or_else(|| anyhow!("unable to determine username; use user@host"))?;
                let password = password
                    .or_else(|| non_empty_env("FLEETSSH_PASSWORD"))
                    .filter(|p| !p.is_empty())
                    .map(SecretString::from);
                Target::Direct {
                    host: parts.host,
                    port: parts.port,
                    username,
                    password,
                    hostname,
                }
            }
        };

        Ok(Config {
            server_id,
            customer_id: customer,
            token,
            endpoint,
            policy,
            target,
            log_file,
            verbosity: verbose,
        })
    }
}

fn build_policy(idle_warning: Option<u64>, auto_logout: Option<u64>, scrollback: Option<usize>) -> Result<SessionPolicy> {
    let mut policy = SessionPolicy::default();
    if let Some(secs) = idle_warning {
        policy.idle_warning = Duration::from_secs(secs);
    }
    if let Some(secs) = auto_logout {
        policy.auto_logout = Duration::from_secs(secs);
    }
    if let Some(lines) = scrollback {
        if lines == 0 {
            bail!("--scrollback must be greater than zero");
        }
        policy.scrollback_lines = lines;
    }
    if policy.idle_warning.is_zero() {
        bail!("--idle-warning must be greater than zero");
    }
    if policy.auto_logout <= policy.idle_warning {
        bail!(
            "--auto-logout ({}s) must be longer than --idle-warning ({}s)",
            policy.auto_logout.as_secs(),
            policy.idle_warning.as_secs()
        );
    }
    Ok(policy)
}

#[derive(Debug, PartialEq, Eq)]
pub struct TargetParts {
    pub host: String,
    pub port: u16,
    pub inferred_username: Option<String>,
}

/// Split `[user@]host[:port]`; IPv6 hosts go in brackets.
pub fn parse_target(input: &str) -> Result<TargetParts> {
    let (username_part, host_part) = if let Some((user, host)) = input.rsplit_once('@') {
        if user.is_empty() {
            bail!("empty username in {input}");
        }
        (Some(user.to_string()), host.to_string())
    } else {
        (None, input.to_string())
    };

    let (host, port) = if host_part.starts_with('[') {
        parse_bracketed_host(&host_part)?
    } else if let Some((host, port_str)) = host_part.rsplit_once(':') {
        let port = port_str.parse::<u16>().context("invalid port")?;
        (host.to_string(), port)
    } else {
        (host_part, 22)
    };
    if port == 0 {
        bail!("invalid port 0");
    }
    validate_host(&host).with_context(|| format!("invalid target {input}"))?;

    Ok(TargetParts {
        host,
        port,
        inferred_username: username_part,
    })
}

fn parse_bracketed_host(input: &str) -> Result<(String, u16)> {
    if let Some((host, port)) = input.rsplit_once("]:") {
        let host = host.trim_start_matches('[');
        let port = port.parse::<u16>().context("invalid port")?;
        Ok((host.to_string(), port))
    } else {
        let host = input.trim_start_matches('[').trim_end_matches(']');
        Ok((host.to_string(), 22))
    }
}

fn fallback_username() -> Option<String> {
    for key in ["FLEETSSH_USER", "USER", "LOGNAME", "USERNAME"] {
        if let Some(value) = non_empty_env(key) {
            return Some(value);
        }
    }
    let current = whoami::username();
    if current.is_empty() { None } else { Some(current) }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}
