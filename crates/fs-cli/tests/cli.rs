use std::{env, sync::Mutex, time::Duration};

use anyhow::{Result, anyhow};
use clap::{CommandFactory, Parser};
use fs_cli::cli::{Args, Config, Target, parse_target};
use secrecy::ExposeSecret;
use serial_test::serial;

static ENV_GUARD: Mutex<()> = Mutex::new(());

const ENV_KEYS: [&str; 4] = ["FLEETSSH_API", "FLEETSSH_TOKEN", "FLEETSSH_PASSWORD", "FLEETSSH_USER"];

#[test]
#[serial]
fn console_defaults() {
    let cfg = parse_config(&["srv-1"]).expect("defaults");
    assert_eq!(cfg.server_id, "srv-1");
    assert_eq!(cfg.customer_id, None);
    assert!(cfg.token.is_none());
    assert!(matches!(cfg.target, Target::Console));
    assert_eq!(cfg.endpoint.api_base_url, "http://127.0.0.1:8000");
    assert_eq!(cfg.endpoint.ws_host, "127.0.0.1");
    assert_eq!(cfg.endpoint.ws_port, 8000);
    assert!(!cfg.endpoint.secure);
    assert_eq!(cfg.policy.idle_warning, Duration::from_secs(900));
    assert_eq!(cfg.policy.auto_logout, Duration::from_secs(1200));
    assert_eq!(cfg.verbosity, 0);
}

#[test]
#[serial]
fn empty_server_id_is_rejected() {
    match parse_config(&["  "]) {
        Err(err) => assert!(err.to_string().contains("SERVER_ID"), "unexpected error: {err:?}"),
        Ok(cfg) => panic!("expected error, got {cfg:?}"),
    }
}

#[test]
#[serial]
fn ws_host_follows_api_and_https_implies_secure() {
    let cfg = parse_config(&["--api", "https://console.example.com", "--customer", "acme", "srv-2"]).expect("https api");
    assert_eq!(cfg.endpoint.ws_host, "console.example.com");
    assert!(cfg.endpoint.secure);
    assert_eq!(cfg.customer_id.as_deref(), Some("acme"));

    let cfg = parse_config(&["--api", "http://console.local:9000", "--ws-host", "bridge.local", "--ws-port", "8443", "--secure", "srv-2"])
        .expect("explicit bridge");
    assert_eq!(cfg.endpoint.ws_host, "bridge.local");
    assert_eq!(cfg.endpoint.ws_port, 8443);
    assert!(cfg.endpoint.secure);

    match parse_config(&["--ws-host", "bad host", "srv-2"]) {
        Err(err) => assert!(err.to_string().contains("--ws-host"), "unexpected error: {err:?}"),
        Ok(cfg) => panic!("expected error, got {:?}", cfg.endpoint),
    }
    match parse_config(&["--api", "not a url", "srv-2"]) {
        Err(err) => assert!(err.to_string().contains("invalid --api URL"), "unexpected error: {err:?}"),
        Ok(cfg) => panic!("expected error, got {:?}", cfg.endpoint),
    }
}

#[test]
#[serial]
fn env_fallbacks() {
    let cfg = parse_config_with_env(
        &["srv-3"],
        &[
            ("FLEETSSH_API", Some("http://10.1.2.3:8000")),
            ("FLEETSSH_TOKEN", Some("env-token")),
        ],
    )
    .expect("env api and token");
    assert_eq!(cfg.endpoint.api_base_url, "http://10.1.2.3:8000");
    assert_eq!(cfg.endpoint.ws_host, "10.1.2.3");
    assert_eq!(cfg.token.as_ref().map(|t| t.expose_secret().to_string()).as_deref(), Some("env-token"));

    let cfg = parse_config_with_env(&["--token", "flag-token", "srv-3"], &[("FLEETSSH_TOKEN", Some("env-token"))])
        .expect("flag wins");
    assert_eq!(cfg.token.as_ref().map(|t| t.expose_secret().to_string()).as_deref(), Some("flag-token"));

    let cfg = parse_config_with_env(&["srv-3"], &[("FLEETSSH_TOKEN", Some(""))]).expect("empty env");
    assert!(cfg.token.is_none());
}

#[test]
#[serial]
fn direct_target_and_password() {
    let cfg = parse_config_with_env(
        &["--direct", "deploy@10.0.0.5:2222", "--hostname", "web-01", "srv-4"],
        &[("FLEETSSH_PASSWORD", Some("hunter2"))],
    )
    .expect("direct target");
    match cfg.target {
        Target::Direct {
            host,
            port,
            username,
            password,
            hostname,
        } => {
            assert_eq!(host, "10.0.0.5");
            assert_eq!(port, 2222);
            assert_eq!(username, "deploy");
            assert_eq!(password.map(|p| p.expose_secret().to_string()).as_deref(), Some("hunter2"));
            assert_eq!(hostname.as_deref(), Some("web-01"));
        }
        Target::Console => panic!("expected a direct target"),
    }

    let cfg = parse_config(&["--direct", "db.internal", "srv-4"]).expect("username from env");
    match cfg.target {
        Target::Direct { username, password, port, .. } => {
            assert_eq!(username, "cli-test");
            assert_eq!(port, 22);
            assert!(password.is_none());
        }
        Target::Console => panic!("expected a direct target"),
    }
}

#[test]
#[serial]
fn password_requires_direct() {
    match parse_config(&["-p", "secret", "srv-5"]) {
        Err(err) => assert!(err.to_string().contains("--direct"), "unexpected error: {err:?}"),
        Ok(cfg) => panic!("expected error, got {cfg:?}"),
    }
}

#[test]
#[serial]
fn policy_bounds() {
    let cfg = parse_config(&["--idle-warning", "60", "--auto-logout", "120", "--scrollback", "500", "srv-6"]).expect("custom policy");
    assert_eq!(cfg.policy.idle_warning, Duration::from_secs(60));
    assert_eq!(cfg.policy.auto_logout, Duration::from_secs(120));
    assert_eq!(cfg.policy.scrollback_lines, 500);

    match parse_config(&["--idle-warning", "300", "--auto-logout", "300", "srv-6"]) {
        Err(err) => assert!(err.to_string().contains("must be longer than --idle-warning"), "unexpected error: {err:?}"),
        Ok(cfg) => panic!("expected error, got {:?}", cfg.policy),
    }
    match parse_config(&["--idle-warning", "0", "srv-6"]) {
        Err(err) => assert!(err.to_string().contains("greater than zero"), "unexpected error: {err:?}"),
        Ok(cfg) => panic!("expected error, got {:?}", cfg.policy),
    }
    match parse_config(&["--scrollback", "0", "srv-6"]) {
        Err(err) => assert!(err.to_string().contains("--scrollback"), "unexpected error: {err:?}"),
        Ok(cfg) => panic!("expected error, got {:?}", cfg.policy),
    }
}

#[test]
fn target_parsing_matrix() {
    let parts = parse_target("user@example.com:2222").expect("user host port");
    assert_eq!(parts.host, "example.com");
    assert_eq!(parts.port, 2222);
    assert_eq!(parts.inferred_username.as_deref(), Some("user"));

    let parts = parse_target("host-only").expect("host default port");
    assert_eq!(parts.host, "host-only");
    assert_eq!(parts.port, 22);
    assert_eq!(parts.inferred_username, None);

    let parts = parse_target("[fe80::1]:2200").expect("ipv6 port");
    assert_eq!(parts.host, "fe80::1");
    assert_eq!(parts.port, 2200);

    let parts = parse_target("user@[fe80::2]").expect("ipv6 user default port");
    assert_eq!(parts.host, "fe80::2");
    assert_eq!(parts.port, 22);
    assert_eq!(parts.inferred_username.as_deref(), Some("user"));
}

#[test]
fn invalid_targets_error() {
    for (input, expected) in [
        ("@host", "empty username"),
        ("host:notaport", "invalid port"),
        ("host:0", "invalid port 0"),
        ("bad/host", "invalid target"),
    ] {
        match parse_target(input) {
            Err(err) => assert!(err.to_string().contains(expected), "{input}: unexpected error: {err:?}"),
            Ok(parts) => panic!("{input}: expected error, got {parts:?}"),
        }
    }
}

#[test]
fn help_documents_flags() {
    let usage = Args::command().render_help().to_string();
    for flag in ["--api", "--token", "--customer", "--ws-host", "--direct", "--idle-warning", "--auto-logout", "--log-file"] {
        assert!(usage.contains(flag), "{flag} should be documented");
    }
}

fn parse_config(args: &[&str]) -> Result<Config> {
    parse_config_with_env(args, &[])
}

fn parse_config_with_env(args: &[&str], overrides: &[(&str, Option<&str>)]) -> Result<Config> {
    with_clean_env(|| {
        for (key, value) in overrides {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }
        let mut argv = vec!["fleetssh"];
        argv.extend_from_slice(args);
        let cli = Args::try_parse_from(&argv).map_err(|err| anyhow!(err.to_string()))?;
        Config::try_from(cli)
    })
}

fn with_clean_env<T>(f: impl FnOnce() -> T) -> T {
    let guard = ENV_GUARD.lock().expect("env guard poisoned");
    let previous: Vec<(&str, Option<String>)> = ENV_KEYS.iter().map(|key| (*key, env::var(key).ok())).collect();
    unsafe {
        for key in ENV_KEYS {
            env::remove_var(key);
        }
        env::set_var("FLEETSSH_USER", "cli-test");
    }
    let result = f();
    for (key, value) in previous {
        match value {
            Some(value) => unsafe { env::set_var(key, value) },
            None => unsafe { env::remove_var(key) },
        }
    }
    drop(guard);
    result
}
