mod bootstrap;

use std::os::unix::fs::PermissionsExt as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use keywarden_agent::transport::{self, Operation};
use keywarden_agent::{SigningRequestHandler, SshAgent};
use keywarden_core::config::{self, Config};
use keywarden_file::FileKeyring;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

const USAGE: &str = "\
Usage: keywardend [--config <path>] <command>

Commands:
  serve                 Run the SSH agent socket for the configured caller
  invoke [sign|identities]
                        Handle one gateway event read from stdin and write
                        the response to stdout (default: sign)

Options:
  -c, --config <path>   Path to config file (default: $XDG_CONFIG_HOME/keywarden/config.toml)
  -h, --help            Show this help message";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Serve,
    Invoke(Operation),
}

#[derive(Debug)]
struct Args {
    config_path: Option<PathBuf>,
    command: Command,
}

enum ParseOutcome {
    Run(Args),
    Help,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(ParseOutcome::Run(args)) => args,
        Ok(ParseOutcome::Help) => {
            eprintln!("{USAGE}");
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("error: {e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    let config_path = args.config_path.unwrap_or_else(config::default_config_path);

    // Config warnings are emitted before the configured filter exists.
    let early = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter("warn")
        .finish();
    let config = tracing::subscriber::with_default(early, || Config::load(&config_path))?;

    init_logging(&config.service.log_level);
    bootstrap::harden_process(args.command == Command::Serve);
    info!("loaded config from {}", config_path.display());

    let passphrase = read_passphrase(&config.keyring.passphrase_env)?;
    let keyring = FileKeyring::new(config.keyring.path.clone(), passphrase);
    info!(keyring = %keyring.path().display(), "using file keyring");
    let handler = SigningRequestHandler::new(Arc::new(keyring), config.service.multi_key_policy);

    match args.command {
        Command::Serve => serve(handler, &config).await,
        Command::Invoke(operation) => invoke(&handler, operation).await,
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<ParseOutcome, String> {
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().ok_or("--config requires a path argument")?;
                config_path = Some(PathBuf::from(path));
            }
            "--help" | "-h" => return Ok(ParseOutcome::Help),
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    config_path = Some(PathBuf::from(path));
                } else if other.starts_with('-') {
                    return Err(format!("unknown option '{other}'"));
                } else {
                    positional.push(arg);
                }
            }
        }
    }

    let command = match positional.as_slice() {
        [cmd] if cmd == "serve" => Command::Serve,
        [cmd] if cmd == "invoke" => Command::Invoke(Operation::default()),
        [cmd, op] if cmd == "invoke" => Command::Invoke(op.parse()?),
        [] => return Err("missing command".to_string()),
        _ => return Err(format!("unexpected arguments: {}", positional.join(" "))),
    };

    Ok(ParseOutcome::Run(Args {
        config_path,
        command,
    }))
}

/// `RUST_LOG` wins over the configured directive.  Logs go to stderr so
/// `invoke` keeps stdout for the response document.
fn init_logging(directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .unwrap_or_else(|e| {
            eprintln!("invalid log_level '{directive}' ({e}), using 'info'");
            EnvFilter::new("info")
        });
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn read_passphrase(var: &str) -> Result<Zeroizing<String>> {
    let passphrase = std::env::var(var)
        .map(Zeroizing::new)
        .with_context(|| format!("keyring passphrase: environment variable {var} is not set"))?;
    if passphrase.is_empty() {
        anyhow::bail!("keyring passphrase: environment variable {var} is empty");
    }
    Ok(passphrase)
}

async fn serve(handler: SigningRequestHandler, config: &Config) -> Result<()> {
    let caller = config
        .agent
        .caller
        .clone()
        .context("[agent] caller must be set to serve the agent socket")?;
    let socket = config
        .agent
        .socket
        .clone()
        .or_else(config::default_socket_path)
        .context("no agent socket path: set [agent] socket or XDG_RUNTIME_DIR")?;

    prepare_socket_dir(&socket)?;

    info!(socket = %socket.display(), caller = %caller, "SSH agent listening");
    let agent = SshAgent::new(handler, caller, socket.clone());

    tokio::select! {
        result = agent.listen() => result?,
        () = shutdown_signal() => info!("received shutdown signal, exiting"),
    }

    if let Err(e) = std::fs::remove_file(&socket) {
        warn!(path = %socket.display(), "failed to remove agent socket: {e}");
    }
    Ok(())
}

fn prepare_socket_dir(socket: &Path) -> Result<()> {
    if let Some(dir) = socket.parent()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create socket directory {}", dir.display()))?;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("chmod 0700 {}", dir.display()))?;
    }

    // Remove stale socket from a previous run.
    if socket.exists()
        && let Err(e) = std::fs::remove_file(socket)
    {
        warn!(path = %socket.display(), "failed to remove stale agent socket: {e}");
    }
    Ok(())
}

async fn invoke(handler: &SigningRequestHandler, operation: Operation) -> Result<()> {
    let mut event = String::new();
    tokio::io::stdin()
        .read_to_string(&mut event)
        .await
        .context("read event from stdin")?;

    let response = transport::invoke(handler, operation, &event).await;
    info!(status = response.status_code, "invocation finished");

    let mut out = serde_json::to_vec(&response).context("serialize response")?;
    out.push(b'\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&out).await.context("write response")?;
    stdout.flush().await.context("flush stdout")?;
    Ok(())
}

/// Wait for ctrl-c (SIGINT) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!("failed to register SIGTERM handler: {e}, falling back to SIGINT only");
            ctrl_c.await.ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ParseOutcome, String> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    fn run(args: &[&str]) -> Args {
        match parse(args) {
            Ok(ParseOutcome::Run(args)) => args,
            Ok(ParseOutcome::Help) => panic!("unexpected help"),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn serve_with_config() {
        let args = run(&["--config", "/etc/kw.toml", "serve"]);
        assert_eq!(args.command, Command::Serve);
        assert_eq!(args.config_path, Some(PathBuf::from("/etc/kw.toml")));

        let args = run(&["serve", "--config=/tmp/kw.toml"]);
        assert_eq!(args.config_path, Some(PathBuf::from("/tmp/kw.toml")));
    }

    #[test]
    fn invoke_defaults_to_sign() {
        assert_eq!(run(&["invoke"]).command, Command::Invoke(Operation::Sign));
        assert_eq!(
            run(&["-c", "x.toml", "invoke", "identities"]).command,
            Command::Invoke(Operation::ListIdentities)
        );
        assert!(run(&["invoke"]).config_path.is_none());
    }

    #[test]
    fn help_short_circuits() {
        assert!(matches!(parse(&["serve", "--help"]), Ok(ParseOutcome::Help)));
        assert!(matches!(parse(&["-h"]), Ok(ParseOutcome::Help)));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--config"]).is_err());
        assert!(parse(&["--verbose", "serve"]).is_err());
        assert!(parse(&["invoke", "delete"]).is_err());
        assert!(parse(&["serve", "extra"]).is_err());
    }

    #[test]
    fn stale_socket_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("run").join("agent.sock");

        prepare_socket_dir(&socket).unwrap();
        let mode = std::fs::metadata(socket.parent().unwrap())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);

        std::fs::write(&socket, b"").unwrap();
        prepare_socket_dir(&socket).unwrap();
        assert!(!socket.exists());
    }
}
