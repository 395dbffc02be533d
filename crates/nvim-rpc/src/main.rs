//! nvim-rpc - command-line msgpack-RPC client for Neovim.
//!
//! Attaches to a running editor (unix socket or TCP) or spawns an embedded one,
//! then dumps API metadata, issues a single call, or prints notifications.

mod convert;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use nvim_core::{
    Client, DefaultHandler, Handler, LogConfig, LogContext, NvimError, SessionConfig, Transport,
    Value,
};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "nvim-rpc")]
#[command(about = "msgpack-RPC client for Neovim")]
struct Args {
    /// Unix socket the editor listens on
    #[arg(long, conflicts_with_all = ["tcp", "embed"])]
    socket: Option<PathBuf>,

    /// TCP address the editor listens on (host:port)
    #[arg(long, conflicts_with = "embed")]
    tcp: Option<String>,

    /// Spawn an embedded editor and talk to it over stdio
    #[arg(long)]
    embed: bool,

    /// Editor executable used with --embed
    #[arg(long, default_value = "nvim")]
    nvim: String,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the channel id, version, and object types the editor reports
    ApiInfo {
        /// Also list every function
        #[arg(long)]
        functions: bool,
    },
    /// Call one function; arguments are JSON values
    Call {
        method: String,
        args: Vec<String>,
    },
    /// Subscribe to events and print notifications as JSON lines
    Listen { events: Vec<String> },
}

/// Prints every notification as one JSON line.
struct PrintNotifications;

#[async_trait(?Send)]
impl Handler for PrintNotifications {
    async fn handle_notification(&self, client: &mut Client, method: &str, params: Vec<Value>) {
        let api = client.api_info();
        let params = convert::to_json(&Value::Array(params), Some(&*api));
        println!("{}", serde_json::json!({ "method": method, "params": params }));
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let mut log_config = LogConfig::from_env()?;
    if args.debug {
        log_config = log_config.with_filter("debug");
    }
    LogContext::new(log_config)?.install()?;

    let transport = connect(&args).await?;
    info!("Connected via {}", transport.description());

    let mut config = SessionConfig::new();
    if let Some(ms) = args.timeout_ms {
        config = config.with_request_timeout(Duration::from_millis(ms));
    }

    let handler: Rc<dyn Handler> = match args.command {
        Command::Listen { .. } => Rc::new(PrintNotifications),
        _ => Rc::new(DefaultHandler),
    };
    let mut client = Client::attach(transport, config, handler)
        .await
        .context("failed to attach to the editor")?;

    match args.command {
        Command::ApiInfo { functions } => print_api_info(&client, functions)?,
        Command::Call { method, args } => {
            let api = client.api_info();
            let params = args
                .iter()
                .map(|arg| convert::from_json(&parse_arg(arg), Some(&*api)))
                .collect();
            let result = client.call(&method, params).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&convert::to_json(&result, Some(&*api)))?
            );
        }
        Command::Listen { events } => {
            for event in &events {
                client.subscribe(event).await?;
                debug!("Subscribed to {}", event);
            }
            match client.run().await {
                Ok(()) | Err(NvimError::ConnectionClosed { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    Ok(())
}

async fn connect(args: &Args) -> Result<Transport> {
    if args.embed {
        let mut command = tokio::process::Command::new(&args.nvim);
        command.args(["--embed", "--headless"]);
        return Transport::child(&mut command)
            .with_context(|| format!("failed to spawn {}", args.nvim));
    }
    if let Some(addr) = &args.tcp {
        return Ok(Transport::tcp(addr.as_str()).await?);
    }
    if let Some(path) = &args.socket {
        return connect_socket(path).await;
    }

    // Inside a :terminal the editor exports its own address.
    match std::env::var("NVIM").or_else(|_| std::env::var("NVIM_LISTEN_ADDRESS")) {
        Ok(addr) if looks_like_tcp(&addr) => Ok(Transport::tcp(addr.as_str()).await?),
        Ok(addr) => connect_socket(&PathBuf::from(addr)).await,
        Err(_) => bail!("no editor address: pass --socket, --tcp, or --embed"),
    }
}

#[cfg(unix)]
async fn connect_socket(path: &std::path::Path) -> Result<Transport> {
    Transport::unix(path)
        .await
        .with_context(|| format!("failed to connect to {}", path.display()))
}

#[cfg(not(unix))]
async fn connect_socket(path: &std::path::Path) -> Result<Transport> {
    bail!("unix sockets are not supported here: {}", path.display())
}

fn looks_like_tcp(addr: &str) -> bool {
    !addr.contains('/') && addr.rsplit_once(':').is_some_and(|(_, port)| port.parse::<u16>().is_ok())
}

/// Arguments are JSON; anything that does not parse is taken as a string.
fn parse_arg(arg: &str) -> serde_json::Value {
    serde_json::from_str(arg).unwrap_or_else(|_| serde_json::Value::String(arg.to_string()))
}

fn print_api_info(client: &Client, functions: bool) -> Result<()> {
    let api = client.api_info();
    let types: Vec<_> = api
        .types()
        .iter()
        .map(|ty| serde_json::json!({ "name": ty.name, "id": ty.code, "prefix": ty.prefix }))
        .collect();
    let mut summary = serde_json::json!({
        "channel_id": api.channel_id(),
        "version": api.version().map(|v| format!("{}.{}.{}", v.major, v.minor, v.patch)),
        "api_level": api.version().map(|v| v.api_level),
        "types": types,
        "function_count": api.functions().len(),
    });
    if functions {
        summary["functions"] = api
            .functions()
            .iter()
            .map(|function| {
                serde_json::json!({
                    "name": function.name,
                    "parameters": function.parameters,
                    "return_type": function.return_type,
                    "receiver": function.receiver,
                    "deprecated": function.is_deprecated(),
                })
            })
            .collect();
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_call() {
        let args = Args::parse_from(["nvim-rpc", "--socket", "/tmp/nvim.sock", "call", "nvim_eval", "\"1+1\""]);
        assert_eq!(args.socket, Some(PathBuf::from("/tmp/nvim.sock")));
        match args.command {
            Command::Call { method, args } => {
                assert_eq!(method, "nvim_eval");
                assert_eq!(args, vec!["\"1+1\"".to_string()]);
            }
            other => panic!("Expected call, got: {:?}", other),
        }
    }

    #[test]
    fn test_transport_flags_conflict() {
        assert!(Args::try_parse_from(["nvim-rpc", "--socket", "/tmp/s", "--embed", "api-info"]).is_err());
    }

    #[test]
    fn test_parse_arg_falls_back_to_string() {
        assert_eq!(parse_arg("[1, 2]"), serde_json::json!([1, 2]));
        assert_eq!(parse_arg("echo hi"), serde_json::json!("echo hi"));
    }

    #[test]
    fn test_looks_like_tcp() {
        assert!(looks_like_tcp("127.0.0.1:6666"));
        assert!(!looks_like_tcp("/tmp/nvim.sock"));
        assert!(!looks_like_tcp("nvim.sock"));
    }
}
