//! widedesk daemon
//!
//! Hosts the canvas engine on an in-memory window system and drives it from
//! a single event loop.
//!
//! Responsibilities:
//! - Own the engine and the layouts the tiler last produced
//! - Handle IPC commands arriving on the Unix socket
//! - Run engine timers (scroll animation, clip fallback, retile flush)
//! - Tear everything down on stop or Ctrl+C

mod config;
mod scheduler;
mod state;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use state::AppState;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use widedesk_core::{TimerId, TimerTask};
use widedesk_ipc::{decode_command_with_limit, encode_response, IpcCommand, IpcResponse};

/// Events that the daemon event loop processes.
pub enum DaemonEvent {
    /// An IPC command from a client.
    IpcCommand {
        cmd: IpcCommand,
        responder: oneshot::Sender<IpcResponse>,
    },
    /// An engine timer elapsed.
    Timer { timer: TimerId, task: TimerTask },
    /// Shutdown requested.
    Shutdown,
}

#[derive(Debug, Parser)]
#[command(name = "widedesk", version, about = "Scrollable canvas layout daemon")]
struct Args {
    /// Config file to load instead of the standard locations.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Socket to listen on, overriding the config.
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Log level, overriding the config.
    #[arg(long)]
    log_level: Option<String>,
}

/// Limits applied to each client connection.
#[derive(Debug, Clone, Copy)]
struct ClientLimits {
    read_timeout: Duration,
    max_message_size: usize,
}

/// Accept connections until the listener fails, one task per client.
async fn run_ipc_server(
    listener: UnixListener,
    event_tx: mpsc::Sender<DaemonEvent>,
    limits: ClientLimits,
) {
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                error!("Failed to accept client connection: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        debug!("Client connected");

        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, event_tx, limits).await {
                warn!("Client handler error: {}", e);
            }
        });
    }
}

/// Handle a single client connection: one command line in, one response
/// line out.
async fn handle_client<S>(
    stream: S,
    event_tx: mpsc::Sender<DaemonEvent>,
    limits: ClientLimits,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader.take(limits.max_message_size as u64));
    let mut line = String::new();

    let bytes_read = match tokio::time::timeout(limits.read_timeout, reader.read_line(&mut line)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            debug!("Client sent nothing within {:?}", limits.read_timeout);
            return Ok(());
        }
    };
    if bytes_read == 0 {
        return Ok(());
    }

    debug!("Received command: {}", line.trim());

    let cmd = match decode_command_with_limit(&line, limits.max_message_size) {
        Ok(cmd) => cmd,
        Err(e) => {
            let response = IpcResponse::error(e.to_string());
            writer.write_all(encode_response(&response).as_bytes()).await?;
            return Ok(());
        }
    };

    let is_stop = matches!(cmd, IpcCommand::Stop);
    let (resp_tx, resp_rx) = oneshot::channel();

    if event_tx
        .send(DaemonEvent::IpcCommand {
            cmd,
            responder: resp_tx,
        })
        .await
        .is_err()
    {
        let response = IpcResponse::error("Daemon is shutting down");
        writer.write_all(encode_response(&response).as_bytes()).await?;
        return Ok(());
    }

    let response = match resp_rx.await {
        Ok(resp) => resp,
        Err(_) => IpcResponse::error("Failed to get response from daemon"),
    };
    writer.write_all(encode_response(&response).as_bytes()).await?;
    writer.flush().await?;

    if is_stop {
        let _ = event_tx.send(DaemonEvent::Shutdown).await;
    }

    Ok(())
}

/// Check if another daemon instance is already serving the socket.
async fn check_already_running(socket: &Path) -> bool {
    UnixStream::connect(socket).await.is_ok()
}

fn parse_log_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Loaded before logging exists, so failures go to stderr
    let mut config = Config::load(args.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {:#}. Using defaults.", e);
        Config::default()
    });

    let level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.behavior.log_level);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_log_level(level))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    for w in &config.validate() {
        warn!("Config: {} - {}", w.field, w.message);
    }

    info!("widedesk daemon starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let socket = args
        .socket
        .clone()
        .unwrap_or_else(|| config.ipc.resolved_socket_path());
    if check_already_running(&socket).await {
        error!(
            "Another widedesk daemon is already running (socket {} is active)",
            socket.display()
        );
        return Ok(());
    }
    if socket.exists() {
        debug!("Removing stale socket {}", socket.display());
        std::fs::remove_file(&socket)
            .with_context(|| format!("Failed to remove stale socket {}", socket.display()))?;
    }

    info!(
        "Configuration loaded: spacing={}, expansion_ratio={}, scroll_step={}, log_level={}",
        config.canvas.spacing,
        config.canvas.expansion_ratio,
        config.canvas.scroll_step,
        config.behavior.log_level
    );

    let limits = ClientLimits {
        read_timeout: Duration::from_millis(config.ipc.read_timeout_ms),
        max_message_size: config.ipc.max_message_size,
    };

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(100);
    let mut state = AppState::new(config, args.config.clone(), event_tx.clone());

    let listener = UnixListener::bind(&socket)
        .with_context(|| format!("Failed to bind {}", socket.display()))?;
    let ipc_tx = event_tx.clone();
    tokio::spawn(async move {
        run_ipc_server(listener, ipc_tx, limits).await;
    });
    info!("IPC server listening on {}", socket.display());

    {
        let shutdown_tx = event_tx.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Ctrl+C received, initiating shutdown...");
                let _ = shutdown_tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }

    info!("Ready.");

    while let Some(event) = event_rx.recv().await {
        match event {
            DaemonEvent::IpcCommand { cmd, responder } => {
                let response = state.handle_command(cmd);
                if responder.send(response).is_err() {
                    debug!("Client disconnected before receiving IPC response");
                }
            }
            DaemonEvent::Timer { timer, task } => state.handle_timer(timer, task),
            DaemonEvent::Shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    state.shutdown();
    if let Err(e) = std::fs::remove_file(&socket) {
        warn!("Failed to remove socket {}: {}", socket.display(), e);
    }
    info!("widedesk daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ClientLimits {
        ClientLimits {
            read_timeout: Duration::from_millis(500),
            max_message_size: 1024,
        }
    }

    async fn read_response(client: &mut tokio::io::DuplexStream) -> IpcResponse {
        let mut buf = String::new();
        BufReader::new(client).read_line(&mut buf).await.unwrap();
        serde_json::from_str(buf.trim()).unwrap()
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug"), Level::DEBUG);
        assert_eq!(parse_log_level("WARN"), Level::WARN);
        assert_eq!(parse_log_level("verbose"), Level::INFO);
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["widedesk", "--config", "/tmp/w.toml", "--log-level", "trace"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/w.toml")));
        assert_eq!(args.socket, None);
        assert_eq!(args.log_level.as_deref(), Some("trace"));
    }

    #[tokio::test]
    async fn test_client_command_round_trip() {
        let (mut client, server) = tokio::io::duplex(4096);
        let (tx, mut rx) = mpsc::channel(8);

        let handler = tokio::spawn(handle_client(server, tx, limits()));
        client
            .write_all(b"{\"type\":\"query_viewport\",\"workspace\":2}\n")
            .await
            .unwrap();

        match rx.recv().await {
            Some(DaemonEvent::IpcCommand { cmd, responder }) => {
                assert_eq!(
                    cmd,
                    IpcCommand::QueryViewport {
                        monitor: 0,
                        workspace: 2
                    }
                );
                responder.send(IpcResponse::Ok).unwrap();
            }
            _ => panic!("Expected IPC command event"),
        }

        assert_eq!(read_response(&mut client).await, IpcResponse::Ok);
        handler.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_client_malformed_command() {
        let (mut client, server) = tokio::io::duplex(4096);
        let (tx, mut rx) = mpsc::channel(8);

        let handler = tokio::spawn(handle_client(server, tx, limits()));
        client.write_all(b"scroll please\n").await.unwrap();

        assert!(read_response(&mut client).await.is_error());
        handler.await.unwrap().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_client_stop_requests_shutdown() {
        let (mut client, server) = tokio::io::duplex(4096);
        let (tx, mut rx) = mpsc::channel(8);

        let handler = tokio::spawn(handle_client(server, tx, limits()));
        client.write_all(b"{\"type\":\"stop\"}\n").await.unwrap();

        match rx.recv().await {
            Some(DaemonEvent::IpcCommand { responder, .. }) => {
                responder.send(IpcResponse::Ok).unwrap();
            }
            _ => panic!("Expected IPC command event"),
        }
        assert_eq!(read_response(&mut client).await, IpcResponse::Ok);
        assert!(matches!(rx.recv().await, Some(DaemonEvent::Shutdown)));
        handler.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_client_event_loop_gone() {
        let (mut client, server) = tokio::io::duplex(4096);
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        let handler = tokio::spawn(handle_client(server, tx, limits()));
        client.write_all(b"{\"type\":\"reload\"}\n").await.unwrap();

        assert_eq!(
            read_response(&mut client).await,
            IpcResponse::error("Daemon is shutting down")
        );
        handler.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_client_oversized_command() {
        let (mut client, server) = tokio::io::duplex(4096);
        let (tx, mut rx) = mpsc::channel(8);
        let limits = ClientLimits {
            read_timeout: Duration::from_millis(500),
            max_message_size: 16,
        };

        let handler = tokio::spawn(handle_client(server, tx, limits));
        client
            .write_all(b"{\"type\":\"query_visibility\",\"window\":1}\n")
            .await
            .unwrap();

        match read_response(&mut client).await {
            IpcResponse::Error { message } => assert!(message.contains("16 byte limit")),
            other => panic!("Expected error response, got {:?}", other),
        }
        handler.await.unwrap().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_client_times_out() {
        let (_client, server) = tokio::io::duplex(4096);
        let (tx, _rx) = mpsc::channel(8);

        let result = handle_client(server, tx, limits()).await;
        assert!(result.is_ok());
    }
}
