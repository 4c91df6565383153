use bt_serial::config::{Config, ConfigLoader, TransportConfig, TransportKind};
use bt_serial::{
    callback_queue, logging, ConnectionRegistry, Encoding, SerialConnection, SerialError,
    TcpConnector, TransportConnector,
};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "bt-serial",
    version,
    about = "Talk to Bluetooth RFCOMM serial devices line by line.",
    long_about = "Opens RFCOMM serial links (device nodes such as /dev/rfcomm0, or host:port bridges), sends newline-terminated text and prints received lines."
)]
struct Cli {
    /// Configuration file (overrides the standard search path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Transport used to reach devices
    #[arg(short, long, global = true, value_enum)]
    transport: Option<TransportKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List paired devices
    Devices,

    /// Interactive session: stdin lines are sent, received lines are printed
    Chat {
        /// Device address or configured alias
        address: String,

        /// Text encoding (utf-8, iso-8859-1, us-ascii)
        #[arg(short, long)]
        encoding: Option<Encoding>,
    },

    /// Send one line per argument and exit
    Send {
        /// Device address or configured alias
        address: String,

        /// Text encoding (utf-8, iso-8859-1, us-ascii)
        #[arg(short, long)]
        encoding: Option<Encoding>,

        /// Lines to send
        #[arg(required = true)]
        text: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let mut config = loader.into_config();
    if let Some(kind) = cli.transport {
        config.transport.kind = kind;
    }

    logging::init(&config.logging)?;

    match cli.command {
        Command::Devices => list_devices(&config),
        Command::Chat { address, encoding } => chat(&config, &address, encoding).await,
        Command::Send {
            address,
            encoding,
            text,
        } => send(&config, &address, encoding, &text).await,
    }
}

fn build_connector(transport: &TransportConfig) -> CliResult<Arc<dyn TransportConnector>> {
    match transport.kind {
        TransportKind::Tcp => Ok(Arc::new(
            TcpConnector::new().with_nodelay(transport.tcp_nodelay),
        )),
        #[cfg(feature = "serial")]
        TransportKind::Serial => Ok(Arc::new(bt_serial::SerialPortConnector::new(
            bt_serial::SerialSettings {
                baud_rate: transport.baud_rate,
                ..Default::default()
            },
        ))),
        #[cfg(not(feature = "serial"))]
        TransportKind::Serial => {
            Err("this build has no serial support (enable the `serial` feature)".into())
        }
    }
}

fn build_registry(config: &Config) -> CliResult<ConnectionRegistry> {
    let registry = ConnectionRegistry::from_config(config, build_connector(&config.transport)?);

    #[cfg(feature = "serial")]
    let registry =
        if config.devices.known.is_empty() && config.transport.kind == TransportKind::Serial {
            registry.with_enumerator(Arc::new(
                bt_serial::SerialPortEnumerator::new().bluetooth_only(true),
            ))
        } else {
            registry
        };

    Ok(registry)
}

fn list_devices(config: &Config) -> CliResult<()> {
    let registry = build_registry(config)?;
    let devices = registry.paired_devices()?;

    if devices.is_empty() {
        println!("No paired devices found.");
    }
    for device in devices {
        println!("{}", device);
    }
    Ok(())
}

async fn with_timeout<T, E>(
    what: &str,
    limit: Duration,
    operation: impl Future<Output = Result<T, E>>,
) -> CliResult<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(format!("{} timed out after {} ms", what, limit.as_millis()).into()),
    }
}

async fn open(
    registry: &ConnectionRegistry,
    config: &Config,
    address: &str,
    encoding: Option<Encoding>,
) -> CliResult<SerialConnection> {
    let encoding = encoding.unwrap_or(registry.default_encoding());
    let connection = with_timeout(
        "connect",
        config.transport.connect_timeout(),
        registry.open_with_encoding(address, encoding),
    )
    .await?;
    info!(address = %connection.address(), %encoding, "connected");
    Ok(connection)
}

async fn send(
    config: &Config,
    address: &str,
    encoding: Option<Encoding>,
    lines: &[String],
) -> CliResult<()> {
    let registry = build_registry(config)?;
    let connection = open(&registry, config, address, encoding).await?;

    let mut result = Ok(());
    for line in lines {
        let message = format!("{}\n", line);
        if let Err(e) = with_timeout(
            "send",
            config.transport.send_timeout(),
            connection.send(&message),
        )
        .await
        {
            result = Err(e);
            break;
        }
    }

    registry.close_all().await;
    result
}

async fn chat(config: &Config, address: &str, encoding: Option<Encoding>) -> CliResult<()> {
    let (queue, mut callbacks) = callback_queue();
    let registry = build_registry(config)?.with_callback_executor(Arc::new(queue));
    let connection = open(&registry, config, address, encoding).await?;

    let adapter = connection.to_listener_interface()?;
    adapter.set_listeners(
        Some(Arc::new(|message: &str| println!("{}", message))),
        None,
        Some(Arc::new(|error: &SerialError| eprintln!("error: {}", error))),
    );

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            _ = &mut shutdown => break Ok(()),
            more = callbacks.turn() => {
                if !more {
                    break Ok(());
                }
            }
            line = stdin.next_line() => match line {
                Ok(Some(line)) => {
                    if let Err(e) = adapter.send_message(format!("{}\n", line)) {
                        break Err(e.into());
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e.into()),
            },
        }
    };

    registry.close(&adapter).await;
    registry.close_all().await;
    callbacks.run_pending();
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, closing connections");
}
