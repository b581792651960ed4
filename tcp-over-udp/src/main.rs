//! Entry point for `tcp-over-udp`.
//!
//! Parses CLI arguments and dispatches into either **send** or **listen**
//! mode.  All actual protocol work is delegated to library modules; `main.rs`
//! owns only process setup (logging, signal handling, argument parsing).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use tcp_over_udp::{Config, Connection};

/// Reliable message stream over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Name used to tag log lines.
    #[arg(short, long, default_value = "peer")]
    name: String,

    /// Local address to bind (e.g. 127.0.0.1:9001).
    #[arg(short, long)]
    bind: SocketAddr,

    /// The single remote peer (e.g. 127.0.0.1:9002).
    #[arg(short, long)]
    peer: SocketAddr,

    #[command(flatten)]
    tuning: Tuning,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send each line read from stdin as one message.
    Send,
    /// Print every received message on its own line.
    Listen {
        /// Largest read per `recv` call.
        #[arg(long, default_value_t = 65_536)]
        max_len: usize,
    },
}

/// Protocol constants; defaults match [`Config::default`].
#[derive(Args)]
struct Tuning {
    /// Worker tick length in microseconds.
    #[arg(long, default_value_t = 1_000)]
    tick_us: u64,
    /// Idle ticks before resending unacknowledged data.
    #[arg(long, default_value_t = 20)]
    retransmit_timeout: u64,
    /// Idle ticks before sending a heartbeat ACK.
    #[arg(long, default_value_t = 50)]
    heartbeat_timeout: u64,
    /// Maximum payload bytes per packet.
    #[arg(long, default_value_t = tcp_over_udp::config::DEFAULT_MAX_FRAGMENT)]
    max_fragment: usize,
}

impl Tuning {
    fn into_config(self) -> Config {
        Config {
            tick_interval: Duration::from_micros(self.tick_us),
            retransmit_timeout: self.retransmit_timeout,
            heartbeat_timeout: self.heartbeat_timeout,
            max_fragment_size: self.max_fragment,
            recv_buffer_size: tcp_over_udp::HEADER_LEN + self.max_fragment,
            ..Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.tuning.into_config();
    let mut conn = Connection::with_config(&cli.name, cli.bind, cli.peer, config)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;

    match cli.mode {
        Mode::Send => {
            log::info!("[{}] sending stdin lines to {}", cli.name, cli.peer);
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => match line? {
                        Some(line) => {
                            conn.send(line.as_bytes());
                        }
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            // Get the tail onto the wire and, if the peer is there, acked.
            if !conn.drain(Duration::from_secs(2)).await {
                log::warn!("[{}] closing with unacknowledged data", cli.name);
            }
        }
        Mode::Listen { max_len } => {
            log::info!("[{}] listening for {}", cli.name, cli.peer);
            let mut stdout = tokio::io::stdout();
            loop {
                tokio::select! {
                    msg = conn.recv(max_len) => {
                        let mut msg = msg?;
                        msg.push(b'\n');
                        stdout.write_all(&msg).await?;
                        stdout.flush().await?;
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    let stats = conn.stats();
    log::info!("[{}] closing: {stats:?}", cli.name);
    conn.close().await;
    Ok(())
}
