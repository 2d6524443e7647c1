//! `latency-probe` — diagnostic client for measuring relay round-trip
//! latency.
//!
//! Connects like a real game client (the first Ping doubles as the
//! initialization hello), then keeps three clocks running:
//!
//! - ping every 100 ms (never re-pinging while one is outstanding) and
//!   measure the round trip when the Pong comes back,
//! - rotate the display name at 30 Hz to exercise UpdateName traffic,
//! - repaint a status line showing latency and the opponent's name.
//!
//! ```text
//! latency-probe [host] [port]
//! ```

use std::io::Write as _;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use hexmatch_protocol::{Frame, Message, MessageType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 65530;

const PING_INTERVAL: Duration = Duration::from_millis(100);
const NAME_INTERVAL: Duration = Duration::from_millis(1000 / 30);
const STATUS_INTERVAL: Duration = Duration::from_millis(100);

/// Give up on an unanswered ping after this long and arm a fresh one.
/// The very first ping is typically swallowed by seating, so without
/// this the probe would wait forever.
const PING_TIMEOUT: Duration = Duration::from_secs(1);

const NAMES: [&str; 6] = ["A", "B", "C", "D", "E", "F"];

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = match args.next() {
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                eprintln!("Usage: latency-probe [host] [port]");
                return ExitCode::FAILURE;
            }
        },
        None => DEFAULT_PORT,
    };

    let stream = match TcpStream::connect((host.as_str(), port)).await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::error!(%host, port, error = %err, "failed to connect");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(%host, port, "connected");
    let (mut read_half, mut write_half) = stream.into_split();

    let mut ping_tick = tokio::time::interval(PING_INTERVAL);
    let mut name_tick = tokio::time::interval(NAME_INTERVAL);
    let mut status_tick = tokio::time::interval(STATUS_INTERVAL);

    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    let mut outstanding: Option<Instant> = None;
    let mut latency: Option<Duration> = None;
    let mut opponent = String::new();
    let mut name_index = 0usize;

    loop {
        tokio::select! {
            _ = ping_tick.tick() => {
                // Only one ping in flight at a time, but don't let a
                // swallowed one wedge the probe.
                let waiting = outstanding
                    .is_some_and(|sent| sent.elapsed() < PING_TIMEOUT);
                if !waiting {
                    outstanding = Some(Instant::now());
                    if send(&mut write_half, &Message::ping()).await.is_err() {
                        break;
                    }
                }
            }

            _ = name_tick.tick() => {
                let name = NAMES[name_index];
                name_index = (name_index + 1) % NAMES.len();
                // Name payloads are one byte; the constructor can't fail.
                let message = Message::update_name(name.as_bytes())
                    .expect("single-byte name fits a frame");
                if send(&mut write_half, &message).await.is_err() {
                    break;
                }
            }

            _ = status_tick.tick() => {
                match latency {
                    Some(rtt) => print!(
                        "latency={:7.2} ms  opponent={opponent}    \r",
                        rtt.as_secs_f64() * 1000.0
                    ),
                    None => print!("latency=   ?     opponent={opponent}    \r"),
                }
                let _ = std::io::stdout().flush();
            }

            read = read_half.read(&mut chunk) => match read {
                Ok(0) => {
                    tracing::info!("server closed the connection");
                    break;
                }
                Ok(n) => {
                    buffer.extend_from_slice(&chunk[..n]);
                    if drain(
                        &mut buffer,
                        &mut outstanding,
                        &mut latency,
                        &mut opponent,
                    )
                    .is_err()
                    {
                        tracing::error!("stream desynchronized, giving up");
                        break;
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "read failed");
                    break;
                }
            }
        }
    }

    println!();
    ExitCode::SUCCESS
}

async fn send(write_half: &mut OwnedWriteHalf, message: &Message) -> std::io::Result<()> {
    if let Err(err) = write_half.write_all(&message.encode()).await {
        tracing::error!(error = %err, "write failed");
        return Err(err);
    }
    Ok(())
}

/// Decodes every complete frame in the buffer and applies it to the
/// probe's little bit of state.
fn drain(
    buffer: &mut Vec<u8>,
    outstanding: &mut Option<Instant>,
    latency: &mut Option<Duration>,
    opponent: &mut String,
) -> Result<(), hexmatch_protocol::ProtocolError> {
    let mut cursor = 0;
    while let Some(frame) = Frame::try_read(&buffer[cursor..])? {
        match frame.kind {
            MessageType::Pong => match outstanding.take() {
                Some(sent) => *latency = Some(sent.elapsed()),
                None => tracing::warn!("pong without an outstanding ping"),
            },
            MessageType::Connect | MessageType::UpdateName => {
                *opponent = String::from_utf8_lossy(frame.payload).into_owned();
            }
            other => {
                tracing::info!(kind = %other, "received {}", frame.to_message());
            }
        }
        cursor += frame.total_len();
    }

    if cursor == buffer.len() {
        buffer.clear();
    } else if cursor > 0 {
        buffer.drain(..cursor);
    }
    Ok(())
}
