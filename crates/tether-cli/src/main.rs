//! Tether command line.
//!
//! # Usage
//!
//! ```bash
//! # WLAN pairing: compare the code shown on both devices
//! tether listen --port 7000
//! tether connect 192.168.1.10:7000
//!
//! # MANUAL pairing: the listener prints an identifier carrying the secret
//! tether listen --port 7000 --host 192.168.1.10 --manual
//! tether connect 192.168.1.10:7000:<secret> --manual
//! ```

use std::time::Duration;

use clap::{Parser, Subcommand};
use tether_core::{Channel, ChannelDescriptor, ChannelError, ChannelKind, PairingConfig};
use tether_crypto::{
    SlowHashParams,
    slow_hash::{DEFAULT_ITERATIONS, DEFAULT_MEMORY_KIB},
};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Pair two devices and chat over an authenticated channel
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Pair two devices and chat over an authenticated channel")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Wait for one peer on a port
    Listen {
        /// Port to listen on
        #[arg(short, long)]
        port: u16,

        /// Host to advertise in the MANUAL identifier
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Use a pre-shared secret instead of SAS comparison
        #[arg(long)]
        manual: bool,
    },

    /// Connect to a listening peer
    Connect {
        /// `host:port`, or `host:port:secret` with --manual
        identifier: String,

        /// Use a pre-shared secret instead of SAS comparison
        #[arg(long)]
        manual: bool,
    },
}

/// Settings both peers must agree on.
#[derive(clap::Args, Debug)]
struct CommonArgs {
    /// Frame payload size in bytes
    #[arg(long, global = true, default_value_t = tether_proto::DEFAULT_FRAME_SIZE)]
    frame_size: usize,

    /// Verification code length in bytes
    #[arg(long, global = true, default_value_t = tether_crypto::DEFAULT_NONCE_LEN)]
    nonce_len: usize,

    /// Seconds to wait for the peer to show up during sync
    #[arg(long, global = true, default_value_t = 300)]
    sync_timeout_secs: u64,

    /// Seconds to wait for each commitment exchange
    #[arg(long, global = true, default_value_t = 5)]
    exchange_timeout_secs: u64,

    /// Slow hash memory cost in KiB
    #[arg(long, global = true, default_value_t = DEFAULT_MEMORY_KIB)]
    slow_hash_memory_kib: u32,

    /// Slow hash iterations
    #[arg(long, global = true, default_value_t = DEFAULT_ITERATIONS)]
    slow_hash_iterations: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

impl CommonArgs {
    fn pairing_config(&self) -> PairingConfig {
        PairingConfig {
            sync_timeout: Duration::from_secs(self.sync_timeout_secs),
            exchange_timeout: Duration::from_secs(self.exchange_timeout_secs),
            nonce_len: self.nonce_len,
            frame_size: self.frame_size,
            slow_hash: SlowHashParams {
                memory_kib: self.slow_hash_memory_kib,
                iterations: self.slow_hash_iterations,
            },
            ..PairingConfig::default()
        }
    }
}

fn kind(manual: bool) -> ChannelKind {
    if manual { ChannelKind::Manual } else { ChannelKind::Wlan }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.common.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = args.common.pairing_config();
    config.validate()?;

    let mut out = tokio::io::stdout();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let mut channel = match args.command {
        Command::Listen { port, host, manual } => {
            let descriptor = ChannelDescriptor::new(kind(manual), host, port);
            let mut channel: Channel = Channel::new(descriptor, config)?;
            if manual {
                let identifier = channel.create_shared_secret()?;
                say(&mut out, &format!("Share this identifier with your peer:\n  {identifier}\n"))
                    .await?;
            }

            tracing::info!("Waiting for a peer on port {}", port);
            let peer = channel.listen(port).await?;
            tracing::info!("Paired with {}", peer);
            channel
        },
        Command::Connect { identifier, manual } => {
            let descriptor = ChannelDescriptor::parse(kind(manual), &identifier)?;
            let mut channel: Channel = Channel::new(descriptor, config)?;
            channel.connect().await?;
            tracing::info!("Paired with {}", channel.descriptor().address());
            channel
        },
    };

    let wlan = channel.descriptor().kind() == ChannelKind::Wlan;
    if wlan && !confirm_sas(&mut channel, &mut input, &mut out).await? {
        say(&mut out, "Codes rejected, closing.\n").await?;
        channel.close().await;
        return Ok(());
    }

    say(&mut out, "Channel verified. Type a line to send it, Ctrl-D to quit.\n").await?;
    let result = chat(&mut channel, &mut input, &mut out).await;
    channel.close().await;
    result
}

/// Show the SAS and ask the user to compare it with the peer's.
async fn confirm_sas<W>(
    channel: &mut Channel,
    input: &mut Lines<BufReader<Stdin>>,
    out: &mut W,
) -> Result<bool, Box<dyn std::error::Error>>
where
    W: AsyncWrite + Unpin,
{
    let sas = channel.sas()?.to_string();
    say(out, &format!("Verification code: {sas}\nDoes the code match on both devices? [y/N] "))
        .await?;

    let answer = input.next_line().await?.unwrap_or_default();
    if !answer.trim().eq_ignore_ascii_case("y") {
        tracing::warn!("User rejected verification code");
        return Ok(false);
    }

    channel.verified_oob()?;
    Ok(true)
}

/// Send stdin lines, print received messages, until either side stops.
async fn chat<W>(
    channel: &mut Channel,
    input: &mut Lines<BufReader<Stdin>>,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>>
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            line = input.next_line() => match line? {
                Some(line) => channel.write(line.as_bytes()).await?,
                None => return Ok(()),
            },
            message = channel.read(true) => match message {
                Ok(message) => {
                    let text = String::from_utf8_lossy(&message);
                    say(out, &format!("peer> {text}\n")).await?;
                },
                Err(ChannelError::WrongTag) => {
                    tracing::warn!("Dropped a message that failed authentication");
                },
                Err(ChannelError::Read(reason)) => {
                    say(out, "Peer disconnected.\n").await?;
                    tracing::debug!("Read ended: {}", reason);
                    return Ok(());
                },
                Err(e) => return Err(e.into()),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

async fn say<W>(out: &mut W, text: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(text.as_bytes()).await?;
    out.flush().await
}
