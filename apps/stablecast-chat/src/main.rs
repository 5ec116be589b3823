//! # stablecast chat
//!
//! A console group chat on top of the stablecast SDK. Every line typed is
//! multicast to the group; each member keeps received messages buffered
//! until the timestamp matrix shows everybody has seen them.
//!
//! ## Commands
//!
//! ```text
//! \members         list the group, in id order
//! \buffer          show the stability buffer and the timestamp matrix
//! \step <text>     send <text>, confirming each recipient with Enter
//! \exit            leave
//! <anything else>  send "<name>: <text>" to every member
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use colored::*;
use stablecast_sdk::{
    ChannelDeliver, GroupConfigBuilder, GroupEvent, Result, SdkError, StableMulticast,
    UdpTransport, DEFAULT_CAPACITY, DEFAULT_GROUP_ADDR, DEFAULT_GROUP_PORT,
};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "stablecast-chat")]
#[command(about = "Group chat over stable multicast")]
#[command(version)]
struct Cli {
    /// Display name (asked for interactively when omitted)
    #[arg(long)]
    name: Option<String>,

    /// Port of the point-to-point endpoint (0 picks a free one)
    #[arg(long, default_value_t = 0)]
    port: u16,

    /// Address peers use to reach this process
    #[arg(long, default_value = "127.0.0.1")]
    bind: Ipv4Addr,

    /// Multicast group address
    #[arg(long, default_value_t = DEFAULT_GROUP_ADDR)]
    group: Ipv4Addr,

    /// Multicast group port
    #[arg(long, default_value_t = DEFAULT_GROUP_PORT)]
    group_port: u16,

    /// Maximum number of group members
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// Milliseconds to wait for a hello before founding a new group
    #[arg(long, default_value_t = 1000)]
    join_timeout_ms: u64,
}

type Input = Lines<BufReader<Stdin>>;

// ─── Pretty printing ──────────────────────────────────────────────────────

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

fn warn(text: &str) {
    println!("  {} {}", "!".bright_red(), text);
}

fn usage() {
    println!("  {}", "Commands:".bold().underline());
    println!("    {}            List group members", "\\members".bright_cyan());
    println!("    {}             Show buffer and timestamp matrix", "\\buffer".bright_cyan());
    println!("    {} <text>        Send, confirming each recipient", "\\step".bright_cyan());
    println!("    {}               Leave the group", "\\exit".bright_cyan());
    println!("    {}               Anything else is sent to everyone", "<text>".bright_cyan());
    println!();
}

async fn prompt(text: &str) -> io::Result<()> {
    let mut out = io::stdout();
    out.write_all(text.as_bytes()).await?;
    out.flush().await
}

async fn read_line(input: &mut Input) -> Result<Option<String>> {
    Ok(input.next_line().await?)
}

// ─── Commands ─────────────────────────────────────────────────────────────

fn show_members(engine: &StableMulticast<UdpTransport>) {
    let me = engine.self_id();
    let members = engine.members();
    if members.is_empty() {
        warn("not a member of any group yet");
        return;
    }
    for peer in members {
        let marker = if peer.member_id() == me { " (you)" } else { "" };
        println!(
            "  {} {} {}{}",
            format!("#{}", peer.id).bright_yellow(),
            peer.name.bold(),
            peer.socket_addr().to_string().dimmed(),
            marker.bright_green()
        );
    }
}

/// Stamp once, then hand the same envelope to each member after the user
/// confirms. The state lock is not held while waiting for input.
async fn stepwise_send(
    engine: &StableMulticast<UdpTransport>,
    input: &mut Input,
    text: String,
) -> Result<()> {
    let envelope = engine.stamp(text)?;
    for peer in engine.members() {
        let Some(target) = peer.member_id() else {
            continue;
        };
        prompt(&format!(
            "  Press Enter to send to {} (s to skip): ",
            peer.name.bright_cyan()
        ))
        .await?;
        match read_line(input).await?.as_deref().map(str::trim) {
            None => return Ok(()),
            Some("s") => step(&format!("skipped {}", peer.name)),
            Some(_) => {
                engine.transmit(&envelope, target).await?;
                step(&format!("sent to {}", peer.name));
            }
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut input = BufReader::new(io::stdin()).lines();

    let name = match cli.name {
        Some(name) => name,
        None => {
            prompt("Please enter your name: ").await?;
            read_line(&mut input)
                .await?
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| SdkError::Config("a name is required".into()))?
        }
    };

    let config = GroupConfigBuilder::new()
        .user_name(name.clone())
        .bind_addr(SocketAddr::from((cli.bind, cli.port)))
        .group(cli.group, cli.group_port)
        .capacity(cli.capacity)
        .join_timeout(Some(Duration::from_millis(cli.join_timeout_ms)))
        .build()?;

    let (deliver, mut deliveries) = ChannelDeliver::new();
    let engine = StableMulticast::bind(config, deliver).await?;

    tokio::spawn(async move {
        while let Some(text) = deliveries.recv().await {
            println!("{}", text);
        }
    });

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                GroupEvent::Joined { id, members } => step(&format!(
                    "joined as {} ({} member{})",
                    id.to_string().bright_yellow(),
                    members,
                    if members == 1 { "" } else { "s" }
                )),
                GroupEvent::Evicted { text, .. } => {
                    println!("  {} {}", "stable:".dimmed(), text.dimmed())
                }
                GroupEvent::MemberAdded { .. } | GroupEvent::Delivered { .. } => {}
            }
        }
    });

    header(&format!(
        "stablecast chat: {} @ {}",
        name,
        engine.local().socket_addr()
    ));
    usage();
    engine.start().await?;

    while let Some(line) = read_line(&mut input).await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let outcome = match line.split_once(' ').unwrap_or((line, "")) {
            ("\\members", _) => {
                show_members(&engine);
                Ok(())
            }
            ("\\buffer", _) => {
                print!("{}", engine.dump_state());
                Ok(())
            }
            ("\\exit", _) => break,
            ("\\step", text) if !text.trim().is_empty() => {
                stepwise_send(&engine, &mut input, format!("{}: {}", name, text.trim())).await
            }
            ("\\step", _) => {
                warn("Usage: \\step <text>");
                Ok(())
            }
            _ => engine
                .send(format!("{}: {}", name, line))
                .await
                .map(|_| ()),
        };
        if let Err(e) = outcome {
            warn(&e.to_string());
        }
    }

    engine.shutdown();
    Ok(())
}

// ─── Entry point ───────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("{} {}", "error:".bright_red().bold(), e);
        std::process::exit(1);
    }
}
