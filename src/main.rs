//! shardkv server process.
//!
//! Serves one shard of a deployment from a line-oriented console on stdin:
//!
//! ```text
//!   GET <key>          → VALUE <value> | NOT_FOUND | REDIRECT <addr>
//!   PUT <key> <value>  → OK | REDIRECT <addr>
//!   DEL <key>          → DELETED <0|1> | REDIRECT <addr>
//!   STAT               → policy, size, memory and counters
//!   QUIT               → shut down
//! ```

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use shardkv::config::ServerConfig;
use shardkv::ds::{Route, ShardRouter};
use shardkv::storage::StorageGateway;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Sharded in-memory key-value cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Index of the shard this process serves
    #[arg(env = "SHARDKV_SHARD", default_value = "0")]
    shard: usize,

    /// Path to the key=value config file
    #[arg(long, env = "SHARDKV_CONFIG", default_value = "config.cfg")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "shardkv exited with an error");
            ExitCode::FAILURE
        },
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let config = ServerConfig::load(&args.config)?;
    let router = config.router(args.shard)?;
    let gateway = config.gateway();
    gateway.start_reclamation()?;

    info!(
        shard = args.shard,
        addr = router.local_addr(),
        shards = router.shard_count(),
        policy = %config.policy,
        capacity = config.capacity,
        ttl_secs = config.ttl.as_secs(),
        "shardkv serving"
    );

    let stdin = io::stdin();
    let mut out = io::stdout().lock();
    serve(&gateway, &router, stdin.lock(), &mut out)?;

    gateway.shutdown();
    info!("shardkv stopped");
    Ok(())
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // logs go to stderr so stdout stays a clean reply stream
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(io::stderr))
            .init();
    }
}

// =============================================================================
// Console
// =============================================================================

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Get(&'a str),
    Put(&'a str, &'a str),
    Del(&'a str),
    Stat,
    Quit,
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim_start();
        match verb.to_ascii_uppercase().as_str() {
            "GET" if !rest.is_empty() => Some(Command::Get(rest)),
            "DEL" if !rest.is_empty() => Some(Command::Del(rest)),
            "PUT" => {
                let (key, value) = rest.split_once(char::is_whitespace)?;
                Some(Command::Put(key, value.trim_start()))
            },
            "STAT" => Some(Command::Stat),
            "QUIT" | "EXIT" => Some(Command::Quit),
            _ => None,
        }
    }

    fn key(&self) -> Option<&'a str> {
        match *self {
            Command::Get(key) | Command::Put(key, _) | Command::Del(key) => Some(key),
            Command::Stat | Command::Quit => None,
        }
    }
}

/// Answers commands from `input` until `QUIT` or end of input.
fn serve<R: BufRead, W: Write>(
    gateway: &StorageGateway,
    router: &ShardRouter,
    input: R,
    out: &mut W,
) -> io::Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Some(command) = Command::parse(&line) else {
            warn!(line = %line, "unrecognized command");
            writeln!(out, "ERROR unrecognized command")?;
            continue;
        };
        if let Some(Route::Redirect(addr)) = command.key().map(|key| router.route(key)) {
            writeln!(out, "REDIRECT {addr}")?;
            continue;
        }
        match command {
            Command::Quit => break,
            Command::Get(key) => match gateway.get(key) {
                Some(value) => writeln!(out, "VALUE {value}")?,
                None => writeln!(out, "NOT_FOUND")?,
            },
            Command::Put(key, value) => {
                gateway.put(key, value);
                writeln!(out, "OK")?;
            },
            Command::Del(key) => writeln!(out, "DELETED {}", gateway.remove(key))?,
            Command::Stat => {
                let load = gateway.load();
                let stats = gateway.stats();
                writeln!(
                    out,
                    "STAT policy={} size={} memory_kib={} hits={} misses={} evictions={} cycles={}",
                    gateway.policy(),
                    load.resident,
                    load.memory_kib,
                    stats.hits,
                    stats.misses,
                    stats.evictions,
                    stats.cycles,
                )?;
            },
        }
        out.flush()?;
    }
    Ok(())
}
