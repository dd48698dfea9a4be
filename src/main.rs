//! FlashKV CLI - A command-line client for FlashKV and Redis
//!
//! Runs one command given on the command line, an interactive prompt when no
//! command is given, or a `--pipe` batch that sends every stdin line in a
//! single pipelined write.

use anyhow::Context;
use flashkv_client::{connect_with_config, Arg, ClientConfig, Connection, Reply};
use std::io::{self, BufRead, Write};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// CLI configuration
struct Config {
    /// Host to connect to
    host: String,
    /// Port to connect to
    port: u16,
    /// Password for AUTH
    password: Option<String>,
    /// Socket timeout applied to connect, read and write
    timeout: Option<Duration>,
    /// Pipeline stdin instead of prompting
    pipe: bool,
    /// Command and arguments to run once
    command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: flashkv_client::DEFAULT_HOST.to_string(),
            port: flashkv_client::DEFAULT_PORT,
            password: None,
            timeout: None,
            pipe: false,
            command: Vec::new(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = option_value(&args, i, "--host").to_string();
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = option_value(&args, i, "--port").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--password" | "-a" => {
                    config.password = Some(option_value(&args, i, "--password").to_string());
                    i += 2;
                }
                "--timeout" | "-t" => {
                    let secs: f64 = option_value(&args, i, "--timeout")
                        .parse()
                        .ok()
                        .filter(|s: &f64| s.is_finite() && *s > 0.0)
                        .unwrap_or_else(|| {
                            eprintln!("Error: invalid timeout");
                            std::process::exit(1);
                        });
                    config.timeout = Some(Duration::from_secs_f64(secs));
                    i += 2;
                }
                "--pipe" => {
                    config.pipe = true;
                    i += 1;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("flashkv-cli version {}", flashkv_client::VERSION);
                    std::process::exit(0);
                }
                arg if arg.starts_with('-') && config.command.is_empty() => {
                    eprintln!("Unknown argument: {}", arg);
                    print_help();
                    std::process::exit(1);
                }
                _ => {
                    // Everything from the first positional argument on is the command.
                    config.command = args[i..].to_vec();
                    break;
                }
            }
        }

        config
    }

    /// Returns the server address as a string
    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn option_value<'a>(args: &'a [String], i: usize, name: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", name);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
flashkv-cli - Command-line client for FlashKV and Redis

USAGE:
    flashkv-cli [OPTIONS] [COMMAND [ARG...]]

OPTIONS:
    -h, --host <HOST>          Server host (default: 127.0.0.1)
    -p, --port <PORT>          Server port (default: 6379)
    -a, --password <PASS>      Password sent with AUTH after connecting
    -t, --timeout <SECONDS>    Connect/read/write timeout
        --pipe                 Send every stdin line in one pipelined batch
    -v, --version              Print version information
        --help                 Print this help message

EXAMPLES:
    flashkv-cli SET name chia           # Run one command
    flashkv-cli GET name
    flashkv-cli                         # Interactive prompt
    printf 'INCR a\nINCR a\n' | flashkv-cli --pipe

Set RUST_LOG=debug to see connection logs on stderr.
"#
    );
}

fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    // Logs go to stderr so replies on stdout stay clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let addr = config.address();
    let client_config = ClientConfig {
        addr: addr.clone(),
        password: config.password.clone(),
        connect_timeout: config.timeout,
        read_timeout: config.timeout,
        write_timeout: config.timeout,
    };

    let mut conn = connect_with_config(&client_config)
        .with_context(|| format!("could not connect to {}", addr))?;
    info!(addr = %addr, "Connected");

    let succeeded = if config.pipe {
        run_pipe(&mut conn)?
    } else if !config.command.is_empty() {
        run_once(&mut conn, &config.command)
    } else {
        run_interactive(&mut conn, &addr)?
    };

    conn.close().context("failed to close connection")?;

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

/// Runs a single command; returns false on an error reply.
fn run_once(conn: &mut Connection, command: &[String]) -> bool {
    let args: Vec<Arg> = command[1..].iter().map(Arg::from).collect();
    let reply = conn.exec(&command[0], &args);
    print_reply(&reply);
    reply.is_ok()
}

/// Prompts for commands until EOF or `quit`.
fn run_interactive(conn: &mut Connection, addr: &str) -> anyhow::Result<bool> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "{}> ", addr)?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(true);
        }

        let parts = match split_line(&line) {
            Ok(parts) => parts,
            Err(msg) => {
                println!("(error) {}", msg);
                continue;
            }
        };
        match parts.first().map(|s| s.to_ascii_lowercase()).as_deref() {
            None => continue,
            Some("quit") | Some("exit") => return Ok(true),
            Some(_) => {
                run_once(conn, &parts);
                if conn.broken().is_some() {
                    warn!("Connection is no longer usable, exiting");
                    return Ok(false);
                }
            }
        }
    }
}

/// Queues every stdin line, then commits them in one write.
fn run_pipe(conn: &mut Connection) -> anyhow::Result<bool> {
    let mut all_ok = true;

    for (lineno, line) in io::stdin().lock().lines().enumerate() {
        let line = line.context("failed to read stdin")?;
        let parts = match split_line(&line) {
            Ok(parts) if parts.is_empty() => continue,
            Ok(parts) => parts,
            Err(msg) => {
                eprintln!("line {}: {}", lineno + 1, msg);
                all_ok = false;
                continue;
            }
        };

        let args: Vec<Arg> = parts[1..].iter().map(Arg::from).collect();
        if let Err(e) = conn.pipeline(&parts[0], &args) {
            eprintln!("line {}: {}", lineno + 1, e);
            all_ok = false;
        }
    }

    debug!(pending = conn.pending(), "Committing pipelined commands");
    for reply in conn.commit() {
        print_reply(&reply);
        all_ok &= reply.is_ok();
    }
    Ok(all_ok)
}

fn print_reply(reply: &Reply) {
    match reply.as_result() {
        Ok(value) => println!("{}", value),
        Err(e) => println!("(error) {}", e),
    }
}

/// Splits a command line into words, honouring double-quoted strings.
///
/// Inside quotes, `\"`, `\\`, `\n`, `\r` and `\t` are unescaped.
fn split_line(line: &str) -> Result<Vec<String>, String> {
    let mut parts = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            return Ok(parts);
        };

        let mut word = String::new();
        if first == '"' {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('n') => word.push('\n'),
                        Some('r') => word.push('\r'),
                        Some('t') => word.push('\t'),
                        Some(c) => word.push(c),
                        None => return Err("unbalanced quotes".to_string()),
                    },
                    Some(c) => word.push(c),
                    None => return Err("unbalanced quotes".to_string()),
                }
            }
            if chars.peek().is_some_and(|c| !c.is_whitespace()) {
                return Err("closing quote must be followed by a space".to_string());
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                word.push(c);
            }
        }
        parts.push(word);
    }
}
