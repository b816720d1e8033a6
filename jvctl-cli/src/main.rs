//! Terminal remote control for D-ILA projectors.

use std::collections::BTreeMap;
use std::time::Duration;

use clap::{Parser, Subcommand};
use jvctl_core::{CommandTable, JvcError, PowerState, Session, SessionConfig};
use serde::Serialize;
use serde_json::json;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jvctl")]
#[command(about = "Terminal remote control for JVC D-ILA projectors")]
#[command(version)]
struct Args {
    /// Projector hostname or IP address
    #[arg(short = 'H', long)]
    host: String,

    /// Control port
    #[arg(short = 'P', long, default_value_t = jvctl_core::DEFAULT_PORT)]
    port: u16,

    /// Handshake password (NZ series)
    #[arg(short, long)]
    password: Option<String>,

    /// Minimum milliseconds between commands
    #[arg(long, default_value = "600", value_name = "MS")]
    spacing: u64,

    /// Seconds to wait for a reply
    #[arg(long, default_value = "5", value_name = "SECS")]
    timeout: u64,

    /// Seconds to wait for the TCP connection and handshake
    #[arg(long, default_value = "10", value_name = "SECS")]
    connect_timeout: u64,

    /// Emit machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Power the projector on
    On,
    /// Power the projector off
    Off,
    /// Report the power state
    Status {
        /// Ride out warming or cooling before reporting
        #[arg(long)]
        wait: bool,
    },
    /// Send a named command
    Send {
        /// Command name, as listed by `list`
        command: String,
        /// Parameter name; omit for parameterless actions
        #[arg(default_value = "")]
        parameter: String,
    },
    /// Query the current value of a command
    Get {
        /// Command name, as listed by `list`
        command: String,
    },
    /// Send a two-character remote control code
    Remote {
        /// Hex code from the remote control table, e.g. 2E for menu
        code: String,
    },
    /// List the known commands and their parameters
    List,
    /// Print device identity and usage counters
    Info,
}

fn init_logging(verbose: u8) {
    // RUST_LOG wins; otherwise the -v flags pick the level
    let default_level = match verbose {
        0 => "warn",
        1 => "info,jvctl_core=debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let as_json = args.json;
    if let Err(e) = run(args).await {
        if as_json {
            println!("{}", json!({ "error": e.to_string() }));
        }
        error!(error = %e, "command failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), JvcError> {
    // `list` never talks to the projector
    if matches!(args.command, Command::List) {
        print_list(args.json);
        return Ok(());
    }

    let mut config = SessionConfig::new(args.host);
    config.port = args.port;
    config.password = args.password;
    config.command_spacing = Duration::from_millis(args.spacing);
    config.reply_timeout = Duration::from_secs(args.timeout);
    config.connect_timeout = Duration::from_secs(args.connect_timeout);
    let session = Session::new(config);

    let result = dispatch(&session, args.command, args.json).await;
    session.close().await;
    result
}

async fn dispatch(session: &Session, command: Command, as_json: bool) -> Result<(), JvcError> {
    match command {
        Command::On => {
            session.power_on().await?;
            print_ok(as_json);
        }
        Command::Off => {
            session.power_off().await?;
            print_ok(as_json);
        }
        Command::Status { wait } => {
            let mut state = session.power_state().await?;
            if wait {
                let target = match state {
                    PowerState::Warming => Some(PowerState::On),
                    PowerState::Cooling => Some(PowerState::Standby),
                    _ => None,
                };
                if let Some(target) = target {
                    session
                        .wait_for_power(target, Duration::from_secs(180))
                        .await?;
                    state = session.power_state().await?;
                }
            }
            if as_json {
                println!("{}", json!({ "power": state.to_string() }));
            } else {
                println!("{state}");
            }
        }
        Command::Send { command, parameter } => {
            session.submit(&command, &parameter).await?;
            print_ok(as_json);
        }
        Command::Get { command } => {
            let reply = session.query(&command).await?;
            let raw = reply.raw().escape_ascii().to_string();
            if as_json {
                println!(
                    "{}",
                    json!({ "command": command, "raw": raw, "value": reply.name() })
                );
            } else {
                match reply.name() {
                    Some(name) => println!("{name}"),
                    None => println!("{raw}"),
                }
            }
        }
        Command::Remote { code } => {
            session.remote_code(&code).await?;
            print_ok(as_json);
        }
        Command::Info => {
            let model = session.model().await?;
            let software = session.software_version().await?;
            let lamp = session.lamp_time().await?;
            let power = session.power_state().await?;
            if as_json {
                println!(
                    "{}",
                    json!({
                        "model": model,
                        "software_version": software,
                        "lamp_hours": lamp,
                        "power": power.to_string(),
                    })
                );
            } else {
                println!("model:    {model}");
                println!("software: {software}");
                println!("lamp:     {lamp} hours");
                println!("power:    {power}");
            }
        }
        // normally intercepted before the session is built
        Command::List => print_list(as_json),
    }
    Ok(())
}

fn print_ok(as_json: bool) {
    if as_json {
        println!("{}", json!({ "ok": true }));
    } else {
        println!("ok");
    }
}

#[derive(Serialize)]
struct CommandEntry<'a> {
    kind: String,
    parameters: Vec<&'a str>,
}

fn print_list(as_json: bool) {
    let table = CommandTable::builtin();
    if as_json {
        let entries: BTreeMap<&str, CommandEntry<'_>> = table
            .entries()
            .map(|(name, spec)| {
                let entry = CommandEntry {
                    kind: spec.kind().to_string(),
                    parameters: spec.parameters().collect(),
                };
                (name, entry)
            })
            .collect();
        println!("{}", json!(entries));
    } else {
        for (name, spec) in table.entries() {
            let parameters = spec.parameters().collect::<Vec<_>>().join("|");
            println!("{name:<22} {:<9} {parameters}", spec.kind().to_string());
        }
    }
}
