//! `waygate` binary.

use std::{error::Error, path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::JoinHandle,
};
use waygate_app::{RuntimeConfig, RuntimeHandle};
use waygate_cli::{
    CliError, Command, Settings, commands, logging,
    render::{render, timer_line},
    setup,
};
use waygate_core::{Environment, SystemEnv};
use waygate_store::IdentityStore;

/// Waygate VPN client.
#[derive(Debug, Parser)]
#[command(name = "waygate", version, about)]
struct Cli {
    /// Backend base URL.
    #[arg(long, env = "WAYGATE_API_URL", global = true)]
    api_url: Option<String>,

    /// Directory for the identity file.
    #[arg(long, env = "WAYGATE_STATE_DIR", global = true)]
    state_dir: Option<PathBuf>,

    /// Tunnel plugin socket.
    #[arg(long, env = "WAYGATE_PLUGIN_SOCKET", global = true)]
    plugin_socket: Option<PathBuf>,

    /// Use the simulated tunnel layer.
    #[arg(long, env = "WAYGATE_SIMULATE", global = true)]
    simulate: bool,

    /// Debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Log in and store the session.
    Login {
        /// Account name.
        username: String,
        /// Account password; read from stdin when omitted.
        #[arg(long, env = "WAYGATE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored session.
    Logout,
    /// Connect to the assigned server.
    Connect {
        /// Keep running and show the connected time.
        #[arg(long)]
        follow: bool,
    },
    /// Disconnect.
    Disconnect,
    /// Show the connection status.
    Status,
    /// Interactive shell.
    Shell,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            api_url: self.api_url.clone(),
            state_dir: self.state_dir.clone(),
            plugin_socket: self.plugin_socket.clone(),
            simulate: self.simulate,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let settings = cli.settings();
    let identity = setup::open_identity(&settings)?;

    match cli.command {
        CliCommand::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => read_line().await?,
            };
            let session = setup::auth_client(&settings, &identity)?.login(&username, &password).await?;
            println!("Logged in as {}", session.username);
        },
        CliCommand::Logout => {
            setup::auth_client(&settings, &identity)?.logout();
            println!("Logged out");
        },
        CliCommand::Connect { follow } => {
            let (handle, task) = start_runtime(&settings, &identity).await?;
            let result = connect(&handle, follow).await;
            stop_runtime(handle, task).await;
            result?;
        },
        CliCommand::Disconnect => {
            let (handle, task) = start_runtime(&settings, &identity).await?;
            let result = handle.disconnect().await;
            println!("{}", render(&handle.view(), SystemEnv.now_ms()));
            stop_runtime(handle, task).await;
            result?;
        },
        CliCommand::Status => {
            let (handle, task) = start_runtime(&settings, &identity).await?;
            let view = handle.refresh().await;
            stop_runtime(handle, task).await;
            println!("{}", render(&view?, SystemEnv.now_ms()));
        },
        CliCommand::Shell => {
            let (handle, task) = start_runtime(&settings, &identity).await?;
            let result = shell(&handle, &settings, &identity).await;
            stop_runtime(handle, task).await;
            result?;
        },
    }

    Ok(())
}

async fn start_runtime(
    settings: &Settings,
    identity: &IdentityStore,
) -> Result<(RuntimeHandle, JoinHandle<()>), CliError> {
    let services = setup::services(settings, identity).await?;
    Ok(waygate_app::spawn(services, RuntimeConfig::default(), SystemEnv))
}

async fn stop_runtime(handle: RuntimeHandle, task: JoinHandle<()>) {
    handle.shutdown().await;
    let _ = task.await;
}

async fn connect(handle: &RuntimeHandle, follow: bool) -> Result<(), CliError> {
    // Startup poll first, so a tunnel left by a previous run is adopted
    // rather than duplicated.
    let view = handle.refresh().await?;
    if !view.record.is_connected() {
        handle.connect().await?;
    }
    println!("{}", render(&handle.view(), SystemEnv.now_ms()));

    if follow {
        follow_timer(handle).await;
    }
    Ok(())
}

/// Print the connected time every second until the tunnel drops or Ctrl-C.
async fn follow_timer(handle: &RuntimeHandle) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let view = handle.view();
                match timer_line(&view.record, SystemEnv.now_ms()) {
                    Some(line) => println!("{line}"),
                    None => {
                        println!("{}", render(&view, SystemEnv.now_ms()));
                        return;
                    },
                }
            },
            _ = tokio::signal::ctrl_c() => return,
        }
    }
}

async fn shell(handle: &RuntimeHandle, settings: &Settings, identity: &IdentityStore) -> Result<(), CliError> {
    let auth = setup::auth_client(settings, identity)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut changes = handle.watch();

    println!("{}", commands::HELP);
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { return Ok(()) };
                match commands::parse(&line) {
                    Command::Connect => report(handle.connect().await),
                    Command::Disconnect => report(handle.disconnect().await),
                    Command::Toggle => report(handle.toggle().await),
                    Command::Status => println!("{}", render(&handle.view(), SystemEnv.now_ms())),
                    Command::Refresh => {
                        let view = handle.refresh().await?;
                        println!("{}", render(&view, SystemEnv.now_ms()));
                    },
                    Command::Dismiss => handle.dismiss_error().await?,
                    Command::Login { username, password } => match auth.login(&username, &password).await {
                        Ok(session) => println!("Logged in as {}", session.username),
                        Err(e) => println!("Login failed: {e}"),
                    },
                    Command::Logout => {
                        auth.logout();
                        println!("Logged out");
                    },
                    Command::Help => println!("{}", commands::HELP),
                    Command::Quit => return Ok(()),
                    Command::Empty => {},
                    Command::Unknown { input } => println!("Unknown command: {input}"),
                    Command::InvalidArgs { error, .. } => println!("{error}"),
                }
            },
            changed = changes.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let view = changes.borrow_and_update().clone();
                println!("[{}]", view.record.status.label());
            },
        }
    }
}

fn report(result: Result<(), waygate_core::CommandError>) {
    if let Err(e) = result {
        println!("{e}");
    }
}

async fn read_line() -> Result<String, CliError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    Ok(lines.next_line().await?.unwrap_or_default())
}
