use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

mod config;
mod console;
mod gauzy;
mod guard;
mod heartbeat;
mod logger;
mod server;
mod session;
mod status_store;
mod time_log;
mod timer_command;

use config::Config;
use console::{ConsoleMarkdownList, ConsolePresenter};
use gauzy::GauzyClient;
use guard::{authenticated_guard, AuthContext, SessionCookies};
use status_store::StatusStore;
use time_log::{TimerSource, TimerStatus};
use timer_command::TimerCommands;

/// Ever Teamsのタイマーを操作するためのCLIアプリケーション。
///
/// # Examples
/// ```
/// $ cargo run -- login --token <token> --tenant-id <tenant>
/// $ cargo run -- start <task-id>
/// $ cargo run -- serve
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(short, long, parse(from_occurrences), global = true, help = "Increase log verbosity")]
    verbose: u64,

    #[clap(long, global = true, help = "Path to the session file")]
    session: Option<PathBuf>,

    #[clap(subcommand)]
    subcommand: SubCommands,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, Subcommand)]
enum SubCommands {
    /// Run the /api/timer proxy server
    Serve,
    /// Save the session used by the timer commands
    Login(LoginArgs),
    #[clap(flatten)]
    Timer(TimerSubCommands),
}

/// セッションを使ってタイマーを操作するサブコマンド。
#[derive(Debug, Subcommand)]
enum TimerSubCommands {
    /// Start the timer for a task
    Start(StartArgs),
    /// Stop the running timer
    Stop(StopArgs),
    /// Toggle the timer for a task
    Toggle(ToggleArgs),
    /// Send a single heartbeat
    Sync(SourceArgs),
    /// Show the timer status
    Status(SourceArgs),
    /// Send heartbeats periodically until interrupted
    Heartbeat(SourceArgs),
}

#[derive(Debug, clap::Args)]
struct LoginArgs {
    #[clap(long, help = "Bearer token of the Gauzy API")]
    token: String,
    #[clap(long)]
    tenant_id: Option<String>,
    #[clap(long)]
    organization_id: Option<String>,
    #[clap(long, help = "Active organization team")]
    team_id: Option<String>,
}

#[derive(Debug, clap::Args)]
struct SourceArgs {
    #[clap(short, long, default_value = "TEAMS", help = "Timer source, e.g. TEAMS or DESKTOP")]
    source: TimerSource,
}

#[derive(Debug, clap::Args)]
struct StartArgs {
    task_id: String,
    #[clap(long, help = "Organization team, defaults to the active team")]
    team_id: Option<String>,
    #[clap(flatten)]
    source: SourceArgs,
}

#[derive(Debug, clap::Args)]
struct StopArgs {
    #[clap(long)]
    task_id: Option<String>,
    #[clap(flatten)]
    source: SourceArgs,
}

#[derive(Debug, clap::Args)]
struct ToggleArgs {
    task_id: String,
    #[clap(flatten)]
    source: SourceArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logger::init(logger::level_from_verbosity(args.verbose))?;

    let session_path = match args.session {
        Some(path) => path,
        None => session::default_path()?,
    };

    match args.subcommand {
        SubCommands::Login(login) => {
            let cookies = SessionCookies {
                access_token: Some(login.token),
                tenant_id: login.tenant_id,
                organization_id: login.organization_id,
                team_id: login.team_id,
            };
            session::save(&session_path, &cookies)
        }
        SubCommands::Serve => {
            let config = Config::from_env().context("Failed to load configuration")?;
            let client = GauzyClient::new(&config.api_server_url);
            server::serve(Arc::new(client), config.listen_addr).await;
            Ok(())
        }
        SubCommands::Timer(timer) => timer_command(timer, &session_path).await,
    }
}

/// タイマーのサブコマンドを実行し、最新の状態を表示する。
async fn timer_command(timer: TimerSubCommands, session_path: &Path) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let client = GauzyClient::new(&config.api_server_url);
    let cookies = session::load(session_path)?;
    let ctx = authorize(&client, cookies).await?;
    let store = Arc::new(StatusStore::new());

    let commands = TimerCommands::new(&client);
    let result = match timer {
        TimerSubCommands::Start(start) => {
            commands
                .start(
                    &ctx,
                    &start.task_id,
                    start.team_id.as_deref(),
                    start.source.source,
                )
                .await
        }
        TimerSubCommands::Stop(stop) => {
            commands
                .stop(&ctx, stop.source.source, stop.task_id.as_deref())
                .await
        }
        TimerSubCommands::Toggle(toggle) => {
            commands
                .toggle(&ctx, &toggle.task_id, toggle.source.source)
                .await
        }
        TimerSubCommands::Sync(sync) => commands.sync(&ctx, sync.source).await,
        TimerSubCommands::Status(status) => commands.status(&ctx, status.source).await,
        TimerSubCommands::Heartbeat(heartbeat) => {
            return run_heartbeat(client.clone(), ctx, heartbeat.source, &config, store).await;
        }
    };

    let status = store.track(result)?;
    show(&status)
}

/// セッションを検証する。認証できない場合はエラーを返す。
async fn authorize(client: &GauzyClient, cookies: SessionCookies) -> Result<AuthContext> {
    authenticated_guard(client, cookies)
        .await
        .context()
        .context("Unauthorized: run `ever-timer login` with a valid token")
}

/// Ctrl-Cが押されるまでハートビートを送信し、状態が変わるたびに表示する。
async fn run_heartbeat(
    client: GauzyClient,
    ctx: AuthContext,
    source: TimerSource,
    config: &Config,
    store: Arc<StatusStore>,
) -> Result<()> {
    let mut receiver = store.subscribe();
    let printer = tokio::spawn(async move {
        while receiver.changed().await.is_ok() {
            let status = receiver.borrow().clone();
            if let Some(status) = status {
                if let Err(err) = show(&status) {
                    warn!("{:#}", err);
                }
            }
        }
    });

    info!("Sending heartbeats every {:?}", config.heartbeat_period);
    let ticks = heartbeat::run(
        Arc::new(client),
        ctx,
        source,
        config.heartbeat_period,
        Arc::clone(&store),
        async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", err);
            }
        },
    )
    .await;
    info!("Heartbeat stopped after {} ticks", ticks);
    if let Some(status) = store.get() {
        info!("Last status: running={} duration={}", status.running, status.duration);
    }

    drop(store);
    printer.await.context("Failed to join status printer")?;

    Ok(())
}

fn show(status: &TimerStatus) -> Result<()> {
    let mut stdout = io::stdout();
    ConsoleMarkdownList::new(&mut stdout).show_timer_status(status)
}
