mod batch;
mod channel;
mod config;
mod data_dir;
mod error;
mod follower;
mod input;
mod lifecycle;
mod player;
mod session;
mod signals;
mod watchdog;

use channel::ControlChannel;
use clap::Parser;
use config::{PlayerConfig, Settings};
use data_dir::PlayerDir;
use error::FatalError;
use input::{KeySource, TerminalKeys};
use lifecycle::{Coordinator, ProcessTeardown};
use player::{Monitor, PlayerLauncher, ProcessList};
use session::Session;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Launch, attach to, and remote-control a long-running pianobar process.
///
/// Without KEYS: start the player if needed, show its output and forward
/// every keystroke to it until `q` (or Ctrl-D). With KEYS: send them to the
/// player and exit.
#[derive(Parser, Debug)]
#[command(name = "barctl", version, about)]
pub struct Cli {
    /// Keys to send to a running player (batch mode)
    #[arg(value_name = "KEYS", trailing_var_arg = true, allow_hyphen_values = true)]
    keys: Vec<String>,

    /// Player binary name, also its directory under $XDG_CONFIG_HOME
    #[arg(long, env = "BARCTL_PLAYER", default_value = "pianobar")]
    player: String,

    /// Seconds between checks that the player is still alive
    #[arg(long, env = "BARCTL_POLL_INTERVAL", default_value_t = 2)]
    poll_interval: u64,

    /// Number of output log lines shown on attach
    #[arg(short = 'n', long, env = "BARCTL_TAIL_LINES", default_value_t = 30)]
    lines: usize,

    /// Seconds to wait after launching the player
    #[arg(long, env = "BARCTL_LAUNCH_GRACE", default_value_t = 1)]
    launch_grace: u64,

    /// Key that ends the interactive session (never forwarded)
    #[arg(long, default_value_t = 'q')]
    quit_key: char,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            player: self.player.clone(),
            poll_interval: Duration::from_secs(self.poll_interval.max(1)),
            tail_lines: self.lines,
            launch_grace: Duration::from_secs(self.launch_grace),
            quit_key: self.quit_key,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let settings = cli.settings();
    tracing::debug!(?settings, keys = ?cli.keys, "resolved settings");

    let dir = PlayerDir::from_env(&settings.player);
    let config = PlayerConfig::load_or_default(&dir.config());

    let code = match run(&cli.keys, &settings, &dir, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("barctl: {e}");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(
    keys: &[String],
    settings: &Settings,
    dir: &PlayerDir,
    config: &PlayerConfig,
) -> Result<i32, FatalError> {
    let channel = ControlChannel::new(config.fifo(dir));
    let output_log = config.output_log(dir);
    let monitor = Monitor::new(
        settings.player.clone(),
        Arc::new(ProcessList),
        Arc::new(PlayerLauncher::new(settings.player.clone(), &output_log)),
        settings.launch_grace,
    );

    if !keys.is_empty() {
        let outcome = batch::run(&monitor, &channel, &channel, &config.bindings(), keys).await?;
        if outcome == batch::BatchOutcome::NotRunning {
            println!("{} is not running", settings.player);
        }
        return Ok(0);
    }

    let session = Session {
        monitor,
        channel: channel.clone(),
        output_log,
        tail_lines: settings.tail_lines,
        poll_interval: settings.poll_interval,
        quit_key: settings.quit_key,
        crlf: true,
    };
    session
        .attach(
            Arc::new(Coordinator::new(Arc::new(ProcessTeardown))),
            tokio::io::stdout(),
            Arc::new(channel),
            Box::new(open_terminal),
        )
        .await
}

fn open_terminal(quit_key: char) -> std::io::Result<Box<dyn KeySource>> {
    Ok(Box::new(TerminalKeys::open(quit_key)?) as Box<dyn KeySource>)
}
