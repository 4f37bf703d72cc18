mod cli;

use std::io;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use uplink_node::runner::write_report;
use uplink_node::{HostDevice, NodeConfig, NodeError, Reading, Runner};
use uplink_session::UplinkSession;
use uplink_transport::host::{SystemClock, SystemResolver, TcpTransport};

use crate::cli::{Cli, Command};

fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli) {
        let code = err.exit_code();
        eprintln!("error: {err}");
        std::process::exit(code);
    }
}

/// stdout はレポート用なので、ログは stderr に出す
fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), NodeError> {
    let mut config = NodeConfig::load(cli.global.config.as_deref())?;
    cli.global.apply(&mut config);
    if let Command::Run {
        sleep_between_ms: Some(ms),
    } = cli.command
    {
        config.sleep_between_ms = ms;
    }
    config.validate()?;

    let transport = TcpTransport::new(Duration::from_millis(config.connect_timeout_ms));
    let session = UplinkSession::new(
        config.session_config(),
        transport,
        SystemClock::new(),
        HostDevice::new(),
    );
    let mut runner = Runner::new(session, &config);
    runner.start(&mut SystemResolver)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Send {
            component_id,
            payload,
        } => {
            let reading = Reading::new(component_id, payload)?;
            let report = runner.upload(&reading);
            write_report(&mut out, &report)?;
        }
        Command::Run { .. } => {
            let uploads = runner.run(io::stdin().lock(), &mut out)?;
            tracing::info!(uploads, "input exhausted");
        }
    }

    Ok(())
}
