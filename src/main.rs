use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use rmote::cli::Cli;
use rmote::config;
use rmote::controller::Controller;
use rmote::exchange::{Exchange, Message, MessageKind, WalkStatus};
use rmote::synchronizer::Synchronizer;
use rmote::transport::Transport;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (configuration, ssh_details) = config::load(&cli).context("failed to load configuration")?;

    rmote::logging::init(configuration.debug);
    info!(project = %configuration.project, local = %configuration.local_dir.display(), "starting rmote");

    let transport = Transport::connect(&ssh_details).context("failed to connect to remote host")?;
    let transport = Arc::new(std::sync::Mutex::new(transport));

    let remote_dir = configuration
        .remote_dir
        .clone()
        .context("no remote directory configured; pass --remote-dir or set one in a config file")?;

    let synchronizer = Arc::new(Synchronizer::new(
        configuration.local_dir.clone(),
        remote_dir,
        &ssh_details,
        configuration.ignore.clone(),
        transport,
    ));

    let exchange = Exchange::new();
    install_line_reporter(&exchange);

    let controller = Arc::new(Controller::new(exchange.clone(), Arc::clone(&synchronizer), configuration.ignore.clone())?);
    controller.install();

    let dispatcher = {
        let exchange = exchange.clone();
        std::thread::spawn(move || exchange.run())
    };

    exchange.publish(Message::VerifyRemoteDirectory(None));
    if cli.initial_sync {
        exchange.publish(Message::StartInitialFileTreeWalk);
    }
    exchange.publish(Message::StartWatchSync);

    // Block the main thread until STOP_CALLED, which the Controller turns
    // into Exchange::stop().
    dispatcher.join().expect("exchange dispatcher thread panicked");

    let _ = controller.stop_requested();
    Ok(())
}

/// Minimal stand-in for the out-of-scope TUI (spec.md §1): writes the
/// user-visible message catalogue to the terminal via `tracing`.
fn install_line_reporter(exchange: &Exchange) {
    exchange.subscribe(MessageKind::WalkStatusChange, |message| {
        if let Message::WalkStatusChange(status) = message {
            let label = match status {
                WalkStatus::Connecting => "connecting",
                WalkStatus::LocalWalk => "walking local tree",
                WalkStatus::RemoteWalk => "walking remote tree",
                WalkStatus::CalculatingDifferences => "calculating differences",
            };
            info!(status = label, "walk status");
        }
    });
    exchange.subscribe(MessageKind::DisplayDifferences, |message| {
        if let Message::DisplayDifferences(diffs) = message {
            info!(count = diffs.len(), "differences found");
            for diff in diffs {
                info!(path = diff.path(), kind = ?diff.difference_type, "difference");
            }
        }
    });
    exchange.subscribe(MessageKind::HeldFilesChanged, |message| {
        if let Message::HeldFilesChanged(held) = message {
            info!(count = held.len(), "held paths changed");
        }
    });
    exchange.subscribe(MessageKind::StartingHandlingFsEvent, |message| {
        if let Message::StartingHandlingFsEvent(event) = message {
            info!(path = %event.path, kind = ?event.event_type, "handling fs event");
        }
    });
    exchange.subscribe(MessageKind::FinishedHandlingFsEvent, |message| {
        if let Message::FinishedHandlingFsEvent(event) = message {
            info!(path = %event.path, kind = ?event.event_type, "finished fs event");
        }
    });
    exchange.subscribe(MessageKind::ErrorHandlingFsEvent, |_| {
        tracing::error!("error handling fs event; recovering");
    });
    exchange.subscribe(MessageKind::PromptForRemoteDirectory, |_| {
        tracing::warn!("remote directory is missing or not a directory");
    });
}
