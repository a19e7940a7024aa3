use std::process::ExitCode;

use clap::Parser;
use timetable_sync::app::App;
use timetable_sync::cli::{Args, Command};
use timetable_sync::config::Config;
use timetable_sync::logging::setup_logging;
use timetable_sync::timetable::ScheduleMode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config and setup logging before App::new() so startup logs are never silently dropped
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:?}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        "Starting timetable-sync"
    );

    let mut app = match App::new(config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = ?e, "Failed to initialize application");
            return ExitCode::FAILURE;
        }
    };

    let result = match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            app.setup_services();
            app.start_services();
            return app.run().await;
        }
        Command::Sync { group } => app.sync_once(group.as_deref()).await.map(|stats| {
            info!(?stats, "Sync finished");
        }),
        Command::Show { group, session } => app
            .show(&group, ScheduleMode::from_session_flag(session))
            .await
            .and_then(|week| Ok(serde_json::to_string_pretty(&week)?))
            .map(|json| println!("{json}")),
        Command::Update { id, file } => app.update_from_file(id, &file).await.map(|()| {
            info!(%id, "Schedule row updated");
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "Command failed");
            ExitCode::FAILURE
        }
    }
}
