use clap::Parser;
use slamtest::cancellation;
use slamtest::config::Cli;
use slamtest::credentials::Credentials;
use slamtest::errors::LoadError;
use slamtest::orchestrator::Orchestrator;
use slamtest::scenario;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match cli.into_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let script_contents = match std::fs::read_to_string(&config.script) {
        Ok(c) => c,
        Err(source) => {
            let err = LoadError::ScriptRead {
                path: config.script.clone(),
                source,
            };
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let scenario = match scenario::load_scenario(&config.script, &script_contents) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let credentials = match load_credentials(config.credentials.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if !credentials.is_empty() && credentials.len() < config.users as usize {
        tracing::warn!(
            credentials = credentials.len(),
            users = config.users,
            "fewer credentials than users; credentials will repeat"
        );
    }

    config.print_summary();

    let (interrupt_trigger, interrupt_scope) = cancellation::scope();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            error!("interrupt received, shutting down");
            interrupt_trigger.cancel();
        }
    });

    let orchestrator = Orchestrator::new(config, scenario, credentials);
    orchestrator.run(interrupt_scope).await;

    ExitCode::SUCCESS
}

fn load_credentials(path: Option<&str>) -> Result<Credentials, LoadError> {
    match path {
        None => Credentials::load("", ""),
        Some(path) => {
            let contents =
                std::fs::read_to_string(path).map_err(|source| LoadError::CredentialsRead {
                    path: path.to_string(),
                    source,
                })?;
            Credentials::load(path, &contents)
        }
    }
}
