use std::{env, path::Path, process::ExitCode};

use tokio::task::LocalSet;
use tracing::error;
use tracing_subscriber::EnvFilter;

use proyx_delay::{run_main_listener, Config};

const CONFIG_ENV: &str = "DELAY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "delay-config.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = match Config::load(Path::new(&path)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let local = LocalSet::new();
    match local.run_until(run_main_listener(&config)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, listen = %config.listen, "listener failed");
            ExitCode::FAILURE
        }
    }
}
