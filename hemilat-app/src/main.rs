mod adapters;
mod app;
mod settings;
mod simulate;

use app::App;
use settings::{DEFAULT_CONFIG, Settings};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, PartialEq)]
struct Args {
    config: String,
    simulate: Option<u64>,
}

impl Args {
    /// `hemilat-app [CONFIG] [--simulate [SEED]]`
    fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut parsed = Args {
            config: DEFAULT_CONFIG.to_string(),
            simulate: None,
        };
        let mut args = args.into_iter().peekable();
        while let Some(arg) = args.next() {
            if arg == "--simulate" {
                let seed = args.next_if(|a| a.parse::<u64>().is_ok());
                parsed.simulate = Some(seed.and_then(|s| s.parse().ok()).unwrap_or(0));
            } else {
                parsed.config = arg;
            }
        }
        parsed
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> ExitCode {
    let args = Args::parse(std::env::args().skip(1));
    let settings = match Settings::load(&args.config) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("hemilat: {err:#}");
            return ExitCode::from(1);
        }
    };
    init_tracing(&settings.app.logging.level);

    let result = match args.simulate {
        Some(seed) => simulate::run(settings, seed),
        None => App::new(settings).and_then(App::run),
    };
    match result {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(1)
        }
    }
}
