use clap::Parser;
use fixer_predictor::{
    app,
    config::{Config, RetrainPolicy, CONFIG_PATH_ENV},
    error::{AppError, Result},
};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "fixer-predictor", version)]
#[command(about = "Suggest who should fix a new issue, trained on past issues")]
struct Cli {
    /// Extra configuration file layered over the defaults
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Issue CSV to train on
    #[arg(short, long)]
    issues: Option<PathBuf>,

    /// Model artifact path
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Seed for cross-validation folds and trainer example order
    #[arg(long)]
    seed: Option<u64>,

    /// Retrain even if a stored model is up to date
    #[arg(long)]
    retrain: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(issues) = &self.issues {
            config.data.issues_path = issues.clone();
        }
        if let Some(model) = &self.model {
            config.model.path = model.clone();
        }
        if let Some(seed) = self.seed {
            config.training.seed = seed;
        }
        if self.retrain {
            config.model.retrain_policy = RetrainPolicy::Always;
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.observability.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.check()?;

    init_tracing(&config);
    tracing::info!(
        "Starting fixer predictor v{}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::debug!(
        issues = %config.data.issues_path.display(),
        model = %config.model.path.display(),
        policy = %config.model.retrain_policy,
        seed = config.training.seed,
        "Configuration loaded"
    );

    let stdin = io::stdin();
    let stdout = io::stdout();
    app::run(&config, stdin.lock(), stdout.lock())?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn report(err: &AppError) {
    tracing::error!(code = err.error_code(), "{}", err);
    eprintln!("Error: {err}");
}
