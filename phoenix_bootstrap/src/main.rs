//! `phoenix` binary entry point: parses the CLI, loads the policy document,
//! and either runs a one-shot use case or starts the full runtime (pipeline
//! + governor + safety monitor) until a shutdown signal arrives.

use phoenix::application::use_cases;
use phoenix::infrastructure::metrics::MetricsService;
use phoenix::infrastructure::policy::FilePolicyRepository;
use phoenix::PhoenixRuntime;
use phoenix_bootstrap::cli::{self, Commands};
use phoenix_bootstrap::exit_code::ExitCode;
use phoenix_bootstrap::shutdown::ShutdownHandle;
use phoenix_bootstrap::signals::{self, SystemSignals};
use phoenix_domain::repositories::PolicyRepository;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("global tracing subscriber already set");
    }
}

#[tokio::main]
async fn main() {
    let cli = cli::parse_cli();
    init_tracing(cli.verbose);

    let code = match cli.command.clone() {
        Commands::Validate { policy_file } => run_validate(policy_file.or(cli.policy.clone())),
        Commands::DumpStatus => run_dump_status(cli.policy.clone()).await,
        Commands::ForceSafeMode => run_force_safe_mode(cli.policy.clone()).await,
        Commands::ExitSafeMode => run_exit_safe_mode(cli.policy.clone()).await,
        Commands::Run { tick_interval_seconds } => run_runtime(cli.policy.clone(), tick_interval_seconds).await,
    };

    std::process::exit(code.as_i32());
}

fn run_validate(policy_file: Option<std::path::PathBuf>) -> ExitCode {
    let path = match cli::resolve_policy_path(policy_file.as_deref()) {
        Ok(p) => p,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::UsageError;
        }
    };

    match use_cases::validate_policy_file(&path) {
        Ok(()) => {
            println!("policy is valid: {}", path.display());
            ExitCode::Success
        }
        Err(err) => {
            eprintln!("policy validation failed: {err}");
            ExitCode::from_phoenix_error(&err)
        }
    }
}

async fn run_dump_status(policy: Option<std::path::PathBuf>) -> ExitCode {
    let runtime = match load_runtime(policy) {
        Ok(rt) => rt,
        Err(code) => return code,
    };
    println!("{}", use_cases::dump_status(runtime.registry.as_ref()));
    ExitCode::Success
}

async fn run_force_safe_mode(policy: Option<std::path::PathBuf>) -> ExitCode {
    let runtime = match load_runtime(policy) {
        Ok(rt) => rt,
        Err(code) => return code,
    };
    match use_cases::force_safe_mode(runtime.safety_monitor.as_ref(), runtime.policy_repo.as_ref()).await {
        Ok(()) => {
            println!("safe mode forced");
            ExitCode::Success
        }
        Err(err) => {
            eprintln!("force-safe-mode failed: {err}");
            ExitCode::from_phoenix_error(&err)
        }
    }
}

async fn run_exit_safe_mode(policy: Option<std::path::PathBuf>) -> ExitCode {
    let runtime = match load_runtime(policy) {
        Ok(rt) => rt,
        Err(code) => return code,
    };
    match use_cases::exit_safe_mode(runtime.safety_monitor.as_ref()).await {
        Ok(()) => {
            println!("safe mode exited");
            ExitCode::Success
        }
        Err(err) => {
            eprintln!("exit-safe-mode failed: {err}");
            ExitCode::from_phoenix_error(&err)
        }
    }
}

fn load_runtime(policy: Option<std::path::PathBuf>) -> Result<PhoenixRuntime, ExitCode> {
    let path = cli::resolve_policy_path(policy.as_deref()).map_err(|err| {
        eprintln!("{err}");
        ExitCode::UsageError
    })?;

    let metrics = Arc::new(MetricsService::new().map_err(|err| {
        eprintln!("failed to initialize metrics: {err}");
        ExitCode::from_phoenix_error(&err)
    })?);

    let repo: Arc<dyn PolicyRepository> = Arc::new(FilePolicyRepository::load(path, metrics.clone()).map_err(|err| {
        eprintln!("failed to load policy: {err}");
        ExitCode::from_phoenix_error(&err)
    })?);

    PhoenixRuntime::new(repo, metrics).map_err(|err| {
        eprintln!("failed to build runtime: {err}");
        ExitCode::from_phoenix_error(&err)
    })
}

async fn run_runtime(policy: Option<std::path::PathBuf>, tick_override: Option<u64>) -> ExitCode {
    let path = match cli::resolve_policy_path(policy.as_deref()) {
        Ok(p) => p,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::UsageError;
        }
    };

    let metrics = match MetricsService::new() {
        Ok(m) => Arc::new(m),
        Err(err) => {
            eprintln!("failed to initialize metrics: {err}");
            return ExitCode::from_phoenix_error(&err);
        }
    };

    let file_repo = match FilePolicyRepository::load(path, metrics.clone()) {
        Ok(repo) => Arc::new(repo),
        Err(err) => {
            eprintln!("failed to load policy: {err}");
            return ExitCode::from_phoenix_error(&err);
        }
    };
    let repo: Arc<dyn PolicyRepository> = file_repo.clone();

    let runtime = match PhoenixRuntime::new(repo.clone(), metrics) {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to build runtime: {err}");
            return ExitCode::from_phoenix_error(&err);
        }
    };

    if let Err(err) = runtime.pipeline.start().await {
        eprintln!("pipeline start failed: {err}");
        return ExitCode::from_phoenix_error(&err);
    }

    let shutdown = ShutdownHandle::new();
    let signal_handler = signals::create_signal_handler();
    let shutdown_for_signal = shutdown.clone();
    let signal_task = tokio::spawn(async move {
        signal_handler
            .wait_for_signal(Box::new(move || shutdown_for_signal.trigger()))
            .await;
    });

    let tick_interval_seconds = tick_override.unwrap_or(repo.current().governance.tick_interval_seconds).max(1);
    let governor = runtime.governor.clone();
    let governor_shutdown = shutdown.clone();
    let governor_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(tick_interval_seconds));
        loop {
            tokio::select! {
                _ = governor_shutdown.wait() => break,
                _ = interval.tick() => {
                    if let Err(err) = governor.run_tick(tick_interval_seconds as f64).await {
                        tracing::error!(error = %err, "governor tick failed");
                    }
                }
            }
        }
    });

    let poll_interval_ms = repo.current().safety.poll_interval_ms.max(1);
    let safety_monitor = runtime.safety_monitor.clone();
    let safety_policy_repo = repo.clone();
    let safety_shutdown = shutdown.clone();
    let safety_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(poll_interval_ms));
        loop {
            tokio::select! {
                _ = safety_shutdown.wait() => break,
                _ = interval.tick() => {
                    let policy = safety_policy_repo.current();
                    if let Err(err) = safety_monitor.poll_once(&policy).await {
                        tracing::error!(error = %err, "safety monitor poll failed");
                    }
                }
            }
        }
    });

    let policy_poll_interval_seconds = repo.current().governance.policy_poll_interval_seconds.max(1);
    let policy_poll_repo = file_repo.clone();
    let policy_poll_shutdown = shutdown.clone();
    let policy_poll_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(policy_poll_interval_seconds));
        loop {
            tokio::select! {
                _ = policy_poll_shutdown.wait() => break,
                _ = interval.tick() => {
                    match policy_poll_repo.poll_for_changes().await {
                        Ok(true) => tracing::info!("policy file changed, reloaded"),
                        Ok(false) => {}
                        Err(err) => tracing::error!(error = %err, "policy hot-reload failed, retaining last-known-good"),
                    }
                }
            }
        }
    });

    shutdown.wait().await;
    let _ = tokio::join!(signal_task, governor_task, safety_task, policy_poll_task);

    if let Err(err) = runtime.pipeline.shutdown().await {
        eprintln!("pipeline shutdown failed: {err}");
        return ExitCode::from_phoenix_error(&err);
    }

    ExitCode::Success
}
