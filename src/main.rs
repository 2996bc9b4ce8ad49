//! Probe CLI Entry Point
//!
//! Provides command-line interface for workflow execution.
//!
//! # Usage
//!
//! ```bash
//! # Execute probe.yaml from the current directory
//! probe
//!
//! # Execute a specific workflow with full step reports
//! probe --workflow smtp.yaml --verbose
//!
//! # Validate only
//! probe --workflow smtp.yaml --lint
//!
//! # Write a starter workflow
//! probe --init
//!
//! # Serve a builtin action over the plugin protocol
//! echo '{"name":"x"}' | probe builtin hello
//! ```

use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use log::{error, info, warn};

use probe::actions::create_builtin_registry;
use probe::actions::process::serve_builtin;
use probe::monitoring::format_summary;
use probe::workflow::parser::write_template;
use probe::{load_workflow, ActionsConfig, Engine, APP_NAME, VERSION};

/// Default workflow file used when none is specified.
const DEFAULT_WORKFLOW: &str = "probe.yaml";

/// Environment variable supplying the step timeout in seconds.
const STEP_TIMEOUT_ENV: &str = "PROBE_STEP_TIMEOUT";

/// What the invocation asks for.
#[derive(Debug, PartialEq)]
enum Command {
    Run,
    Lint,
    Init,
    Builtin(String),
}

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    command: Command,
    workflow_path: String,
    verbose: bool,
    step_timeout: Option<Duration>,
    plugin_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command: Command::Run,
            workflow_path: DEFAULT_WORKFLOW.to_string(),
            verbose: false,
            step_timeout: None,
            plugin_dir: None,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Scenario Testing Engine");
    println!();
}

/// Usage text shown by `--help` and on argument errors.
fn usage() -> String {
    format!(
        "Usage: probe [OPTIONS] [WORKFLOW_FILE]
       probe builtin <ACTION>

Options:
  --workflow PATH     Workflow YAML file (default: {workflow})
  --lint              Validate the workflow and exit
  --init              Write a template workflow to the workflow path
  --timeout SECS      Per-step deadline, 0 disables (env: {timeout_env})
  --plugin-dir PATH   Directory of action plugins (env: PROBE_PLUGIN_DIR)
  --verbose, -v       Print the full request/response report of every step,
                      the run timeline, and debug logs. Without it each
                      step is logged as a single status line.
  --help              Show this help message
  --version           Show version information

Examples:
  probe --workflow smtp.yaml
  probe --workflow smtp.yaml --lint
  probe --timeout 30 -v
",
        workflow = DEFAULT_WORKFLOW,
        timeout_env = STEP_TIMEOUT_ENV,
    )
}

/// Prints usage information.
fn print_usage() {
    print!("{}", usage());
}

/// Parses a timeout in whole seconds; zero means no deadline.
fn parse_timeout(value: &str) -> Result<Option<Duration>, String> {
    let secs: u64 = value
        .trim()
        .parse()
        .map_err(|_| format!("Invalid timeout value: {}", value))?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

/// Parses command-line arguments into a Config struct.
///
/// `--flag value` and `--flag=value` are both accepted.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut timeout_set = false;
    let mut positional_index = 0;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let (flag, inline) = match args[i].split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value.to_string())),
            _ => (args[i].as_str(), None),
        };

        let mut value = |name: &str| -> Result<String, String> {
            if let Some(value) = inline.clone() {
                return Ok(value);
            }
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| format!("{} requires an argument", name))
        };

        match flag {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--lint" => {
                config.command = Command::Lint;
            }
            "--init" => {
                config.command = Command::Init;
            }
            "--workflow" | "-w" => {
                config.workflow_path = value("--workflow")?;
            }
            "--timeout" => {
                config.step_timeout = parse_timeout(&value("--timeout")?)?;
                timeout_set = true;
            }
            "--plugin-dir" => {
                config.plugin_dir = Some(PathBuf::from(value("--plugin-dir")?));
            }
            "builtin" if positional_index == 0 => {
                let action = value("builtin")?;
                config.command = Command::Builtin(action);
                positional_index += 1;
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            arg => {
                match positional_index {
                    0 => config.workflow_path = arg.to_string(),
                    _ => return Err(format!("Unexpected argument: {}", arg)),
                }
                positional_index += 1;
            }
        }
        i += 1;
    }

    if !timeout_set {
        if let Ok(raw) = env::var(STEP_TIMEOUT_ENV) {
            config.step_timeout = parse_timeout(&raw)
                .map_err(|e| format!("{} (from {})", e, STEP_TIMEOUT_ENV))?;
        }
    }

    Ok(config)
}

/// Runs a builtin action as a plugin over stdin/stdout.
fn serve(action: &str) -> Result<(), Box<dyn std::error::Error>> {
    let registry = create_builtin_registry();
    serve_builtin(&registry, action, io::stdin().lock(), io::stdout().lock())?;
    Ok(())
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(config.verbose);

    // Plugin mode keeps stdout for the protocol
    if let Command::Builtin(action) = &config.command {
        return serve(action);
    }

    // Print banner
    print_banner();

    if config.command == Command::Init {
        write_template(&config.workflow_path)?;
        info!("Template workflow written to {}", config.workflow_path);
        return Ok(());
    }

    // Load workflow
    info!("Loading workflow: {}", config.workflow_path);
    let workflow = load_workflow(&config.workflow_path).map_err(|e| {
        error!("Failed to load workflow: {}", e);
        format!(
            "Could not load workflow from '{}': {}",
            config.workflow_path, e
        )
    })?;

    info!(
        "Workflow '{}' loaded: {} jobs, {} steps",
        workflow.name,
        workflow.len(),
        workflow.step_count()
    );

    if config.command == Command::Lint {
        println!("OK: {} is valid", config.workflow_path);
        return Ok(());
    }

    // Create and configure engine
    let actions = ActionsConfig {
        builtins: true,
        plugin_dir: config.plugin_dir,
    };
    let mut engine = Engine::from_config(&actions);
    engine.set_step_timeout(config.step_timeout);
    engine.set_verbose(config.verbose);

    // Execute workflow
    let summary = engine.run(&workflow)?;

    print!("{}", format_summary(&summary));
    if config.verbose {
        println!("{}", summary.timeline().gantt_chart());
    }

    if !summary.is_success() {
        warn!("{} of {} steps failed", summary.failed_steps(), summary.total_steps());
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
