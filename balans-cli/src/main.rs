// balans-cli/src/main.rs
mod models;

use anyhow::{Context, Result, anyhow};
use colored::*;
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use indicatif::{ProgressBar, ProgressStyle};
use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor};

use balans_core::{agent::Agent, config::AgentConfig, errors::AgentError};

use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const CONFIG_FILENAME: &str = "Balans.toml";
const LOG_FILE_NAME: &str = "balans-app.log";

fn find_project_root() -> Result<PathBuf> {
    let current_dir = env::current_dir().context("Failed to get current directory")?;
    let mut current = current_dir.as_path();
    loop {
        let config_path = current.join(CONFIG_FILENAME);
        if config_path.exists() && config_path.is_file() {
            return Ok(current.to_path_buf());
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => {
                return Err(anyhow!(
                    "Could not find '{}' in current directory or any parent directory.",
                    CONFIG_FILENAME
                ));
            }
        }
    }
}

fn load_cli_config() -> Result<(AgentConfig, PathBuf)> {
    let project_root = find_project_root()?;
    let config_path = project_root.join(CONFIG_FILENAME);
    info!("Found configuration file at: {:?}", config_path);
    let config_toml_content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read project config file: {:?}", config_path))?;
    let agent_config = AgentConfig::from_toml_str(&config_toml_content)
        .context("Failed to parse or validate configuration content")?;
    Ok((agent_config, project_root))
}

fn print_welcome_message() {
    println!("\n{}", "Balans - 1C ERP Assistant".cyan().bold());
    println!(
        "{}",
        "Type 'exit', 'quit', Ctrl-D, or press Enter on an empty line to quit.".dimmed()
    );
    println!();
}

fn thinking_spinner() -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "-"]),
    );
    pb.set_message("Thinking...");
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

/// Runs a single turn (non-interactive).
async fn run_single_turn(agent: &Agent, prompt: String) -> Result<()> {
    info!(turn = %prompt, "Running non-interactive turn.");

    let pb = thinking_spinner()?;
    let result = agent.ask(&prompt, None).await;
    pb.finish_and_clear();

    match result {
        Ok(final_message) => {
            println!("{}", final_message);
            Ok(())
        }
        Err(e) => {
            error!("Agent run encountered an error: {}", e);
            Err(anyhow!(e))
        }
    }
}

/// Runs an interactive chat session using rustyline for a REPL experience.
async fn run_interactive(agent: &Agent) -> Result<()> {
    print_welcome_message();

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .completion_type(rustyline::CompletionType::List)
        .edit_mode(rustyline::EditMode::Emacs)
        .auto_add_history(true)
        .build();

    let mut rl = DefaultEditor::with_config(rl_config)?;

    // Input history lives next to the logs in the cache dir.
    let history_dir = dirs::cache_dir()
        .map(|d| d.join("balans"))
        .ok_or_else(|| anyhow!("Could not determine cache directory for history file"))?;
    fs::create_dir_all(&history_dir).context("Failed to create history directory")?;
    let history_file_path = history_dir.join("cli_history.txt");
    if rl.load_history(&history_file_path).is_err() {
        debug!(path = %history_file_path.display(), "No previous CLI history found or error loading.");
    }

    let prompt = format!("{} ", ">".green().bold());

    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed_input = line.trim();

                if trimmed_input.is_empty()
                    || trimmed_input.to_lowercase() == "exit"
                    || trimmed_input.to_lowercase() == "quit"
                {
                    info!("Exit command or empty line entered, exiting interactive mode.");
                    break;
                }

                let pb = thinking_spinner()?;
                let result = agent.ask(trimmed_input, None).await;
                pb.finish_and_clear();

                match result {
                    Ok(final_message) => {
                        info!("Agent turn completed successfully.");
                        println!("\n{}", "--- Assistant ---\n".bold());
                        println!("{}", final_message);
                        println!("\n-----------------");
                    }
                    Err(e) => {
                        error!("Agent run encountered an error: {}", e);
                        eprintln!("\n{}: {}", "Agent run encountered an error".red(), e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "^C".yellow());
                continue;
            }
            Err(ReadlineError::Eof) => {
                info!("EOF detected, exiting interactive mode.");
                break;
            }
            Err(err) => {
                error!("Readline error: {:?}", err);
                eprintln!("Error reading input: {}", err.to_string().red());
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(&history_file_path) {
        warn!(path = %history_file_path.display(), error = %e, "Failed to save CLI history.");
    } else {
        debug!(path = %history_file_path.display(), "Saved CLI history.");
    }

    println!("\n{}\n", "Exiting.".cyan());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    colored::control::set_override(true);

    dotenvy::dotenv().ok();
    let cli = models::cli::Cli::parse();

    let default_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(default_level.into()));

    let log_dir = match dirs::cache_dir()
        .or_else(dirs::runtime_dir)
        .or_else(|| Some(env::temp_dir()))
        .map(|d| d.join("balans"))
    {
        Some(dir) => dir,
        None => {
            eprintln!(
                "{}",
                "Error: Could not determine a suitable directory for log files.".red()
            );
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!(
            "{} Failed to create log directory {}: {}",
            "Error:".red(),
            log_dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let log_path = log_dir.join(LOG_FILE_NAME);
    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE_NAME);
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer()
        .with_writer(non_blocking_writer)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    let time_format_desc = match time::format_description::parse(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]",
    ) {
        Ok(desc) => desc,
        Err(e) => {
            eprintln!("Warning: Failed to parse time format, using default: {}", e);
            time::format_description::parse("[hour]:[minute]:[second]")
                .expect("Fallback time format failed")
        }
    };
    let local_timer = LocalTime::new(time_format_desc);

    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_timer(local_timer.clone())
        .with_target(false)
        .with_level(true);
    let file_layer = file_layer.with_timer(local_timer);

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("{} Failed to initialize logging: {}", "Error:".red(), e);
        return ExitCode::FAILURE;
    }
    colored::control::unset_override();

    info!(
        "Logging initialized. Level determined by RUST_LOG or -v flags (default: {}). Logging to stderr and {}",
        default_level,
        log_path.display()
    );

    let (config, project_root) = match load_cli_config() {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!(
                "{} Could not find or load '{}'. Ensure you are in a Balans project directory.",
                "Error:".red(),
                CONFIG_FILENAME
            );
            return ExitCode::FAILURE;
        }
    };
    debug!(project_root = %project_root.display(), "Using project root.");

    let mut agent = match Agent::new(config) {
        Ok(agent) => agent,
        Err(e) => {
            error!("Failed to create agent: {}", e);
            eprintln!("{} Failed to create agent: {}", "Error:".red(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = agent.connect().await {
        error!("Failed to connect to tool servers: {}", e);
        eprintln!("{} Failed to connect to tool servers: {}", "Error:".red(), e);
        return ExitCode::FAILURE;
    }

    let result = match cli.turn {
        Some(prompt) => run_single_turn(&agent, prompt).await,
        None => run_interactive(&agent).await,
    };

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            let error_string = e.to_string();
            let already_handled = error_string.contains("Agent run encountered an error")
                || error_string.contains("Error reading input")
                || matches!(e.downcast_ref::<AgentError>(), Some(_));

            if !already_handled {
                error!("Operation failed: {}", e);
                eprintln!("{} Operation failed: {}", "Error:".red(), e);
            }
            ExitCode::FAILURE
        }
    }
}
