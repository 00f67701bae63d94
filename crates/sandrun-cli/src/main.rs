//! Sandrun CLI
//!
//! Runs code snippets in sandboxes from the command line, or serves the
//! runner over HTTP.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sandrun::{Config, EXAMPLE_CONFIG, ExecutionRequest, ExecutionResult, LanguageRegistry, Runner};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

mod server;

#[derive(Parser)]
#[command(name = "sandrun")]
#[command(about = "Run code snippets in throwaway sandboxes")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "sandrun.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a program (compile if needed, then execute)
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language (e.g., python, js, cpp)
        #[arg(short, long)]
        language: String,

        /// File piped to the program's standard input
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List available languages
    Languages,

    /// Print a language's starter code
    Template {
        /// Language (e.g., python, js, cpp)
        language: String,
    },

    /// Show the effective configuration
    ShowConfig,

    /// Serve the runner over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Init { output, force } = &cli.command {
        return init_config(output, *force).await;
    }

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::from_env().context("failed to load configuration")?
    };

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Run {
            source,
            language,
            input,
            json,
        } => run(config, &source, &language, input.as_deref(), json).await,
        Commands::Languages => list_languages(config),
        Commands::Template { language } => {
            let registry = LanguageRegistry::from_config(&config)
                .context("invalid language configuration")?;
            print!("{}", registry.template(&language)?);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
        Commands::Serve { addr } => {
            let runner = Runner::new(config).context("failed to start runner")?;
            server::serve(runner, addr).await
        }
    }
}

async fn run(
    config: Config,
    source: &Path,
    language: &str,
    input: Option<&Path>,
    json: bool,
) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("failed to read source file '{}'", source.display()))?;

    let stdin = match input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read input file '{}'", path.display()))?,
        None => String::new(),
    };

    let runner = Runner::new(config).context("failed to start runner")?;
    let result = runner
        .execute(ExecutionRequest::new(code, language).with_stdin(stdin))
        .await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("failed to encode result")?
        );
    } else {
        print_result(&result);
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn print_result(result: &ExecutionResult) {
    // Program output goes to stdout untouched so it can be piped
    print!("{}", result.output);

    if !result.error.is_empty() {
        eprintln!("{}", result.error.trim_end());
    }
    if let Some(ref explanation) = result.explanation {
        eprintln!("\nHint: {}", explanation.quick_hint);
        if let Some(ref detailed) = explanation.detailed {
            eprintln!("\n{}", detailed.explanation);
            for (label, text) in [
                ("Where", &detailed.problem_location),
                ("Fix", &detailed.fix),
                ("Tip", &detailed.tip),
            ] {
                if !text.is_empty() {
                    eprintln!("{label}: {text}");
                }
            }
        }
    }

    info!(
        status = ?result.status,
        time = format_args!("{:.3}s", result.execution_time),
        "execution result"
    );
}

fn list_languages(config: Config) -> Result<()> {
    let registry = LanguageRegistry::from_config(&config)
        .context("invalid language configuration")?;

    println!("Available languages:\n");
    for language in registry.list() {
        let kind = if language.compiled {
            "compiled"
        } else {
            "interpreted"
        };
        println!(
            "  {:<12} {} {} ({})",
            language.id.as_str(),
            language.name,
            language.version,
            kind
        );
    }
    Ok(())
}

fn show_config(config: &Config) {
    println!("Backend: {:?}", config.backend);
    println!("Local fallback: {}", config.allow_local_fallback);
    println!("Max concurrent executions: {}", config.max_concurrent);
    println!("Queue timeout: {:?}", config.queue_timeout());
    println!("Workspace root: {}", config.workspace_root().display());
    println!("Output cap per stream: {} bytes", config.max_output_bytes);
    println!();
    println!(
        "Explainer: {} ({}, key from ${})",
        if config.explainer.enabled {
            "enabled"
        } else {
            "disabled"
        },
        config.explainer.model,
        config.explainer.api_key_env
    );
    println!();

    let mut languages: Vec<_> = config.languages.iter().collect();
    languages.sort_by_key(|(id, _)| *id);
    println!("Languages configured: {}", languages.len());
    for (id, profile) in languages {
        println!(
            "  {:<12} image={} timeout={}s memory={}",
            id, profile.image, profile.timeout_seconds, profile.memory_limit
        );
    }
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
