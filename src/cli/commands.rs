//! CLI commands implementation.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Settings;
use crate::dispatch::Dispatcher;
use crate::export::{self, ExportRow};
use crate::providers::ProviderKind;
use crate::server;

#[derive(Parser)]
#[command(name = "cardscan")]
#[command(about = "Business card OCR extraction via hosted vision models")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Start the extraction API server
    Serve {
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value = "5000")]
        port: u16,
    },

    /// Extract card data from one or more image files
    Extract {
        /// Image files to process
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Preferred provider (auto, nvidia, mistral, gemini)
        #[arg(short, long, default_value = "auto")]
        model: String,
        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,
        /// Write output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show configured providers and their availability
    Providers,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::Serve { host, port } => cmd_serve(&settings, &host, port).await,
        Commands::Extract {
            images,
            model,
            format,
            output,
        } => cmd_extract(&settings, &images, &model, format, output.as_deref()).await,
        Commands::Providers => cmd_providers(&settings),
    }
}

async fn cmd_serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    println!(
        "{} Starting server on {}:{}",
        style("→").cyan(),
        host,
        port
    );
    server::serve(settings, host, port).await
}

async fn cmd_extract(
    settings: &Settings,
    images: &[PathBuf],
    model: &str,
    format: OutputFormat,
    output: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let dispatcher = Dispatcher::from_settings(settings)?;
    if !dispatcher.has_providers() {
        anyhow::bail!("no providers configured; set NVIDIA_API_KEY, MISTRAL_API_KEY or GEMINI_API_KEY");
    }

    let pb = if images.len() > 1 {
        let pb = ProgressBar::new(images.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
                .unwrap()
                .progress_chars("█▓░"),
        );
        Some(pb)
    } else {
        None
    };

    let mut rows = Vec::with_capacity(images.len());
    let mut failures = 0usize;

    for image in images {
        let filename = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| image.display().to_string());

        if let Some(pb) = &pb {
            pb.set_message(filename.clone());
        }

        if !image.exists() {
            anyhow::bail!("image not found: {}", image.display());
        }

        let result = dispatcher.extract_one(image, model).await;
        if !result.is_success() {
            failures += 1;
        }

        rows.push(ExportRow {
            success: result.is_success(),
            data: result.record,
            model_used: result.provider,
            filename,
        });

        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&rows)?,
        OutputFormat::Csv => export::to_csv_string(&rows)?,
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            println!(
                "{} Wrote {} results to {}",
                style("✓").green(),
                rows.len(),
                path.display()
            );
        }
        None => println!("{}", rendered),
    }

    if failures > 0 {
        eprintln!(
            "{} {} of {} images failed",
            style("✗").red(),
            failures,
            rows.len()
        );
    }

    Ok(())
}

fn cmd_providers(settings: &Settings) -> anyhow::Result<()> {
    println!("Configured provider order:");
    for kind in &settings.provider_order {
        let configured = match kind {
            ProviderKind::Nvidia => settings.nvidia_api_key.is_some(),
            ProviderKind::Mistral => settings.mistral_api_key.is_some(),
            ProviderKind::Gemini => settings.gemini_api_key.is_some(),
        };
        if configured {
            println!("  {} {}", style("✓").green(), kind);
        } else {
            println!("  {} {} (API key not set)", style("✗").red(), kind);
        }
    }
    Ok(())
}
