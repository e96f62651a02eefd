use clap::{Parser, Subcommand};
use std::sync::Arc;

use vast_resolver::remote;
use vast_resolver::{
    HttpLoader, ResolutionSession, ResolvedAd, SelectionCriteria, DEFAULT_FOLLOW_BUDGET,
    DEFAULT_TIMEOUT_MS,
};

/// VAST ad document resolver
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve an ad document, following its wrapper chain
    Resolve {
        /// Path, file:// URL, or http(s) URL of the ad document
        #[arg(short, long)]
        input: String,

        /// Maximum number of wrapper hops
        #[arg(long, default_value_t = DEFAULT_FOLLOW_BUDGET)]
        follow_budget: u32,

        /// Per-fetch timeout in milliseconds
        #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
        timeout_ms: u64,

        /// Pretty print the output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Resolve an ad document and choose the best rendition for a viewport
    Choose {
        /// Path, file:// URL, or http(s) URL of the ad document
        #[arg(short, long)]
        input: String,

        /// Viewport width in pixels
        #[arg(long, default_value_t = 800)]
        width: u32,

        /// Viewport height in pixels
        #[arg(long, default_value_t = 600)]
        height: u32,

        /// Bandwidth ceiling in kbps (defaults to the measured estimate)
        #[arg(long)]
        bandwidth: Option<f64>,

        /// Acceptable MIME types, repeatable
        #[arg(long = "mime-type")]
        mime_types: Option<Vec<String>>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Resolve {
            input,
            follow_budget,
            timeout_ms,
            pretty,
        } => {
            let resolved = resolve_input(input, *follow_budget, *timeout_ms).await?;

            if *pretty {
                println!("{:#?}", resolved.document());
            } else {
                println!("{:?}", resolved.document());
            }
            println!(
                "bandwidth estimate: {:.1} kbps",
                resolved.bandwidth_estimate_kbs()
            );
        }
        Commands::Choose {
            input,
            width,
            height,
            bandwidth,
            mime_types,
        } => {
            let resolved = resolve_input(input, DEFAULT_FOLLOW_BUDGET, DEFAULT_TIMEOUT_MS).await?;

            let criteria = SelectionCriteria {
                viewport_width: *width,
                viewport_height: *height,
                bandwidth_ceiling_kbs: *bandwidth,
                supported_mime_types: mime_types.clone(),
            };

            let best = resolved.best_media_file(&criteria)?;
            println!("{best:#?}");
        }
    }

    Ok(())
}

/// Load the starting document from a file or URL, then resolve it
async fn resolve_input(
    input: &str,
    follow_budget: u32,
    timeout_ms: u64,
) -> Result<ResolvedAd, Box<dyn std::error::Error>> {
    let content = remote::load_source(input).await?;

    let loader = HttpLoader::new()?;
    let resolved = ResolutionSession::new(Arc::new(loader))
        .with_follow_budget(follow_budget)
        .with_timeout_ms(timeout_ms)
        .resolve(&content)
        .await?;

    Ok(resolved)
}
