use anyhow::{Context, Result, bail};
use clap::Parser;
use liquid_loader::LoaderOptions;
use liquid_loader::models::options::DEFAULT_EXTNAME;
use liquid_loader::pages;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

/// Renders every Liquid page in a directory to HTML.
#[derive(Parser, Debug)]
#[command(name = "liquid-loader", version, about)]
struct Args {
    /// Directory holding the pages to build.
    #[arg(long, default_value = "src/pages")]
    pages: PathBuf,

    /// Prefix prepended to include names, usually a directory with a trailing slash.
    #[arg(long, default_value = "src/pages/partials/")]
    partials: String,

    /// JSON file used as the render context.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Output directory.
    #[arg(long, default_value = "dist")]
    out: PathBuf,

    #[arg(long, default_value = DEFAULT_EXTNAME)]
    extname: String,

    /// Track partial dependencies and print them after the build.
    #[arg(long)]
    dev: bool,

    /// Fail on undefined variables and filters.
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let mut options = LoaderOptions::new()
        .root(args.partials)
        .extname(args.extname)
        .dev(args.dev)
        .strict_variables(args.strict)
        .strict_filters(args.strict);
    if let Some(data) = &args.data {
        options = options
            .data_file(data)
            .with_context(|| format!("failed to load data from {}", data.display()))?;
    }

    let report = pages::build_pages(&args.pages, Arc::new(options)).await?;
    let written = report.write_pages(&args.out).await?;
    info!("wrote {} pages to {}", written, args.out.display());

    if args.dev {
        for resource in report.registry.resources() {
            for dep in report.registry.dependencies(&resource) {
                info!("{} -> {}", resource, dep.display());
            }
        }
    }

    let failed = report.failures().count();
    if failed > 0 {
        bail!("{} of {} pages failed", failed, report.pages.len());
    }
    Ok(())
}
