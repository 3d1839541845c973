use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nexus_resolver::config::{find_config_file, load_config, Config};
use nexus_resolver::gateway::{build_document_url, GatewayProbe};
use nexus_resolver::host::{FileSink, LogReporter};
use nexus_resolver::resolvers::{parse_resolver_blob, ResolverSpec, UnpaywallLookup};
use nexus_resolver::utils::HttpClient;
use nexus_resolver::{doi, MemoryRecord, Record, ResolverEngine, ResolverMethods};

/// Nexus Resolver - locate and download scholarly PDFs by DOI
#[derive(Parser, Debug)]
#[command(name = "nexus-resolver")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Locate and download scholarly PDFs by DOI", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times: -v, -vv, -vvv)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Batch concurrency policy
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Concurrency {
    /// Probe the local gateway and decide
    Auto,
    /// One record at a time, rate limited
    Sequential,
    /// All records at once
    Parallel,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve DOIs and download the documents they lead to
    Resolve {
        /// DOIs to resolve
        dois: Vec<String>,

        /// File with one DOI per line (lines starting with '#' are skipped)
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Strategy groups to use (comma separated: doi,url,oa,custom)
        #[arg(long)]
        methods: Option<String>,

        /// Run as an unattended batch: only resolvers that opted into
        /// automatic processing participate
        #[arg(long)]
        automatic: bool,

        /// Batch concurrency policy
        #[arg(long, value_enum, default_value_t = Concurrency::Auto)]
        concurrency: Concurrency,

        /// Download directory (defaults to the configured one)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Print the archive document URL for a DOI
    Url {
        doi: String,

        /// Use the local gateway instead of the public one
        #[arg(long)]
        local: bool,
    },

    /// Check whether the local gateway is reachable
    Probe,

    /// Validate the configured custom resolvers and print diagnostics
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(format!("nexus_resolver={filter}"))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match cli.config.clone().or_else(find_config_file) {
        Some(path) => {
            tracing::info!("using config file: {}", path.display());
            load_config(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))?
        }
        None => Config::default(),
    };

    match cli.command {
        Commands::Resolve {
            dois,
            input,
            methods,
            automatic,
            concurrency,
            output,
        } => {
            resolve_command(config, dois, input, methods, automatic, concurrency, output).await
        }
        Commands::Url { doi, local } => url_command(&config, &doi, local),
        Commands::Probe => probe_command(&config).await,
        Commands::CheckConfig => check_config_command(&config),
    }
}

async fn resolve_command(
    mut config: Config,
    dois: Vec<String>,
    input: Option<PathBuf>,
    methods: Option<String>,
    automatic: bool,
    concurrency: Concurrency,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut records: Vec<Arc<dyn Record>> = Vec::new();
    for doi in &dois {
        records.push(Arc::new(MemoryRecord::from_doi(doi.clone())));
    }
    if let Some(path) = input {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            records.push(Arc::new(MemoryRecord::from_doi(line)));
        }
    }

    if records.is_empty() {
        anyhow::bail!("no DOIs given; pass them as arguments or via --input");
    }

    if let Some(output) = output {
        config.downloads.default_path = output;
    }

    let methods = match methods.as_deref() {
        Some(list) => parse_methods(list)?,
        None => ResolverMethods::default(),
    };

    let http = HttpClient::new().context("failed to create HTTP client")?;
    let engine = ResolverEngine::new(
        http.clone(),
        config.clone(),
        Arc::new(UnpaywallLookup::new(http.clone())),
        Arc::new(FileSink::new(http, config.downloads.default_path.clone())),
        Arc::new(LogReporter),
    );

    let report = match concurrency {
        Concurrency::Auto => engine.update_records(&records, methods, automatic).await,
        Concurrency::Sequential => {
            engine
                .update_records_with_policy(&records, methods, automatic, false)
                .await
        }
        Concurrency::Parallel => {
            engine
                .update_records_with_policy(&records, methods, automatic, true)
                .await
        }
    };

    println!(
        "{} attached, {} failed, {} without identifier, {} skipped",
        report.attached, report.failed, report.missing_identifier, report.skipped
    );

    if report.attached < report.total() - report.skipped {
        std::process::exit(1);
    }
    Ok(())
}

fn parse_methods(list: &str) -> Result<ResolverMethods> {
    let mut methods = ResolverMethods::empty();
    for part in list.split(',') {
        match part.trim().to_lowercase().as_str() {
            "doi" => methods |= ResolverMethods::DOI,
            "url" => methods |= ResolverMethods::URL,
            "oa" => methods |= ResolverMethods::OA,
            "custom" => methods |= ResolverMethods::CUSTOM,
            other => anyhow::bail!("unknown method group '{other}'"),
        }
    }
    Ok(methods)
}

fn url_command(config: &Config, raw: &str, local: bool) -> Result<()> {
    let doi = doi::clean_doi(raw).unwrap_or_else(|| raw.trim().to_string());
    let url = build_document_url(&doi, config.gateway.base(local))
        .context("could not build a document URL for this DOI")?;
    println!("{url}");
    Ok(())
}

async fn probe_command(config: &Config) -> Result<()> {
    let http = HttpClient::new().context("failed to create HTTP client")?;
    let probe = GatewayProbe::new(http, &config.gateway);
    if probe.probe().await {
        println!("local gateway reachable");
    } else {
        println!("local gateway not reachable");
        std::process::exit(1);
    }
    Ok(())
}

fn check_config_command(config: &Config) -> Result<()> {
    let Some(blob) = config.resolvers.as_deref() else {
        println!("no custom resolvers configured");
        return Ok(());
    };

    let raw_specs = parse_resolver_blob(blob);
    if raw_specs.is_empty() {
        println!("no usable custom resolvers in configuration");
        return Ok(());
    }

    let mut rejected = 0;
    for raw in &raw_specs {
        let label = raw.name.as_deref().unwrap_or("<unnamed>");
        match ResolverSpec::validate(raw) {
            Ok(spec) => {
                println!("ok      {} ({} {})", spec.name, spec.method, spec.url_template);
            }
            Err(reason) => {
                rejected += 1;
                println!("reject  {label}: {reason}");
            }
        }
    }

    println!(
        "{} usable, {} rejected",
        raw_specs.len() - rejected,
        rejected
    );
    Ok(())
}
