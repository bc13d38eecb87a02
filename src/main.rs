use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use sample_health::config::Config;
use sample_health::detect::PrecheckConfig;
use sample_health::fetch::{CodeFetcher, GithubFetcher};
use sample_health::llm::{OpenRouterClient, TextGenerator};
use sample_health::logging;
use sample_health::pipeline::{HealthScorer, LoopSettings, PrepareOptions, SampleInput};
use sample_health::product::{ProductCatalog, ProductResolver};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "sample-health",
    about = "Score code samples against the documentation rubric",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    run: RunArgs,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level or filter directive (overrides --verbose)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score a local file
    Analyze {
        file: PathBuf,
        /// Where the sample lives; drives language and product detection
        #[arg(long)]
        url: Option<String>,
    },
    /// Download a sample from GitHub and score it
    Fetch { url: String },
}

#[derive(ClapArgs, Debug)]
struct RunArgs {
    /// Maximum analyze/validate round trips
    #[arg(long, global = true)]
    max_loops: Option<u32>,

    /// Validation scores above this are accepted (1-10)
    #[arg(long, global = true)]
    threshold: Option<u8>,

    /// Product catalog TOML
    #[arg(long, global = true)]
    products: Option<PathBuf>,

    /// Never ask the model to classify the product
    #[arg(long, global = true)]
    no_generative_category: bool,

    /// Fail when the sample has no region tags
    #[arg(long, global = true)]
    require_region_tags: bool,

    /// Fail when the language is outside the supported set
    #[arg(long, global = true)]
    restrict_languages: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(max_loops) = self.max_loops {
            config.max_loops = max_loops;
        }
        if let Some(threshold) = self.threshold {
            config.acceptance_threshold = threshold;
        }
        if let Some(products) = self.products.as_ref() {
            config.products_path = Some(products.clone());
        }
        if self.no_generative_category {
            config.allow_generative_category = false;
        }
        config.require_region_tags |= self.require_region_tags;
        config.restrict_languages |= self.restrict_languages;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = logging::init_tracing(cli.verbose, cli.log_level.as_deref(), cli.log_json) {
        eprintln!("  Warning: failed to initialize logging: {}", err);
    }

    let mut config = Config::load();
    config.apply_env();
    cli.run.apply(&mut config);

    let input = match &cli.command {
        Command::Analyze { file, url } => SampleInput {
            code: std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read sample '{}'", file.display()))?,
            provenance_url: url.clone(),
        },
        Command::Fetch { url } => {
            let fetcher = GithubFetcher::new()?;
            SampleInput {
                code: fetcher.fetch(url).await?,
                provenance_url: Some(url.clone()),
            }
        }
    };

    let catalog = match config.products_path.as_ref() {
        Some(path) => ProductCatalog::load(path)?,
        None => ProductCatalog::builtin()?,
    };

    let client = Arc::new(OpenRouterClient::from_config(&config)?);
    let generator: Arc<dyn TextGenerator> = client.clone();
    let resolver = ProductResolver::new(Arc::new(catalog)).with_generator(Arc::clone(&generator));

    let scorer = HealthScorer::new(generator, resolver)
        .with_settings(LoopSettings::new(
            config.effective_max_loops(),
            config.acceptance_threshold,
        ))
        .with_options(PrepareOptions {
            precheck: PrecheckConfig {
                require_region_tags: config.require_region_tags,
                restrict_languages: config.restrict_languages,
            },
            allow_generative_category: config.allow_generative_category,
        });

    let report = scorer.score(input).await?;

    let usage = client.usage();
    tracing::info!(
        calls = client.call_count(),
        total_tokens = usage.total_tokens,
        cost_usd = usage.cost(),
        "generation usage"
    );

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize report")?
    );
    Ok(())
}
