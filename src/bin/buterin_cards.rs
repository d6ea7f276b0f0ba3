use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use buterin_cards::app::{
    App, ExportSource, FetchOptions, FetchSummary, InspectResult, ProgressSink, RebuildSummary,
    TracingProgress,
};
use buterin_cards::config::{ConfigLoader, ResolvedConfig, load_dotenv, rpc_endpoint};
use buterin_cards::domain::{ContractAddress, TokenRange};
use buterin_cards::error::CardsError;
use buterin_cards::export::ExportSummary;
use buterin_cards::metadata::TokenEntry;
use buterin_cards::output::{BarProgress, JsonOutput, OutputMode};
use buterin_cards::rpc::{EthRpcClient, NoRpc};
use buterin_cards::store::Store;

#[derive(Parser)]
#[command(name = "buterin-cards")]
#[command(about = "Harvest Buterin Cards token metadata and export the quote mapping")]
#[command(version, author)]
struct Cli {
    /// Print results as JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,

    /// JSON config file (defaults to ./buterin-cards.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    contract: Option<ContractAddress>,

    #[arg(long, global = true)]
    results_file: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    mapping_file: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    csv_file: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch token metadata, resuming from the results checkpoint")]
    Fetch(FetchArgs),
    #[command(about = "Rebuild the quote mapping from the results file")]
    Rebuild,
    #[command(about = "Export the quote mapping to CSV")]
    Export(ExportArgs),
    #[command(about = "Fetch and decode a few tokens without writing anything")]
    Inspect(InspectArgs),
}

#[derive(Args)]
struct FetchArgs {
    /// Token range: N, MIN-MAX, MIN..=MAX or MIN..END
    #[arg(long, conflicts_with_all = ["min", "max"])]
    range: Option<TokenRange>,

    #[arg(long)]
    min: Option<u64>,

    #[arg(long)]
    max: Option<u64>,

    #[arg(long)]
    batch_size: Option<u64>,

    /// Pause before every RPC call, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Skip token 0 when it already has a good entry
    #[arg(long)]
    no_refresh_zero: bool,

    /// Rebuild the quote mapping from the results file afterwards
    #[arg(long)]
    rebuild: bool,
}

#[derive(Args)]
struct ExportArgs {
    /// Derive the mapping from the results file instead of the mapping file
    #[arg(long)]
    from_results: bool,
}

#[derive(Args)]
struct InspectArgs {
    #[arg(default_values_t = [1u64, 2, 3, 10, 100])]
    token_ids: Vec<u64>,

    #[arg(long)]
    delay_ms: Option<u64>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<CardsError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CardsError) -> u8 {
    match error {
        CardsError::MissingEndpoint
        | CardsError::ConfigRead(_)
        | CardsError::ConfigParse(_)
        | CardsError::InvalidContractAddress(_)
        | CardsError::InvalidRange(_)
        | CardsError::InvalidBatchSize(_) => 2,
        CardsError::RpcHttp(_) | CardsError::RpcStatus { .. } | CardsError::RpcCall(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    load_dotenv();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(contract) = cli.contract {
        config.contract = contract;
    }
    if let Some(path) = cli.results_file {
        config.results_file = path;
    }
    if let Some(path) = cli.mapping_file {
        config.mapping_file = path;
    }
    if let Some(path) = cli.csv_file {
        config.csv_file = path;
    }
    let store = Store::new(&config);

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, config, store, output_mode),
        Commands::Rebuild => {
            let app = App::new(store, NoRpc);
            let result = app.rebuild_mapping(sink_for(output_mode).as_ref())?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_rebuild(&result).into_diagnostic(),
                OutputMode::Human => {
                    print_rebuild_summary(&result);
                    Ok(())
                }
            }
        }
        Commands::Export(args) => {
            let app = App::new(store, NoRpc);
            let source = if args.from_results {
                ExportSource::Results
            } else {
                ExportSource::Mapping
            };
            let result = app.export_csv(source, sink_for(output_mode).as_ref())?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_export(&result).into_diagnostic(),
                OutputMode::Human => {
                    print_export_summary(&result);
                    Ok(())
                }
            }
        }
        Commands::Inspect(args) => {
            let client = EthRpcClient::new(rpc_endpoint()?, config.contract.clone())?;
            let app = App::new(store, client);
            let delay = args
                .delay_ms
                .map(std::time::Duration::from_millis)
                .unwrap_or(config.delay);
            let result = app.inspect(&args.token_ids, delay);
            match output_mode {
                OutputMode::Json => JsonOutput::print_inspect(&result).into_diagnostic(),
                OutputMode::Human => {
                    print_inspect(&result);
                    Ok(())
                }
            }
        }
    }
}

fn run_fetch(
    args: FetchArgs,
    mut config: ResolvedConfig,
    store: Store,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let range = match args.range {
        Some(range) => range,
        None => TokenRange::new(
            args.min.unwrap_or(config.range.min()),
            args.max.unwrap_or(config.range.max()),
        )?,
    };
    if let Some(batch_size) = args.batch_size {
        config.batch_size = buterin_cards::config::validate_batch_size(batch_size)?;
    }
    if let Some(delay_ms) = args.delay_ms {
        config.delay = std::time::Duration::from_millis(delay_ms);
    }
    if args.no_refresh_zero {
        config.refresh_token_zero = false;
    }

    let endpoint = rpc_endpoint()?;
    let client = EthRpcClient::new(endpoint, config.contract.clone())?;
    tracing::info!(contract = %client.contract(), %range, "starting fetch");
    let app = App::new(store, client);
    let sink: Box<dyn ProgressSink> = match output_mode {
        OutputMode::Json => Box::new(JsonOutput),
        OutputMode::Human => Box::new(BarProgress::new()),
    };

    let result = app.fetch_range(range, &FetchOptions::from_config(&config), sink.as_ref())?;
    let rebuilt = if args.rebuild {
        Some(app.rebuild_mapping(sink.as_ref())?)
    } else {
        None
    };

    match output_mode {
        OutputMode::Json => {
            JsonOutput::print_fetch(&result).into_diagnostic()?;
            if let Some(rebuilt) = &rebuilt {
                JsonOutput::print_rebuild(rebuilt).into_diagnostic()?;
            }
            Ok(())
        }
        OutputMode::Human => {
            print_fetch_summary(&result);
            if let Some(rebuilt) = &rebuilt {
                print_rebuild_summary(rebuilt);
            }
            Ok(())
        }
    }
}

fn sink_for(output_mode: OutputMode) -> Box<dyn ProgressSink> {
    match output_mode {
        OutputMode::Json => Box::new(JsonOutput),
        OutputMode::Human => Box::new(TracingProgress),
    }
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

fn print_fetch_summary(result: &FetchSummary) {
    println!("{CYAN}Buterin Cards fetch {}{RESET}", result.range);
    println!(
        "{GREEN}fetched {} tokens ({} ok), skipped {} already checkpointed{RESET}",
        result.processed, result.succeeded, result.skipped
    );
    if result.failed > 0 {
        println!("{RED}failed: {}{RESET}", result.failed);
    }
    println!(
        "{YELLOW}new quotes: {}, quotes total: {}{RESET}",
        result.new_quotes, result.quotes_total
    );
    println!("   results: {} ({} entries)", result.results_path, result.results_total);
    println!("   mapping: {}", result.mapping_path);
}

fn print_rebuild_summary(result: &RebuildSummary) {
    println!(
        "{CYAN}Built quote mapping with {} unique quotes from {} records{RESET}",
        result.quotes, result.records
    );
    if !result.sample.is_empty() {
        println!("Sample of the mapping (first {} quotes):", result.sample.len());
        for sample in &result.sample {
            println!("- {}: {} tokens", sample.quote, sample.tokens);
        }
    }
    println!("   mapping: {}", result.mapping_path);
}

fn print_export_summary(result: &ExportSummary) {
    println!(
        "{GREEN}Exported {} quote mappings to {}{RESET}",
        result.rows, result.path
    );
    println!("Number of unique quotes: {}", result.quotes);
    println!("Total token mappings: {}", result.rows);
}

fn print_inspect(result: &InspectResult) {
    for item in &result.items {
        println!("{CYAN}=== Token ID: {} ==={RESET}", item.token_id);
        if let Some(preview) = &item.uri_preview {
            println!("Raw tokenURI: {preview}");
        }
        match &item.entry {
            TokenEntry::Metadata(record) => {
                println!("Name: {}", record.name);
                println!("Description: {}", record.description);
                if !record.attributes.is_empty() {
                    println!("Attributes:");
                    for (name, value) in &record.attributes {
                        match value.as_str() {
                            Some(text) => println!("- {name}: {text}"),
                            None => println!("- {name}: {value}"),
                        }
                    }
                }
                if !record.image.is_empty() {
                    println!("Image URL: {}", record.image);
                }
            }
            TokenEntry::Svg(svg) => {
                println!("Name: {}", svg.name);
                println!("SVG: {}", svg.data);
            }
            TokenEntry::Failed(failure) => {
                println!("{RED}Error: {}{RESET}", failure.error);
                if let Some(preview) = &failure.preview {
                    println!("Preview: {preview}");
                }
            }
        }
        println!();
    }
}
