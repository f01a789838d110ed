//! # DataShare CLI Entry Point
//!
//! Main binary for DataShare. Runs the reference provider and drives a
//! running provider from the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Start the in-memory provider
//! datashare serve -b 127.0.0.1:7600
//!
//! # Insert and query rows
//! datashare insert datashare:///com.example/contacts name=Rose age=31
//! datashare query datashare:///com.example/contacts -w name=Rose -c age
//!
//! # Print change notifications until interrupted
//! datashare watch datashare:///com.example/contacts
//!
//! # Publish data and read it back
//! datashare publish datashare:///weather/today 11 sunny --bundle com.example.weather
//! datashare get-published com.example.weather
//! ```
//!
//! Client commands talk to `127.0.0.1:7600` unless `--addr` is given before
//! the subcommand.

use std::sync::Arc;

use anyhow::Result;
use argh::FromArgs;
use datashare_cli::format;
use datashare_client::{DataShareHelper, HelperConfig};
use datashare_common::protocol::{Data, PublishedDataItem, PublishedValue, Uri};
use datashare_server::{ProviderServer, ServerConfig};
use serde_json::json;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// DataShare - share data between processes by URI
struct Cli {
    /// provider address used by client commands
    #[argh(option, short = 'a', default = "\"127.0.0.1:7600\".into()")]
    addr: String,

    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Insert(InsertArgs),
    Update(UpdateArgs),
    Query(QueryArgs),
    Delete(DeleteArgs),
    Notify(NotifyArgs),
    Watch(WatchArgs),
    Publish(PublishArgs),
    GetPublished(GetPublishedArgs),
}

/// Arguments for running the in-memory provider.
///
/// The provider keeps every table and published bundle in memory and pushes
/// change notifications to subscribed callers. It serves until interrupted.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// run the in-memory DataShare provider
struct ServeArgs {
    /// address to bind the provider to
    #[argh(option, short = 'b', default = "\"127.0.0.1:7600\".into()")]
    bind: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "insert")]
/// insert one row
struct InsertArgs {
    /// table URI
    #[argh(positional)]
    uri: String,

    /// column values as key=value
    #[argh(positional)]
    values: Vec<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "update")]
/// update matching rows
struct UpdateArgs {
    /// table URI
    #[argh(positional)]
    uri: String,

    /// column values to set, as key=value
    #[argh(positional)]
    values: Vec<String>,

    /// only rows where key=value holds; may repeat
    #[argh(option, short = 'w', long = "where")]
    filters: Vec<String>,
}

/// Arguments for querying rows.
///
/// Rows are printed as a JSON array of objects, one per row.
#[derive(FromArgs)]
#[argh(subcommand, name = "query")]
/// query rows
struct QueryArgs {
    /// table URI
    #[argh(positional)]
    uri: String,

    /// only rows where key=value holds; may repeat
    #[argh(option, short = 'w', long = "where")]
    filters: Vec<String>,

    /// columns to return; all columns when omitted
    #[argh(option, short = 'c', long = "column")]
    columns: Vec<String>,

    /// column to sort by
    #[argh(option, long = "order-by")]
    order_by: Option<String>,

    /// sort descending
    #[argh(switch)]
    desc: bool,

    /// maximum number of rows
    #[argh(option)]
    limit: Option<i64>,

    /// rows to skip before the first returned one
    #[argh(option, default = "0")]
    offset: i64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "delete")]
/// delete matching rows
struct DeleteArgs {
    /// table URI
    #[argh(positional)]
    uri: String,

    /// only rows where key=value holds; may repeat
    #[argh(option, short = 'w', long = "where")]
    filters: Vec<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "notify")]
/// notify every observer of a URI
struct NotifyArgs {
    /// URI to notify
    #[argh(positional)]
    uri: String,
}

/// Arguments for watching a URI.
///
/// Prints one JSON line per change notification until interrupted.
#[derive(FromArgs)]
#[argh(subcommand, name = "watch")]
/// print change notifications for a URI
struct WatchArgs {
    /// URI to watch
    #[argh(positional)]
    uri: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "publish")]
/// publish one string item
struct PublishArgs {
    /// item key (a URI)
    #[argh(positional)]
    key: String,

    /// subscriber id the item is meant for
    #[argh(positional)]
    subscriber_id: i64,

    /// item value
    #[argh(positional)]
    value: String,

    /// bundle to publish under
    #[argh(option, default = "\"datashare.client\".into()")]
    bundle: String,

    /// data version
    #[argh(option, default = "0")]
    version: i32,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "get-published")]
/// print a bundle's published data
struct GetPublishedArgs {
    /// bundle name
    #[argh(positional)]
    bundle: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // stdout carries results; logs go to stderr. Long-running commands log
    // at INFO, one-shot commands only warn. RUST_LOG overrides both.
    let default_level = if matches!(cli.command, Commands::Serve(_) | Commands::Watch(_)) {
        "info"
    } else {
        "warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Insert(args) => {
            let bucket = format::bucket_from(&args.values)?;
            let helper = connect(&cli.addr, None).await?;
            let row_id = helper.insert(&args.uri, &bucket).await?;
            println!("{}", json!({ "row_id": row_id }));
            Ok(())
        }
        Commands::Update(args) => {
            let bucket = format::bucket_from(&args.values)?;
            let predicates = format::predicates_from(&args.filters)?;
            let helper = connect(&cli.addr, None).await?;
            let changed = helper.update(&args.uri, &predicates, &bucket).await?;
            println!("{}", json!({ "changed": changed }));
            Ok(())
        }
        Commands::Query(args) => run_query(&cli.addr, args).await,
        Commands::Delete(args) => {
            let predicates = format::predicates_from(&args.filters)?;
            let helper = connect(&cli.addr, None).await?;
            let removed = helper.delete(&args.uri, &predicates).await?;
            println!("{}", json!({ "removed": removed }));
            Ok(())
        }
        Commands::Notify(args) => {
            let helper = connect(&cli.addr, None).await?;
            helper.notify_change(&args.uri).await?;
            Ok(())
        }
        Commands::Watch(args) => run_watch(&cli.addr, args).await,
        Commands::Publish(args) => {
            let data = Data {
                items: vec![PublishedDataItem::new(args.key, args.subscriber_id, PublishedValue::String(args.value))],
                version: args.version,
            };
            let helper = connect(&cli.addr, Some(args.bundle)).await?;
            let results = helper.publish(&data).await?;
            println!("{}", format::results_json(&results)?);
            Ok(())
        }
        Commands::GetPublished(args) => {
            let helper = connect(&cli.addr, None).await?;
            let data = helper.get_published_data(&args.bundle).await?;
            println!("{}", serde_json::to_string(&data)?);
            Ok(())
        }
    }
}

async fn connect(addr: &str, bundle_name: Option<String>) -> Result<DataShareHelper> {
    let mut config = HelperConfig::default();
    if let Some(bundle_name) = bundle_name {
        config.bundle_name = bundle_name;
    }
    Ok(DataShareHelper::connect(addr, config).await?)
}

/// Runs the in-memory provider until Ctrl-C.
async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = ServerConfig { bind_addr: args.bind };
    let server = ProviderServer::in_memory(&config).await?;
    tracing::info!(addr = %server.local_addr()?, "DataShare provider ready");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
            }
        })
        .await?;
    tracing::info!("provider stopped");
    Ok(())
}

async fn run_query(addr: &str, args: QueryArgs) -> Result<()> {
    let mut predicates = format::predicates_from(&args.filters)?;
    if let Some(field) = &args.order_by {
        predicates = if args.desc {
            predicates.order_by_desc(field)
        } else {
            predicates.order_by_asc(field)
        };
    }
    if let Some(limit) = args.limit {
        predicates = predicates.limit(limit, args.offset);
    }
    let columns: Vec<&str> = args.columns.iter().map(String::as_str).collect();

    let helper = connect(addr, None).await?;
    let result = helper.query(&args.uri, &predicates, &columns).await?;
    println!("{}", format::rows_json(&result)?);
    Ok(())
}

/// Prints a JSON line per change of `uri` until Ctrl-C.
async fn run_watch(addr: &str, args: WatchArgs) -> Result<()> {
    let helper = connect(addr, None).await?;
    helper
        .on(&args.uri, Arc::new(|uri: &Uri| println!("{}", json!({ "changed": uri.as_str() }))))
        .await?;
    tracing::info!(uri = %args.uri, endpoint = helper.observer_endpoint(), "watching");

    tokio::signal::ctrl_c().await?;
    helper.off(&args.uri).await?;
    Ok(())
}
