use anyhow::bail;
use clap::{Parser, ValueEnum};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::serde_json;
use kube::ResourceExt;
use std::time::Duration;
use storage_informers::k8s::informers::config::DEFAULT_RESYNC_SECONDS;
use storage_informers::k8s::informers::core::{PV_STORAGE_CLASS_INDEX, pv_storage_class_index};
use storage_informers::k8s::informers::{EventHandlerFns, Indexers, SharedInformerFactory};
use storage_informers::k8s::{USER_AGENT, client};
use storage_informers::report::{format_table, storage_class_usage};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Output {
    Table,
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Resync period in seconds, 0 disables resync
    #[arg(short, long, default_value_t = DEFAULT_RESYNC_SECONDS)]
    resync: u64,

    /// Only count persistent volume claims in this namespace
    #[arg(short, long)]
    namespace: Option<String>,

    /// Label selector applied to every list and watch
    #[arg(short = 'l', long)]
    selector: Option<String>,

    #[arg(short, long, value_enum, default_value_t = Output::Table)]
    output: Output,

    /// Keep running and log storage class changes until Ctrl-C
    #[arg(short, long)]
    watch: bool,
}

fn storage_class_logger() -> EventHandlerFns<StorageClass> {
    EventHandlerFns::<StorageClass>::new()
        .with_add(|sc| info!("➕ StorageClass added: {} ({})", sc.name_any(), sc.provisioner))
        .with_update(|old, new| {
            if old.resource_version() != new.resource_version() {
                info!("📝 StorageClass modified: {}", new.name_any());
            }
        })
        .with_delete(|sc| info!("🗑️  StorageClass deleted: {}", sc.name_any()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let args = Args::parse();
    let client = client::new(Some(USER_AGENT)).await?;

    let mut builder =
        SharedInformerFactory::builder(client).default_resync(Duration::from_secs(args.resync));
    if let Some(ns) = &args.namespace {
        builder = builder.namespace(ns);
    }
    if let Some(selector) = &args.selector {
        builder = builder.label_selector(selector);
    }
    let factory = builder.build();

    let classes = factory.storage().v1().storage_classes();
    let volumes = factory.core().v1().persistent_volumes();
    let claims = factory.core().v1().persistent_volume_claims();

    volumes
        .informer()
        .add_indexers(Indexers::new().with(PV_STORAGE_CLASS_INDEX, pv_storage_class_index))?;
    // claims are only read through the lister, but must be registered before start
    let _ = claims.informer();
    let class_informer = classes.informer();
    if args.watch {
        class_informer.add_event_handler(storage_class_logger());
    }

    factory.start();
    let synced = factory.wait_for_cache_sync().await;
    if let Some((key, _)) = synced.iter().find(|(_, ok)| !**ok) {
        factory.shutdown().await;
        bail!("informer for {key} failed to sync");
    }

    let rows = storage_class_usage(&classes.lister(), &volumes.lister(), &claims.lister())?;
    match args.output {
        Output::Table => print!("{}", format_table(&rows)),
        Output::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
    }

    if args.watch {
        info!("👀 Watching storage classes, Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
    }

    factory.shutdown().await;
    Ok(())
}
