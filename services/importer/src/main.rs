//! Importer Service - Loads one statistical subject into the warehouse
//!
//! Responsibilities:
//! - Validate the metadata and data files before touching the database
//! - Import filters and indicators declared in the metadata
//! - Resolve locations, schools and filter items (find or create)
//! - Commit observations in fixed-size batches
//! - Record the attempt in import_runs

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ees_importer::model::Subject;
use ees_importer::{
    EntityStore, ImportConfig, ImportSummary, ImporterService, MemoryStore, PgStore,
};

#[derive(Parser, Debug)]
#[command(name = "importer", about = "Imports a statistical subject from CSV")]
struct Args {
    /// Subject id (UUID); a new one is generated when omitted
    #[arg(long)]
    subject_id: Option<String>,

    /// Subject name used in logs and stored on the subject row
    #[arg(long)]
    subject_name: String,

    /// Metadata CSV path
    #[arg(long)]
    meta: PathBuf,

    /// Data CSV path
    #[arg(long)]
    data: PathBuf,

    /// Release the subject belongs to (UUID)
    #[arg(long)]
    release_id: Option<String>,

    /// Dry run - import into memory, don't touch the database
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Observations per committed batch (overrides IMPORT_BATCH_SIZE)
    #[arg(long)]
    batch_size: Option<usize>,
}

fn parse_uuid(raw: Option<&str>, what: &str) -> Result<Option<Uuid>> {
    raw.map(|value| {
        value
            .parse()
            .with_context(|| format!("Invalid {what} UUID: {value}"))
    })
    .transpose()
}

async fn import<S: EntityStore>(
    store: &S,
    config: ImportConfig,
    subject: &Subject,
    meta: &str,
    data: &str,
) -> Result<ImportSummary> {
    ImporterService::new(store, config)
        .import_subject(subject, meta, data)
        .await
        .with_context(|| format!("Import of subject {} failed", subject.id))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("importer=info,ees_importer=info")),
        )
        .init();

    let args = Args::parse();
    let mut config = ImportConfig::from_env();
    if let Some(batch_size) = args.batch_size {
        config = config.with_batch_size(batch_size);
    }

    let subject = Subject {
        id: parse_uuid(args.subject_id.as_deref(), "subject_id")?.unwrap_or_else(Uuid::new_v4),
        release_id: parse_uuid(args.release_id.as_deref(), "release_id")?,
        name: args.subject_name.clone(),
    };

    info!(
        subject_id = %subject.id,
        subject = %subject.name,
        mode = if args.dry_run { "dry-run" } else { "live" },
        batch_size = config.batch_size,
        geography = ?config.geography_mode,
        "starting importer"
    );

    let meta = fs::read_to_string(&args.meta)
        .await
        .with_context(|| format!("Failed to read metadata file {}", args.meta.display()))?;
    let data = fs::read_to_string(&args.data)
        .await
        .with_context(|| format!("Failed to read data file {}", args.data.display()))?;
    info!(meta_bytes = meta.len(), data_bytes = data.len(), "read input files");

    let summary = if args.dry_run {
        let store = MemoryStore::new();
        let summary = import(&store, config, &subject, &meta, &data).await?;
        info!("dry run - nothing saved to database");
        summary
    } else {
        let db_url = std::env::var("DB_URL").context("DB_URL env var missing")?;
        let store = PgStore::connect(&db_url, 5)
            .await
            .context("Failed to connect to database")?;
        store
            .ensure_schema()
            .await
            .context("Failed to apply schema")?;
        import(&store, config, &subject, &meta, &data).await?
    };

    info!(
        subject_id = %subject.id,
        rows = summary.rows,
        batches = summary.batches,
        observations = summary.observations,
        locations = summary.locations,
        schools = summary.schools,
        filter_items = summary.filter_items,
        "import finished"
    );
    Ok(())
}
