use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serialfield::{
    FieldDescriptor, InMemoryBackend, InstanceDescriptor, ManagedField, SerialConfig, SerialFields,
};
use std::path::{Path, PathBuf};

const DEFAULT_SNAPSHOT: &str = "serial.snapshot";

#[derive(Parser)]
#[command(name = "serial-tool")]
#[command(about = "Inspect and maintain serial counter tables in a snapshot file")]
struct Cli {
    /// Storage snapshot to operate on. Overrides `snapshot_path` from
    /// --config; `serial.snapshot` when neither is given
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// JSON configuration file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct FieldArgs {
    #[arg(long)]
    entity_type: String,
    #[arg(long)]
    bundle: String,
    #[arg(long)]
    field: String,
}

impl FieldArgs {
    fn managed_field(&self) -> ManagedField {
        ManagedField::new(&self.entity_type, &self.bundle, &self.field)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the counter table name for a field
    Resolve(FieldArgs),
    /// Create the counter table for a field
    Create(FieldArgs),
    /// Allocate serial values
    Allocate {
        #[command(flatten)]
        field: FieldArgs,
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// List counter tables
    Tables,
    /// Delete every row below the latest one
    Compact(FieldArgs),
    /// Drop the counter table for a field
    Drop(FieldArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref(), cli.snapshot.clone())?;
    let snapshot = config.snapshot_path.clone().unwrap_or_default();

    let backend = InMemoryBackend::open(&config)
        .with_context(|| format!("Failed to open snapshot '{}'", snapshot.display()))?;
    let hooks = backend.serial_fields(config)?;

    let mutated = run(&cli.command, &backend, &hooks).await?;
    if mutated {
        hooks.checkpoint().await.context("Failed to write snapshot")?;
    }
    Ok(())
}

fn load_config(config: Option<&Path>, snapshot: Option<PathBuf>) -> Result<SerialConfig> {
    let loaded = match config {
        Some(path) => SerialConfig::from_file(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => SerialConfig::default(),
    };
    let snapshot = snapshot
        .or_else(|| loaded.snapshot_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT));
    Ok(loaded.snapshot_path(snapshot))
}

async fn run(command: &Command, backend: &InMemoryBackend, hooks: &SerialFields) -> Result<bool> {
    match command {
        Command::Resolve(args) => {
            let table = hooks.lifecycle().namer().resolve(&args.managed_field())?;
            println!("{}", table);
            Ok(false)
        }
        Command::Create(args) => {
            let field = args.managed_field();
            if hooks.lifecycle().ensure_table(&field).await? {
                println!("Created counter table for {}", field);
            } else {
                println!("Counter table for {} already exists", field);
            }
            Ok(true)
        }
        Command::Allocate { field, count } => {
            if *count == 0 {
                bail!("--count must be at least 1");
            }
            for _ in 0..*count {
                let value = hooks
                    .generate(&field.entity_type, &field.bundle, &field.field)
                    .await?;
                println!("{}", value);
            }
            Ok(true)
        }
        Command::Tables => {
            let tables = backend.storage.list_tables().await;
            if tables.is_empty() {
                println!("No counter tables");
            }
            for name in tables {
                println!("{}", backend.storage.table_stats(&name).await?);
            }
            Ok(false)
        }
        Command::Compact(args) => {
            let removed = hooks.allocator().compact(&args.managed_field()).await?;
            println!("Removed {} rows", removed);
            Ok(true)
        }
        Command::Drop(args) => {
            let field = FieldDescriptor::new(&args.field, &hooks.config().field_type);
            let instance = InstanceDescriptor::new(&args.entity_type, &args.bundle, &args.field);
            hooks.lifecycle().drop(&field, &instance).await?;
            println!("Dropped counter table for {}", instance.managed_field());
            Ok(true)
        }
    }
}
