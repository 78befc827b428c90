use std::{path::PathBuf, process};

use anyhow::{Context, Result};
use bookings_helper::{
    BatchSelection, BookingStore, DatabaseLocation, HelperConfig, Notice, StorageGateway, logging,
    ops,
};
use clap::{ArgGroup, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "bookings-helper",
    version,
    about = "Export and import booking products and global availability rules"
)]
struct Cli {
    /// SQLite database path, or `memory`
    #[arg(long, value_name = "PATH")]
    db: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Export one booking product
    ExportProduct {
        #[arg(long)]
        id: i64,
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// Export several booking products into one file
    #[command(group(ArgGroup::new("selection").required(true).args(["all", "products"])))]
    ExportProducts {
        /// Every published booking product
        #[arg(long)]
        all: bool,
        /// Comma separated product ids
        #[arg(long, value_delimiter = ',', value_name = "IDS")]
        products: Vec<i64>,
        #[arg(long)]
        with_global_availability_rules: bool,
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// Export the global availability rules
    ExportRules {
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
    /// Import one exported booking product
    ImportProduct {
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
    },
    /// Import a batch export
    ImportProducts {
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
        #[arg(long)]
        with_global_availability_rules: bool,
    },
    /// Replace the global availability rules with an exported list
    ImportRules {
        #[arg(long, value_name = "PATH")]
        file: PathBuf,
    },
    /// Remove duplicated product/resource relationships
    CleanUp,
    /// Show row counts and the rule storage in use
    Status,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.json_logs);

    match run(cli) {
        Ok(notice) => {
            println!("{notice}");
            if !notice.is_success() {
                process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            process::exit(2);
        }
    }
}

fn run(cli: Cli) -> Result<Notice> {
    let mut config = HelperConfig::from_env().context("invalid environment configuration")?;
    if let Some(db) = cli.db.as_deref() {
        config = config.with_database(DatabaseLocation::parse(db));
    }
    let store = config
        .open_store()
        .with_context(|| format!("failed to open database {:?}", config.database))?;

    let notice = match cli.cmd {
        Cmd::ExportProduct { id, dir } => ops::export_product(&store, &with_dir(&config, dir), id),
        Cmd::ExportProducts {
            all,
            products,
            with_global_availability_rules,
            dir,
        } => {
            let selection = if all {
                BatchSelection::all()
            } else {
                BatchSelection::ids(products)
            };
            ops::export_products(
                &store,
                &with_dir(&config, dir),
                &selection,
                with_global_availability_rules,
            )
        }
        Cmd::ExportRules { dir } => ops::export_rules(&store, &with_dir(&config, dir)),
        Cmd::ImportProduct { file } => ops::import_product(&store, &config, &file),
        Cmd::ImportProducts {
            file,
            with_global_availability_rules,
        } => ops::import_products(&store, &config, &file, with_global_availability_rules),
        Cmd::ImportRules { file } => ops::import_rules(&store, &config, &file),
        Cmd::CleanUp => ops::clean_up(&store),
        Cmd::Status => status(&store)?,
    };
    Ok(notice)
}

fn with_dir(config: &HelperConfig, dir: Option<PathBuf>) -> HelperConfig {
    match dir {
        Some(dir) => config.clone().with_export_dir(dir),
        None => config.clone(),
    }
}

fn status(store: &BookingStore) -> Result<Notice> {
    let counts = store.counts().context("failed to count rows")?;
    let storage = store.rule_storage().context("failed to probe rule storage")?;
    Ok(Notice::success(format!(
        "products={} resources={} persons={} meta={} relationships={} rules={} rule_storage={}",
        counts.products,
        counts.resources,
        counts.persons,
        counts.meta_rows,
        counts.relationships,
        counts.rules,
        storage.as_str()
    )))
}
