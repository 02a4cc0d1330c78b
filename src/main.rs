//! Thin CLI shell around the folio catalog.

use clap::{Parser, Subcommand};
use folio_catalog::{Book, BookEventKind, Catalog, CatalogEvent};
use folio_config::Settings;
use folio_db::{Database, GatewayHandle, SqliteGateway};
use folio_meta::FormatReader;
use folio_vfs::tree::LocalTree;
use miette::IntoDiagnostic;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "folio", version, about = "Catalog the books in a library directory")]
struct Cli {
    /// Path to a configuration file (defaults to the platform config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile the catalog with the library directory.
    Build,
    /// List all catalogued books.
    List,
    /// Show recently opened books, most recent first.
    Recent,
    /// Show favorite books.
    Favorites,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings =
        Settings::load(cli.config.as_deref()).map_err(|error| miette::miette!("{error:?}"))?;
    if let Some(parent) = settings.database_path.parent() {
        std::fs::create_dir_all(parent).into_diagnostic()?;
    }

    let database = Database::connect(&settings.database_path)
        .await
        .map_err(|error| miette::miette!("{error:?}"))?;
    let gateway: GatewayHandle = Arc::new(SqliteGateway::from(&database));
    let tree = LocalTree::new("library", &settings.library_root)
        .map_err(|error| miette::miette!("{error:?}"))?;
    let catalog = Catalog::new(gateway, Arc::new(tree), Arc::new(FormatReader));

    match cli.command {
        Command::Build => build(&catalog).await?,
        Command::List => {
            // A quiet pass first, so the listing reflects the directory as
            // it is now rather than as it was last time.
            catalog.build_once().await.map_err(|error| miette::miette!("{error:?}"))?;
            print_books(&catalog.books());
        },
        Command::Recent => print_books(
            &catalog.recent_books().await.map_err(|error| miette::miette!("{error:?}"))?,
        ),
        Command::Favorites => print_books(
            &catalog.favorite_books().await.map_err(|error| miette::miette!("{error:?}"))?,
        ),
    }

    database.close().await;
    Ok(())
}

async fn build(catalog: &Catalog) -> miette::Result<()> {
    let mut events = catalog.subscribe();
    let report = catalog.build_once().await.map_err(|error| miette::miette!("{error:?}"))?;
    while let Ok(event) = events.try_recv() {
        match event {
            CatalogEvent::Book(BookEventKind::Added, book) => println!("  + {}", describe(&book)),
            CatalogEvent::Book(BookEventKind::Updated, book) => println!("  ~ {}", describe(&book)),
            CatalogEvent::Book(BookEventKind::Removed, book) => println!("  - {}", describe(&book)),
            CatalogEvent::Build(_) => {},
        }
    }
    for (file, reason) in &report.skipped {
        println!("  ! {file}: {reason}");
    }
    println!(
        "{} indexed, {} new, {} resurrected, {} orphaned, {} skipped",
        report.indexed,
        report.created,
        report.resurrected,
        report.orphaned,
        report.skipped.len(),
    );
    Ok(())
}

fn print_books(books: &[Book]) {
    for book in books {
        println!("{}", describe(book));
    }
}

fn describe(book: &Book) -> String {
    match book.meta.authors.is_empty() {
        true => format!("{} ({})", book.meta.title, book.file),
        false => format!("{} by {} ({})", book.meta.title, book.meta.authors.join(", "), book.file),
    }
}
