use std::path::PathBuf;
use std::process::ExitCode;

use promptview::{Catalog, CatalogConfig};

/// Opens a catalog over the directory given as the first argument, running
/// the initial scan/extract/reconcile cycle and flushing both tables.
fn main() -> ExitCode {
    env_logger::init();

    let Some(root) = std::env::args().nth(1).map(PathBuf::from) else {
        eprintln!("usage: promptview <image directory>");
        return ExitCode::FAILURE;
    };

    let config_path = CatalogConfig::default().metadata_dir.join(promptview::config::CONFIG_FILE);
    let config = CatalogConfig::load(&config_path);

    let started = std::time::Instant::now();
    let catalog = match Catalog::open(&root, config) {
        Ok(catalog) => catalog,
        Err(error) => {
            eprintln!("failed to open catalog for {}: {}", root.display(), error);
            return ExitCode::FAILURE;
        }
    };

    println!(
        "{}: {} images, {} extracted rows, {} annotation rows ({:.2}s)",
        root.display(),
        catalog.refs().len(),
        catalog.exif_table().len(),
        catalog.annotation_table().len(),
        started.elapsed().as_secs_f64()
    );
    ExitCode::SUCCESS
}
