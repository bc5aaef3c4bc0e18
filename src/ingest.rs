//! `docqa ingest`: feed local files through the ingestion pipeline.
//!
//! Files are processed one after another. A failing file is reported and
//! left `failed` in the database; the remaining files are still ingested
//! and the command exits with an error at the end.

use std::path::PathBuf;

use anyhow::{bail, Result};
use tracing::warn;

use crate::config::Config;
use crate::models::IngestOptions;
use crate::rag::RagService;

pub async fn run_ingest(
    config: &Config,
    paths: &[PathBuf],
    mime: Option<&str>,
    options: IngestOptions,
) -> Result<()> {
    if paths.is_empty() {
        bail!("No files given.");
    }

    let service = RagService::from_config(config).await?;
    let mut failed = 0usize;
    let mut total_chunks = 0usize;

    for path in paths {
        match service.ingest_path(path, mime, options.clone()).await {
            Ok(response) => {
                total_chunks += response.chunks_count;
                println!(
                    "Ingested {} → file {} ({}), {} chunks",
                    path.display(),
                    response.file_id,
                    response.document_id,
                    response.chunks_count
                );
            }
            Err(e) => {
                failed += 1;
                warn!(path = %path.display(), error = %e, "ingestion failed");
                eprintln!("Failed to ingest {}: {:#}", path.display(), e);
            }
        }
    }

    println!();
    println!(
        "{} of {} files ingested, {} chunks total.",
        paths.len() - failed,
        paths.len(),
        total_chunks
    );

    if failed > 0 {
        bail!("{} file(s) failed to ingest", failed);
    }
    Ok(())
}
