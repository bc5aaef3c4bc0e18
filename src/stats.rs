//! Collection overview: `docqa stats` and `docqa types`.

use anyhow::Result;

use crate::config::Config;
use crate::extract;
use crate::rag::RagService;

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let stats = service.stats().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("docqa: Collection Stats");
    println!("========================");
    println!();
    println!("  Database:    {} ({} bytes)", config.db.path.display(), db_size);
    println!("  Documents:   {}", stats.total_documents);
    println!("  Chunks:      {}", stats.total_chunks);
    println!("  Avg chunks:  {:.2} per document", stats.avg_chunks_per_file);
    println!();
    println!("  By status:");
    for (status, count) in &stats.status_counts {
        println!("    {:<12} {}", status, count);
    }
    println!();
    println!("  Embedding model:  {}", service.embedding_model());
    println!("  Chat model:       {}", service.completion_model());
    Ok(())
}

/// Print every accepted MIME type and file extension.
pub fn run_types() {
    println!("Supported MIME types:");
    for mime in extract::supported_types() {
        println!("  {}", mime);
    }
    println!();
    println!("Extensions: {}", extract::supported_extensions().join(" "));
}
