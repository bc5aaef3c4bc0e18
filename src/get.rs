//! Document inspection commands: `docqa documents`, `docqa get`,
//! `docqa delete`.

use anyhow::Result;

use crate::config::Config;
use crate::models::{Document, FileId};
use crate::rag::RagService;

fn format_size(bytes: i64) -> String {
    const KB: i64 = 1024;
    const MB: i64 = 1024 * KB;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn print_document(doc: &Document) {
    println!("--- Document ---");
    println!("id:          {}", doc.id);
    println!("document_id: {}", doc.document_id);
    println!("file:        {} ({})", doc.file_name, doc.file_type);
    println!("size:        {}", format_size(doc.file_size));
    if let Some(title) = &doc.title {
        println!("title:       {}", title);
    }
    if let Some(author) = &doc.author {
        println!("author:      {}", author);
    }
    if !doc.tags.is_empty() {
        println!("tags:        {}", doc.tags.join(", "));
    }
    println!("status:      {}", doc.status);
    println!("chunks:      {}", doc.chunk_count);
    println!("uploaded:    {}", doc.uploaded_at.to_rfc3339());
    if let Some(processed) = doc.processed_at {
        println!("processed:   {}", processed.to_rfc3339());
    }
    if let Some(err) = doc.processing_metadata.get("error").and_then(|e| e.as_str()) {
        println!("error:       {}", err);
    }
}

/// `docqa documents`: list all documents, newest first.
pub async fn run_documents(config: &Config) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let docs = service.list_documents().await?;

    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    println!(
        "{:>5}  {:<10}  {:>6}  {:<20}  FILE",
        "ID", "STATUS", "CHUNKS", "UPLOADED"
    );
    for doc in &docs {
        println!(
            "{:>5}  {:<10}  {:>6}  {:<20}  {}",
            doc.id,
            doc.status,
            doc.chunk_count,
            doc.uploaded_at.format("%Y-%m-%d %H:%M:%S"),
            doc.file_name
        );
    }
    Ok(())
}

/// `docqa get <id>`: print one document, optionally with its chunks.
pub async fn run_get(config: &Config, file_id: FileId, show_chunks: bool) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let doc = service.get_document(file_id).await?;
    print_document(&doc);

    if show_chunks {
        let chunks = service.get_chunks(file_id).await?;
        println!();
        for chunk in &chunks {
            println!(
                "--- Chunk {} (tokens {}..{}, {} tokens) ---",
                chunk.chunk_index, chunk.start_index, chunk.end_index, chunk.token_count
            );
            println!("{}", chunk.content);
            println!();
        }
    }
    Ok(())
}

/// `docqa delete <id>`: remove a document and its chunks.
pub async fn run_delete(config: &Config, file_id: FileId) -> Result<()> {
    let service = RagService::from_config(config).await?;
    service.delete_document(file_id).await?;
    println!("Deleted document {}.", file_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
