//! Question commands: `docqa ask` and `docqa chat`.

use anyhow::Result;

use crate::config::Config;
use crate::models::{ChatOptions, QueryOptions};
use crate::rag::RagService;

pub async fn run_ask(config: &Config, question: &str, options: QueryOptions) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let response = service.query(question, options).await?;

    println!("{}", response.answer);
    println!();
    println!(
        "confidence: {:.2}  ({} ms)",
        response.confidence, response.processing_time_ms
    );
    if !response.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, source) in response.sources.iter().enumerate() {
            println!(
                "  [{}] {} chunk {} (score {:.3})",
                i + 1,
                source.document.file_name,
                source.chunk.chunk_index,
                source.score
            );
        }
    }
    Ok(())
}

pub async fn run_chat(
    config: &Config,
    message: &str,
    options: ChatOptions,
    with_tools: bool,
) -> Result<()> {
    let service = RagService::from_config(config).await?;

    if with_tools {
        let answer = service.ask_with_tools(message).await?;
        println!("{}", answer.answer);
        if !answer.tools_called.is_empty() {
            println!();
            println!("tools: {}", answer.tools_called.join(", "));
        }
        return Ok(());
    }

    let response = service.chat(message, options).await?;
    println!("{}", response.answer);
    println!();
    match response.confidence {
        Some(c) => println!(
            "model: {}  rag: {}  confidence: {:.2}",
            response.model, response.used_rag, c
        ),
        None => println!("model: {}  rag: {}", response.model, response.used_rag),
    }
    for source in &response.sources {
        println!("  - {} ({:.3}): {}", source.file_name, source.score, source.preview);
    }
    Ok(())
}
