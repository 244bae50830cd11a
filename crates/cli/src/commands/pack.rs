//! `echogarden pack` — Build a context pack from message identifiers.

use anyhow::Context;
use clap::Args;
use echogarden_config::EngineConfig;
use echogarden_context::{ContextPackAssembler, TokenCounter};
use echogarden_core::pack::PackRequest;
use echogarden_memory::load_jsonl;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args)]
pub struct PackArgs {
    /// JSONL archive holding the messages
    #[arg(long)]
    pub archive: PathBuf,

    /// Message identifiers as <conv_id>/<msg_id>, in pack order
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Token budget (defaults to pack.default_max_tokens)
    #[arg(long)]
    pub max_tokens: Option<usize>,

    /// Model whose tokenizer sizes the budget (defaults to pack.default_model)
    #[arg(long)]
    pub model: Option<String>,
}

pub async fn run(args: PackArgs, config: &EngineConfig) -> anyhow::Result<()> {
    let store = load_jsonl(&args.archive)
        .with_context(|| format!("Failed to load archive {}", args.archive.display()))?;
    let counter = TokenCounter::from_config(&config.tokenizer)?;

    let assembler =
        ContextPackAssembler::new(Arc::new(store), Arc::new(counter), config.pack.clone());
    let request = PackRequest {
        message_ids: args.ids,
        max_tokens: args.max_tokens,
        model: args.model,
    };

    let pack = assembler.pack(&request).await?;
    println!("{}", serde_json::to_string_pretty(&pack.to_response())?);
    Ok(())
}
