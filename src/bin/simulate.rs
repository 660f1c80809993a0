//! Interactive caregiver training simulator.
//!
//! Reads caregiver lines from stdin and prints the persona's replies.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin simulate -- margaret beginner
//! ```
//!
//! Commands: `/reset` clears the persona's memory, `/status` prints
//! retrieval health, `/quit` ends the session.
//!
//! # Environment Variables
//!
//! - `GERONTO_CONFIG`: YAML configuration file
//! - `GERONTO_OLLAMA_URL`, `GERONTO_MODEL`, `GERONTO_ADAPTER_MODEL`, ...: overrides
//! - `RUST_LOG`: tracing filter (default: "info,gerontovoice=debug")

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use gerontovoice::{
    ConversationStore, Difficulty, InMemoryConversationStore, PipelineConfig, ResponsePipeline,
};

const HISTORY_TURNS: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gerontovoice=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let persona_id = args.next().unwrap_or_else(|| "margaret".to_string());
    let difficulty: Difficulty = match args.next() {
        Some(level) => level.parse().map_err(anyhow::Error::msg)?,
        None => Difficulty::Beginner,
    };

    let config = PipelineConfig::from_env().context("loading configuration")?;
    let pipeline = ResponsePipeline::from_config(config)
        .await
        .context("building response pipeline")?;
    let store = InMemoryConversationStore::new();

    let greeting = pipeline.greeting(&persona_id)?;
    let session = store.create_session(&persona_id, difficulty).await?;
    tracing::info!(
        "Session {} with '{}' at {} difficulty",
        session.id,
        persona_id,
        difficulty
    );
    println!("{}", greeting);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let utterance = line.trim();
        match utterance {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                pipeline.reset(&persona_id).await?;
                println!("{}", greeting);
                continue;
            }
            "/status" => {
                println!("{}", serde_json::to_string_pretty(&pipeline.retrieval_status())?);
                continue;
            }
            _ => {}
        }

        let history = store.history(session.id, HISTORY_TURNS).await?;
        let record = pipeline
            .respond(&persona_id, utterance, &history, difficulty)
            .await?;
        store.record_exchange(session.id, utterance, &record).await?;

        tracing::debug!(
            "strategy={} confidence={:.2} grounded={} caregiver={} persona={}",
            record.strategy,
            record.confidence,
            record.grounded,
            record.caregiver_emotion,
            record.persona_emotion
        );
        println!("{}", record.text);
    }

    let ended = store.end_session(session.id).await?;
    tracing::info!("Session {} ended after {} turns", ended.id, ended.turn_count);
    Ok(())
}
