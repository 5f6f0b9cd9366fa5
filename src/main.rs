//! DataVault CLI - main entry point
//!
//! Import chat exports, search the enriched corpus, ask questions over it.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use datavault::service::MessageQuery;
use datavault::{metrics, Config, MessageFilter, MessageService, MessageType};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "datavault")]
#[command(about = "Chat message vault with AI enrichment and hybrid search", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import an exported chat file
    Import {
        /// Path to the exported chat text file
        file: PathBuf,

        /// Chat label attached to every imported message
        #[arg(short, long, default_value = "Imported Chat")]
        chat: String,

        /// Return without waiting for background enrichment to finish
        #[arg(long)]
        no_wait: bool,
    },

    /// Search messages with hybrid vector + keyword ranking
    Search {
        /// Search query
        query: String,

        /// Number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Filter by category
        #[arg(long)]
        category: Option<String>,

        /// Filter by message type (text, image, video, audio, document, link, media)
        #[arg(long, value_name = "TYPE")]
        message_type: Option<MessageType>,

        /// Filter by sender id
        #[arg(long)]
        sender: Option<String>,
    },

    /// Ask a question answered from relevant messages
    Ask {
        /// Question text
        query: String,

        /// How many messages to use as context
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List stored messages, newest first
    List {
        /// Number of messages
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Filter by sender id
        #[arg(long)]
        sender: Option<String>,

        /// Filter by category
        #[arg(long)]
        category: Option<String>,
    },

    /// Show vault statistics
    Stats {
        /// Show statistics for one sender instead
        #[arg(long)]
        sender: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("datavault=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::new();

    let metrics_addr = cli.metrics_addr.or_else(|| config.metrics_addr.clone());
    if let Some(addr) = metrics_addr {
        match addr.parse() {
            Ok(addr) => metrics::spawn_metrics_server(addr),
            Err(err) => warn!("Invalid metrics address '{}': {}", addr, err),
        }
    }

    let service = MessageService::from_config(&config).await?;

    match cli.command {
        Commands::Import {
            file,
            chat,
            no_wait,
        } => {
            let raw = tokio::fs::read_to_string(&file).await?;
            info!("Importing {} into chat '{}'", file.display(), chat);

            let report = service.import_chat(&raw, &chat).await?;

            if no_wait {
                println!(
                    "Imported {} messages from '{}' (enrichment running in background)",
                    report.imported, report.chat_label
                );
            } else {
                service.worker().wait_idle().await;

                let mut embedded = 0;
                let mut failed = 0;
                for id in &report.message_ids {
                    if let Some(msg) = service.get_message(*id).await {
                        if msg.has_embedding {
                            embedded += 1;
                        }
                        if msg.enrichment_error.is_some() {
                            failed += 1;
                        }
                    }
                }

                println!("\n=== Import Results ===");
                println!(
                    "{}: {} messages, {} embeddings, {} errors",
                    report.chat_label, report.imported, embedded, failed
                );
            }
        }

        Commands::Search {
            query,
            limit,
            category,
            message_type,
            sender,
        } => {
            let response = service
                .search(MessageQuery {
                    query: query.clone(),
                    limit,
                    categories: category.into_iter().collect(),
                    message_types: message_type.into_iter().collect(),
                    sender_id: sender,
                    date_from: None,
                    date_to: None,
                })
                .await;

            println!("\n=== Search Results for '{}' ===\n", query);
            for (i, hit) in response.hits.iter().enumerate() {
                println!(
                    "{}. [Score: {:.3}] {} in {}",
                    i + 1,
                    hit.score,
                    hit.message.sender_name,
                    hit.message.chat_label
                );
                println!("   {}", hit.message.timestamp.format("%Y-%m-%d %H:%M"));
                println!("   {}", truncate(&hit.message.content, 100));
                println!();
            }

            if !response.suggested_categories.is_empty() {
                println!(
                    "Suggested categories: {}",
                    response.suggested_categories.join(", ")
                );
            }
            println!("Found {} messages", response.total);
        }

        Commands::Ask { query, limit } => {
            let answer = service.ask(&query, limit).await;
            println!("\n{}", answer);
        }

        Commands::List {
            limit,
            sender,
            category,
        } => {
            let filter = MessageFilter {
                sender_id: sender,
                categories: category.into_iter().collect(),
                limit: Some(limit),
                ..Default::default()
            };
            let messages = service.list_messages(&filter).await;

            for msg in &messages {
                let marker = if msg.enriched { ' ' } else { '*' };
                println!(
                    "{}{} [{}] {}: {}",
                    msg.id,
                    marker,
                    msg.timestamp.format("%Y-%m-%d %H:%M"),
                    msg.sender_name,
                    truncate(&msg.content, 80)
                );
            }
            println!("\n{} messages", messages.len());
        }

        Commands::Stats { sender } => {
            if let Some(sender_id) = sender {
                let stats = service.sender_stats(&sender_id).await;

                println!("\n=== Stats for '{}' ===\n", stats.sender_id);
                println!("Messages: {}", stats.total_messages);
                if !stats.top_categories.is_empty() {
                    println!("Top categories: {}", stats.top_categories.join(", "));
                }
                match stats.last_activity {
                    Some(ts) => println!("Last activity: {}", ts.format("%Y-%m-%d %H:%M")),
                    None => println!("Last activity: never"),
                }
            } else {
                let stats = service.stats().await;

                println!("\n=== Vault Statistics ===\n");
                println!("Messages: {}", stats.messages);
                println!("Embedding store ({}):", stats.embeddings.backend);
                println!("  Points: {}", stats.embeddings.points_count);
                println!("  Dimension: {}", stats.embeddings.dimension);
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len).collect();
        format!("{}...", cut)
    }
}
