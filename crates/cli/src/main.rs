use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use oficina_agents::{MaintenanceAgent, DEFAULT_PAYMENT_LINK_BASE};
use oficina_core::{
    Attachment, InboundMessage, IntentExtractor, NewProcedure, ProcedureIntent, ReplySegment,
    Vocabulary,
};
use oficina_observability::{init_tracing, AppMetrics};
use oficina_storage::Store;

#[derive(Debug, Parser)]
#[command(name = "oficina")]
#[command(about = "Oficina maintenance-procedure bot CLI")]
struct Cli {
    /// SQLite URL; runs against an in-memory store when omitted.
    #[arg(long, env = "OFICINA_DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// JSON file with `operations` and `brands` lists.
    #[arg(long, env = "OFICINA_VOCABULARY_PATH", global = true)]
    vocabulary: Option<PathBuf>,

    #[arg(long, env = "OFICINA_PAYMENT_LINK_BASE", default_value = DEFAULT_PAYMENT_LINK_BASE, global = true)]
    payment_link_base: String,

    #[arg(long, default_value = "cli:local", global = true)]
    sender: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session; `/foto <url>` attaches a photo to the next message.
    Chat,
    Extract {
        text: String,
    },
    Search {
        #[arg(long, default_value = "")]
        operation: String,
        #[arg(long, default_value = "")]
        equipment: String,
    },
    Register {
        #[arg(long)]
        operation: String,
        #[arg(long)]
        equipment: String,
        #[arg(long = "photo")]
        photos: Vec<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("oficina_cli");
    let cli = Cli::parse();

    let agent = build_agent(&cli).await?;

    match cli.command {
        Command::Chat => run_chat(agent, &cli.sender).await?,
        Command::Extract { text } => {
            let intent = agent.extract(&text);
            println!("{}", serde_json::to_string_pretty(&intent)?);
        }
        Command::Search {
            operation,
            equipment,
        } => {
            let hits = agent
                .search(&ProcedureIntent::new(operation, equipment))
                .await?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
        Command::Register {
            operation,
            equipment,
            photos,
            description,
        } => {
            let record = agent
                .register_procedure(NewProcedure {
                    operation,
                    equipment,
                    description,
                    photo_urls: photos,
                    created_by: Some(cli.sender.clone()),
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Summary => {
            let today = chrono::Utc::now().date_naive();
            let summary = agent.month_summary(&cli.sender, today).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

async fn run_chat(agent: MaintenanceAgent<Store>, sender: &str) -> Result<()> {
    let mut pending_photos: Vec<Attachment> = Vec::new();

    println!("Oficina chat mode. type 'exit' to quit, '/foto <url>' to attach a photo.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        if let Some(url) = message.strip_prefix("/foto") {
            let url = url.trim();
            if url.is_empty() {
                println!("usage: /foto <url>");
            } else {
                pending_photos.push(Attachment::image(url));
                println!("({} foto(s) na fila)", pending_photos.len());
            }
            continue;
        }

        if message.is_empty() && pending_photos.is_empty() {
            continue;
        }

        let inbound = InboundMessage {
            sender: Some(sender.to_string()),
            text: message.to_string(),
            attachments: std::mem::take(&mut pending_photos),
        };
        let handled = agent.handle_message(inbound).await?;

        println!();
        for segment in handled.reply.segments {
            match segment {
                ReplySegment::Text { body } => println!("{body}"),
                ReplySegment::Media { url } => println!("[foto] {url}"),
            }
        }
        println!();
    }

    Ok(())
}

async fn build_agent(cli: &Cli) -> Result<MaintenanceAgent<Store>> {
    let extractor = match cli.vocabulary.as_ref() {
        Some(path) => Vocabulary::from_json_file(path)
            .and_then(Vocabulary::into_extractor)
            .with_context(|| format!("failed loading vocabulary from {}", path.display()))?,
        None => IntentExtractor::reference(),
    };

    let store = match cli.database_url.as_deref() {
        Some(database_url) => Store::sqlite(database_url).await?,
        None => Store::memory(),
    };

    Ok(MaintenanceAgent::new(
        extractor,
        Arc::new(store),
        AppMetrics::shared(),
        cli.payment_link_base.clone(),
    ))
}
