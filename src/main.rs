use anyhow::Result;
use clap::Parser;
use repotools::cli::{Cli, Commands};
use repotools::core::server;
use repotools::core::ChannelSource;
use repotools::tools::ToolHost;
use repotools::{init_with_settings, utils, Conversation, Settings};
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::new()?,
    };

    // stdout belongs to the protocol in serve mode, so logs always go to stderr
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve => handle_serve(&settings).await,
        Commands::Tools => handle_tools(&settings).await,
        Commands::Call { name, args } => handle_call(&settings, &name, &args).await,
        Commands::Chat { prompt } => {
            init_with_settings(settings).await?;
            handle_chat(prompt).await
        }
        Commands::Interactive => {
            init_with_settings(settings).await?;
            handle_interactive().await
        }
    }
}

async fn handle_serve(settings: &Settings) -> Result<()> {
    let host = ToolHost::from_settings(settings)?;
    server::serve_stdio(Arc::new(host)).await
}

async fn handle_tools(settings: &Settings) -> Result<()> {
    let source = ChannelSource::from_settings(&settings.tool_server)?;
    let tools = repotools::api::tools::list_from(&source).await?;

    utils::print_header(&format!("{} tools", tools.len()));
    utils::print_tools(&tools);
    Ok(())
}

async fn handle_call(settings: &Settings, name: &str, args: &str) -> Result<()> {
    let arguments: serde_json::Value = serde_json::from_str(args)
        .map_err(|e| anyhow::anyhow!("--args is not valid JSON: {}", e))?;

    let source = ChannelSource::from_settings(&settings.tool_server)?;
    let result = repotools::api::tools::call_via(&source, name, arguments).await?;

    utils::print_tool_result(&result);
    Ok(())
}

async fn handle_chat(prompt: String) -> Result<()> {
    utils::print_info("Thinking...");

    let answer = repotools::converse(prompt).await?;
    println!("\n{}", answer);
    Ok(())
}

async fn handle_interactive() -> Result<()> {
    utils::print_header("Interactive Mode");
    utils::print_info("Type your messages (/help for commands, /exit to quit)\n");

    let mut conversation = Conversation::new();
    let mut lines = BufReader::new(io::stdin()).lines();

    loop {
        utils::print_prompt("You: ");
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/exit" | "/quit" => break,
            "/clear" => {
                conversation.clear();
                utils::print_success("Conversation history cleared\n");
                continue;
            }
            "/help" => {
                println!("Special commands:");
                println!("  /clear  - Clear conversation history");
                println!("  /help   - Show this help");
                println!("  /exit   - Exit\n");
                continue;
            }
            _ => {}
        }

        match conversation.send(input).await {
            Ok(answer) => {
                utils::print_info("Assistant: ");
                println!("{}\n", answer);
            }
            // A failed turn leaves the history untouched; keep the session going
            Err(e) => utils::print_error(&format!("Error: {:#}\n", e)),
        }
    }

    Ok(())
}
