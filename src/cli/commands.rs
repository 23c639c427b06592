use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "repotools")]
#[command(author, version, about = "Conversational agent with GitHub repository tools", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to config/$CONFIG_ENV.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the tool host on stdin/stdout
    Serve,

    /// List the tools the host exposes
    Tools,

    /// Invoke one tool directly, without the model
    Call {
        name: String,

        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// Send a single message and print the answer
    Chat { prompt: String },

    /// Start an interactive chat session
    Interactive,
}
