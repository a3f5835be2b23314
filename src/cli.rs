use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "websearch", about = "Per-query web search pipeline")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one search to completion and print ranked results
    Search {
        /// Seed URL to crawl from
        #[arg(long)]
        url: String,

        /// Query to search for
        #[arg(short, long = "query")]
        query: String,

        /// Maximum pages to crawl (defaults to the config preset)
        #[arg(long)]
        max_pages: Option<usize>,
    },
    /// Start the HTTP/WebSocket front end
    Serve {
        /// Port to listen on (overrides config/PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}
