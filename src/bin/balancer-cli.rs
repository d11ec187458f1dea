use clap::{Parser, Subcommand, ValueEnum};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "balancer-cli")]
#[command(about = "Admin CLI for the round-robin proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    #[arg(short, long, env = "BALANCER_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check balancer status
    Status,
    /// List backends and their liveness
    Backends,
    /// Mark a backend alive or dead
    SetLiveness {
        /// Position of the backend in the configured list
        index: usize,
        state: Liveness,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Liveness {
    Alive,
    Dead,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = match cli.command {
        Commands::Status => {
            client
                .get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Backends => {
            client
                .get(format!("{}/admin/backends", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::SetLiveness { index, state } => {
            let alive = matches!(state, Liveness::Alive);
            client
                .put(format!("{}/admin/backends/{}/liveness", cli.url, index))
                .headers(headers)
                .json(&json!({ "alive": alive }))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
