use clap::{Parser, Subcommand};
use reqwest::StatusCode;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the meshcaline gateway", long_about = None)]
struct Cli {
    /// Base URL of the admin API
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// List routing mappings in match order
    List,
    /// Append a mapping
    Add {
        /// Mapping id; generated when omitted
        #[arg(long)]
        id: Option<String>,
        /// Ingress regex, matched against the whole request URI
        ingress: String,
        /// Egress template, `$1` / `${name}` refer to ingress captures
        egress: String,
    },
    /// Replace a mapping's ingress and egress, keeping its position
    Update {
        id: String,
        ingress: String,
        egress: String,
    },
    /// Remove a mapping
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")).send().await?,
        Commands::List => client.get(format!("{base}/admin/mappings")).send().await?,
        Commands::Add {
            id,
            ingress,
            egress,
        } => {
            client
                .post(format!("{base}/admin/mappings"))
                .json(&json!({ "id": id, "ingress": ingress, "egress": egress }))
                .send()
                .await?
        }
        Commands::Update {
            id,
            ingress,
            egress,
        } => {
            client
                .put(format!("{base}/admin/mappings/{id}"))
                .json(&json!({ "ingress": ingress, "egress": egress }))
                .send()
                .await?
        }
        Commands::Delete { id } => {
            client
                .delete(format!("{base}/admin/mappings/{id}"))
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

    if status == StatusCode::NO_CONTENT {
        println!("OK");
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
