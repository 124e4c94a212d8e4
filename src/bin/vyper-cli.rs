use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::StatusCode;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "vyper-cli")]
#[command(about = "Client for the Vyper compilation service", long_about = None)]
struct Cli {
    /// Service base URL; the edge proxy or the backend directly.
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the compiler banner
    Version,
    /// Submit a source file for compilation
    Compile {
        file: PathBuf,
        /// Fetch the artifacts once compiled
        #[arg(long)]
        wait: bool,
    },
    /// Show whether a compilation succeeded
    Status { id: String },
    /// Fetch the stored output of a compilation
    Artifacts { id: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()?;
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Version => {
            let res = client.get(format!("{}/", base)).send().await?;
            print_response(res).await
        }
        Commands::Compile { file, wait } => {
            let content = std::fs::read_to_string(&file)?;
            let source_id = file.to_string_lossy().into_owned();
            let body = json!({ "sources": { source_id: { "content": content } } });

            let res = client
                .post(format!("{}/compile", base))
                .json(&body)
                .send()
                .await?;
            let status = res.status();
            let text = res.text().await?;

            let id = match compilation_id(status, &text) {
                Ok(id) => id,
                Err(outcome) => {
                    report_failure(status, &text);
                    if let (Some(id), true) = (outcome, wait) {
                        // The stored failure carries the diagnostic.
                        let res = client.get(format!("{}/artifacts/{}", base, id)).send().await?;
                        print_response(res).await?;
                    }
                    return Ok(ExitCode::FAILURE);
                }
            };
            println!("{}", id);

            if wait {
                let res = client.get(format!("{}/artifacts/{}", base, id)).send().await?;
                return print_response(res).await;
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status { id } => {
            let res = client.get(format!("{}/status/{}", base, id)).send().await?;
            print_response(res).await
        }
        Commands::Artifacts { id } => {
            let res = client.get(format!("{}/artifacts/{}", base, id)).send().await?;
            print_response(res).await
        }
    }
}

/// Id of a submitted compilation.
///
/// `Err(Some(id))` is a compilation the server stored as failed; `Err(None)`
/// is a response that carries no id at all, such as a proxy error page.
fn compilation_id(status: StatusCode, body: &str) -> Result<String, Option<String>> {
    let id = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string));
    match id {
        Some(id) if status.is_success() => Ok(id),
        id => Err(id),
    }
}

fn report_failure(status: StatusCode, body: &str) {
    eprintln!("Error: server returned status {}", status);
    eprintln!("Response: {}", body.trim_end());
}

async fn print_response(res: reqwest::Response) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        report_failure(status, &text);
        return Ok(ExitCode::FAILURE);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text.trim_end()),
    }
    Ok(ExitCode::SUCCESS)
}
