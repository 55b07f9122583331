use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "camera-cli")]
#[command(about = "Management CLI for the camera service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "CAMERA_SERVICE_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service status
    Status,
    /// Show MediaMTX health and circuit state
    Health,
    /// Run a readiness check for a device
    Ready {
        /// Device id, e.g. /dev/video0
        device: String,
        /// snapshot or recording
        #[arg(short, long, default_value = "snapshot")]
        purpose: String,
    },
    /// Drop a device from the active stream cache
    Inactive {
        device: String,
    },
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

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Health => {
            let res = client.get(format!("{}/admin/health", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Ready { device, purpose } => {
            let res = client.post(format!("{}/admin/devices/{}/ready", cli.url, encode_device(&device)))
                .query(&[("purpose", purpose.as_str())])
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Inactive { device } => {
            let res = client.delete(format!("{}/admin/devices/{}/active", cli.url, encode_device(&device)))
                .headers(headers)
                .send()
                .await?;
            if res.status().is_success() {
                println!("{} removed from active cache", device);
            } else {
                eprintln!("Error: Admin API returned status {}", res.status());
            }
        }
    }

    Ok(())
}

/// Device ids like `/dev/video0` contain slashes; escape them for the path.
fn encode_device(device: &str) -> String {
    device.replace('%', "%25").replace('/', "%2F")
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
