//! Check connectivity to the FURS test environment
//!
//! ```text
//! FURS_BUNDLE=bundle.pem FURS_PASSWORD=... cargo run --example echo
//! ```

use furs::{ClientConfig, FursClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("furs=debug")))
        .init();

    let config = ClientConfig::from_env()?;
    println!("Environment: {:?}", config.environment);

    let client = FursClient::from_config(&config)?;
    println!("Client certificate: {}", client.identity().subject_name);
    println!("Issuer:             {}", client.identity().issuer_name);
    println!("Serial:             {}", client.identity().serial);

    let message = std::env::args().nth(1).unwrap_or_else(|| "ping".to_string());
    let reply = client.echo(&message).await?;
    println!("\n✓ Echo: {}", reply);

    Ok(())
}
