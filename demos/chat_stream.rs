//! Stream one chat reply to stdout.
//!
//! Run with:
//! ```bash
//! export CHAT_BASE_URL="http://localhost:5000"
//! export CHAT_TOKEN="your-jwt"            # optional
//! export CHAT_TRANSPORT="poll"            # optional, defaults to the stream reader
//! RUST_LOG=chatstream=debug cargo run --example chat_stream -- "How was my day?"
//! ```

use std::io::Write;
use std::time::Duration;

use chatstream::client::ChatClient;
use chatstream::options::{StreamConfig, TransportKind};
use chatstream::session::Callbacks;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let base_url =
        std::env::var("CHAT_BASE_URL").unwrap_or_else(|_| "http://localhost:5000".to_string());
    let message = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Hello! How are you today?".to_string());

    let mut config = StreamConfig::new(base_url).with_connect_timeout(Duration::from_secs(10));
    if let Ok(token) = std::env::var("CHAT_TOKEN") {
        config = config.with_bearer_token(token);
    }
    if let Ok(csrf) = std::env::var("CHAT_CSRF_TOKEN") {
        config = config.with_csrf_token(csrf);
    }
    if std::env::var("CHAT_TRANSPORT").as_deref() == Ok("poll") {
        config = config.with_transport(TransportKind::ProgressivePoll);
    }

    let client = ChatClient::new(config)?;

    let handle = client.spawn(
        message,
        Callbacks::new(
            |token: &str| {
                print!("{}", token);
                // Flush stdout to show text immediately
                let _ = std::io::stdout().flush();
            },
            || println!("\n\n=== Stream Complete ==="),
            |err| {
                eprintln!("\nI'm having trouble responding right now. Please try again.");
                eprintln!("({})", err);
            },
        ),
    );

    // Ctrl-C cancels the reply without reporting an error
    let cancel = handle.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let state = handle.join().await?;
    println!("Session ended: {:?}", state);
    Ok(())
}
