//! # chatstream - incremental streaming client for chat replies
//!
//! Consumes a chat reply delivered as small `data: ` frames over a streaming
//! HTTP response, reassembles frames from arbitrarily fragmented network
//! chunks, and reports tokens, completion and failure to the caller.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Two interchangeable body readers behind one [`transport::DeltaSource`]
//!   capability: push-style chunk reading and progressive polling
//! - Fragmentation-safe frame buffering and tolerant frame parsing
//! - A session state machine that fires `on_complete`/`on_error` at most once
//!   and supports cancellation at any point
//!
//! ## Wire protocol
//! ```text
//! data: {"token": "<fragment>"}
//!
//! data: {"error": "<message>"}
//!
//! data: [DONE]
//! ```
//!
//! ## Example
//! ```no_run
//! use chatstream::client::ChatClient;
//! use chatstream::options::StreamConfig;
//! use chatstream::session::Callbacks;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StreamConfig::new("http://localhost:5000").with_bearer_token("jwt");
//!     let client = ChatClient::new(config)?;
//!
//!     let handle = client.spawn(
//!         "I slept badly but the walk helped.",
//!         Callbacks::new(
//!             |token: &str| print!("{}", token),
//!             || println!(),
//!             |err| eprintln!("Something went wrong. Please try again. ({})", err),
//!         ),
//!     );
//!
//!     let state = handle.join().await?;
//!     println!("{:?}", state);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod http;
pub mod model;
pub mod options;
pub mod session;
pub mod sse;
pub mod stream;
pub mod transport;

// Re-exports for convenience
pub use client::{ChatClient, ClientError};
pub use model::{SessionState, StreamEvent, StreamRequest};
pub use options::{SecretString, StreamConfig, TransportKind};
pub use session::{Callbacks, CancelHandle, SessionHandle, StreamHandler, StreamSession};
