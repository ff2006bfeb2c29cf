//! Chat Engine - conversation session engine
//!
//! Keeps the ordered history of one conversation, sends user messages
//! through a pluggable transport with retry and backoff, and notifies
//! subscribers after every change.
//!
//! ```no_run
//! use chat_engine::{EchoTransport, Session};
//!
//! # async fn run() -> chat_engine::SessionResult<()> {
//! let session = Session::builder(EchoTransport::default()).build();
//! let _sub = session.subscribe(|event| println!("{:?}", event.message()));
//! session.send_message("hello").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod message;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::{EngineConfig, TransportConfig};
pub use error::{SessionError, SessionResult, StoreError};
pub use message::{Message, MessageId, MessageStatus, MonotonicClock, Role, Timestamp};
pub use pipeline::{Delivered, RetryPolicy, SendPipeline};
pub use session::{Session, SessionBuilder, Subscription};
pub use store::{MessageStore, StoreEvent, StoreObserver};
pub use transport::{
    DeliveryReply, DeliveryRequest, EchoTransport, HttpTransport, LoggingTransport, Transport,
    TransportError, TransportErrorKind,
};
