//! Chat Engine - interactive console front end
//!
//! Reads lines from stdin and sends each one through a session. Status
//! changes and replies are rendered as they happen.

use chat_engine::{
    EchoTransport, EngineConfig, HttpTransport, LoggingTransport, MessageStatus, Role, Session,
    StoreEvent, Transport,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn render(event: &StoreEvent) {
    match event {
        StoreEvent::Appended(message) => match message.role {
            Role::User => println!("you> {} [{}]", message.text, message.status),
            Role::Assistant => println!("bot> {}", message.text),
        },
        StoreEvent::StatusChanged { message, .. } => {
            if message.status == MessageStatus::Failed {
                println!("     ! not delivered: {}", message.text);
            } else {
                println!("     [{}]", message.status);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they don't interleave with the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_engine=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = EngineConfig::from_env();

    let transport: Arc<dyn Transport> = if let Some(endpoint) = &config.transport.endpoint {
        tracing::info!(endpoint = %endpoint, "Using HTTP transport");
        Arc::new(HttpTransport::new(endpoint.clone(), &config.transport)?)
    } else {
        tracing::warn!("No endpoint configured. Set CHAT_ENGINE_ENDPOINT. Falling back to echo.");
        Arc::new(EchoTransport::default())
    };

    let session = Session::with_transport(LoggingTransport::new(transport), &config);
    let _render = session.subscribe(render);

    tracing::info!(
        max_attempts = config.retry.max_attempts,
        max_message_chars = config.max_message_chars,
        "Session ready"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };

        match line.trim() {
            "/quit" => break,
            "/history" => {
                for message in session.history() {
                    println!(
                        "  {} {} [{}] {}",
                        message.created_at.as_micros(),
                        message.role,
                        message.status,
                        message.text
                    );
                }
                continue;
            }
            _ => {}
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            result = session.send_message(&line) => {
                if let Err(e) = result {
                    println!("     ! {}", e.user_message());
                }
            }
        }
    }

    session.shutdown();
    Ok(())
}
