use std::io;

use tokio::io::AsyncWrite;

use crate::{
    registry::{Registry, Session},
    wire,
};

/// Classification of one inbound payload from a registered session.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound<'a> {
    /// `/list`: answer the requester with the current snapshot.
    ListRequest,
    /// `exit` in any case, or an empty payload: leave the chat.
    Disconnect,
    /// Anything else relays as chat.
    Chat(&'a str),
}

pub fn classify(payload: &str) -> Inbound<'_> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        Inbound::Disconnect
    } else if trimmed == wire::LIST_REQUEST {
        Inbound::ListRequest
    } else if trimmed.eq_ignore_ascii_case(wire::EXIT_TOKEN) {
        Inbound::Disconnect
    } else {
        Inbound::Chat(trimmed)
    }
}

/// Whether the session loop should keep reading.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Disconnect,
}

/// Executes one inbound payload on behalf of `sender`.
///
/// A write failure to the sender's own session is a transport error
/// for the caller to handle; failures toward other recipients are
/// isolated inside [`Registry::broadcast`].
pub async fn dispatch<W>(
    registry: &Registry<W>,
    session: &Session<W>,
    sender: &str,
    payload: &str,
) -> io::Result<Flow>
where
    W: AsyncWrite + Unpin,
{
    match classify(payload) {
        Inbound::ListRequest => {
            let list = wire::user_list_line(&registry.snapshot().await);
            session.send(&list).await?;
            Ok(Flow::Continue)
        }
        Inbound::Disconnect => Ok(Flow::Disconnect),
        Inbound::Chat(body) => {
            registry
                .broadcast(&wire::chat_line(sender, body), Some(sender))
                .await;
            Ok(Flow::Continue)
        }
    }
}
