use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Registration prompt sent to every new connection.
pub const USERNAME_PROMPT: &str = "Enter your username: ";

/// Rejection payload for an empty or already-taken username.
pub const REJECTION: &str = "Username is invalid or already taken.";

/// Token a client sends to request the online-user list.
pub const LIST_REQUEST: &str = "/list";

/// Token (matched case-insensitively) a client sends to disconnect.
pub const EXIT_TOKEN: &str = "exit";

/// Prefix marking a user-list control line pushed to clients.
pub const USER_LIST_PREFIX: &str = "/users ";

const READ_BUFFER_SIZE: usize = 1024;

/// Formats a relayed chat message as seen by recipients.
pub fn chat_line(sender: &str, body: &str) -> String {
    format!("{sender}: {body}")
}

/// Formats the user-list control line (empty list yields a bare prefix).
pub fn user_list_line(usernames: &[String]) -> String {
    format!("{USER_LIST_PREFIX}{}", usernames.join(","))
}

/// Interprets a payload as a user-list control line, by prefix match.
/// Returns `None` for chat and any other non-control payload.
pub fn parse_user_list(payload: &str) -> Option<Vec<&str>> {
    let list = payload.strip_prefix(USER_LIST_PREFIX)?;
    if list.is_empty() {
        return Some(Vec::new());
    }
    Some(list.split(',').collect())
}

/// Reads one payload from the stream, or `None` on EOF.
///
/// The protocol carries no framing: one transport read is one logical
/// message. A sender that writes large or rapid payloads can see them
/// split or coalesced; this is adequate only for short messages typed
/// one at a time, and is a deliberate, documented limitation.
pub async fn read_payload<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    let bytes = reader.read(&mut buffer).await?;
    if bytes == 0 {
        return Ok(None);
    }

    let payload = std::str::from_utf8(&buffer[..bytes])
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    Ok(Some(payload.to_string()))
}
