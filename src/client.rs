use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{tcp::OwnedWriteHalf, TcpStream},
    select,
};
use tracing::{info, warn};

use crate::{cli::ClientArgs, wire};

/// Terminal client: registers the configured username, then
/// multiplexes stdin with server payloads until either side closes.
pub async fn run(args: ClientArgs) -> Result<()> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    info!("connected to {}", args.server);

    let (mut reader, mut writer) = stream.into_split();

    // The server opens with its prompt; show it, then answer with the
    // configured username.
    if let Some(prompt) = wire::read_payload(&mut reader).await? {
        write_stdout(prompt.trim_end()).await?;
    }
    send_payload(&mut writer, &args.username).await?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();

    loop {
        input.clear();
        select! {
            server_payload = wire::read_payload(&mut reader) => {
                if !handle_server_payload(server_payload?).await? {
                    break;
                }
            }
            bytes_read = stdin.read_line(&mut input) => {
                if !handle_stdin_input(bytes_read?, &input, &mut writer).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }

    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shut down writer cleanly");
    }
    Ok(())
}

/// Renders one server payload. Control lines are distinguished from
/// chat by their `/users ` prefix.
async fn handle_server_payload(payload: Option<String>) -> Result<bool> {
    let payload = match payload {
        Some(payload) => payload,
        None => {
            write_stdout("*** server closed the connection").await?;
            return Ok(false);
        }
    };

    if let Some(users) = wire::parse_user_list(&payload) {
        if users.is_empty() {
            write_stdout("*** no users online").await?;
        } else {
            write_stdout(&format!("*** online users: {}", users.join(", "))).await?;
        }
    } else {
        write_stdout(&payload).await?;
    }
    Ok(true)
}

async fn handle_stdin_input(
    bytes_read: usize,
    input: &str,
    writer: &mut OwnedWriteHalf,
) -> Result<bool> {
    if bytes_read == 0 {
        return Ok(false);
    }

    let text = input.trim_end();
    if text.is_empty() {
        return Ok(true);
    }

    send_payload(writer, text).await?;
    if text.eq_ignore_ascii_case(wire::EXIT_TOKEN) {
        write_stdout("*** leaving chat").await?;
        return Ok(false);
    }
    Ok(true)
}

async fn send_payload(writer: &mut OwnedWriteHalf, payload: &str) -> io::Result<()> {
    writer.write_all(payload.as_bytes()).await?;
    writer.flush().await
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
