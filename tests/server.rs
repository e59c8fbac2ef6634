use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result};
use chat_relay::{server::Server, wire};
use tokio::{
    io::AsyncWriteExt,
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    sync::oneshot,
    task::JoinHandle,
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn duplicate_username_is_rejected_without_disturbing_the_holder() -> Result<()> {
    let (addr, shutdown, server) = start_server().await?;

    let (mut alice_reader, mut alice_writer) = connect_and_register(addr, "alice").await?;
    expect_payload(&mut alice_reader, "/users alice").await?;

    // Bob claims "alice": rejection payload, then the server closes.
    let (mut bob_reader, _bob_writer) = connect_and_register(addr, "alice").await?;
    expect_payload(&mut bob_reader, wire::REJECTION).await?;
    let eof = timeout(READ_TIMEOUT, wire::read_payload(&mut bob_reader))
        .await
        .context("waiting for bob's connection to close")??;
    assert_eq!(eof, None);

    // Alice's session is unaffected.
    send_payload(&mut alice_writer, "/list").await?;
    expect_payload(&mut alice_reader, "/users alice").await?;

    stop_server(shutdown, server).await;
    Ok(())
}

#[tokio::test]
async fn empty_username_is_rejected() -> Result<()> {
    let (addr, shutdown, server) = start_server().await?;

    let (mut reader, _writer) = connect_and_register(addr, "   ").await?;
    expect_payload(&mut reader, wire::REJECTION).await?;

    stop_server(shutdown, server).await;
    Ok(())
}

#[tokio::test]
async fn chat_relays_to_peers_but_never_echoes() -> Result<()> {
    let (addr, shutdown, server) = start_server().await?;

    let (mut alice_reader, mut alice_writer) = connect_and_register(addr, "alice").await?;
    expect_payload(&mut alice_reader, "/users alice").await?;
    let (mut bob_reader, _bob_writer) = connect_and_register(addr, "bob").await?;
    expect_payload(&mut bob_reader, "/users alice,bob").await?;
    expect_payload(&mut alice_reader, "/users alice,bob").await?;

    send_payload(&mut alice_writer, "hi").await?;
    expect_payload(&mut bob_reader, "alice: hi").await?;

    // Alice's next delivery is the list reply, not her own message.
    send_payload(&mut alice_writer, "/list").await?;
    expect_payload(&mut alice_reader, "/users alice,bob").await?;

    stop_server(shutdown, server).await;
    Ok(())
}

#[tokio::test]
async fn abrupt_disconnect_republishes_the_user_list() -> Result<()> {
    let (addr, shutdown, server) = start_server().await?;

    let (mut alice_reader, alice_writer) = connect_and_register(addr, "alice").await?;
    expect_payload(&mut alice_reader, "/users alice").await?;
    let (mut bob_reader, _bob_writer) = connect_and_register(addr, "bob").await?;
    expect_payload(&mut bob_reader, "/users alice,bob").await?;
    expect_payload(&mut alice_reader, "/users alice,bob").await?;

    // Alice drops without an exit token.
    drop(alice_reader);
    drop(alice_writer);

    expect_payload(&mut bob_reader, "/users bob").await?;

    stop_server(shutdown, server).await;
    Ok(())
}

#[tokio::test]
async fn exit_token_disconnects_in_any_case() -> Result<()> {
    let (addr, shutdown, server) = start_server().await?;

    let (mut alice_reader, _alice_writer) = connect_and_register(addr, "alice").await?;
    expect_payload(&mut alice_reader, "/users alice").await?;
    let (mut bob_reader, mut bob_writer) = connect_and_register(addr, "bob").await?;
    expect_payload(&mut bob_reader, "/users alice,bob").await?;
    expect_payload(&mut alice_reader, "/users alice,bob").await?;

    send_payload(&mut bob_writer, "EXIT").await?;

    expect_payload(&mut alice_reader, "/users alice").await?;
    let eof = timeout(READ_TIMEOUT, wire::read_payload(&mut bob_reader))
        .await
        .context("waiting for bob's connection to close")??;
    assert_eq!(eof, None);

    stop_server(shutdown, server).await;
    Ok(())
}

#[tokio::test]
async fn list_request_answers_only_the_requester() -> Result<()> {
    let (addr, shutdown, server) = start_server().await?;

    let (mut alice_reader, _alice_writer) = connect_and_register(addr, "alice").await?;
    expect_payload(&mut alice_reader, "/users alice").await?;
    let (mut bob_reader, mut bob_writer) = connect_and_register(addr, "bob").await?;
    expect_payload(&mut bob_reader, "/users alice,bob").await?;
    expect_payload(&mut alice_reader, "/users alice,bob").await?;

    send_payload(&mut bob_writer, "/list").await?;
    expect_payload(&mut bob_reader, "/users alice,bob").await?;

    // Alice's first delivery since the join lists is bob's chat, so
    // the list reply never reached her.
    send_payload(&mut bob_writer, "hello alice").await?;
    expect_payload(&mut alice_reader, "bob: hello alice").await?;

    stop_server(shutdown, server).await;
    Ok(())
}

async fn start_server() -> Result<(SocketAddr, oneshot::Sender<()>, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let server = Server::new(listener);
    let addr = server.local_addr()?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        let _ = server.run_until(shutdown).await;
    });

    Ok((addr, shutdown_tx, handle))
}

async fn stop_server(shutdown: oneshot::Sender<()>, server: JoinHandle<()>) {
    let _ = shutdown.send(());
    let _ = server.await;
}

async fn connect_and_register(
    addr: SocketAddr,
    username: &str,
) -> Result<(OwnedReadHalf, OwnedWriteHalf)> {
    let stream = TcpStream::connect(addr).await?;
    let (mut reader, mut writer) = stream.into_split();

    let prompt = timeout(READ_TIMEOUT, wire::read_payload(&mut reader))
        .await
        .context("waiting for username prompt")??
        .context("connection closed before prompt")?;
    assert_eq!(prompt, wire::USERNAME_PROMPT);

    send_payload(&mut writer, username).await?;
    Ok((reader, writer))
}

async fn expect_payload(reader: &mut OwnedReadHalf, expected: &str) -> Result<()> {
    let payload = timeout(READ_TIMEOUT, wire::read_payload(reader))
        .await
        .with_context(|| format!("timed out waiting for '{expected}'"))??
        .with_context(|| format!("connection closed while waiting for '{expected}'"))?;
    assert_eq!(payload, expected);
    Ok(())
}

async fn send_payload(writer: &mut OwnedWriteHalf, payload: &str) -> Result<()> {
    writer.write_all(payload.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
