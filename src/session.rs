use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{io::BufReader, net::TcpStream};
use tracing::{debug, info};

use crate::{
    protocol::{self, read_line, write_line, Command},
    registry::{RegisterError, Registry, SessionHandle},
    router::Router,
};

/// Drives one participant from accept to disconnect: username handshake,
/// registration, join announcement, the read-route loop, then cleanup.
///
/// Returns an error only for handshake failures, before anything was
/// registered. Once the session is active, every I/O fault is a normal
/// disconnect: the loop ends, cleanup runs, and `Ok` comes back so one
/// client's dead socket is never treated as a server problem.
pub async fn run(stream: TcpStream, registry: Arc<Registry>, router: Router) -> Result<()> {
    let peer = stream.peer_addr().ok();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let username = handshake(&mut reader, &mut writer).await?;

    let handle = Arc::new(SessionHandle::new(username.clone(), writer));
    if let Err(RegisterError::DuplicateUsername) = registry.register(Arc::clone(&handle)).await {
        let _ = handle.send_line(&protocol::taken_line(&username)).await;
        anyhow::bail!("username '{username}' already taken");
    }

    info!(?peer, username, "client joined");
    router
        .announce(&username, &protocol::joined_line(&username))
        .await;

    // The loop result is captured, not `?`-ed, so cleanup runs on every
    // exit path.
    if let Err(err) = read_loop(&mut reader, &handle, &router).await {
        debug!(?peer, username, error = ?err, "session ended on I/O fault");
    }

    terminate(&registry, &router, &username, peer).await;
    Ok(())
}

/// Joining state: prompt for a username and read exactly one line. A peer
/// that disconnects first, or sends only whitespace, never gets registered.
async fn handshake<R, W>(reader: &mut R, writer: &mut W) -> Result<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    write_line(writer, protocol::USERNAME_PROMPT).await?;

    let username = match read_line(reader).await? {
        Some(line) => line.trim().to_string(),
        None => anyhow::bail!("connection closed before username"),
    };

    if username.is_empty() {
        write_line(writer, protocol::EMPTY_USERNAME).await?;
        anyhow::bail!("empty username");
    }

    Ok(username)
}

/// Active state: one inbound line per iteration until the peer closes or
/// errors. `/file` needs a second read for the content line, which is why
/// the loop rather than the router owns the reader.
async fn read_loop<R>(reader: &mut R, handle: &SessionHandle, router: &Router) -> std::io::Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    loop {
        let line = match read_line(reader).await? {
            Some(line) => line,
            None => return Ok(()),
        };

        match Command::parse(&line) {
            Command::Chat(text) => router.broadcast(handle.username(), text).await,
            Command::Private { target, text } => {
                router.private_message(handle, target, text).await?;
            }
            Command::File { target, filename } => {
                // Prompt and consume the content line before the lookup,
                // so a sender addressing an offline user still has its
                // content line drained rather than misread as a command.
                handle.send_line(protocol::FILE_CONTENT_PROMPT).await?;
                let content = match read_line(reader).await? {
                    Some(content) => content,
                    None => return Ok(()),
                };
                router
                    .file_transfer(handle, target, filename, &content)
                    .await?;
            }
            Command::MalformedPrivate => handle.send_line(protocol::PM_USAGE).await?,
            Command::MalformedFile => handle.send_line(protocol::FILE_USAGE).await?,
        }
    }
}

/// Terminated state: unregister, close the connection, announce the
/// departure. `unregister` returning the handle gates the announcement,
/// keeping cleanup idempotent.
async fn terminate(registry: &Registry, router: &Router, username: &str, peer: Option<SocketAddr>) {
    if let Some(handle) = registry.unregister(username).await {
        if let Err(err) = handle.shutdown().await {
            debug!(?peer, username, error = ?err, "connection did not close cleanly");
        }
        info!(?peer, username, "client disconnected");
        router
            .announce(username, &protocol::left_line(username))
            .await;
    }
}
