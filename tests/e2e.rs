use std::{path::Path, process::Stdio, time::Duration};

use anyhow::{anyhow, Context, Result};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn cli_chat_end_to_end() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("chat_relay");

    let (mut server_child, mut server_stdout) = spawn_server(binary).await?;
    let addr = read_server_addr(&mut server_stdout).await?;

    // Drain further server logs in the background so the pipe never fills.
    let server_log_task = tokio::spawn(async move {
        drain_stdout(server_stdout).await;
    });

    let mut alice = spawn_client(binary, &addr).await?;
    alice.expect_line("Enter your username:").await?;
    alice.send_line("alice").await?;

    let mut bob = spawn_client(binary, &addr).await?;
    bob.expect_line("Enter your username:").await?;
    bob.send_line("bob").await?;

    alice.expect_line("Server: bob has joined the chat!").await?;

    // Public chat goes to bob but is not echoed to alice.
    alice.send_line("Hello from Alice").await?;
    bob.expect_line("alice: Hello from Alice").await?;

    // Private reply, with the sender-side echo.
    bob.send_line("/pm alice Hi back").await?;
    alice.expect_line("[Private] bob: Hi back").await?;
    bob.expect_line("[Private to alice] Hi back").await?;

    // One-line file transfer.
    alice.send_line("/file bob report.txt").await?;
    alice.expect_line("Send file content:").await?;
    alice.send_line("Q1 numbers").await?;
    bob.expect_line("[File] alice sent you a file: report.txt").await?;
    bob.expect_line("Q1 numbers").await?;

    // `exit` is sent as a final chat line before alice's client quits, so
    // bob sees the broadcast and then the departure announcement.
    alice.send_line("exit").await?;
    bob.expect_line("alice: exit").await?;
    bob.expect_line("Server: alice has left the chat.").await?;

    ensure_success(&mut alice.child, "alice client").await?;

    // The server keeps running after clients leave; stop it manually.
    let _ = bob.child.kill().await;
    let _ = server_child.kill().await;
    let _ = server_child.wait().await;
    let _ = server_log_task.await;

    Ok(())
}

struct ClientProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ClientProcess {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to send line '{line}'"))?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn expect_line(&mut self, expected: &str) -> Result<()> {
        let line = read_line_expect(&mut self.stdout, expected).await?;
        if line != expected {
            return Err(anyhow!("expected '{expected}', got '{line}'"));
        }
        Ok(())
    }
}

async fn spawn_server(binary: &Path) -> Result<(Child, BufReader<ChildStdout>)> {
    let mut cmd = Command::new(binary);
    cmd.arg("server")
        .arg("--listen")
        .arg("127.0.0.1:0")
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = cmd.spawn().context("failed to spawn server")?;
    let stdout = child
        .stdout
        .take()
        .context("server stdout missing after spawn")?;

    Ok((child, BufReader::new(stdout)))
}

/// Pulls the listening address out of the server banner. The log line may
/// carry timestamps or color codes, so scan for the loopback address
/// rather than splitting on whitespace.
async fn read_server_addr(reader: &mut BufReader<ChildStdout>) -> Result<String> {
    let line = read_line(reader)
        .await?
        .context("server did not emit a listening address")?;
    let start = line
        .find("127.0.0.1:")
        .with_context(|| format!("unexpected server banner: {line}"))?;
    let port: String = line[start + "127.0.0.1:".len()..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    if port.is_empty() {
        return Err(anyhow!("server banner missing port: {line}"));
    }
    Ok(format!("127.0.0.1:{port}"))
}

async fn spawn_client(binary: &Path, addr: &str) -> Result<ClientProcess> {
    let mut cmd = Command::new(binary);
    cmd.arg("client")
        .arg("--server")
        .arg(addr)
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = cmd.spawn().context("failed to spawn client")?;
    let stdin = child
        .stdin
        .take()
        .context("client stdin missing after spawn")?;
    let stdout = child
        .stdout
        .take()
        .context("client stdout missing after spawn")?;

    Ok(ClientProcess {
        child,
        stdin,
        stdout: BufReader::new(stdout),
    })
}

async fn read_line_expect(
    reader: &mut BufReader<ChildStdout>,
    description: &str,
) -> Result<String> {
    match read_line(reader).await {
        Ok(Some(line)) => Ok(line),
        Ok(None) => Err(anyhow!("waiting for '{description}': stream closed")),
        Err(err) => Err(err.context(format!("waiting for '{description}'"))),
    }
}

async fn read_line(reader: &mut BufReader<ChildStdout>) -> Result<Option<String>> {
    let mut line = String::new();
    let bytes_io = match timeout(READ_TIMEOUT, reader.read_line(&mut line)).await {
        Ok(result) => result,
        Err(_) => return Err(anyhow!("timed out waiting for line")),
    };
    let byte_count = bytes_io?;
    if byte_count == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn drain_stdout(mut reader: BufReader<ChildStdout>) {
    let mut buffer = String::new();
    while reader
        .read_line(&mut buffer)
        .await
        .map(|bytes| {
            let has_data = bytes > 0;
            if has_data {
                buffer.clear();
            }
            has_data
        })
        .unwrap_or(false)
    {}
}

async fn ensure_success(child: &mut Child, name: &str) -> Result<()> {
    let status = child
        .wait()
        .await
        .with_context(|| format!("failed to await {name} process"))?;
    if !status.success() {
        return Err(anyhow!("{name} exited with status {status}"));
    }
    Ok(())
}
