use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Prompt sent to every new connection before anything else.
pub const USERNAME_PROMPT: &str = "Enter your username:";
/// Prompt sent after a well-formed `/file` command; exactly one content
/// line is read in response.
pub const FILE_CONTENT_PROMPT: &str = "Send file content:";
/// Reserved sender identity for join and leave announcements.
pub const SERVER_SENDER: &str = "Server";

pub const PM_USAGE: &str = "Invalid private message format. Use /pm <username> <message>";
pub const FILE_USAGE: &str = "Invalid file sharing format. Use /file <username> <filename>";
pub const EMPTY_USERNAME: &str = "Username cannot be empty.";

/// One inbound line, classified by its command prefix. `/pm` and `/file`
/// split into at most three tokens, so the trailing field (message text or
/// filename) may itself contain spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Chat(&'a str),
    Private { target: &'a str, text: &'a str },
    File { target: &'a str, filename: &'a str },
    MalformedPrivate,
    MalformedFile,
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        if let Some(rest) = strip_command(line, "/pm") {
            return match split_target(rest) {
                Some((target, text)) => Command::Private { target, text },
                None => Command::MalformedPrivate,
            };
        }
        if let Some(rest) = strip_command(line, "/file") {
            return match split_target(rest) {
                Some((target, filename)) => Command::File { target, filename },
                None => Command::MalformedFile,
            };
        }
        Command::Chat(line)
    }
}

/// Matches `word` as the whole first token, returning the remainder.
fn strip_command<'a>(line: &'a str, word: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(word)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix(' ')
    }
}

fn split_target(rest: &str) -> Option<(&str, &str)> {
    let (target, payload) = rest.split_once(' ')?;
    if target.is_empty() || payload.is_empty() {
        return None;
    }
    Some((target, payload))
}

pub fn chat_line(sender: &str, text: &str) -> String {
    format!("{sender}: {text}")
}

pub fn private_line(sender: &str, text: &str) -> String {
    format!("[Private] {sender}: {text}")
}

pub fn private_echo_line(target: &str, text: &str) -> String {
    format!("[Private to {target}] {text}")
}

pub fn file_notice_line(sender: &str, filename: &str) -> String {
    format!("[File] {sender} sent you a file: {filename}")
}

pub fn not_found_line(target: &str) -> String {
    format!("User {target} not found.")
}

pub fn joined_line(username: &str) -> String {
    format!("{username} has joined the chat!")
}

pub fn left_line(username: &str) -> String {
    format!("{username} has left the chat.")
}

pub fn taken_line(username: &str) -> String {
    format!("Username {username} is already taken.")
}

/// Reads one line, stripping the terminator. `Ok(None)` means the peer
/// closed the connection. A blank line is returned as-is rather than
/// skipped; it is valid chat text and valid file content.
pub async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let bytes = reader.read_line(&mut line).await?;
    if bytes == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(LINE_ENDINGS).to_string()))
}

/// Writes one line with a trailing newline and flushes so peers get
/// timely delivery.
pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
