//! Interactive chat session.
//!
//! Logs in, then prints every frame the server sends (replies and pushed
//! messages alike) while reading commands from stdin.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, warn};

use wirechat_core::ChatMessage;
use wirechat_protocol::{Frame, FrameReader, RequestCode, ResponseCode};

use crate::cli::Cli;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::socket::Response;

const HELP: &str = "\
commands:
  send <user> <text>   send a message
  list [pattern]       list accounts (default: *)
  view                 show queued messages
  create <user>        create an account
  delete <user>        delete an account
  help                 show this help
  quit                 leave";

/// A line typed at the chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Send { to: String, text: String },
    List(String),
    View,
    Create(String),
    Delete(String),
    Help,
    Quit,
}

impl ChatCommand {
    /// Parses one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word {
            "send" | "msg" => {
                let Some((to, text)) = rest.split_once(char::is_whitespace) else {
                    return Err("usage: send <user> <text>".into());
                };
                Self::Send {
                    to: to.to_string(),
                    text: text.trim().to_string(),
                }
            }
            "list" | "ls" => Self::List(if rest.is_empty() { "*" } else { rest }.to_string()),
            "view" => Self::View,
            "create" | "delete" if rest.is_empty() => {
                return Err(format!("usage: {} <user>", word));
            }
            "create" => Self::Create(rest.to_string()),
            "delete" => Self::Delete(rest.to_string()),
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command `{}`, try `help`", other)),
        };
        Ok(Some(command))
    }

    /// Returns the request this command sends as `username`, if any.
    pub fn to_request(&self, username: &str) -> Option<(RequestCode, String)> {
        match self {
            Self::Send { to, text } => Some((
                RequestCode::SendMessage,
                ChatMessage::new(username, to.as_str(), text.as_str()).to_payload(),
            )),
            Self::List(pattern) => Some((RequestCode::ListAccounts, pattern.clone())),
            Self::View => Some((RequestCode::ViewMessages, String::new())),
            Self::Create(name) => Some((RequestCode::CreateAccount, name.clone())),
            Self::Delete(name) => Some((RequestCode::DeleteAccount, name.clone())),
            Self::Help => None,
            Self::Quit => Some((RequestCode::Disconnect, String::new())),
        }
    }
}

/// Runs an interactive session as `username`.
pub async fn run(cli: &Cli, config: &ClientConfig, username: Option<&str>) -> ClientResult<()> {
    let username = username
        .map(str::to_owned)
        .or_else(|| config.username.clone())
        .ok_or_else(|| {
            ClientError::Config("no username given and none set in config.toml".into())
        })?;
    let timeout = super::server_settings(cli, config).timeout();

    let mut client = super::connect(cli, config).await?;
    let welcome = client
        .call(RequestCode::Login, &username)
        .await?
        .into_result()?;
    println!("{} as {}", welcome, username);
    println!("{}", HELP);

    let (reader, mut writer) = client.into_split();
    let mut printer = tokio::spawn(print_frames(reader));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            finished = &mut printer => {
                return finished
                    .map_err(|e| ClientError::Connection(format!("reader task failed: {}", e)))?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match ChatCommand::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(ChatCommand::Quit)) => break,
                    Ok(Some(ChatCommand::Help)) => println!("{}", HELP),
                    Ok(Some(command)) => {
                        if let Some((code, payload)) = command.to_request(&username) {
                            writer.write_frame(&Frame::request(code, payload)).await?;
                        }
                    }
                    Err(usage) => eprintln!("{}", usage),
                }
            }
        }
    }

    debug!("leaving chat");
    if let Err(e) = writer
        .write_frame(&Frame::request(RequestCode::Disconnect, ""))
        .await
    {
        debug!(error = %e, "failed to send disconnect");
    }
    let _ = writer.shutdown().await;
    match tokio::time::timeout(timeout, printer).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(ClientError::Connection(format!("reader task failed: {}", e))),
        Err(_) => Ok(()),
    }
}

/// Prints frames until the server closes the connection.
async fn print_frames(mut reader: FrameReader<OwnedReadHalf>) -> ClientResult<()> {
    while let Some(frame) = reader.read_frame().await? {
        let response = match Response::from_frame(frame) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "ignoring frame");
                continue;
            }
        };
        match response.status {
            ResponseCode::Success => {
                if !response.message.is_empty() {
                    println!("{}", response.message);
                }
            }
            ResponseCode::Failure => eprintln!("! {}", response.message),
            ResponseCode::Disconnect => {
                println!("{}", response.message);
                return Ok(());
            }
            ResponseCode::ProtocolErr => return Err(ClientError::Protocol(response.message)),
        }
    }
    println!("Disconnected!");
    Ok(())
}
