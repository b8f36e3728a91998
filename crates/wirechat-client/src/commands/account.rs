//! One-shot account and message commands.
//!
//! Each command opens a connection, sends one request, prints the reply and
//! disconnects.

use tracing::debug;

use wirechat_core::ChatMessage;
use wirechat_protocol::RequestCode;

use crate::cli::Cli;
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::socket::ChatClient;

/// Create an account.
pub async fn create(cli: &Cli, config: &ClientConfig, username: &str) -> ClientResult<()> {
    request(cli, config, RequestCode::CreateAccount, username).await
}

/// Delete an account.
pub async fn delete(cli: &Cli, config: &ClientConfig, username: &str) -> ClientResult<()> {
    request(cli, config, RequestCode::DeleteAccount, username).await
}

/// List accounts matching `pattern`.
pub async fn list(cli: &Cli, config: &ClientConfig, pattern: &str) -> ClientResult<()> {
    request(cli, config, RequestCode::ListAccounts, pattern).await
}

/// Send one message from `from` to `to`.
pub async fn send(
    cli: &Cli,
    config: &ClientConfig,
    from: &str,
    to: &str,
    text: &str,
) -> ClientResult<()> {
    let message = ChatMessage::new(from, to, text);
    request(cli, config, RequestCode::SendMessage, &message.to_payload()).await
}

async fn request(
    cli: &Cli,
    config: &ClientConfig,
    code: RequestCode,
    payload: &str,
) -> ClientResult<()> {
    let mut client = super::connect(cli, config).await?;
    let result = exchange(&mut client, code, payload).await;
    if let Err(e) = client.disconnect().await {
        debug!(error = %e, "disconnect failed");
    }
    println!("{}", result?);
    Ok(())
}

/// Sends one request and returns the SUCCESS text.
pub async fn exchange(
    client: &mut ChatClient,
    code: RequestCode,
    payload: &str,
) -> ClientResult<String> {
    client.call(code, payload).await?.into_result()
}
