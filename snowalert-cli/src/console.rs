//! Stdin/stdout stand-in for the chat platform.

use async_trait::async_trait;
use snowalert_core::{AlertService, ChatId, CommandHandler, Notifier};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Prints alert messages as `[chat] text`.
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, chat: ChatId, text: &str) -> anyhow::Result<()> {
        println!("[{chat}] {text}");
        Ok(())
    }
}

/// Split `<chat_id> <command...>`.
fn split_line(line: &str) -> Option<(ChatId, &str)> {
    let (chat, command) = line.trim().split_once(char::is_whitespace)?;
    let chat = chat.parse::<i64>().ok()?;
    Some((ChatId(chat), command.trim()))
}

/// Feed stdin lines to the command handler until EOF or Ctrl-C.
pub async fn serve(service: Arc<AlertService>) -> anyhow::Result<()> {
    let handler = CommandHandler::new(service);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("reading `<chat_id> <command>` lines from stdin");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match split_line(&line) {
            Some((chat, command)) => {
                let reply = handler.handle(chat, command).await;
                println!("[{chat}] {reply}");
            }
            None => warn!(line = %line, "expected `<chat_id> <command>`"),
        }
    }

    Ok(())
}
