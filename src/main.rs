use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use roleplay_chat_lib::utils::log_error;
use roleplay_chat_lib::{
    init_logging, load_roster, AppConfig, GroupChatManager, HistoryMessage, HttpCompletionService,
    DEFAULT_GROUP_ID,
};

const CONSOLE_USER: &str = "console";
const MAX_CONSOLE_HISTORY: usize = 40;

fn group_from_args() -> Result<String> {
    let mut args = std::env::args().skip(1);
    let mut group = DEFAULT_GROUP_ID.to_string();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--group" => {
                group = args.next().context("--group needs a value")?;
            }
            other => bail!("unknown argument: {}", other),
        }
    }
    Ok(group)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let group_id = group_from_args()?;
    let config = AppConfig::from_env()?;
    let roster = load_roster(config.roster_path.as_deref())?;
    if roster.group(&group_id).is_none() {
        bail!("group {} is not defined in the roster", group_id);
    }

    let completion = Arc::new(HttpCompletionService::from_config(&config)?);
    let manager = GroupChatManager::new(roster, completion, config.default_max_tokens);

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("[{}] /reset 重置对话，/quit 退出\n", group_id).as_bytes())
        .await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<HistoryMessage> = Vec::new();

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                manager.reset_context(CONSOLE_USER, &group_id).await;
                history.clear();
                stdout.write_all("（对话已重置）\n".as_bytes()).await?;
                continue;
            }
            _ => {}
        }

        let reply = match manager
            .process_group_message(CONSOLE_USER, &group_id, input, &history)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                log_error("console", format!("turn failed: {}", err));
                continue;
            }
        };

        history.push(HistoryMessage::user(input));
        history.push(HistoryMessage::persona(&reply.chosen_persona, &reply.reply));
        if history.len() > MAX_CONSOLE_HISTORY {
            let excess = history.len() - MAX_CONSOLE_HISTORY;
            history.drain(..excess);
        }

        stdout
            .write_all(format!("{}: {}\n", reply.chosen_persona, reply.reply).as_bytes())
            .await?;
        stdout.flush().await?;
    }

    Ok(())
}
