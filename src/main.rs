use std::io::Write as _;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use murmur::config::Config;
use murmur::{ConversationSession, ConversationStore, OllamaClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    let client = OllamaClient::new(config.base_url.clone());
    let store = ConversationStore::new(config.data_dir.clone()).await?;
    let mut session = ConversationSession::new(client, store, config.default_model.clone());

    if !session.check_availability().await {
        eprintln!(
            "warning: cannot reach {} - is the model server running?",
            config.base_url
        );
    }

    println!(
        "murmur - chatting with {} at {}, /help for commands",
        session.model(),
        config.base_url
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            if !run_command(&mut session, command).await {
                break;
            }
            continue;
        }

        match session
            .send_message(line, |fragment| {
                print!("{}", fragment);
                let _ = std::io::stdout().flush();
            })
            .await
        {
            Ok(()) => println!(),
            Err(e) => eprintln!("\nerror: {}", e),
        }
    }

    Ok(())
}

/// Run one slash command. Returns false when the loop should exit.
async fn run_command(session: &mut ConversationSession, command: &str) -> bool {
    let (name, arg) = match command.split_once(' ') {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match name {
        "quit" | "q" => return false,
        "help" => {
            println!("/models            list available models");
            println!("/new [model]       start a new conversation");
            println!("/model [name]      show or change the active model");
            println!("/list              list saved conversations");
            println!("/load <id>         resume a saved conversation");
            println!("/delete <id>       delete a saved conversation");
            println!("/clear             clear the current conversation");
            println!("/quit              exit");
        }
        "models" => match session.list_models().await {
            Ok(models) => {
                for model in models {
                    println!("{}", model);
                }
            }
            Err(e) => eprintln!("error: {}", e),
        },
        "new" => {
            session.start_new_conversation(if arg.is_empty() { None } else { Some(arg) });
        }
        "model" => {
            if arg.is_empty() {
                println!("current model: {}", session.model());
            } else {
                session.set_model(arg);
            }
        }
        "list" => match session.list_conversations().await {
            Ok(summaries) => {
                for summary in summaries {
                    println!(
                        "{}  {}  {} ({} messages)",
                        summary.id,
                        summary.updated_at.format("%Y-%m-%d %H:%M"),
                        summary.title,
                        summary.message_count
                    );
                }
            }
            Err(e) => eprintln!("error: {}", e),
        },
        "load" => match session.load_conversation(arg).await {
            Ok(true) => {
                for message in session.messages() {
                    println!("{}: {}", message.role.as_str(), message.content);
                }
            }
            Ok(false) => eprintln!("no conversation with id {}", arg),
            Err(e) => eprintln!("error: {}", e),
        },
        "delete" => {
            if session.delete_conversation(arg).await {
                println!("deleted {}", arg);
            } else {
                eprintln!("no conversation with id {}", arg);
            }
        }
        "clear" => session.clear_conversation(),
        _ => eprintln!("unknown command: /{}", name),
    }
    true
}
