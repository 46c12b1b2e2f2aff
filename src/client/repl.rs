//! Line-based terminal front end for `wayfarer chat`.
//!
//! Renders the conversation as it streams and maps slash commands onto
//! session operations. Ctrl-C while a reply streams cancels that reply;
//! Ctrl-C at the prompt quits.

use std::io::{self, Write};

use log::info;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::client::ChatTransport;
use crate::core::local_store::LocalStore;
use crate::core::quick_actions::{self, QUICK_ACTIONS, QuickAction};
use crate::core::session::{Applied, ChatSession, PendingReply, SendError};
use crate::core::settings::ChatSettings;
use crate::core::turn::{Role, Turn};

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Quick(&'static QuickAction),
    Retry,
    Clear,
    Settings,
    Set { key: String, value: String },
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if !line.starts_with('/') {
        return Command::Send(line.to_string());
    }

    let mut parts = line.split_whitespace();
    let name = parts.next().unwrap_or_default();
    match name {
        "/retry" => Command::Retry,
        "/clear" => Command::Clear,
        "/settings" => Command::Settings,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        "/set" => match (parts.next(), parts.next()) {
            (Some(key), Some(value)) => Command::Set {
                key: key.to_string(),
                value: value.to_string(),
            },
            _ => Command::Unknown(line.to_string()),
        },
        other => match quick_actions::find(other) {
            Some(action) => Command::Quick(action),
            None => Command::Unknown(other.to_string()),
        },
    }
}

/// How a streamed reply ended from the user's point of view.
enum ReplyEnd {
    Finished(Applied),
    Cancelled,
}

pub struct Repl<T> {
    session: ChatSession,
    transport: T,
    settings: ChatSettings,
    local: LocalStore,
}

impl<T: ChatTransport> Repl<T> {
    pub fn new(transport: T, local: LocalStore) -> Self {
        Self {
            session: ChatSession::with_local_store(local.clone()),
            settings: ChatSettings::load(&local),
            transport,
            local,
        }
    }

    pub async fn run(&mut self) -> io::Result<()> {
        self.print_welcome()?;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("\nyou › ");
            io::stdout().flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                println!();
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            match parse_command(&line) {
                Command::Send(text) => {
                    let reply = self.session.submit(&text);
                    self.respond(reply).await?;
                }
                Command::Quick(action) => {
                    println!("{} {}", action.emoji, action.prompt);
                    let reply = self.session.submit(action.prompt);
                    self.respond(reply).await?;
                }
                Command::Retry => {
                    let reply = self.session.retry();
                    self.respond(reply).await?;
                }
                Command::Clear => {
                    self.session.clear();
                    println!("Conversation cleared.");
                }
                Command::Settings => self.print_settings(),
                Command::Set { key, value } => match self.settings.set(&key, &value) {
                    Ok(()) => {
                        self.settings.save(&self.local);
                        self.print_settings();
                    }
                    Err(e) => println!("{e}"),
                },
                Command::Help => self.print_help(),
                Command::Quit => break,
                Command::Unknown(name) => println!("Unknown command {name}. Try /help."),
            }
        }

        info!("Chat session ended");
        Ok(())
    }

    async fn respond(&mut self, reply: Result<PendingReply, SendError>) -> io::Result<()> {
        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                println!("{e}");
                return Ok(());
            }
        };

        print!("\nassistant › ");
        if self.settings.animations_enabled {
            print!("…");
        }
        io::stdout().flush()?;

        let mut erase_indicator = self.settings.animations_enabled;
        let end = {
            let drive = self.session.run_reply_with(&self.transport, reply, |fragment| {
                let mut out = io::stdout().lock();
                if erase_indicator {
                    // Back over the typing indicator.
                    let _ = write!(out, "\u{8} \u{8}");
                    erase_indicator = false;
                }
                let _ = write!(out, "{fragment}");
                let _ = out.flush();
            });
            tokio::select! {
                end = drive => ReplyEnd::Finished(end),
                _ = tokio::signal::ctrl_c() => ReplyEnd::Cancelled,
            }
        };

        match end {
            ReplyEnd::Finished(Applied::Failed) => {
                if let Some(turn) = self.session.turns().last() {
                    println!("\n{}", turn.content);
                }
                println!("(type /retry to send it again)");
            }
            ReplyEnd::Finished(_) => {
                println!();
                if self.settings.sound_enabled {
                    print!("\x07");
                }
            }
            ReplyEnd::Cancelled => {
                self.session.cancel();
                println!("\n(cancelled)");
            }
        }
        io::stdout().flush()
    }

    fn print_welcome(&self) -> io::Result<()> {
        println!("Wayfarer, your travel assistant. /help lists commands.");
        if self.session.turns().is_empty() {
            println!();
            for action in &QUICK_ACTIONS {
                println!("  {:<13} {} {}", action.command, action.emoji, action.label);
            }
        } else {
            for turn in self.session.turns() {
                print_turn(turn);
            }
        }
        io::stdout().flush()
    }

    fn print_settings(&self) {
        let s = &self.settings;
        println!("animations  {}", on_off(s.animations_enabled));
        println!("sound       {}", on_off(s.sound_enabled));
        println!("speed       {}", s.response_speed);
        println!("theme       {}", s.theme);
    }

    fn print_help(&self) {
        for action in &QUICK_ACTIONS {
            println!("{:<20} {}", action.command, action.label);
        }
        println!("{:<20} resend the last failed message", "/retry");
        println!("{:<20} start over", "/clear");
        println!("{:<20} show preferences", "/settings");
        println!("{:<20} change a preference", "/set <key> <value>");
        println!("{:<20} leave", "/quit");
        println!("Ctrl-C while a reply streams cancels it.");
    }
}

fn print_turn(turn: &Turn) {
    let who = match turn.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    println!("\n{who} › {}", turn.content);
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}
