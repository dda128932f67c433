use crate::chat::{ChatService, Message, Role};
use crate::commands::{self, CommandKind, Input};
use crate::event::{Event, EventHandler};
use crate::sync::{HydrationSource, SessionSnapshot, SyncEngine};
use chrono::Local;
use color_eyre::Result;
use std::io::Write;

/// Main application state
pub struct App {
  chat: ChatService,

  /// Sync marker shown in the prompt, from the latest snapshot
  indicator: &'static str,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(chat: ChatService) -> Self {
    Self {
      chat,
      indicator: "",
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    let user = self.chat.user().display_name().to_string();
    println!("Mentoria Extraordinários · signed in as {}", user);
    println!("Type a message, or /help for commands.\n");

    for message in self.chat.engine().messages() {
      print_message(&message);
    }

    let mut events = EventHandler::new();
    let mut updates = self.chat.engine().subscribe();
    self.prompt();

    // Main loop
    while !self.should_quit {
      tokio::select! {
        event = events.next() => match event {
          Some(Event::Input(line)) => {
            self.handle_line(&line).await;
            if !self.should_quit {
              self.prompt();
            }
          }
          Some(Event::Closed) | None => self.should_quit = true,
        },
        changed = updates.changed() => {
          if changed.is_err() {
            break;
          }
          let snapshot = updates.borrow_and_update().clone();
          self.handle_snapshot(&snapshot);
        }
      }
    }

    println!("\nSaving history...");
    self.chat.close().await;
    Ok(())
  }

  async fn handle_line(&mut self, line: &str) {
    match commands::parse_input(line) {
      Input::Empty => {}
      Input::Message(text) => match self.chat.send(text).await {
        Ok(reply) => print_message(&reply.message),
        Err(e) => println!("! {}", e),
      },
      Input::Command(kind) => self.handle_command(kind).await,
      Input::UnknownCommand(name) => {
        println!("! Unknown command /{}. Type /help for the list.", name)
      }
    }
  }

  async fn handle_command(&mut self, kind: CommandKind) {
    let engine = self.chat.engine();
    match kind {
      CommandKind::History => {
        for message in engine.messages() {
          print_message(&message);
        }
      }
      CommandKind::Sync => {
        if engine.messages().is_empty() {
          println!("Nothing to save yet.");
        } else if engine.sync_now().await {
          println!("History saved.");
        } else {
          println!("Couldn't reach the server. Your messages are kept on this device.");
        }
      }
      CommandKind::Refresh => match engine.refresh_from_remote().await {
        Some(added) => println!("Fetched {} new message(s) from the server.", added),
        None => println!("Couldn't reach the server."),
      },
      CommandKind::Status => print_status(engine),
      CommandKind::Help => {
        for cmd in commands::COMMANDS {
          println!("  /{:<8} {}", cmd.name, cmd.description);
        }
      }
      CommandKind::Quit => self.should_quit = true,
    }
  }

  /// Passive sync indicator: `~` while pushing, `*` while something is unsynced.
  fn handle_snapshot(&mut self, snapshot: &SessionSnapshot) {
    self.indicator = if snapshot.is_syncing {
      "~ "
    } else if snapshot.unsynced_count() > 0 {
      "* "
    } else {
      ""
    };
  }

  fn prompt(&self) {
    print!("{}> ", self.indicator);
    let _ = std::io::stdout().flush();
  }
}

fn print_message(message: &Message) {
  let who = match message.role {
    Role::User => "you",
    Role::Assistant => "mentor",
    Role::System => "system",
  };
  let time = message.timestamp.with_timezone(&Local).format("%H:%M");
  println!("[{}] {}: {}", time, who, message.content);
}

fn print_status(engine: &SyncEngine) {
  let snapshot = engine.snapshot();
  let source = match snapshot.source {
    Some(HydrationSource::LocalCache) => "this device",
    Some(HydrationSource::Remote) => "the server",
    Some(HydrationSource::Empty) | None => "a fresh start",
  };
  println!("  messages:  {}", snapshot.messages.len());
  println!("  unsynced:  {}", snapshot.unsynced_count());
  println!("  syncing:   {}", if engine.is_syncing() { "yes" } else { "no" });
  if engine.has_pending_push() {
    println!("  a save is scheduled");
  }
  if snapshot.is_loading() {
    println!("  still loading history");
  } else {
    println!("  loaded from {}", source);
  }
}
