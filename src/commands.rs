/// Slash commands and lookup logic

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
  History,
  Sync,
  Refresh,
  Status,
  Help,
  Quit,
}

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
  pub kind: CommandKind,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "history",
    aliases: &["h", "log"],
    description: "Show the conversation so far",
    kind: CommandKind::History,
  },
  Command {
    name: "sync",
    aliases: &["s", "push"],
    description: "Save history to the server now",
    kind: CommandKind::Sync,
  },
  Command {
    name: "refresh",
    aliases: &["r", "pull"],
    description: "Merge in history saved from other devices",
    kind: CommandKind::Refresh,
  },
  Command {
    name: "status",
    aliases: &["st", "info"],
    description: "Show sync status",
    kind: CommandKind::Status,
  },
  Command {
    name: "help",
    aliases: &["?", "commands"],
    description: "List commands",
    kind: CommandKind::Help,
  },
  Command {
    name: "quit",
    aliases: &["q", "exit", "logout"],
    description: "Save and leave the chat",
    kind: CommandKind::Quit,
  },
];

/// What a line typed at the prompt means
#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
  Empty,
  Command(CommandKind),
  UnknownCommand(&'a str),
  Message(&'a str),
}

/// Classify a prompt line. Lines starting with `/` are commands.
pub fn parse_input(line: &str) -> Input<'_> {
  let line = line.trim();
  if line.is_empty() {
    return Input::Empty;
  }

  match line.strip_prefix('/') {
    Some(name) => {
      let name = name.trim();
      match get_suggestions(name).first() {
        Some(cmd) if !name.is_empty() => Input::Command(cmd.kind),
        _ => Input::UnknownCommand(name),
      }
    }
    None => Input::Message(line),
  }
}

/// Get suggestions for a given input, best match first
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0)); // Highest priority
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    // Prefix match on alias
    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
    }
  }

  // Sort by priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}
