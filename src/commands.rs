/// Command palette entries and autocomplete

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
  Movements,
  Transactions,
  Accounts,
  Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
  pub action: CommandAction,
}

impl Command {
  pub fn opens_view(&self) -> bool {
    self.action != CommandAction::Quit
  }
}

pub const COMMANDS: &[Command] = &[
  Command {
    name: "movements",
    aliases: &["m", "mv", "movement"],
    description: "Browse grouped movements",
    action: CommandAction::Movements,
  },
  Command {
    name: "transactions",
    aliases: &["t", "tx", "transaction"],
    description: "Browse transactions",
    action: CommandAction::Transactions,
  },
  Command {
    name: "accounts",
    aliases: &["a", "account"],
    description: "List accounts",
    action: CommandAction::Accounts,
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit ledgerq",
    action: CommandAction::Quit,
  },
];

/// Resolve a typed command by exact name or alias.
pub fn find_command(input: &str) -> Option<&'static Command> {
  let input = input.trim().to_lowercase();
  COMMANDS
    .iter()
    .find(|cmd| cmd.name == input || cmd.aliases.contains(&input.as_str()))
}

/// Lower is better; `None` means no match.
fn rank(cmd: &Command, input: &str) -> Option<u32> {
  if cmd.name == input {
    Some(0)
  } else if cmd.aliases.contains(&input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if cmd.aliases.iter().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if cmd.aliases.iter().any(|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}

/// Autocomplete suggestions for `input`, best match first.
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input = input.trim().to_lowercase();
  if input.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&'static Command, u32)> = COMMANDS
    .iter()
    .filter_map(|cmd| rank(cmd, &input).map(|r| (cmd, r)))
    .collect();
  // Stable, so ties keep palette order
  matches.sort_by_key(|(_, r)| *r);
  matches.into_iter().map(|(cmd, _)| cmd).collect()
}
