/// Browse-mode commands and autocomplete logic

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "search",
    aliases: &["s", "/"],
    usage: "search [text]",
    description: "Filter products by text (empty clears)",
  },
  Command {
    name: "category",
    aliases: &["c", "cat"],
    usage: "category [id]",
    description: "Filter products by category (empty clears)",
  },
  Command {
    name: "limit",
    aliases: &["l"],
    usage: "limit <n>",
    description: "Set page size (0 = all)",
  },
  Command {
    name: "next",
    aliases: &["n"],
    usage: "next",
    description: "Next page",
  },
  Command {
    name: "prev",
    aliases: &["p"],
    usage: "prev",
    description: "Previous page",
  },
  Command {
    name: "clear",
    aliases: &["x", "reset"],
    usage: "clear",
    description: "Reset every filter",
  },
  Command {
    name: "open",
    aliases: &["o", "show"],
    usage: "open <id>",
    description: "Show product details",
  },
  Command {
    name: "delete",
    aliases: &["d", "rm"],
    usage: "delete <id>",
    description: "Delete a product (asks for confirmation)",
  },
  Command {
    name: "yes",
    aliases: &["y"],
    usage: "yes",
    description: "Confirm the pending deletion",
  },
  Command {
    name: "no",
    aliases: &[],
    usage: "no",
    description: "Abort the pending deletion",
  },
  Command {
    name: "refresh",
    aliases: &["r"],
    usage: "refresh",
    description: "Refetch the product list",
  },
  Command {
    name: "info",
    aliases: &["i"],
    usage: "info",
    description: "Show cache status of the product list",
  },
  Command {
    name: "categories",
    aliases: &["cats"],
    usage: "categories",
    description: "List categories",
  },
  Command {
    name: "help",
    aliases: &["h", "?"],
    usage: "help",
    description: "Show commands",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Leave browse mode",
  },
];

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0));
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
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
    }
  }

  // Stable sort keeps table order within a priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Split an input line into the command it resolves to and its argument.
///
/// Resolves exact names and aliases, then unambiguous prefixes.
pub fn parse(line: &str) -> Option<(&'static Command, &str)> {
  let line = line.trim();
  if line.is_empty() {
    return None;
  }
  let (word, rest) = match line.split_once(char::is_whitespace) {
    Some((word, rest)) => (word, rest.trim()),
    None => (line, ""),
  };

  let suggestions = get_suggestions(word);
  let best = suggestions.first()?;
  let word_lower = word.to_lowercase();
  let exact = best.name == word_lower || best.aliases.contains(&word_lower.as_str());
  let unambiguous = suggestions.len() == 1 && best.name.starts_with(&word_lower);
  (exact || unambiguous).then_some((*best, rest))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    let suggestions = get_suggestions("");
    assert_eq!(suggestions.len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_match() {
    let suggestions = get_suggestions("category");
    assert_eq!(suggestions[0].name, "category");
  }

  #[test]
  fn test_alias_match() {
    let suggestions = get_suggestions("c");
    assert_eq!(suggestions[0].name, "category");
  }

  #[test]
  fn test_prefix_match() {
    let suggestions = get_suggestions("cat");
    // Alias of category beats the prefix match on categories
    assert_eq!(suggestions[0].name, "category");
    assert!(suggestions.iter().any(|c| c.name == "categories"));
  }

  #[test]
  fn test_fuzzy_match() {
    let suggestions = get_suggestions("fres");
    assert_eq!(suggestions[0].name, "refresh");
  }

  #[test]
  fn test_parse_with_argument() {
    let (cmd, arg) = parse("  search   desk lamp ").unwrap();
    assert_eq!(cmd.name, "search");
    assert_eq!(arg, "desk lamp");

    let (cmd, arg) = parse("/ lamp").unwrap();
    assert_eq!(cmd.name, "search");
    assert_eq!(arg, "lamp");
  }

  #[test]
  fn test_parse_prefix_and_unknown() {
    assert_eq!(parse("del p1").map(|(c, a)| (c.name, a)), Some(("delete", "p1")));
    assert!(parse("frobnicate").is_none());
    assert!(parse("").is_none());
  }
}
