//! Command rewriting

use std::collections::BTreeMap;

/// Known custom commands: name -> statements it expands to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSet {
    definitions: BTreeMap<String, Vec<String>>,
}

impl CommandSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, commands: Vec<String>) {
        self.definitions.insert(name.into(), commands);
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.definitions.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Rewrites one statement (without a leading `/`) into zero or more statements.
pub trait CommandTransformer: Send + Sync {
    fn transform(&self, command: &str, commands: &CommandSet) -> Vec<String>;
}

/// Replaces a custom command with its definition, substituting `$1..$n`
/// with the call's arguments and `$*` with all of them.
#[derive(Debug, Clone, Copy, Default)]
pub struct MacroExpander;

impl CommandTransformer for MacroExpander {
    fn transform(&self, command: &str, commands: &CommandSet) -> Vec<String> {
        let mut words = command.split_whitespace();
        let Some(name) = words.next() else {
            return vec![command.to_string()];
        };
        let Some(body) = commands.get(name) else {
            return vec![command.to_string()];
        };
        let args: Vec<&str> = words.collect();
        body.iter().map(|line| substitute(line, &args)).collect()
    }
}

fn substitute(line: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'*') {
            chars.next();
            out.push_str(&args.join(" "));
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(d);
            chars.next();
        }
        match digits.parse::<usize>() {
            Ok(n) if n >= 1 => out.push_str(args.get(n - 1).copied().unwrap_or_default()),
            _ => {
                out.push('$');
                out.push_str(&digits);
            }
        }
    }
    out
}
