//! Input handling - split a command line into a tokenized command

use crate::msg::MessageTokenizedCommand;
use anyhow::{bail, Result};

/// Split `line` on whitespace, honouring single and double quotes
///
/// Returns `None` for a blank line.
pub fn tokenize(line: &str) -> Result<Option<MessageTokenizedCommand>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for ch in line.trim().chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote = Some(ch);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if let Some(q) = quote {
        bail!("Unterminated {} quote", q);
    }
    if in_word {
        words.push(current);
    }

    let mut words = words.into_iter();
    Ok(words.next().map(|command| MessageTokenizedCommand {
        command,
        args: words.collect(),
    }))
}
