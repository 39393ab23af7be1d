/// Text command detection: `!inactive 45` style messages.
use crate::registry::CommandRegistry;
use crate::types::{CommandArg, CommandInvocation};

/// Detect a command at the start of a message. Returns `None` for ordinary
/// messages and for unknown command names.
pub fn detect_command(text: &str, prefix: &str, registry: &CommandRegistry) -> Option<CommandInvocation> {
    if prefix.is_empty() {
        return None;
    }
    let body = text.trim().strip_prefix(prefix)?;

    let (name, rest) = body
        .split_once(char::is_whitespace)
        .map(|(n, r)| (n, r.trim()))
        .unwrap_or((body, ""));
    if name.is_empty() {
        return None;
    }

    let def = registry.find(name)?;
    Some(CommandInvocation::new(def.key.clone(), parse_args(rest, &def.args)))
}

/// One whitespace-separated token per argument; the last argument takes
/// whatever text remains, so member names may contain spaces.
fn parse_args(text: &str, arg_defs: &[CommandArg]) -> Vec<String> {
    let mut result = Vec::new();
    let mut remaining = text.trim();

    for (i, _) in arg_defs.iter().enumerate() {
        if remaining.is_empty() {
            break;
        }
        if i == arg_defs.len() - 1 {
            result.push(remaining.to_string());
            break;
        }
        let (token, rest) = remaining
            .split_once(char::is_whitespace)
            .map(|(t, r)| (t, r.trim()))
            .unwrap_or((remaining, ""));
        result.push(token.to_string());
        remaining = rest;
    }
    result
}
