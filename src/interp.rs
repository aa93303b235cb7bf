//! Message interpreter: mention stripping and base-command extraction
//!
//! The parameter parser never sees the command name. This module finds the
//! registered command a message starts with and hands back the rest.

use crate::registry::{CommandDescriptor, CommandId, CommandRegistry};

/// Parsed chat message
#[derive(Debug)]
pub enum Input<'a> {
    /// `<command> [help|h] [params]`
    Command {
        command: &'a CommandDescriptor,
        args: &'a str,
        help: bool,
    },
    /// Text that doesn't start with a registered command
    Unknown(&'a str),
    /// Nothing left after stripping the mention
    Empty,
}

/// Drop a leading bot mention
///
/// `<@U123>` is always the bot (Slack only delivers messages that mention
/// it). `@name` is only stripped when `name` is `bot_name`.
pub fn strip_mention<'a>(text: &'a str, bot_name: &str) -> &'a str {
    let text = text.trim();

    if let Some(rest) = text.strip_prefix("<@") {
        if let Some(end) = rest.find('>') {
            return rest[end + 1..].trim();
        }
    } else if let Some(rest) = text.strip_prefix('@') {
        let (name, tail) = match rest.find(char::is_whitespace) {
            Some(pos) => (&rest[..pos], rest[pos..].trim()),
            None => (rest, ""),
        };
        if name.eq_ignore_ascii_case(bot_name) {
            return tail;
        }
    }

    text
}

/// Parse raw message text into structured form
pub fn parse<'a>(registry: &'a CommandRegistry, text: &'a str, bot_name: &str) -> Input<'a> {
    let text = strip_mention(text, bot_name);

    if text.is_empty() {
        return Input::Empty;
    }

    let Some((command, rest)) = registry.match_prefix(text) else {
        return Input::Unknown(text);
    };

    // `help` takes a command name as its argument, so never treat it as a help token
    if command.command != CommandId::Help {
        let (first, tail) = match rest.find(char::is_whitespace) {
            Some(pos) => (&rest[..pos], rest[pos..].trim_start()),
            None => (rest, ""),
        };
        if first.eq_ignore_ascii_case("help") || first.eq_ignore_ascii_case("h") {
            return Input::Command {
                command,
                args: tail,
                help: true,
            };
        }
    }

    Input::Command {
        command,
        args: rest,
        help: false,
    }
}
