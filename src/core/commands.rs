//! Slash-command parsing.

use crate::infrastructure::entities::TicketId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Ask(String),
    Id,
    ReloadKb,
    Support,
    Tickets,
    /// `None` when the id is missing or malformed.
    Ticket(Option<TicketId>),
    Close(Option<TicketId>),
    Assign(Option<(TicketId, String)>),
    Reply {
        ticket: Option<TicketId>,
        text: String,
    },
    Unknown(String),
}

impl Command {
    /// Parses `/name[@bot] args...`. Returns `None` for text that is not a command.
    pub fn parse(text: &str) -> Option<Command> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;

        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or(head).to_lowercase();

        let command = match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "ask" => Command::Ask(args.to_owned()),
            "id" => Command::Id,
            "reloadkb" => Command::ReloadKb,
            "support" => Command::Support,
            "tickets" => Command::Tickets,
            "ticket" => Command::Ticket(first_ticket_id(args)),
            "close" => Command::Close(first_ticket_id(args)),
            "assign" => {
                let mut words = args.split_whitespace();
                let parsed = match (words.next(), words.next()) {
                    (Some(id), Some(admin)) => id.parse().ok().map(|id| (id, admin.to_owned())),
                    _ => None,
                };
                Command::Assign(parsed)
            }
            "reply" => parse_reply(args),
            _ => Command::Unknown(name),
        };

        Some(command)
    }
}

fn first_ticket_id(args: &str) -> Option<TicketId> {
    args.split_whitespace().next()?.parse().ok()
}

/// The ticket id is optional: a leading all-digit word (optionally `#`-prefixed)
/// is taken as the id, everything else is the message.
fn parse_reply(args: &str) -> Command {
    let (first, rest) = match args.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim()),
        None => (args, ""),
    };

    let digits = first.trim_start_matches('#');
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(id) = digits.parse() {
            return Command::Reply {
                ticket: Some(id),
                text: rest.to_owned(),
            };
        }
    }

    Command::Reply {
        ticket: None,
        text: args.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(Command::parse("hello"), None);
    }

    #[test]
    fn test_strips_bot_mention() {
        assert_eq!(Command::parse("/support@desk_bot"), Some(Command::Support));
        assert_eq!(
            Command::parse("/ask@desk_bot  how do I pay? "),
            Some(Command::Ask("how do I pay?".to_owned()))
        );
    }

    #[test]
    fn test_ticket_arguments() {
        assert_eq!(
            Command::parse("/ticket 1712"),
            Some(Command::Ticket(Some(TicketId(1712))))
        );
        assert_eq!(Command::parse("/close"), Some(Command::Close(None)));
        assert_eq!(Command::parse("/close nope"), Some(Command::Close(None)));
        assert_eq!(
            Command::parse("/assign 1712 42"),
            Some(Command::Assign(Some((TicketId(1712), "42".to_owned()))))
        );
        assert_eq!(Command::parse("/assign 1712"), Some(Command::Assign(None)));
    }

    #[test]
    fn test_reply_with_and_without_ticket_id() {
        assert_eq!(
            Command::parse("/reply 1712 still broken"),
            Some(Command::Reply {
                ticket: Some(TicketId(1712)),
                text: "still broken".to_owned()
            })
        );
        assert_eq!(
            Command::parse("/reply still broken"),
            Some(Command::Reply {
                ticket: None,
                text: "still broken".to_owned()
            })
        );
        assert_eq!(
            Command::parse("/reply"),
            Some(Command::Reply {
                ticket: None,
                text: String::new()
            })
        );
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            Command::parse("/Frobnicate x"),
            Some(Command::Unknown("frobnicate".to_owned()))
        );
    }
}
