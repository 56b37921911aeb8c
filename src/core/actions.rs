//! Button callback payloads.
//!
//! Telegram limits callback data to 64 bytes, so actions are encoded as short
//! colon-separated strings such as `ADM_CLOSE:1712345678901` or
//! `CSAT:1712345678901:5`.

use crate::infrastructure::entities::{Category, TicketId};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// "Resolved" under an AI answer.
    Resolved,
    /// "Need more help" under an AI answer; enters the intake flow.
    NeedMoreHelp,
    Category(Category),
    SendTicket,
    AdminReply(TicketId),
    AdminClose(TicketId),
    Csat { ticket: TicketId, score: u8 },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized callback payload `{0}`")]
pub struct UnknownAction(pub String);

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackAction::Resolved => f.write_str("SAT_OK"),
            CallbackAction::NeedMoreHelp => f.write_str("SAT_NEED_HELP"),
            CallbackAction::Category(category) => {
                write!(f, "CAT_{}", category.code().unwrap_or("OTHER"))
            }
            CallbackAction::SendTicket => f.write_str("TICKET_SEND"),
            CallbackAction::AdminReply(id) => write!(f, "ADM_REPLY:{id}"),
            CallbackAction::AdminClose(id) => write!(f, "ADM_CLOSE:{id}"),
            CallbackAction::Csat { ticket, score } => write!(f, "CSAT:{ticket}:{score}"),
        }
    }
}

impl FromStr for CallbackAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownAction(s.to_owned());

        match s {
            "SAT_OK" => return Ok(CallbackAction::Resolved),
            "SAT_NEED_HELP" => return Ok(CallbackAction::NeedMoreHelp),
            "TICKET_SEND" => return Ok(CallbackAction::SendTicket),
            _ => {}
        }

        if let Some(code) = s.strip_prefix("CAT_") {
            return Category::from_code(code)
                .map(CallbackAction::Category)
                .ok_or_else(unknown);
        }

        let mut parts = s.split(':');
        let action = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("ADM_REPLY"), Some(id), None, None) => {
                CallbackAction::AdminReply(id.parse().map_err(|_| unknown())?)
            }
            (Some("ADM_CLOSE"), Some(id), None, None) => {
                CallbackAction::AdminClose(id.parse().map_err(|_| unknown())?)
            }
            (Some("CSAT"), Some(id), Some(score), None) => CallbackAction::Csat {
                ticket: id.parse().map_err(|_| unknown())?,
                score: score.parse().map_err(|_| unknown())?,
            },
            _ => return Err(unknown()),
        };

        Ok(action)
    }
}
