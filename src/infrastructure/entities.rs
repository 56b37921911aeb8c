//! Ticket entities

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Ticket identifier, derived from the creation time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TicketId(pub u64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TicketId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().trim_start_matches('#').parse().map(TicketId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Pending,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Pending => "pending",
            TicketStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Problem category chosen during intake.
///
/// `Custom` holds a label produced by automatic classification when the user
/// picked [`Category::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Category {
    Access,
    Payment,
    Signals,
    Other,
    Custom(String),
}

impl Category {
    /// The four categories offered as buttons.
    pub const FIXED: [Category; 4] = [
        Category::Access,
        Category::Payment,
        Category::Signals,
        Category::Other,
    ];

    pub fn label(&self) -> &str {
        match self {
            Category::Access => "Access / Invitation",
            Category::Payment => "Payment / Billing",
            Category::Signals => "Signals / Trading",
            Category::Other => "Other",
            Category::Custom(label) => label,
        }
    }

    /// Short code used in callback payloads. `None` for custom labels.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Category::Access => Some("ACCESS"),
            Category::Payment => Some("PAYMENT"),
            Category::Signals => Some("SIGNALS"),
            Category::Other => Some("OTHER"),
            Category::Custom(_) => None,
        }
    }

    pub fn from_code(code: &str) -> Option<Category> {
        Category::FIXED
            .into_iter()
            .find(|category| category.code() == Some(code))
    }

    /// Maps a free-text label onto a fixed category when it names one,
    /// ignoring case and spacing around the slash.
    pub fn from_label(label: &str) -> Category {
        let squash = |s: &str| {
            s.chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_lowercase()
        };
        let wanted = squash(label);

        Category::FIXED
            .into_iter()
            .find(|category| squash(category.label()) == wanted)
            .unwrap_or_else(|| Category::Custom(label.trim().to_owned()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Ticket {
    pub id: TicketId,
    pub user_id: i64,
    pub name: String,
    pub account_ref: Option<String>,
    pub category: Category,
    pub description: String,
    pub attachment: Option<String>,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub first_response_at: Option<DateTime<Utc>>,
    pub assignee: Option<String>,
    pub csat: Option<u8>,
    pub csat_note: Option<String>,
}

impl Ticket {
    pub fn is_active(&self) -> bool {
        self.status != TicketStatus::Closed
    }

    /// Seconds between creation and the first admin reply.
    pub fn first_response_secs(&self) -> Option<i64> {
        self.first_response_at
            .map(|at| (at - self.created_at).num_seconds())
    }

    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_id_parses_with_or_without_hash() {
        assert_eq!("#1712".parse::<TicketId>().unwrap(), TicketId(1712));
        assert_eq!(" 42 ".parse::<TicketId>().unwrap(), TicketId(42));
        assert!("abc".parse::<TicketId>().is_err());
    }

    #[test]
    fn test_category_codes_round_trip() {
        for category in Category::FIXED {
            let code = category.code().unwrap();
            assert_eq!(Category::from_code(code), Some(category));
        }
        assert_eq!(Category::from_code("NOPE"), None);
    }

    #[test]
    fn test_category_from_label_matches_fixed_labels() {
        assert_eq!(Category::from_label("payment/billing"), Category::Payment);
        assert_eq!(Category::from_label("Access / Invitation"), Category::Access);
        assert_eq!(
            Category::from_label(" Refund request "),
            Category::Custom("Refund request".to_owned())
        );
    }
}
