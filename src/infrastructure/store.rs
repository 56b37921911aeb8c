//! In-memory ticket store
//!
//! Holds every ticket together with the index of each user's single active
//! ticket. Both live behind one lock so that compound operations such as
//! "create unless one is already active" are atomic.

use crate::infrastructure::entities::{Category, Ticket, TicketId, TicketStatus};
use chrono::{DateTime, Utc};
use di::{inject, injectable};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TicketError {
    #[error("ticket #{0} not found")]
    NotFound(TicketId),

    #[error("ticket #{0} is already closed")]
    Closed(TicketId),

    #[error("user already has active ticket #{0}")]
    AlreadyActive(TicketId),

    #[error("no active ticket for this user")]
    NoActiveTicket,

    #[error("ticket #{0} belongs to another user")]
    NotOwner(TicketId),

    #[error("satisfaction score must be between 1 and 5, got {0}")]
    InvalidScore(u8),
}

/// Fields collected by the intake flow.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTicket {
    pub user_id: i64,
    pub name: String,
    pub account_ref: Option<String>,
    pub category: Category,
    pub description: String,
    pub attachment: Option<String>,
}

/// Result of relaying an admin reply.
#[derive(Debug, Clone)]
pub struct AdminReply {
    pub ticket: Ticket,
    /// `true` when this reply moved the ticket to `pending`.
    pub first_reply: bool,
}

#[derive(Default)]
struct StoreState {
    tickets: BTreeMap<TicketId, Ticket>,
    active: HashMap<i64, TicketId>,
    last_id: u64,
}

impl StoreState {
    fn next_id(&mut self, now: DateTime<Utc>) -> TicketId {
        let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
        self.last_id = millis.max(self.last_id + 1);
        TicketId(self.last_id)
    }

    fn active_for(&self, user_id: i64) -> Option<TicketId> {
        self.active
            .get(&user_id)
            .copied()
            .filter(|id| self.tickets.get(id).is_some_and(Ticket::is_active))
    }

    fn open_mut(&mut self, id: TicketId) -> Result<&mut Ticket, TicketError> {
        match self.tickets.get_mut(&id) {
            None => Err(TicketError::NotFound(id)),
            Some(ticket) if ticket.status == TicketStatus::Closed => Err(TicketError::Closed(id)),
            Some(ticket) => Ok(ticket),
        }
    }
}

#[derive(Default)]
pub struct TicketStore {
    state: Mutex<StoreState>,
}

#[injectable]
impl TicketStore {
    #[inject]
    pub fn new() -> TicketStore {
        TicketStore::default()
    }
}

impl TicketStore {
    /// Creates a ticket unless the user already owns a non-closed one.
    pub async fn create(&self, new: NewTicket, now: DateTime<Utc>) -> Result<Ticket, TicketError> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.active_for(new.user_id) {
            return Err(TicketError::AlreadyActive(existing));
        }

        let id = state.next_id(now);
        let ticket = Ticket {
            id,
            user_id: new.user_id,
            name: new.name,
            account_ref: new.account_ref,
            category: new.category,
            description: new.description,
            attachment: new.attachment,
            status: TicketStatus::Open,
            created_at: now,
            first_response_at: None,
            assignee: None,
            csat: None,
            csat_note: None,
        };

        state.active.insert(ticket.user_id, id);
        state.tickets.insert(id, ticket.clone());

        Ok(ticket)
    }

    pub async fn active_ticket(&self, user_id: i64) -> Option<TicketId> {
        self.state.lock().await.active_for(user_id)
    }

    pub async fn get(&self, id: TicketId) -> Option<Ticket> {
        self.state.lock().await.tickets.get(&id).cloned()
    }

    /// Records an admin reply. The first reply moves the ticket to `pending`
    /// and stamps the first-response time; later replies change nothing.
    pub async fn record_admin_reply(
        &self,
        id: TicketId,
        now: DateTime<Utc>,
    ) -> Result<AdminReply, TicketError> {
        let mut state = self.state.lock().await;
        let ticket = state.open_mut(id)?;

        let first_reply = ticket.first_response_at.is_none();
        if first_reply {
            ticket.first_response_at = Some(now);
            ticket.status = TicketStatus::Pending;
        }

        Ok(AdminReply {
            ticket: ticket.clone(),
            first_reply,
        })
    }

    /// Resolves the ticket a client follow-up is aimed at: the explicit id if
    /// given, otherwise the user's active ticket. The ticket must belong to
    /// the user and must not be closed.
    pub async fn follow_up_target(
        &self,
        user_id: i64,
        explicit: Option<TicketId>,
    ) -> Result<Ticket, TicketError> {
        let state = self.state.lock().await;

        let id = match explicit {
            Some(id) => id,
            None => state
                .active_for(user_id)
                .ok_or(TicketError::NoActiveTicket)?,
        };

        let ticket = state.tickets.get(&id).ok_or(TicketError::NotFound(id))?;
        if ticket.user_id != user_id {
            return Err(TicketError::NotOwner(id));
        }
        if ticket.status == TicketStatus::Closed {
            return Err(TicketError::Closed(id));
        }

        Ok(ticket.clone())
    }

    /// Closes a ticket and drops it from the owner's active slot.
    pub async fn close(&self, id: TicketId) -> Result<Ticket, TicketError> {
        let mut state = self.state.lock().await;
        let ticket = state.open_mut(id)?;
        ticket.status = TicketStatus::Closed;
        let ticket = ticket.clone();

        if state.active.get(&ticket.user_id) == Some(&id) {
            state.active.remove(&ticket.user_id);
        }

        Ok(ticket)
    }

    pub async fn assign(&self, id: TicketId, assignee: String) -> Result<Ticket, TicketError> {
        let mut state = self.state.lock().await;
        let ticket = state.tickets.get_mut(&id).ok_or(TicketError::NotFound(id))?;
        ticket.assignee = Some(assignee);
        Ok(ticket.clone())
    }

    /// Stores a satisfaction score from the ticket owner. Status is untouched.
    pub async fn record_csat(
        &self,
        id: TicketId,
        user_id: i64,
        score: u8,
        note: Option<String>,
    ) -> Result<Ticket, TicketError> {
        if !(1..=5).contains(&score) {
            return Err(TicketError::InvalidScore(score));
        }

        let mut state = self.state.lock().await;
        let ticket = state.tickets.get_mut(&id).ok_or(TicketError::NotFound(id))?;
        if ticket.user_id != user_id {
            return Err(TicketError::NotOwner(id));
        }

        ticket.csat = Some(score);
        if note.is_some() {
            ticket.csat_note = note;
        }
        Ok(ticket.clone())
    }

    /// The most recently created tickets, oldest first.
    pub async fn recent(&self, limit: usize) -> Vec<Ticket> {
        let state = self.state.lock().await;
        let skip = state.tickets.len().saturating_sub(limit);
        state.tickets.values().skip(skip).cloned().collect()
    }

    pub async fn open_count(&self) -> usize {
        let state = self.state.lock().await;
        state.tickets.values().filter(|t| t.is_active()).count()
    }
}
