//! Admin side of the ticket lifecycle: notifications, replies, closing,
//! assignment and satisfaction prompts.

use crate::config::Settings;
use crate::core::actions::CallbackAction;
use crate::core::traits::{Button, DeliveryError, Notifier, Outbound};
use crate::infrastructure::entities::{Ticket, TicketId};
use crate::infrastructure::store::{TicketError, TicketStore};
use chrono::{DateTime, Utc};
use di::{Ref, inject, injectable};
use futures_util::future::join_all;
use log::{info, warn};

pub const LIST_LIMIT: usize = 50;

/// Outcome of relaying a message to the other side of a ticket.
#[derive(Debug, Clone)]
pub struct Relay {
    pub ticket: Ticket,
    pub delivered: bool,
}

pub struct AdminDesk {
    store: Ref<TicketStore>,
    notifier: Ref<dyn Notifier>,
    destinations: Vec<i64>,
}

#[injectable]
impl AdminDesk {
    #[inject]
    pub fn create(
        store: Ref<TicketStore>,
        notifier: Ref<dyn Notifier>,
        settings: Ref<Settings>,
    ) -> AdminDesk {
        AdminDesk::new(store, notifier, settings.access.admin_destinations())
    }
}

impl AdminDesk {
    pub fn new(store: Ref<TicketStore>, notifier: Ref<dyn Notifier>, destinations: Vec<i64>) -> Self {
        if destinations.is_empty() {
            warn!("no admin ids or admin group configured, tickets will not be announced");
        }

        Self {
            store,
            notifier,
            destinations,
        }
    }

    /// Sends a new ticket to every admin destination. Returns how many
    /// destinations received it; failures are logged and skipped.
    pub async fn announce(&self, ticket: &Ticket) -> usize {
        let summary = Outbound::text(format!(
            "New ticket #{}\nName: {}\nAccount: {}\nClient ID: {}\nCategory: {}\nDescription: {}",
            ticket.id,
            ticket.name,
            ticket.account_ref.as_deref().unwrap_or("none"),
            ticket.user_id,
            ticket.category,
            ticket.description,
        ))
        .with_row(vec![
            Button::callback("Reply", CallbackAction::AdminReply(ticket.id)),
            Button::callback("Close", CallbackAction::AdminClose(ticket.id)),
        ]);

        let deliveries = self.destinations.iter().map(|&chat_id| {
            let summary = summary.clone();
            async move {
                self.notifier.send(chat_id, summary).await?;
                if let Some(file_ref) = &ticket.attachment {
                    self.notifier
                        .send_photo(chat_id, file_ref, format!("Ticket #{}", ticket.id))
                        .await?;
                }
                Ok::<(), DeliveryError>(())
            }
        });

        let delivered = self.count_delivered(join_all(deliveries).await);
        info!(
            "ticket #{} announced to {delivered}/{} admin destinations",
            ticket.id,
            self.destinations.len()
        );
        delivered
    }

    /// Forwards a client follow-up to the admin destinations.
    pub async fn forward_follow_up(&self, ticket: &Ticket, text: &str) -> usize {
        let message = format!(
            "Client reply for ticket #{}\nClient {}: {text}",
            ticket.id, ticket.user_id
        );

        let deliveries = self
            .destinations
            .iter()
            .map(|&chat_id| self.notifier.send(chat_id, Outbound::text(message.clone())));

        self.count_delivered(join_all(deliveries).await)
    }

    /// Checks that a ticket can still be answered before capturing the
    /// admin's next message.
    pub async fn begin_reply(&self, id: TicketId) -> Result<Ticket, TicketError> {
        match self.store.get(id).await {
            None => Err(TicketError::NotFound(id)),
            Some(ticket) if !ticket.is_active() => Err(TicketError::Closed(id)),
            Some(ticket) => Ok(ticket),
        }
    }

    /// Relays an admin reply verbatim to the ticket owner. The first reply
    /// marks the ticket pending; that change stands even if delivery fails.
    pub async fn relay_reply(
        &self,
        id: TicketId,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Relay, TicketError> {
        let reply = self.store.record_admin_reply(id, now).await?;
        if reply.first_reply {
            info!("ticket #{id} received its first response");
        }

        let message = Outbound::text(format!("Support reply (ticket #{id}):\n{text}"));
        let delivered = match self.notifier.send(reply.ticket.user_id, message).await {
            Ok(()) => true,
            Err(e) => {
                warn!("{e}");
                false
            }
        };

        Ok(Relay {
            ticket: reply.ticket,
            delivered,
        })
    }

    /// Closes a ticket, tells the owner and asks for a satisfaction score.
    pub async fn close(&self, id: TicketId) -> Result<Ticket, TicketError> {
        let ticket = self.store.close(id).await?;
        info!("ticket #{id} closed");

        let notice = Outbound::text(format!(
            "Your ticket #{id} has been closed. If you need more help, open a new ticket with /support."
        ));
        if let Err(e) = self.notifier.send(ticket.user_id, notice).await {
            warn!("closure notice not delivered: {e}");
        }

        if let Err(e) = self.notifier.send(ticket.user_id, csat_prompt(id)).await {
            warn!("satisfaction prompt not delivered: {e}");
        }

        Ok(ticket)
    }

    pub async fn assign(&self, id: TicketId, assignee: &str) -> Result<Ticket, TicketError> {
        self.store.assign(id, assignee.to_owned()).await
    }

    pub async fn list(&self, now: DateTime<Utc>) -> String {
        let tickets = self.store.recent(LIST_LIMIT).await;
        if tickets.is_empty() {
            return "No tickets".to_owned();
        }

        tickets
            .iter()
            .map(|t| {
                format!(
                    "#{} | {} | {} | {} | {}s",
                    t.id,
                    t.status,
                    t.assignee.as_deref().unwrap_or("-"),
                    t.category,
                    t.age_secs(now)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn detail(&self, id: TicketId, now: DateTime<Utc>) -> Option<String> {
        let t = self.store.get(id).await?;
        let frt = t
            .first_response_secs()
            .map(|secs| format!("{secs}s"))
            .unwrap_or_else(|| "-".to_owned());

        Some(format!(
            "Ticket #{}\nStatus: {}\nAssignee: {}\nCategory: {}\nFRT: {frt}\nAge: {}s\nClient: {}\nName: {}\nAccount: {}\nDescription: {}\nCSAT: {}",
            t.id,
            t.status,
            t.assignee.as_deref().unwrap_or("-"),
            t.category,
            t.age_secs(now),
            t.user_id,
            t.name,
            t.account_ref.as_deref().unwrap_or("none"),
            t.description,
            t.csat.map(|score| score.to_string()).unwrap_or_else(|| "-".to_owned()),
        ))
    }

    fn count_delivered(&self, results: Vec<Result<(), DeliveryError>>) -> usize {
        results
            .into_iter()
            .filter(|result| match result {
                Ok(()) => true,
                Err(e) => {
                    warn!("{e}");
                    false
                }
            })
            .count()
    }
}

/// Five score buttons, laid out three and two.
pub fn csat_prompt(id: TicketId) -> Outbound {
    let star = |score: u8| {
        Button::callback(
            "⭐".repeat(usize::from(score)),
            CallbackAction::Csat { ticket: id, score },
        )
    };

    Outbound::text(format!(
        "Thanks for your patience. How would you rate our help with ticket #{id}?"
    ))
    .with_row((1..=3).map(star).collect())
    .with_row((4..=5).map(star).collect())
}
