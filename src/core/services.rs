//! Support service: routes inbound messages, commands and button presses.
//!

use crate::config::{AccessPolicy, Settings};
use crate::core::actions::CallbackAction;
use crate::core::admin::AdminDesk;
use crate::core::assistant::Assistant;
use crate::core::commands::Command;
use crate::core::faq_cache::FaqCache;
use crate::core::intake::{IntakeEffect, IntakeInput, IntakeSession};
use crate::core::knowledge::KnowledgeBase;
use crate::core::rate_limiter::{CommandClass, RateLimiter};
use crate::core::traits::{Button, Notifier, Outbound};
use crate::infrastructure::entities::TicketId;
use crate::infrastructure::store::{NewTicket, TicketError, TicketStore};
use chrono::Utc;
use di::{Ref, inject, injectable};
use log::{debug, info, warn};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tokio::sync::Mutex;

const ACCESS_DENIED: &str = "Access denied. This bot is reserved for members.";
const STAFF_ONLY: &str = "This action is reserved for admins.";
const NOT_FOUND: &str = "Ticket not found or already closed.";

const WELCOME: &str = "Welcome to the support bot ✨
- Send me a message to get help.
- Use /help to see the commands.
- Use /ask <question> to ask the AI.
- Use /id to see your Telegram ID.
- Use /support to open a ticket if needed.";

const HELP: &str = "Available commands:
/start - welcome message
/help - this help
/ask <question> - ask the AI
/id - show your Telegram ID
/support - open a ticket if the problem persists
/reply [ticket id] <message> - follow up on your open ticket
/reloadkb - reload the knowledge base (admin)
/tickets, /ticket <id>, /close <id>, /assign <id> <admin id> - ticket management (admin)";

static TICKET_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ticket\s*#(\d+)").expect("valid ticket reference regex"));

/// Where an inbound event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    pub chat_id: i64,
}

impl Caller {
    /// A private chat, where the chat id equals the user id.
    pub fn private(user_id: i64) -> Self {
        Self {
            user_id,
            chat_id: user_id,
        }
    }
}

pub struct SupportService {
    access: AccessPolicy,
    site_url: Option<String>,
    limiter: RateLimiter,
    assistant: Ref<Assistant>,
    store: Ref<TicketStore>,
    desk: Ref<AdminDesk>,
    notifier: Ref<dyn Notifier>,
    intake: Mutex<HashMap<i64, IntakeSession>>,
    reply_capture: Mutex<HashMap<i64, TicketId>>,
}

#[injectable]
impl SupportService {
    #[inject]
    pub fn create(
        settings: Ref<Settings>,
        assistant: Ref<Assistant>,
        store: Ref<TicketStore>,
        desk: Ref<AdminDesk>,
        notifier: Ref<dyn Notifier>,
    ) -> SupportService {
        SupportService {
            access: settings.access.clone(),
            site_url: settings.site_url.clone(),
            limiter: RateLimiter::new(settings.rate_limit_per_min),
            assistant,
            store,
            desk,
            notifier,
            intake: Mutex::new(HashMap::new()),
            reply_capture: Mutex::new(HashMap::new()),
        }
    }
}

impl SupportService {
    pub fn store(&self) -> &Ref<TicketStore> {
        &self.store
    }

    pub fn cache(&self) -> &Ref<FaqCache> {
        self.assistant.cache()
    }

    pub fn knowledge(&self) -> &Ref<KnowledgeBase> {
        self.assistant.knowledge()
    }

    /// Handles a text message, command or not.
    pub async fn handle_text(&self, from: Caller, text: &str, reply_to: Option<&str>) {
        if let Some(command) = Command::parse(text) {
            return self.handle_command(from, command).await;
        }

        let captured = self.reply_capture.lock().await.remove(&from.user_id);
        if let Some(ticket) = captured {
            return self.finish_admin_reply(from, ticket, text).await;
        }

        if self
            .advance_intake(from, IntakeInput::Text(text.to_owned()))
            .await
        {
            return;
        }

        if !self.access.is_authorized(from.user_id) {
            return self.reply(from, Outbound::text(ACCESS_DENIED)).await;
        }

        let referenced = reply_to
            .and_then(|quoted| TICKET_REFERENCE.captures(quoted))
            .and_then(|captures| captures[1].parse::<TicketId>().ok());
        if let Some(id) = referenced {
            if self.store.follow_up_target(from.user_id, Some(id)).await.is_ok() {
                if !self.limiter.allow(from.user_id, CommandClass::Reply).await {
                    debug!("user {} rate limited on replies", from.user_id);
                    return self
                        .reply(from, Outbound::text("Please wait before sending another reply ⏳"))
                        .await;
                }
                return self.relay_follow_up(from, id, text).await;
            }
        }

        if text.trim().is_empty() {
            return self
                .reply(from, Outbound::text("Send a text message to get help."))
                .await;
        }

        if !self.limiter.allow(from.user_id, CommandClass::Message).await {
            debug!("user {} rate limited on messages", from.user_id);
            return self
                .reply(from, Outbound::text("Please wait a moment before sending another message ⏳"))
                .await;
        }

        self.auto_answer(from, text).await
    }

    /// Handles an uploaded photo. Only the intake flow accepts photos.
    pub async fn handle_photo(&self, from: Caller, file_ref: &str) {
        if self
            .advance_intake(from, IntakeInput::Photo(file_ref.to_owned()))
            .await
        {
            return;
        }

        if self.access.is_authorized(from.user_id) {
            self.reply(from, Outbound::text("Send a text message to get help."))
                .await;
        }
    }

    /// Handles a button press carrying `data`.
    pub async fn handle_callback(&self, from: Caller, data: &str) {
        let action = match data.parse::<CallbackAction>() {
            Ok(action) => action,
            Err(e) => {
                debug!("ignoring callback from {}: {e}", from.user_id);
                return;
            }
        };

        match action {
            CallbackAction::Resolved => {
                self.reply(from, Outbound::text("Great, glad I could help! 😊"))
                    .await
            }
            CallbackAction::NeedMoreHelp => self.start_intake(from).await,
            CallbackAction::Category(category) => {
                if !self
                    .advance_intake(from, IntakeInput::Category(category))
                    .await
                {
                    self.reply_no_intake(from).await;
                }
            }
            CallbackAction::SendTicket => {
                if !self.advance_intake(from, IntakeInput::Confirm).await {
                    self.reply_no_intake(from).await;
                }
            }
            CallbackAction::AdminReply(id) => {
                if !self.is_staff(from) {
                    return self.reply(from, Outbound::text(STAFF_ONLY)).await;
                }
                match self.desk.begin_reply(id).await {
                    Ok(_) => {
                        self.reply_capture.lock().await.insert(from.user_id, id);
                        self.reply(
                            from,
                            Outbound::text(format!("Reply for ticket #{id}, type your message:")),
                        )
                        .await
                    }
                    Err(_) => self.reply(from, Outbound::text(NOT_FOUND)).await,
                }
            }
            CallbackAction::AdminClose(id) => {
                if !self.is_staff(from) {
                    return self.reply(from, Outbound::text(STAFF_ONLY)).await;
                }
                self.close_ticket(from, id).await
            }
            CallbackAction::Csat { ticket, score } => {
                match self
                    .store
                    .record_csat(ticket, from.user_id, score, None)
                    .await
                {
                    Ok(_) => {
                        info!("ticket #{ticket} rated {score}/5");
                        self.reply(from, Outbound::text("Thanks for your feedback ⭐"))
                            .await
                    }
                    Err(TicketError::InvalidScore(score)) => {
                        debug!("satisfaction score {score} rejected")
                    }
                    Err(e) => {
                        debug!("satisfaction score rejected: {e}");
                        self.reply(from, Outbound::text(NOT_FOUND)).await
                    }
                }
            }
        }
    }

    async fn handle_command(&self, from: Caller, command: Command) {
        match command {
            Command::Start => {
                let text = if self.access.is_authorized(from.user_id) {
                    WELCOME
                } else {
                    "Hello 👋! This bot is reserved for members. If you think this is a mistake, contact support."
                };
                self.reply(from, Outbound::text(text)).await
            }
            Command::Help => self.reply(from, Outbound::text(HELP)).await,
            Command::Id => {
                self.reply(
                    from,
                    Outbound::text(format!("Your Telegram ID: {}", from.user_id)),
                )
                .await
            }
            Command::Ask(question) => {
                if !self.access.is_authorized(from.user_id) {
                    return self.reply(from, Outbound::text(ACCESS_DENIED)).await;
                }
                if !self.limiter.allow(from.user_id, CommandClass::Ask).await {
                    debug!("user {} rate limited on /ask", from.user_id);
                    return self
                        .reply(from, Outbound::text("Please wait a moment before asking again ⏳"))
                        .await;
                }
                if question.is_empty() {
                    return self
                        .reply(from, Outbound::text("Usage: /ask <your question>"))
                        .await;
                }
                self.auto_answer(from, &question).await
            }
            Command::ReloadKb => {
                if !self.access.is_admin(from.user_id) {
                    return self.reply(from, Outbound::text(STAFF_ONLY)).await;
                }
                let stats = self.knowledge().reload().await;
                self.reply(
                    from,
                    Outbound::text(format!(
                        "Knowledge base reloaded: {} file(s), {} characters.",
                        stats.files, stats.chars
                    )),
                )
                .await
            }
            Command::Support => self.start_intake(from).await,
            Command::Tickets => {
                if !self.access.is_admin(from.user_id) {
                    return self.reply(from, Outbound::text(STAFF_ONLY)).await;
                }
                let listing = self.desk.list(Utc::now()).await;
                self.reply(from, Outbound::text(listing)).await
            }
            Command::Ticket(id) => {
                if !self.access.is_admin(from.user_id) {
                    return self.reply(from, Outbound::text(STAFF_ONLY)).await;
                }
                let Some(id) = id else {
                    return self.reply(from, Outbound::text("Usage: /ticket <ticket_id>")).await;
                };
                let text = self
                    .desk
                    .detail(id, Utc::now())
                    .await
                    .unwrap_or_else(|| "Ticket not found".to_owned());
                self.reply(from, Outbound::text(text)).await
            }
            Command::Close(id) => {
                if !self.access.is_admin(from.user_id) {
                    return self.reply(from, Outbound::text(STAFF_ONLY)).await;
                }
                match id {
                    Some(id) => self.close_ticket(from, id).await,
                    None => self.reply(from, Outbound::text("Usage: /close <ticket_id>")).await,
                }
            }
            Command::Assign(args) => {
                if !self.access.is_admin(from.user_id) {
                    return self.reply(from, Outbound::text(STAFF_ONLY)).await;
                }
                let Some((id, assignee)) = args else {
                    return self
                        .reply(from, Outbound::text("Usage: /assign <ticket_id> <admin_id>"))
                        .await;
                };
                let text = match self.desk.assign(id, &assignee).await {
                    Ok(_) => format!("Ticket #{id} assigned to {assignee}"),
                    Err(_) => "Ticket not found".to_owned(),
                };
                self.reply(from, Outbound::text(text)).await
            }
            Command::Reply { ticket, text } => self.reply_command(from, ticket, &text).await,
            Command::Unknown(name) => debug!("ignoring unknown command /{name}"),
        }
    }

    async fn reply_command(&self, from: Caller, ticket: Option<TicketId>, text: &str) {
        if !self.access.is_authorized(from.user_id) {
            return self.reply(from, Outbound::text(ACCESS_DENIED)).await;
        }
        if !self.limiter.allow(from.user_id, CommandClass::Reply).await {
            debug!("user {} rate limited on /reply", from.user_id);
            return self
                .reply(from, Outbound::text("Please wait before sending another reply ⏳"))
                .await;
        }

        if let (Some(id), true) = (ticket, self.access.is_admin(from.user_id)) {
            let owned_by_caller = self
                .store
                .get(id)
                .await
                .is_some_and(|t| t.user_id == from.user_id);
            if !owned_by_caller {
                if text.is_empty() {
                    return self
                        .reply(from, Outbound::text("Usage: /reply <ticket_id> <message>"))
                        .await;
                }
                return self.finish_admin_reply(from, id, text).await;
            }
        }

        match self.store.follow_up_target(from.user_id, ticket).await {
            Err(TicketError::Closed(_)) => {
                self.reply(
                    from,
                    Outbound::text(
                        "This ticket is already closed. Use /support to open a new one.",
                    ),
                )
                .await
            }
            Err(_) => {
                self.reply(
                    from,
                    Outbound::text("No open ticket found. Use /support to open one."),
                )
                .await
            }
            Ok(_) if text.is_empty() => {
                self.reply(
                    from,
                    Outbound::text("Usage: /reply [ticket_id] <your message>"),
                )
                .await
            }
            Ok(target) => self.relay_follow_up(from, target.id, text).await,
        }
    }

    async fn relay_follow_up(&self, from: Caller, id: TicketId, text: &str) {
        // Re-resolve under the store lock in case the ticket closed meanwhile.
        let ticket = match self.store.follow_up_target(from.user_id, Some(id)).await {
            Ok(ticket) => ticket,
            Err(_) => return self.reply(from, Outbound::text(NOT_FOUND)).await,
        };

        self.desk.forward_follow_up(&ticket, text).await;
        self.reply(from, Outbound::text("Message sent to support ✅"))
            .await
    }

    async fn finish_admin_reply(&self, from: Caller, id: TicketId, text: &str) {
        let text = match self.desk.relay_reply(id, text, Utc::now()).await {
            Ok(relay) if relay.delivered => "Reply delivered to the client ✅",
            Ok(_) => "The reply was recorded but could not be delivered to the client.",
            Err(_) => NOT_FOUND,
        };
        self.reply(from, Outbound::text(text)).await
    }

    async fn close_ticket(&self, from: Caller, id: TicketId) {
        let text = match self.desk.close(id).await {
            Ok(_) => format!("Ticket #{id} closed ✅"),
            Err(_) => NOT_FOUND.to_owned(),
        };
        self.reply(from, Outbound::text(text)).await
    }

    async fn start_intake(&self, from: Caller) {
        if !self.access.is_authorized(from.user_id) {
            return self.reply(from, Outbound::text(ACCESS_DENIED)).await;
        }

        if let Some(id) = self.store.active_ticket(from.user_id).await {
            self.intake.lock().await.remove(&from.user_id);
            return self
                .reply(
                    from,
                    Outbound::text(format!(
                        "You already have an open ticket: #{id}.\nReply to a support message or use /reply <your message>."
                    )),
                )
                .await;
        }

        let (session, prompt) = IntakeSession::start(from.user_id);
        self.intake.lock().await.insert(from.user_id, session);
        self.reply(from, prompt).await
    }

    /// Feeds an input to the caller's intake session. Returns `false` when
    /// the caller has no session in progress.
    async fn advance_intake(&self, from: Caller, input: IntakeInput) -> bool {
        let transition = {
            let mut sessions = self.intake.lock().await;
            let Some(session) = sessions.remove(&from.user_id) else {
                return false;
            };
            let transition = session.advance(input);
            if let Some(next) = &transition.session {
                sessions.insert(from.user_id, next.clone());
            }
            transition
        };

        match transition.effect {
            Some(IntakeEffect::Classify(description)) => {
                if let Some(category) = self.assistant.classify(&description).await {
                    debug!("classified ticket description as {category}");
                    if let Some(session) = self.intake.lock().await.get_mut(&from.user_id) {
                        session.adopt_category(category);
                    }
                }
            }
            Some(IntakeEffect::Submit(new)) => {
                self.submit_ticket(from, new).await;
            }
            None => {}
        }

        if let Some(reply) = transition.reply {
            self.reply(from, reply).await;
        }
        true
    }

    async fn submit_ticket(&self, from: Caller, new: NewTicket) {
        match self.store.create(new, Utc::now()).await {
            Ok(ticket) => {
                info!("ticket #{} created for user {}", ticket.id, ticket.user_id);
                self.desk.announce(&ticket).await;
                self.reply(
                    from,
                    Outbound::text(format!(
                        "Thank you ✅ Your request was sent to an administrator.\nYour ticket number: #{}. Keep it for follow-up.",
                        ticket.id
                    )),
                )
                .await
            }
            Err(TicketError::AlreadyActive(id)) => {
                self.reply(
                    from,
                    Outbound::text(format!(
                        "A ticket is already open: #{id}.\nUse /reply or answer a support message."
                    )),
                )
                .await
            }
            Err(e) => warn!("ticket creation failed: {e}"),
        }
    }

    async fn auto_answer(&self, from: Caller, prompt: &str) {
        let answer = self.assistant.answer(prompt).await;
        self.assistant.remember(prompt, &answer).await;
        self.reply(from, self.with_satisfaction_keyboard(answer.text))
            .await
    }

    fn with_satisfaction_keyboard(&self, text: String) -> Outbound {
        let message = Outbound::text(text).with_row(vec![
            Button::callback("👍 Resolved", CallbackAction::Resolved),
            Button::callback("❗ Need more help", CallbackAction::NeedMoreHelp),
        ]);

        match &self.site_url {
            Some(url) => message.with_row(vec![Button::link("📚 FAQ", url.clone())]),
            None => message,
        }
    }

    async fn reply_no_intake(&self, from: Caller) {
        self.reply(
            from,
            Outbound::text("No ticket in progress. Use /support to open one."),
        )
        .await
    }

    /// Button presses count as staff actions for admin ids and for anyone in
    /// the admin group chat.
    fn is_staff(&self, from: Caller) -> bool {
        self.access.is_admin(from.user_id) || self.access.admin_group == Some(from.chat_id)
    }

    async fn reply(&self, to: Caller, message: Outbound) {
        if let Err(e) = self.notifier.send(to.chat_id, message).await {
            warn!("{e}");
        }
    }
}
