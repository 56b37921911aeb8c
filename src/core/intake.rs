//! Ticket intake conversation.
//!
//! A session walks a user through name, account reference, category,
//! description, attachment and confirmation. Each input produces a
//! [`Transition`]: the next session (or `None` when the flow ends), the reply
//! to show, and any side effect the caller has to carry out.

use crate::core::actions::CallbackAction;
use crate::core::traits::{Button, Outbound};
use crate::infrastructure::entities::Category;
use crate::infrastructure::store::NewTicket;

pub const SKIP_TOKEN: &str = "skip";

const NO_ACCOUNT_TOKENS: [&str; 4] = ["none", "no", "n/a", "-"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeStage {
    AskName,
    AskAccountRef,
    AskCategory,
    AskDescription,
    AskAttachment,
    Confirm,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IntakeDraft {
    pub name: String,
    pub account_ref: Option<String>,
    pub category: Option<Category>,
    pub description: String,
    pub attachment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntakeInput {
    Text(String),
    /// Platform reference of an uploaded image.
    Photo(String),
    Category(Category),
    Confirm,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntakeEffect {
    /// The user picked "Other": classify the description and adopt the label.
    Classify(String),
    /// The user confirmed: create the ticket.
    Submit(NewTicket),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub session: Option<IntakeSession>,
    pub reply: Option<Outbound>,
    pub effect: Option<IntakeEffect>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntakeSession {
    user_id: i64,
    stage: IntakeStage,
    draft: IntakeDraft,
}

impl IntakeSession {
    /// A fresh session at the first question, with the question to ask.
    pub fn start(user_id: i64) -> (IntakeSession, Outbound) {
        let session = IntakeSession {
            user_id,
            stage: IntakeStage::AskName,
            draft: IntakeDraft::default(),
        };
        let prompt = session.prompt();
        (session, prompt)
    }

    pub fn stage(&self) -> IntakeStage {
        self.stage
    }

    pub fn draft(&self) -> &IntakeDraft {
        &self.draft
    }

    /// Replaces the generic category with a classified one. Ignored once the
    /// user has moved past the attachment question.
    pub fn adopt_category(&mut self, category: Category) {
        if self.stage == IntakeStage::AskAttachment {
            self.draft.category = Some(category);
        }
    }

    pub fn advance(mut self, input: IntakeInput) -> Transition {
        match (self.stage, input) {
            (IntakeStage::AskName, IntakeInput::Text(text)) if !text.trim().is_empty() => {
                self.draft.name = text.trim().to_owned();
                self.move_to(IntakeStage::AskAccountRef)
            }
            (IntakeStage::AskAccountRef, IntakeInput::Text(text)) if !text.trim().is_empty() => {
                let text = text.trim();
                let none = NO_ACCOUNT_TOKENS
                    .iter()
                    .any(|token| token.eq_ignore_ascii_case(text));
                self.draft.account_ref = (!none).then(|| text.to_owned());
                self.move_to(IntakeStage::AskCategory)
            }
            (IntakeStage::AskCategory, IntakeInput::Category(category)) => {
                self.draft.category = Some(category);
                self.move_to(IntakeStage::AskDescription)
            }
            (IntakeStage::AskDescription, IntakeInput::Text(text)) if !text.trim().is_empty() => {
                let description = text.trim().to_owned();
                self.draft.description = description.clone();
                let needs_label = matches!(self.draft.category, None | Some(Category::Other));

                let mut transition = self.move_to(IntakeStage::AskAttachment);
                if needs_label {
                    transition.effect = Some(IntakeEffect::Classify(description));
                }
                transition
            }
            (IntakeStage::AskAttachment, IntakeInput::Photo(file_ref)) => {
                self.draft.attachment = Some(file_ref);
                self.move_to(IntakeStage::Confirm)
            }
            (IntakeStage::AskAttachment, IntakeInput::Text(text))
                if text.trim().eq_ignore_ascii_case(SKIP_TOKEN) =>
            {
                self.draft.attachment = None;
                self.move_to(IntakeStage::Confirm)
            }
            (IntakeStage::Confirm, IntakeInput::Confirm) => Transition {
                session: None,
                reply: None,
                effect: Some(IntakeEffect::Submit(self.into_ticket())),
            },
            _ => {
                let reply = self.reprompt();
                Transition {
                    session: Some(self),
                    reply: Some(reply),
                    effect: None,
                }
            }
        }
    }

    fn move_to(mut self, stage: IntakeStage) -> Transition {
        self.stage = stage;
        let reply = self.prompt();
        Transition {
            session: Some(self),
            reply: Some(reply),
            effect: None,
        }
    }

    fn into_ticket(self) -> NewTicket {
        NewTicket {
            user_id: self.user_id,
            name: self.draft.name,
            account_ref: self.draft.account_ref,
            category: self.draft.category.unwrap_or(Category::Other),
            description: self.draft.description,
            attachment: self.draft.attachment,
        }
    }

    /// The question for the current stage.
    pub fn prompt(&self) -> Outbound {
        match self.stage {
            IntakeStage::AskName => Outbound::text("OK, let's open a ticket. What is your name?"),
            IntakeStage::AskAccountRef => Outbound::text(
                "Do you have an account reference linked to your subscription? (otherwise type 'none')",
            ),
            IntakeStage::AskCategory => {
                let mut message = Outbound::text("Which category best describes the problem?");
                for category in Category::FIXED {
                    let label = category.label().to_owned();
                    message = message
                        .with_row(vec![Button::callback(label, CallbackAction::Category(category))]);
                }
                message
            }
            IntakeStage::AskDescription => {
                Outbound::text("Thanks. Briefly describe the problem, with any useful details.")
            }
            IntakeStage::AskAttachment => Outbound::text(format!(
                "Can you attach a screenshot? Send an image, or type '{SKIP_TOKEN}'."
            )),
            IntakeStage::Confirm => Outbound::text(format!("Ticket preview:\n{}", self.preview()))
                .with_row(vec![Button::callback("Send", CallbackAction::SendTicket)]),
        }
    }

    fn reprompt(&self) -> Outbound {
        let hint = match self.stage {
            IntakeStage::AskCategory => "Please pick one of the buttons below.",
            IntakeStage::AskAttachment => "Please send an image, or type 'skip'.",
            IntakeStage::Confirm => "Press Send to submit the ticket, or /support to start over.",
            _ => "Please answer with a short text message.",
        };
        let prompt = self.prompt();
        Outbound {
            text: format!("{hint}\n\n{}", prompt.text),
            keyboard: prompt.keyboard,
        }
    }

    fn preview(&self) -> String {
        let draft = &self.draft;
        format!(
            "Name: {}\nAccount: {}\nTelegram ID: {}\nCategory: {}\nDescription: {}\nScreenshot: {}",
            draft.name,
            draft.account_ref.as_deref().unwrap_or("none"),
            self.user_id,
            draft
                .category
                .as_ref()
                .map(Category::label)
                .unwrap_or("Other"),
            draft.description,
            if draft.attachment.is_some() { "attached" } else { "none" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> IntakeInput {
        IntakeInput::Text(s.to_owned())
    }

    fn step(session: IntakeSession, input: IntakeInput) -> (IntakeSession, Transition) {
        let transition = session.advance(input);
        (transition.session.clone().unwrap(), transition)
    }

    #[test]
    fn test_happy_path_submits_collected_fields() {
        let (session, _) = IntakeSession::start(42);
        let (session, _) = step(session, text("Alex"));
        let (session, _) = step(session, text("none"));
        let (session, t) = step(session, IntakeInput::Category(Category::Payment));
        assert_eq!(session.stage(), IntakeStage::AskDescription);
        assert!(t.effect.is_none());

        let (session, t) = step(session, text("card declined"));
        assert_eq!(session.stage(), IntakeStage::AskAttachment);
        assert!(t.effect.is_none());

        let (session, t) = step(session, text("SKIP"));
        assert_eq!(session.stage(), IntakeStage::Confirm);
        let preview = t.reply.unwrap();
        assert!(preview.text.contains("Name: Alex"));
        assert!(preview.text.contains("Category: Payment / Billing"));
        assert!(preview.actions().any(|a| *a == CallbackAction::SendTicket));

        let done = session.advance(IntakeInput::Confirm);
        assert!(done.session.is_none());
        assert_eq!(
            done.effect,
            Some(IntakeEffect::Submit(NewTicket {
                user_id: 42,
                name: "Alex".to_owned(),
                account_ref: None,
                category: Category::Payment,
                description: "card declined".to_owned(),
                attachment: None,
            }))
        );
    }

    #[test]
    fn test_other_category_requests_classification() {
        let (session, _) = IntakeSession::start(1);
        let (session, _) = step(session, text("Sam"));
        let (session, _) = step(session, text("JM-77"));
        let (session, _) = step(session, IntakeInput::Category(Category::Other));
        let (mut session, t) = step(session, text("my card keeps failing"));

        assert_eq!(
            t.effect,
            Some(IntakeEffect::Classify("my card keeps failing".to_owned()))
        );
        session.adopt_category(Category::Payment);
        assert_eq!(session.draft().category, Some(Category::Payment));
        assert_eq!(session.draft().account_ref.as_deref(), Some("JM-77"));
    }

    #[test]
    fn test_invalid_input_reprompts_without_advancing() {
        let (session, _) = IntakeSession::start(1);
        let (session, t) = step(session, text("   "));
        assert_eq!(session.stage(), IntakeStage::AskName);
        assert!(t.reply.is_some());

        let (session, _) = step(session, text("Alex"));
        let (session, _) = step(session, text("none"));
        let (session, t) = step(session, text("Payment please"));
        assert_eq!(session.stage(), IntakeStage::AskCategory);
        assert_eq!(t.reply.unwrap().actions().count(), 4);

        let (session, _) = step(session, IntakeInput::Category(Category::Access));
        let (session, _) = step(session, text("cannot join"));
        let (session, _) = step(session, text("maybe later"));
        assert_eq!(session.stage(), IntakeStage::AskAttachment);

        let (session, _) = step(session, IntakeInput::Photo("file-1".to_owned()));
        assert_eq!(session.stage(), IntakeStage::Confirm);
        assert_eq!(session.draft().attachment.as_deref(), Some("file-1"));

        let (session, _) = step(session, text("send it"));
        assert_eq!(session.stage(), IntakeStage::Confirm);
    }

    #[test]
    fn test_confirm_is_only_accepted_at_the_end() {
        let (session, _) = IntakeSession::start(1);
        let (session, t) = step(session, IntakeInput::Confirm);
        assert_eq!(session.stage(), IntakeStage::AskName);
        assert!(t.effect.is_none());
    }

    #[test]
    fn test_adopt_category_ignored_after_attachment_stage() {
        let (session, _) = IntakeSession::start(1);
        let (session, _) = step(session, text("Alex"));
        let (session, _) = step(session, text("none"));
        let (session, _) = step(session, IntakeInput::Category(Category::Other));
        let (session, _) = step(session, text("weird issue"));
        let (mut session, _) = step(session, text("skip"));

        session.adopt_category(Category::Access);
        assert_eq!(session.draft().category, Some(Category::Other));
    }
}
