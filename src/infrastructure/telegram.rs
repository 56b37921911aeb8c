//! Telegram adapter: update dispatching and outbound delivery.

use crate::core::services::{Caller, SupportService};
use crate::core::traits::{Button, DeliveryError, Notifier, Outbound};
use async_trait::async_trait;
use di::Ref;
use log::{debug, info, warn};
use teloxide::prelude::*;
use teloxide::types::{FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile};

pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn keyboard(rows: &[Vec<Button>]) -> InlineKeyboardMarkup {
    let rows = rows.iter().map(|row| {
        row.iter()
            .filter_map(|button| match button {
                Button::Callback { label, action } => {
                    Some(InlineKeyboardButton::callback(label.clone(), action.to_string()))
                }
                Button::Link { label, url } => match reqwest::Url::parse(url) {
                    Ok(url) => Some(InlineKeyboardButton::url(label.clone(), url)),
                    Err(e) => {
                        warn!("dropping link button with invalid url {url}: {e}");
                        None
                    }
                },
            })
            .collect::<Vec<_>>()
    });
    InlineKeyboardMarkup::new(rows)
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, chat_id: i64, message: Outbound) -> Result<(), DeliveryError> {
        let mut request = self.bot.send_message(ChatId(chat_id), message.text);
        if !message.keyboard.is_empty() {
            request = request.reply_markup(keyboard(&message.keyboard));
        }

        request.await.map(|_| ()).map_err(|e| DeliveryError {
            chat_id,
            reason: e.to_string(),
        })
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        file_ref: &str,
        caption: String,
    ) -> Result<(), DeliveryError> {
        self.bot
            .send_photo(ChatId(chat_id), InputFile::file_id(FileId(file_ref.to_owned())))
            .caption(caption)
            .await
            .map(|_| ())
            .map_err(|e| DeliveryError {
                chat_id,
                reason: e.to_string(),
            })
    }
}

async fn on_message(msg: Message, service: Ref<SupportService>) -> ResponseResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let from = Caller {
        user_id: user.id.0 as i64,
        chat_id: msg.chat.id.0,
    };

    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        service.handle_photo(from, &photo.file.id.to_string()).await;
        return Ok(());
    }

    match msg.text() {
        Some(text) => {
            let quoted = msg
                .reply_to_message()
                .and_then(|quoted| quoted.text().or_else(|| quoted.caption()));
            service.handle_text(from, text, quoted).await;
        }
        None => debug!("ignoring non-text message from {}", from.user_id),
    }
    Ok(())
}

async fn on_callback(bot: Bot, q: CallbackQuery, service: Ref<SupportService>) -> ResponseResult<()> {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("could not acknowledge callback: {e}");
    }

    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };

    let chat_id = match &q.message {
        Some(message) => {
            // Buttons are single use.
            if let Err(e) = bot
                .edit_message_reply_markup(message.chat().id, message.id())
                .await
            {
                debug!("could not clear keyboard: {e}");
            }
            message.chat().id.0
        }
        None => q.from.id.0 as i64,
    };

    let from = Caller {
        user_id: q.from.id.0 as i64,
        chat_id,
    };
    service.handle_callback(from, data).await;
    Ok(())
}

/// Long-polls Telegram until interrupted. Updates from one chat are handled
/// in order.
pub async fn run(bot: Bot, service: Ref<SupportService>) {
    info!("starting telegram polling");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![service])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("telegram polling stopped");
}
