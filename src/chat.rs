//! Support conversation per signed-in account
//!
//! Every conversation opens with two greetings from support. A text
//! message gets a scripted acknowledgement after a short delay; image
//! attachments do not.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::transfer::{Scheduler, TimerKey};

const GREETINGS: &[&str] = &[
    "Welcome to Thelden! How can I help you today?",
    "You can ask me about movies, your account, or report any issues.",
];

/// Characters of the user's message quoted back in the reply
const QUOTED_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Me,
    Them,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: u64,
    pub text: Option<String>,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

/// The conversation that last changed
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatUpdate {
    pub email: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Default)]
struct ChatState {
    histories: HashMap<String, Vec<Message>>,
    next_id: u64,
}

impl ChatState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// The conversation for `email`, opened with the greetings if new
    fn conversation(&mut self, email: &str) -> &mut Vec<Message> {
        if !self.histories.contains_key(email) {
            let now = Utc::now();
            let greetings: Vec<Message> = GREETINGS
                .iter()
                .map(|text| Message {
                    id: self.next_id(),
                    text: Some(text.to_string()),
                    image_url: None,
                    sender: Sender::Them,
                    timestamp: now,
                })
                .collect();
            self.histories.insert(email.to_string(), greetings);
        }
        self.histories.entry(email.to_string()).or_default()
    }

    fn push(
        &mut self,
        email: &str,
        text: Option<String>,
        image_url: Option<String>,
        sender: Sender,
    ) -> Message {
        let message = Message {
            id: self.next_id(),
            text,
            image_url,
            sender,
            timestamp: Utc::now(),
        };
        self.conversation(email).push(message.clone());
        message
    }

    fn update(&self, email: &str) -> ChatUpdate {
        ChatUpdate {
            email: email.to_string(),
            messages: self.histories.get(email).cloned().unwrap_or_default(),
        }
    }
}

fn reply_to(text: &str) -> String {
    let quoted: String = text.chars().take(QUOTED_CHARS).collect();
    format!(
        "Thanks for your message! Our team will look into \"{quoted}...\" and get back to you shortly."
    )
}

#[derive(Debug)]
pub struct SupportChat {
    state: Arc<Mutex<ChatState>>,
    scheduler: Scheduler,
    reply_delay: Duration,
    updates: Arc<watch::Sender<ChatUpdate>>,
}

impl SupportChat {
    pub fn new(scheduler: Scheduler, reply_delay: Duration) -> Self {
        let (updates, _) = watch::channel(ChatUpdate::default());
        Self {
            state: Arc::new(Mutex::new(ChatState::default())),
            scheduler,
            reply_delay,
            updates: Arc::new(updates),
        }
    }

    /// Messages for `email`, oldest first. Opens the conversation on first
    /// use.
    pub fn history(&self, email: &str) -> Vec<Message> {
        self.state.lock().conversation(email).clone()
    }

    /// Send a text message; support answers after the reply delay
    pub fn send_message(&self, email: &str, text: &str) -> Result<Message> {
        if text.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }

        let message = {
            let mut state = self.state.lock();
            let message = state.push(email, Some(text.to_string()), None, Sender::Me);
            self.updates.send_replace(state.update(email));
            message
        };
        debug!(email = %email, id = message.id, "Chat message sent");

        let state = Arc::clone(&self.state);
        let updates = Arc::clone(&self.updates);
        let reply = reply_to(text);
        let owner = email.to_string();
        let key = TimerKey::ChatReply {
            email: owner.clone(),
            message: message.id,
        };
        self.scheduler.after(key, self.reply_delay, move || {
            let mut state = state.lock();
            state.push(&owner, Some(reply), None, Sender::Them);
            updates.send_replace(state.update(&owner));
        });

        Ok(message)
    }

    /// Send an image. Attachments get no scripted reply.
    pub fn send_attachment(&self, email: &str, image_url: &str) -> Result<Message> {
        if image_url.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }

        let mut state = self.state.lock();
        let message = state.push(email, None, Some(image_url.to_string()), Sender::Me);
        self.updates.send_replace(state.update(email));
        debug!(email = %email, id = message.id, "Chat attachment sent");
        Ok(message)
    }

    /// Drop replies still pending for `email`. The history is kept.
    pub fn cancel_replies(&self, email: &str) -> usize {
        let cancelled = self.scheduler.cancel_chat(email);
        if cancelled > 0 {
            info!(email = %email, cancelled, "Dropped pending support replies");
        }
        cancelled
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatUpdate> {
        self.updates.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use tokio::time;

    use super::*;

    const EMAIL: &str = "viewer@example.com";

    fn chat() -> SupportChat {
        SupportChat::new(Scheduler::new().unwrap(), Duration::from_millis(1500))
    }

    fn texts(messages: &[Message]) -> Vec<(Sender, String)> {
        messages
            .iter()
            .map(|m| (m.sender, m.text.clone().unwrap_or_default()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_conversation_opens_with_greetings() {
        let chat = chat();
        let history = chat.history(EMAIL);
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|m| m.sender == Sender::Them));
        assert_eq!(
            history[0].text.as_deref(),
            Some("Welcome to Thelden! How can I help you today?")
        );

        // Reopening does not greet twice
        assert_eq!(chat.history(EMAIL), history);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_arrives_after_delay() {
        let chat = chat();
        chat.send_message(EMAIL, "My download is stuck at 40 percent").unwrap();
        assert_eq!(chat.history(EMAIL).len(), 3);

        time::sleep(Duration::from_millis(1400)).await;
        assert_eq!(chat.history(EMAIL).len(), 3);

        time::sleep(Duration::from_millis(200)).await;
        let history = chat.history(EMAIL);
        let expected = "Thanks for your message! Our team will look into \
                        \"My download is stuck...\" and get back to you shortly.";
        assert_eq!(texts(&history[3..]), vec![(Sender::Them, expected.to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_message_gets_its_own_reply() {
        let chat = chat();
        chat.send_message(EMAIL, "one").unwrap();
        time::sleep(Duration::from_millis(500)).await;
        chat.send_message(EMAIL, "two").unwrap();

        time::sleep(Duration::from_secs(3)).await;
        let senders: Vec<_> = chat.history(EMAIL)[2..].iter().map(|m| m.sender).collect();
        assert_eq!(senders, vec![Sender::Me, Sender::Me, Sender::Them, Sender::Them]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attachment_gets_no_reply() {
        let chat = chat();
        let sent = chat.send_attachment(EMAIL, "blob:screenshot").unwrap();
        assert_eq!(sent.image_url.as_deref(), Some("blob:screenshot"));
        assert!(sent.text.is_none());

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(chat.history(EMAIL).len(), 3);
        assert!(matches!(
            chat.send_attachment(EMAIL, " "),
            Err(Error::EmptyMessage)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_message_rejected() {
        let chat = chat();
        assert!(matches!(
            chat.send_message(EMAIL, "   "),
            Err(Error::EmptyMessage)
        ));
        assert_eq!(chat.history(EMAIL).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_reply_never_arrives() {
        let chat = chat();
        chat.send_message(EMAIL, "hello").unwrap();
        chat.send_message("other@example.com", "hi").unwrap();

        assert_eq!(chat.cancel_replies(EMAIL), 1);
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(chat.history(EMAIL).len(), 3);
        assert_eq!(chat.history("other@example.com").len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_reply() {
        let chat = chat();
        let mut rx = chat.subscribe();
        chat.send_message(EMAIL, "ping").unwrap();
        rx.borrow_and_update();

        rx.changed().await.unwrap();
        let update = rx.borrow_and_update().clone();
        assert_eq!(update.email, EMAIL);
        assert_eq!(update.messages.last().unwrap().sender, Sender::Them);
    }
}
