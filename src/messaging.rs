//! Contacts, conversations and messages.
//!
//! Each collection is its own JSON array in storage. A collection that is
//! absent on open is seeded with a demo contact list, one conversation and
//! three messages, and written back so the next start sees the same data.
//! Entries that fail to parse are skipped and kept in storage as they are.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{MessagingError, StorageError};
use crate::storage::{keys, set_json, KeyValueStore};
use crate::types::{Contact, Conversation, Message, User, UserRole};

/// Replacement text of a soft-deleted message.
pub const DELETED_MESSAGE_TEXT: &str = "This message was deleted";

struct MessagingState {
    contacts: Collection<Contact>,
    conversations: Collection<Conversation>,
    messages: Collection<Message>,
}

/// One stored array. Entries that fail to parse are kept aside and written
/// back untouched, so a single bad record never costs the rest.
struct Collection<T> {
    key: &'static str,
    items: Vec<T>,
    unreadable: Vec<Value>,
}

impl<T: Serialize + DeserializeOwned> Collection<T> {
    /// Read the array under `key`. Only a missing key is seeded; a blob that
    /// is not an array reads as empty.
    fn load_or_seed(
        store: &dyn KeyValueStore,
        key: &'static str,
        seed: impl FnOnce() -> Vec<T>,
    ) -> Result<Self, StorageError> {
        let Some(raw) = store.get(key)? else {
            let collection = Self {
                key,
                items: seed(),
                unreadable: Vec::new(),
            };
            collection.save(store)?;
            log::info!("Seeded '{}' with {} default entries", key, collection.items.len());
            return Ok(collection);
        };

        let entries = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => {
                log::warn!("'{}' is not an array; treating as empty", key);
                Vec::new()
            }
            Err(e) => {
                log::warn!("'{}' is not valid JSON ({}); treating as empty", key, e);
                Vec::new()
            }
        };

        let mut items = Vec::with_capacity(entries.len());
        let mut unreadable = Vec::new();
        for entry in entries {
            match T::deserialize(&entry) {
                Ok(item) => items.push(item),
                Err(e) => {
                    log::warn!("Skipping malformed entry in '{}': {}", key, e);
                    unreadable.push(entry);
                }
            }
        }
        Ok(Self {
            key,
            items,
            unreadable,
        })
    }

    fn save(&self, store: &dyn KeyValueStore) -> Result<(), StorageError> {
        let mut all = Vec::with_capacity(self.items.len() + self.unreadable.len());
        for item in &self.items {
            let value = serde_json::to_value(item).map_err(|e| StorageError::Serialize {
                key: self.key.to_string(),
                message: e.to_string(),
            })?;
            all.push(value);
        }
        all.extend(self.unreadable.iter().cloned());
        set_json(store, self.key, &all)
    }
}

pub struct MessagingStore {
    storage: Arc<dyn KeyValueStore>,
    state: Mutex<MessagingState>,
}

impl MessagingStore {
    pub fn open(storage: Arc<dyn KeyValueStore>) -> Result<Self, StorageError> {
        let now = Utc::now();
        let contacts = Collection::load_or_seed(storage.as_ref(), keys::CONTACTS, seed_contacts)?;
        let conversations = Collection::load_or_seed(storage.as_ref(), keys::CONVERSATIONS, || {
            seed_conversations(now)
        })?;
        let messages =
            Collection::load_or_seed(storage.as_ref(), keys::MESSAGES, || seed_messages(now))?;
        log::debug!(
            "Messaging loaded: {} contacts, {} conversations, {} messages",
            contacts.items.len(),
            conversations.items.len(),
            messages.items.len()
        );
        Ok(Self {
            storage,
            state: Mutex::new(MessagingState {
                contacts,
                conversations,
                messages,
            }),
        })
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.state.lock().contacts.items.clone()
    }

    pub fn contact(&self, id: &str) -> Option<Contact> {
        self.state.lock().contacts.items.iter().find(|c| c.id == id).cloned()
    }

    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.state
            .lock()
            .conversations
            .items
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// Conversations the user takes part in.
    pub fn visible_conversations(&self, user_id: &str) -> Vec<Conversation> {
        self.state
            .lock()
            .conversations
            .items
            .iter()
            .filter(|c| c.participants.iter().any(|p| p == user_id))
            .cloned()
            .collect()
    }

    /// Visible conversations whose other participant's name or last message
    /// contains `term` (case-insensitive). Conversations whose counterpart is
    /// no longer a contact are hidden.
    pub fn search_conversations(&self, user_id: &str, term: &str) -> Vec<Conversation> {
        let term = term.to_lowercase();
        self.visible_conversations(user_id)
            .into_iter()
            .filter(|conv| {
                let Some(other) = self.other_participant(conv, user_id) else {
                    return false;
                };
                other.name.to_lowercase().contains(&term)
                    || conv
                        .last_message
                        .as_deref()
                        .is_some_and(|m| m.to_lowercase().contains(&term))
            })
            .collect()
    }

    /// The contact on the other side of `conversation`.
    pub fn other_participant(&self, conversation: &Conversation, user_id: &str) -> Option<Contact> {
        let other_id = conversation.participants.iter().find(|p| *p != user_id)?;
        self.contact(other_id)
    }

    /// Preview line for a conversation list, prefixed with "You: " when the
    /// user sent the last message.
    pub fn last_message_preview(conversation: &Conversation, user_id: &str) -> Option<String> {
        let text = conversation.last_message.as_deref()?;
        if conversation.last_message_sender_id.as_deref() == Some(user_id) {
            Some(format!("You: {}", text))
        } else {
            Some(text.to_string())
        }
    }

    /// Messages of a conversation, oldest first.
    pub fn conversation_messages(&self, conversation_id: &str) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .state
            .lock()
            .messages
            .items
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        messages
    }

    /// Open a conversation, marking it read when the other side sent the
    /// last message.
    pub fn open_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation, MessagingError> {
        let mut state = self.state.lock();
        let conv = state
            .conversations
            .items
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| MessagingError::ConversationNotFound(conversation_id.to_string()))?;

        let has_unread = conv.unread.is_some_and(|n| n > 0);
        let sent_by_other = conv.last_message_sender_id.as_deref() != Some(user_id);
        if !(has_unread && sent_by_other) {
            return Ok(conv.clone());
        }

        conv.unread = Some(0);
        let opened = conv.clone();
        state.conversations.save(self.storage.as_ref())?;
        Ok(opened)
    }

    pub fn send_message(
        &self,
        conversation_id: &str,
        sender: &User,
        text: &str,
    ) -> Result<Message, MessagingError> {
        if text.trim().is_empty() {
            return Err(MessagingError::EmptyMessage);
        }

        let mut state = self.state.lock();
        let now = Utc::now();
        let conv = state
            .conversations
            .items
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| MessagingError::ConversationNotFound(conversation_id.to_string()))?;
        conv.last_message = Some(text.to_string());
        conv.last_message_sender_id = Some(sender.id.clone());
        conv.last_timestamp = Some(now);
        conv.unread = Some(1);

        let message = Message {
            id: format!("msg-{}", Uuid::new_v4()),
            text: text.to_string(),
            sender_id: sender.id.clone(),
            sender_name: sender.name.clone(),
            conversation_id: conversation_id.to_string(),
            timestamp: now,
            is_deleted: false,
        };
        state.messages.items.push(message.clone());

        state.messages.save(self.storage.as_ref())?;
        state.conversations.save(self.storage.as_ref())?;
        log::debug!("Message {} sent in {}", message.id, conversation_id);
        Ok(message)
    }

    /// Soft-delete a message. Only its sender may delete it; anything else
    /// (including an unknown id) is a no-op returning `None`.
    pub fn delete_message(
        &self,
        message_id: &str,
        user_id: &str,
    ) -> Result<Option<Message>, StorageError> {
        let mut state = self.state.lock();
        let Some(index) = state.messages.items.iter().position(|m| m.id == message_id) else {
            return Ok(None);
        };
        if state.messages.items[index].sender_id != user_id {
            log::debug!("Refusing to delete message {} for non-sender {}", message_id, user_id);
            return Ok(None);
        }

        let conversation_id = state.messages.items[index].conversation_id.clone();
        let was_last =
            latest_message_id(&state.messages.items, &conversation_id) == Some(message_id);

        let message = &mut state.messages.items[index];
        message.text = DELETED_MESSAGE_TEXT.to_string();
        message.is_deleted = true;
        let deleted = message.clone();
        state.messages.save(self.storage.as_ref())?;

        if was_last {
            if let Some(conv) = state
                .conversations
                .items
                .iter_mut()
                .find(|c| c.id == conversation_id)
            {
                conv.last_message = Some(DELETED_MESSAGE_TEXT.to_string());
                state.conversations.save(self.storage.as_ref())?;
            }
        }
        Ok(Some(deleted))
    }

    /// Remove a conversation. Its messages stay in storage.
    pub fn delete_conversation(&self, conversation_id: &str) -> Result<bool, StorageError> {
        let mut state = self.state.lock();
        let before = state.conversations.items.len();
        state.conversations.items.retain(|c| c.id != conversation_id);
        if state.conversations.items.len() == before {
            return Ok(false);
        }
        state.conversations.save(self.storage.as_ref())?;
        Ok(true)
    }

    /// Remove a contact and every conversation that includes it.
    pub fn delete_contact(&self, contact_id: &str) -> Result<bool, StorageError> {
        let mut state = self.state.lock();
        let before = state.contacts.items.len();
        state.contacts.items.retain(|c| c.id != contact_id);
        if state.contacts.items.len() == before {
            return Ok(false);
        }
        let conversations_before = state.conversations.items.len();
        state
            .conversations
            .items
            .retain(|c| !c.participants.iter().any(|p| p == contact_id));

        state.contacts.save(self.storage.as_ref())?;
        state.conversations.save(self.storage.as_ref())?;
        log::info!(
            "Deleted contact {} and {} conversation(s)",
            contact_id,
            conversations_before - state.conversations.items.len()
        );
        Ok(true)
    }

    /// Add a contact and open an empty conversation with it.
    pub fn add_contact(
        &self,
        user_id: &str,
        name: &str,
        email: &str,
        role: UserRole,
    ) -> Result<(Contact, Conversation), MessagingError> {
        if name.trim().is_empty() || email.trim().is_empty() {
            return Err(MessagingError::MissingContactFields);
        }

        let contact = Contact {
            id: format!("contact-{}", Uuid::new_v4()),
            name: name.to_string(),
            avatar: None,
            role,
            email: email.to_string(),
        };
        let conversation = Conversation {
            id: format!("conv-{}", Uuid::new_v4()),
            participants: vec![user_id.to_string(), contact.id.clone()],
            last_message: None,
            last_message_sender_id: None,
            last_timestamp: None,
            unread: Some(0),
        };

        let mut state = self.state.lock();
        state.contacts.items.push(contact.clone());
        state.conversations.items.push(conversation.clone());
        state.contacts.save(self.storage.as_ref())?;
        state.conversations.save(self.storage.as_ref())?;
        log::info!("Added contact {} ({})", contact.name, contact.id);
        Ok((contact, conversation))
    }
}

fn latest_message_id<'a>(messages: &'a [Message], conversation_id: &str) -> Option<&'a str> {
    messages
        .iter()
        .filter(|m| m.conversation_id == conversation_id)
        .max_by_key(|m| m.timestamp)
        .map(|m| m.id.as_str())
}

fn seed_contacts() -> Vec<Contact> {
    vec![
        Contact {
            id: "1".to_string(),
            name: "John Doe".to_string(),
            avatar: Some("https://i.pravatar.cc/150?img=68".to_string()),
            role: UserRole::Client,
            email: "john@example.com".to_string(),
        },
        Contact {
            id: "2".to_string(),
            name: "Jane Smith".to_string(),
            avatar: Some("https://i.pravatar.cc/150?img=47".to_string()),
            role: UserRole::CaseManager,
            email: "jane@example.com".to_string(),
        },
    ]
}

fn seed_conversations(now: DateTime<Utc>) -> Vec<Conversation> {
    vec![Conversation {
        id: "conv-1".to_string(),
        participants: vec!["1".to_string(), "2".to_string()],
        last_message: Some("Hello, how can I help you?".to_string()),
        last_message_sender_id: Some("2".to_string()),
        last_timestamp: Some(now),
        unread: Some(0),
    }]
}

fn seed_messages(now: DateTime<Utc>) -> Vec<Message> {
    let seed = |id: &str, text: &str, sender_id: &str, sender_name: &str, minutes_ago: i64| {
        Message {
            id: id.to_string(),
            text: text.to_string(),
            sender_id: sender_id.to_string(),
            sender_name: sender_name.to_string(),
            conversation_id: "conv-1".to_string(),
            timestamp: now - Duration::minutes(minutes_ago),
            is_deleted: false,
        }
    };
    vec![
        seed("msg-1", "Hello, how can I help you?", "2", "Jane Smith", 30),
        seed("msg-2", "I need help finding housing resources.", "1", "John Doe", 25),
        seed(
            "msg-3",
            "I can help you with that. Have you checked our housing search tool in the Resources section?",
            "2",
            "Jane Smith",
            20,
        ),
    ]
}
