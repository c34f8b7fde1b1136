//! SQLite-backed persistence for chat history and tool-server configs.
//!
//! The [`Store`] keeps two independent record kinds:
//!
//! - **Chats** ([`ChatSession`]) are a title plus the ordered [`Message`]s of
//!   one conversation. Titles are derived from the first user message when
//!   none is given (see [`session_title`]).
//! - **Servers** ([`StoredServer`]) are saved [`mcp::ServerConfig`]s, with JSON
//!   export and import.
//!
//! Live tool-server connections are never persisted.
//!
//! # Example
//!
//! ```no_run
//! use storage::{ChatSession, Message, Store};
//!
//! let store = Store::open("deckhand.db")?;
//!
//! let mut chat = ChatSession::new();
//! chat.messages.push(Message::user("What's the weather in Seoul?"));
//! chat.messages.push(Message::model("Let me check."));
//! let chat = store.save_chat(chat)?;
//! println!("saved {} as {:?}", chat.id, chat.title);
//!
//! for summary in store.list_chats(None)? {
//!     println!("{}: {} messages", summary.title, summary.message_count);
//! }
//! # Ok::<(), storage::Error>(())
//! ```

mod chat;
mod error;
mod servers;
mod store;

pub use chat::{ChatSession, ChatSummary, DEFAULT_TITLE, Message, Role, session_title};
pub use error::{Error, Result};
pub use servers::{ImportReport, StoredServer};
pub use store::Store;
