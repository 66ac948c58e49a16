pub mod chat_manager;
pub mod config;
pub mod error;
pub mod group_chat_manager;
pub mod logger;
pub mod utils;

pub use chat_manager::service::{CompletionService, HttpCompletionService};
pub use chat_manager::storage::{default_roster, load_roster, DEFAULT_GROUP_ID};
pub use chat_manager::types::{GroupDefinition, HistoryMessage, Persona, Role, Roster};
pub use chat_manager::{CharacterReply, ChatManager};
pub use config::AppConfig;
pub use error::{AppError, ServiceError, ServiceErrorKind};
pub use group_chat_manager::selection::SelectionReason;
pub use group_chat_manager::{GroupChatManager, GroupReply};
pub use logger::init_logging;
