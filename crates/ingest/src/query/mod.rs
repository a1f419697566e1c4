//! Query API for dashboard consumption
//!
//! Read-side functions returning data shaped for the conversation list and
//! conversation view.

mod conversations;

pub use conversations::{
    ConversationDetail, ConversationSummary, MAX_PAGE_SIZE, get_conversation_detail,
    list_conversations,
};
