//! API endpoint handlers, one module per route group.

pub mod chat;
pub mod health;
pub mod rag;
pub mod sessions;
pub mod turn;
