pub mod agent;
pub mod chat;
pub mod conversation;
pub mod tooling;
