pub mod chat;
pub mod chatbot;
pub mod stomp;
