pub mod config;
pub mod context;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod language;
pub mod message;
pub mod notebook;
pub mod notes;
pub mod position;
pub mod response;
