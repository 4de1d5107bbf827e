pub mod blog;
pub mod book_index;
pub mod contact;
pub mod converter;
pub mod error;
pub mod ingest;
pub mod layout;
pub mod model;
pub mod sanitize;
pub mod server;
pub mod store;
pub mod uploads;
