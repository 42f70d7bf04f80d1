pub mod activity;
pub mod admin;
pub mod documents;
pub mod health;
pub mod me;
mod multipart;
pub mod tasks;
