pub mod document;
pub mod user;
pub mod work_log;
