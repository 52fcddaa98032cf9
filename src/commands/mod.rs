pub mod cache;
pub mod comments;
pub mod export;
pub mod init;
pub mod tickets;
pub mod users;
