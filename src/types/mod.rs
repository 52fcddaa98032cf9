mod comment;
mod ticket;
mod user;

pub use comment::Comment;
pub use ticket::{CustomField, Ticket};
pub use user::{Identity, User};
