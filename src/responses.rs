//! Upstream response envelopes shared by the pipeline stages.

use serde::Deserialize;

use crate::types::{Comment, Ticket, User};

/// One page of the ticket listing. `next_page` is an absolute URL, or null on
/// the last page.
#[derive(Deserialize, Debug, Default)]
pub struct TicketPage {
    #[serde(default)]
    pub tickets: Vec<Ticket>,
    pub next_page: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct UserPage {
    #[serde(default)]
    pub users: Vec<User>,
    pub next_page: Option<String>,
}

#[derive(Deserialize)]
pub struct TicketResponse {
    pub ticket: Ticket,
}

#[derive(Deserialize)]
pub struct CommentsResponse {
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// Payload of the bulk "show many" endpoint.
#[derive(Deserialize)]
pub struct ShowManyResponse {
    #[serde(default)]
    pub tickets: Vec<TicketComments>,
}

/// A ticket's comment thread as embedded in a show-many payload.
#[derive(Deserialize, Debug, Clone)]
pub struct TicketComments {
    pub id: Option<u64>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Deserialize)]
pub struct MeResponse {
    pub user: Me,
}

#[derive(Deserialize)]
pub struct Me {
    pub id: Option<u64>,
}
