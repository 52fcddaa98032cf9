//! In-memory helpdesk used by the pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::client::HelpdeskApi;
use crate::error::{ExportError, Result};
use crate::responses::{TicketComments, TicketPage, UserPage};
use crate::types::{Comment, CustomField, Ticket, User};
use crate::window::DateWindow;

#[derive(Default)]
pub struct Calls {
    pub auth: AtomicUsize,
    pub ticket_pages: AtomicUsize,
    pub user_pages: AtomicUsize,
    pub show_many: AtomicUsize,
    pub details: AtomicUsize,
    pub comments: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct MockApi {
    pub tickets: Vec<Ticket>,
    pub users: Vec<User>,
    pub comments: HashMap<u64, Vec<Comment>>,
    pub page_size: usize,
    pub auth_ok: bool,
    pub fail_ticket_page: Option<usize>,
    pub fail_user_page: Option<usize>,
    pub fail_comments: HashSet<u64>,
    pub fail_details: HashSet<u64>,
    /// Extra thread returned by every show-many call, whether asked for or not.
    pub stray_thread: Option<u64>,
    /// Comment reads that stall for the given delay before answering.
    pub slow_comments: HashMap<u64, Duration>,
    /// Make the last page point back at the second page instead of ending.
    pub cycle_pages: bool,
    pub calls: Calls,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            tickets: Vec::new(),
            users: Vec::new(),
            comments: HashMap::new(),
            page_size: 100,
            auth_ok: true,
            fail_ticket_page: None,
            fail_user_page: None,
            fail_comments: HashSet::new(),
            fail_details: HashSet::new(),
            stray_thread: None,
            slow_comments: HashMap::new(),
            cycle_pages: false,
            calls: Calls::default(),
        }
    }

    pub fn with_tickets(mut self, tickets: Vec<Ticket>) -> Self {
        self.tickets = tickets;
        self
    }

    pub fn with_users(mut self, users: Vec<User>) -> Self {
        self.users = users;
        self
    }

    pub fn with_comments(mut self, id: u64, comments: Vec<Comment>) -> Self {
        self.comments.insert(id, comments);
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    pub fn with_auth_failure(mut self) -> Self {
        self.auth_ok = false;
        self
    }

    pub fn failing_comments(mut self, id: u64) -> Self {
        self.fail_comments.insert(id);
        self
    }

    pub fn failing_details(mut self, id: u64) -> Self {
        self.fail_details.insert(id);
        self
    }

    pub fn with_slow_comments(mut self, id: u64, delay: Duration) -> Self {
        self.slow_comments.insert(id, delay);
        self
    }

    pub fn with_cycling_cursor(mut self) -> Self {
        self.cycle_pages = true;
        self
    }

    async fn enter(&self) {
        let now = self.calls.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.max_in_flight.fetch_max(now, Ordering::SeqCst);
        // Let sibling futures in the same wave start before this one ends.
        tokio::task::yield_now().await;
    }

    fn leave(&self) {
        self.calls.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn page<T: Clone>(&self, items: &[T], cursor: Option<&str>) -> (Vec<T>, usize, Option<String>) {
        let size = self.page_size;
        let index = cursor
            .and_then(|c| c.rsplit('=').next())
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);
        let start = index * size;
        let page: Vec<T> = items.iter().skip(start).take(size).cloned().collect();
        let next = if start + size < items.len() {
            Some(index + 1)
        } else if self.cycle_pages && index > 1 {
            Some(1)
        } else {
            None
        };
        let next = next.map(|n| format!("https://mock.test/page?n={n}"));
        (page, index, next)
    }
}

fn server_error() -> ExportError {
    ExportError::ApiError {
        status: 500,
        message: "internal error".to_string(),
    }
}

#[async_trait]
impl HelpdeskApi for MockApi {
    async fn validate_credentials(&self) -> Result<()> {
        self.calls.auth.fetch_add(1, Ordering::SeqCst);
        if self.auth_ok {
            Ok(())
        } else {
            Err(ExportError::AuthFailed("status 401: Couldn't authenticate you".into()))
        }
    }

    async fn ticket_page(&self, window: &DateWindow, cursor: Option<&str>) -> Result<TicketPage> {
        self.calls.ticket_pages.fetch_add(1, Ordering::SeqCst);
        let matching: Vec<Ticket> = self
            .tickets
            .iter()
            .filter(|t| t.created_at_utc().is_some_and(|at| window.contains(at)))
            .cloned()
            .collect();
        let (tickets, index, next_page) = self.page(&matching, cursor);
        if self.fail_ticket_page == Some(index) {
            return Err(server_error());
        }
        Ok(TicketPage { tickets, next_page })
    }

    async fn user_page(&self, cursor: Option<&str>) -> Result<UserPage> {
        self.calls.user_pages.fetch_add(1, Ordering::SeqCst);
        let (users, index, next_page) = self.page(&self.users, cursor);
        if self.fail_user_page == Some(index) {
            return Err(server_error());
        }
        Ok(UserPage { users, next_page })
    }

    async fn show_many_comments(&self, ids: &[u64]) -> Result<Vec<TicketComments>> {
        self.calls.show_many.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        let result = if ids.iter().any(|id| self.fail_comments.contains(id)) {
            Err(server_error())
        } else {
            let mut threads: Vec<TicketComments> = ids
                .iter()
                .filter(|id| self.tickets.iter().any(|t| t.id == **id))
                .map(|id| TicketComments {
                    id: Some(*id),
                    comments: self.comments.get(id).cloned().unwrap_or_default(),
                })
                .collect();
            if let Some(stray) = self.stray_thread {
                threads.push(TicketComments {
                    id: Some(stray),
                    comments: Vec::new(),
                });
            }
            Ok(threads)
        };
        self.leave();
        result
    }

    async fn ticket(&self, id: u64) -> Result<Ticket> {
        self.calls.details.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        let result = if self.fail_details.contains(&id) {
            Err(server_error())
        } else {
            self.tickets
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .ok_or(ExportError::ApiError {
                    status: 404,
                    message: "RecordNotFound".into(),
                })
        };
        self.leave();
        result
    }

    async fn ticket_comments(&self, id: u64) -> Result<Vec<Comment>> {
        self.calls.comments.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        if let Some(delay) = self.slow_comments.get(&id) {
            tokio::time::sleep(*delay).await;
        }
        let result = if self.fail_comments.contains(&id) {
            Err(server_error())
        } else {
            Ok(self.comments.get(&id).cloned().unwrap_or_default())
        };
        self.leave();
        result
    }
}

pub fn ticket(id: u64, created_at: &str) -> Ticket {
    Ticket {
        id,
        subject: Some(format!("Ticket {id}")),
        status: Some("open".into()),
        priority: Some("normal".into()),
        ticket_type: Some("question".into()),
        created_at: created_at.to_string(),
        updated_at: Some(created_at.to_string()),
        tags: vec!["billing".into(), "vip".into()],
        assignee_id: Some(1),
        requester_id: Some(2),
        custom_fields: vec![CustomField {
            id: 360001,
            value: json!(null),
        }],
    }
}

pub fn comment(author_id: Option<u64>, public: bool, body: &str) -> Comment {
    Comment {
        author_id,
        created_at: Some("2026-09-10T10:00:00Z".into()),
        public,
        body: body.to_string(),
    }
}

pub fn user(id: u64, name: Option<&str>, email: Option<&str>) -> User {
    User {
        id: Some(id),
        name: name.map(String::from),
        email: email.map(String::from),
    }
}
