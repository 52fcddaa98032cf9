use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::Credentials;
use crate::error::{ExportError, Result};
use crate::responses::{
    CommentsResponse, MeResponse, ShowManyResponse, TicketComments, TicketPage, TicketResponse,
    UserPage,
};
use crate::types::{Comment, Ticket};
use crate::window::DateWindow;

/// Largest page the listing endpoints accept.
pub const PAGE_SIZE: u32 = 100;

/// The upstream operations the export pipeline needs. Every stage talks to the
/// helpdesk through this trait so they can run against a fake in tests.
#[async_trait]
pub trait HelpdeskApi: Send + Sync {
    /// Check that the configured credentials are accepted.
    async fn validate_credentials(&self) -> Result<()>;

    /// Fetch one page of tickets created inside `window`. `cursor` is the
    /// previous page's `next_page`, or `None` for the first page.
    async fn ticket_page(&self, window: &DateWindow, cursor: Option<&str>) -> Result<TicketPage>;

    async fn user_page(&self, cursor: Option<&str>) -> Result<UserPage>;

    /// Comment threads for several tickets in one round trip.
    async fn show_many_comments(&self, ids: &[u64]) -> Result<Vec<TicketComments>>;

    async fn ticket(&self, id: u64) -> Result<Ticket>;

    async fn ticket_comments(&self, id: u64) -> Result<Vec<Comment>>;
}

pub struct HelpdeskClient {
    http: Client,
    base_url: Url,
    auth_header: String,
}

impl HelpdeskClient {
    pub fn new(base_url: Url, credentials: &Credentials, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_http(http, base_url, credentials))
    }

    fn with_http(http: Client, base_url: Url, credentials: &Credentials) -> Self {
        Self {
            http,
            base_url,
            auth_header: credentials.auth_header(),
        }
    }

    /// Validate a `next_page` cursor before following it. Credentials are
    /// only ever sent to the configured helpdesk origin.
    fn follow(&self, next: &str) -> Result<Url> {
        let url = Url::parse(next).map_err(|e| ExportError::InvalidUrl(format!("{next}: {e}")))?;
        if url.origin() != self.base_url.origin() {
            return Err(ExportError::InvalidUrl(format!(
                "pagination cursor {next} points outside {}",
                self.base_url
            )));
        }
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ExportError::InvalidUrl(format!("{path}: {e}")))
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.http
            .get(url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(ExportError::ApiError {
                status: response.status().as_u16(),
                message: response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<failed to read response body>".to_string()),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl HelpdeskApi for HelpdeskClient {
    async fn validate_credentials(&self) -> Result<()> {
        let url = self.endpoint("/api/v2/users/me.json")?;
        let me: MeResponse = self.send(self.get(url.as_str())).await.map_err(|e| match e {
            ExportError::ApiError { status, message } => {
                ExportError::AuthFailed(format!("status {status}: {message}"))
            }
            other => other,
        })?;

        // Anonymous callers get a user object back with a null id.
        match me.user.id {
            Some(_) => Ok(()),
            None => Err(ExportError::AuthFailed(
                "credentials were not recognized".to_string(),
            )),
        }
    }

    async fn ticket_page(&self, window: &DateWindow, cursor: Option<&str>) -> Result<TicketPage> {
        let request = match cursor {
            Some(next) => self.get(self.follow(next)?.as_str()),
            None => {
                let url = self.endpoint("/api/v2/tickets.json")?;
                self.get(url.as_str()).query(&[
                    ("created_after", window.start.to_rfc3339()),
                    ("created_before", window.end.to_rfc3339()),
                    ("per_page", PAGE_SIZE.to_string()),
                ])
            }
        };
        self.send(request).await
    }

    async fn user_page(&self, cursor: Option<&str>) -> Result<UserPage> {
        let request = match cursor {
            Some(next) => self.get(self.follow(next)?.as_str()),
            None => {
                let url = self.endpoint("/api/v2/users.json")?;
                self.get(url.as_str())
                    .query(&[("per_page", PAGE_SIZE.to_string())])
            }
        };
        self.send(request).await
    }

    async fn show_many_comments(&self, ids: &[u64]) -> Result<Vec<TicketComments>> {
        let url = self.endpoint("/api/v2/show_many.json")?;
        let ids = ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let response: ShowManyResponse = self
            .send(
                self.get(url.as_str())
                    .query(&[("ids", ids.as_str()), ("type", "ticket")]),
            )
            .await?;
        Ok(response.tickets)
    }

    async fn ticket(&self, id: u64) -> Result<Ticket> {
        let url = self.endpoint(&format!("/api/v2/tickets/{id}.json"))?;
        let response: TicketResponse = self.send(self.get(url.as_str())).await?;
        Ok(response.ticket)
    }

    async fn ticket_comments(&self, id: u64) -> Result<Vec<Comment>> {
        let url = self.endpoint(&format!("/api/v2/tickets/{id}/comments.json"))?;
        let response: CommentsResponse = self.send(self.get(url.as_str())).await?;
        Ok(response.comments)
    }
}
