use crate::identity::IdentityMap;
use crate::types::{Comment, Identity, Ticket};

pub const NO_COMMENTS: &str = "No comments found.";

const SEPARATOR_WIDTH: usize = 40;

/// One flattened export row. Column order is fixed for the core ticket
/// fields; `custom_field_<id>` columns follow only for fields with a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    fields: Vec<(String, String)>,
}

impl ExportRecord {
    fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }
}

/// Join a ticket, its comment thread and the identity map into one row.
pub fn format(ticket: &Ticket, comments: &[Comment], identities: &IdentityMap) -> ExportRecord {
    let mut record = ExportRecord { fields: Vec::new() };

    record.push("id", ticket.id.to_string());
    record.push("subject", ticket.subject.clone().unwrap_or_default());
    record.push("status", ticket.status.clone().unwrap_or_default());
    record.push("priority", ticket.priority.clone().unwrap_or_default());
    record.push("type", ticket.ticket_type.clone().unwrap_or_default());
    record.push("created_at", ticket.created_at.clone());
    record.push("updated_at", ticket.updated_at.clone().unwrap_or_default());
    record.push("tags", ticket.tags.join(", "));
    record.push("all_comments", format_thread(comments, identities));

    let assignee = resolve_role(
        ticket.assignee_id,
        identities,
        ("Unassigned", "unassigned@example.com"),
    );
    record.push("assignee_email", assignee.email);
    record.push("assignee_name", assignee.name);

    let requester = resolve_role(
        ticket.requester_id,
        identities,
        ("Unknown Requester", "unknown@example.com"),
    );
    record.push("requester_email", requester.email);
    record.push("requester_name", requester.name);

    for field in &ticket.custom_fields {
        if let Some(value) = field.export_value() {
            record.push(format!("custom_field_{}", field.id), value);
        }
    }

    record
}

/// Assignees and requesters only resolve when actually known; each role has
/// its own fallback.
fn resolve_role(id: Option<u64>, identities: &IdentityMap, fallback: (&str, &str)) -> Identity {
    id.and_then(|id| identities.lookup(id))
        .cloned()
        .unwrap_or_else(|| Identity::new(fallback.0, fallback.1))
}

fn format_thread(comments: &[Comment], identities: &IdentityMap) -> String {
    if comments.is_empty() {
        return NO_COMMENTS.to_string();
    }

    comments
        .iter()
        .map(|comment| format_comment(comment, identities))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_comment(comment: &Comment, identities: &IdentityMap) -> String {
    let author = identities.get(comment.author_id);
    let kind = if comment.public { "PUBLIC" } else { "INTERNAL" };
    let created_at = comment.created_at.as_deref().unwrap_or("Unknown date");

    format!(
        "[{kind}] {} ({}) - {created_at}\n{}\n{}\n",
        author.name,
        author.email,
        comment.body.trim(),
        "-".repeat(SEPARATOR_WIDTH)
    )
}
