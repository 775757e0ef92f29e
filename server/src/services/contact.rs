//! Contact and book-a-demo form delivery.
//!
//! Both marketing forms post the same shape; the `kind` only changes the
//! subject line and heading. Validated submissions are rendered into an
//! HTML email and handed to a `Mailer` (Resend in production).

use resend_rs::Resend;
use resend_rs::types::CreateEmailBaseOptions;
use serde::Deserialize;
use session::Language;

const CONTACT_TEMPLATE: &str = include_str!("../../templates/contact.html");

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_COMPANY_LEN: usize = 200;
pub const MAX_MESSAGE_LEN: usize = 5_000;

#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error("invalid email")]
    InvalidEmail,
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("contact delivery is not configured")]
    NotConfigured,
    #[error("email delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Contact,
    Demo,
}

impl ContactKind {
    fn heading(self) -> &'static str {
        match self {
            Self::Contact => "New contact request",
            Self::Demo => "New demo request",
        }
    }
}

/// Raw form body as posted by the site.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactRequest {
    pub kind: ContactKind,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
    pub message: String,
    #[serde(default)]
    pub language: Option<Language>,
}

/// A submission that passed validation. Fields are trimmed, email lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactMessage {
    pub kind: ContactKind,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub message: String,
    pub language: Language,
}

#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') || normalized.contains(char::is_whitespace) {
        return None;
    }
    Some(normalized)
}

fn required(value: &str, field: &'static str, max: usize) -> Result<String, ContactError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ContactError::Missing(field));
    }
    if value.chars().count() > max {
        return Err(ContactError::TooLong { field, max });
    }
    Ok(value.to_owned())
}

impl ContactRequest {
    /// # Errors
    ///
    /// Returns the first field that fails validation.
    pub fn validate(self) -> Result<ContactMessage, ContactError> {
        let name = required(&self.name, "name", MAX_NAME_LEN)?;
        let email = normalize_email(&self.email).ok_or(ContactError::InvalidEmail)?;
        let message = required(&self.message, "message", MAX_MESSAGE_LEN)?;
        let company = match self.company.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(c) => Some(required(c, "company", MAX_COMPANY_LEN)?),
        };
        Ok(ContactMessage {
            kind: self.kind,
            name,
            email,
            company,
            message,
            language: self.language.unwrap_or_default(),
        })
    }
}

#[must_use]
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Substitute `{{KEY}}` placeholders in one pass so values are never re-scanned.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        match values.iter().find(|(k, _)| *k == key) {
            Some((_, v)) => out.push_str(v),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

impl ContactMessage {
    #[must_use]
    pub fn subject(&self) -> String {
        match &self.company {
            Some(company) => format!("[Allside] {} from {} ({company})", self.kind.heading(), self.name),
            None => format!("[Allside] {} from {}", self.kind.heading(), self.name),
        }
    }

    #[must_use]
    pub fn render_html(&self) -> String {
        let name = escape_html(&self.name);
        let email = escape_html(&self.email);
        let company = self.company.as_deref().map_or_else(|| "-".to_owned(), escape_html);
        let message = escape_html(&self.message);
        fill(
            CONTACT_TEMPLATE,
            &[
                ("HEADING", self.kind.heading()),
                ("NAME", &name),
                ("EMAIL", &email),
                ("COMPANY", &company),
                ("LANGUAGE", self.language.as_str()),
                ("MESSAGE", &message),
            ],
        )
    }
}

// =============================================================================
// MAILER
// =============================================================================

#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one form submission to the sales inbox.
    async fn send(&self, message: &ContactMessage) -> Result<(), ContactError>;
}

pub struct ResendMailer {
    client: Resend,
    from: String,
    to: String,
}

impl ResendMailer {
    #[must_use]
    pub fn new(api_key: &str, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { client: Resend::new(api_key), from: from.into(), to: to.into() }
    }
}

#[async_trait::async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: &ContactMessage) -> Result<(), ContactError> {
        let html = message.render_html();
        let email = CreateEmailBaseOptions::new(&self.from, [self.to.as_str()], message.subject())
            .with_html(&html);
        self.client
            .emails
            .send(email)
            .await
            .map_err(|e| ContactError::Delivery(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "contact_test.rs"]
mod tests;
