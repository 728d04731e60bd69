//! Query building with bound values
//!
//! Query text is always a `&'static str` template. Values are bound to
//! `:name` placeholders and rendered as escaped literals, so caller-supplied
//! text can never change the shape of a query.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::CrmError;

static RECORD_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]{15}(?:[a-zA-Z0-9]{3})?$").expect("valid regex"));

/// Key prefix of user records, which bankers are
pub const USER_ID_PREFIX: &str = "005";

/// Check that `id` looks like a 15 or 18 character record id
pub fn validate_id(id: &str) -> Result<&str, CrmError> {
    if RECORD_ID_RE.is_match(id) {
        Ok(id)
    } else {
        Err(CrmError::InvalidIdentifier(id.to_string()))
    }
}

/// Bankers are user records, so their ids start with `005`
pub fn validate_banker_id(id: &str) -> Result<&str, CrmError> {
    let id = validate_id(id)?;
    if id.starts_with(USER_ID_PREFIX) {
        Ok(id)
    } else {
        Err(CrmError::Validation(format!(
            "Banker id must start with {}: {}",
            USER_ID_PREFIX, id
        )))
    }
}

/// Escape a value for use inside a single-quoted literal
pub fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            other => out.push(other),
        }
    }
    out
}

#[derive(Debug, Clone)]
enum Bound {
    Text(String),
    Int(i64),
}

impl Bound {
    fn render(&self) -> String {
        match self {
            Bound::Text(s) => format!("'{}'", escape_literal(s)),
            Bound::Int(n) => n.to_string(),
        }
    }
}

/// Query template plus bindings
#[derive(Debug, Clone)]
pub struct SoqlQuery {
    template: &'static str,
    bindings: Vec<(&'static str, Bound)>,
}

impl SoqlQuery {
    pub fn new(template: &'static str) -> Self {
        Self {
            template,
            bindings: Vec::new(),
        }
    }

    /// Bind free text as an escaped string literal
    pub fn bind_text(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.bindings.push((name, Bound::Text(value.into())));
        self
    }

    /// Bind a record id, rejecting anything that is not id-shaped
    pub fn bind_id(mut self, name: &'static str, id: &str) -> Result<Self, CrmError> {
        let id = validate_id(id)?;
        self.bindings.push((name, Bound::Text(id.to_string())));
        Ok(self)
    }

    pub fn bind_int(mut self, name: &'static str, value: i64) -> Self {
        self.bindings.push((name, Bound::Int(value)));
        self
    }

    /// Render the final query text
    ///
    /// Fails if the template names a placeholder with no binding.
    pub fn build(&self) -> Result<String, CrmError> {
        let mut out = String::with_capacity(self.template.len() + 32);
        let mut chars = self.template.char_indices().peekable();

        while let Some((idx, c)) = chars.next() {
            if c != ':' {
                out.push(c);
                continue;
            }

            let start = idx + 1;
            let mut end = start;
            while let Some(&(i, next)) = chars.peek() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    end = i + next.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }

            if end == start {
                out.push(':');
                continue;
            }

            let name = &self.template[start..end];
            let bound = self
                .bindings
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, b)| b)
                .ok_or_else(|| CrmError::InvalidData(format!("Unbound query parameter :{}", name)))?;
            out.push_str(&bound.render());
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("O'Brien"), "O\\'Brien");
        assert_eq!(escape_literal("a\\b"), "a\\\\b");
        assert_eq!(escape_literal("line\nbreak"), "line\\nbreak");
    }

    #[test]
    fn test_injection_stays_inside_literal() {
        let query = SoqlQuery::new("SELECT Id FROM Visit__c WHERE Purpose__c = :purpose")
            .bind_text("purpose", "x' OR Name != '")
            .build()
            .unwrap();
        assert_eq!(
            query,
            "SELECT Id FROM Visit__c WHERE Purpose__c = 'x\\' OR Name != \\''"
        );
    }

    #[test]
    fn test_bind_id_validates() {
        assert!(SoqlQuery::new("x").bind_id("id", "003XX0000000001").is_ok());
        assert!(SoqlQuery::new("x").bind_id("id", "003XX0000000001AAA").is_ok());
        assert!(matches!(
            SoqlQuery::new("x").bind_id("id", "003' OR Id != '"),
            Err(CrmError::InvalidIdentifier(_))
        ));
        assert!(SoqlQuery::new("x").bind_id("id", "short").is_err());
    }

    #[test]
    fn test_build_multiple_bindings() {
        let query = SoqlQuery::new(
            "SELECT Id FROM Chat_Session__c WHERE Contact__c = :contact AND Appointment_Status__c = :status LIMIT :limit",
        )
        .bind_id("contact", "003XX0000000001")
        .unwrap()
        .bind_text("status", "in_progress")
        .bind_int("limit", 5)
        .build()
        .unwrap();
        assert_eq!(
            query,
            "SELECT Id FROM Chat_Session__c WHERE Contact__c = '003XX0000000001' AND Appointment_Status__c = 'in_progress' LIMIT 5"
        );
    }

    #[test]
    fn test_unbound_placeholder_fails() {
        let result = SoqlQuery::new("SELECT Id FROM X WHERE A = :missing").build();
        assert!(matches!(result, Err(CrmError::InvalidData(_))));
    }

    #[test]
    fn test_lone_colon_kept() {
        let query = SoqlQuery::new("SELECT Id FROM X WHERE A = : ").build().unwrap();
        assert_eq!(query, "SELECT Id FROM X WHERE A = : ");
    }

    #[test]
    fn test_banker_prefix() {
        assert!(validate_banker_id("005XX0000000001").is_ok());
        assert!(matches!(
            validate_banker_id("003XX0000000001"),
            Err(CrmError::Validation(_))
        ));
    }
}
