use regex::Regex;
use std::sync::OnceLock;

/// A delivered message as the gateway reports it: raw `To` header,
/// decoded subject, and every HTML body part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub html_parts: Vec<String>,
}

fn angle_addr() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([^>]+)>").expect("static regex"))
}

impl MailMessage {
    /// Case-insensitive recipient match. The `To` header may carry several
    /// comma-separated recipients, each either a bare address or a
    /// `Display Name <addr>` wrapper; any one matching is enough.
    pub fn addressed_to(&self, address: &str) -> bool {
        let wanted = address.to_lowercase();

        self.to.split(',').any(|recipient| {
            let recipient = recipient.trim();
            match angle_addr().captures(recipient) {
                Some(caps) => caps[1].to_lowercase() == wanted,
                None => recipient.to_lowercase() == wanted,
            }
        })
    }

    pub fn subject_contains(&self, marker: &str) -> bool {
        self.subject.contains(marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(to: &str) -> MailMessage {
        MailMessage {
            to: to.to_string(),
            subject: String::new(),
            html_parts: vec![],
        }
    }

    #[test]
    fn bare_address_matches_case_insensitively() {
        assert!(msg("ABC123@Sub.Example.com").addressed_to("abc123@sub.example.com"));
    }

    #[test]
    fn display_name_wrapper_is_unwrapped() {
        assert!(msg("New User <Abc@Example.com>").addressed_to("abc@example.com"));
    }

    #[test]
    fn any_of_multiple_recipients_suffices() {
        let m = msg("ops@example.com, Someone <abc@example.com>, other@example.com");
        assert!(m.addressed_to("abc@example.com"));
    }

    #[test]
    fn unrelated_recipient_does_not_match() {
        assert!(!msg("Someone <abcd@example.com>").addressed_to("abc@example.com"));
    }
}
