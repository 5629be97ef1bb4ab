pub mod action;
pub mod config;
pub mod entity;
pub mod error;
pub mod message;
pub mod paths;
pub mod types;

pub use action::{ActionError, ActionResult, ErrorKind};
pub use config::Config;
pub use entity::{ChatRole, EntityKind, EntityReference};
pub use error::{Error, Result};
pub use message::InboundEvent;
pub use paths::Paths;

/// Truncate a string to at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("привет", 3), "при");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
