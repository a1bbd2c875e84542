//! OTP detection over incoming message text.
//!
//! A message counts as an OTP notification when its text contains one of a
//! fixed set of phrases, compared case-insensitively. This is a heuristic:
//! codes phrased differently are missed, and unrelated messages that happen
//! to contain a phrase are forwarded.

use regex::{RegexSet, RegexSetBuilder};

use crate::platform::IncomingMessage;

pub const DEFAULT_OTP_PHRASES: &[&str] = &["login code", "otp is", "telegram code"];

#[derive(Clone, Debug)]
pub struct OtpMatcher {
    phrases: Vec<String>,
    set: RegexSet,
}

impl OtpMatcher {
    pub fn new<I, S>(phrases: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let phrases: Vec<String> = phrases.into_iter().map(Into::into).collect();
        let set = RegexSetBuilder::new(phrases.iter().map(|p| regex::escape(p)))
            .case_insensitive(true)
            .build()?;
        Ok(Self { phrases, set })
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Absent or empty text never matches.
    pub fn is_match(&self, text: Option<&str>) -> bool {
        match text {
            Some(t) if !t.is_empty() => self.set.is_match(t),
            _ => false,
        }
    }

    /// Raw text of `message` when it is an incoming OTP notification.
    pub fn extract<'a>(&self, message: &'a IncomingMessage) -> Option<&'a str> {
        if message.outgoing {
            return None;
        }
        let text = message.text.as_deref();
        if self.is_match(text) {
            text
        } else {
            None
        }
    }
}

impl Default for OtpMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_OTP_PHRASES.iter().copied())
            .expect("escaped literal phrases always compile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_each_default_phrase() {
        let m = OtpMatcher::default();
        assert!(m.is_match(Some("Your login code: 12345")));
        assert!(m.is_match(Some("Your OTP is 998877")));
        assert!(m.is_match(Some("telegram code 55555")));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let m = OtpMatcher::default();
        assert!(m.is_match(Some("LOGIN CODE: 1")));
        assert!(m.is_match(Some("Otp Is 42")));
        assert!(m.is_match(Some("Telegram Code 9")));
    }

    #[test]
    fn unrelated_text_does_not_match() {
        let m = OtpMatcher::default();
        assert!(!m.is_match(Some("see you at lunch")));
        assert!(!m.is_match(Some("login: code 123")));
        assert!(!m.is_match(Some("otpis 123")));
    }

    #[test]
    fn absent_or_empty_text_does_not_match() {
        let m = OtpMatcher::default();
        assert!(!m.is_match(None));
        assert!(!m.is_match(Some("")));
    }

    #[test]
    fn phrases_are_literal_not_patterns() {
        let m = OtpMatcher::new(["code (1)"]).unwrap();
        assert!(m.is_match(Some("your code (1) is here")));
        assert!(!m.is_match(Some("your code 1 is here")));
    }

    #[test]
    fn extract_returns_raw_text() {
        let m = OtpMatcher::default();
        let msg = IncomingMessage::text(777000, "Login code: 12345. Do not give this code to anyone");
        assert_eq!(m.extract(&msg), Some("Login code: 12345. Do not give this code to anyone"));
    }

    #[test]
    fn extract_ignores_outgoing_messages() {
        let m = OtpMatcher::default();
        let mut msg = IncomingMessage::text(1, "my login code is 1234");
        msg.outgoing = true;
        assert_eq!(m.extract(&msg), None);
    }

    #[test]
    fn default_phrase_list() {
        let m = OtpMatcher::default();
        assert_eq!(m.phrases(), ["login code", "otp is", "telegram code"]);
    }
}
