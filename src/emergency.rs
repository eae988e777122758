//! Emergency (SOS) message composition.
//!
//! Only the text is built here; delivery to the guardian is the host's job.

use anyhow::{anyhow, Result};

pub const DEFAULT_USER_NAME: &str = "Guide User";
pub const DEFAULT_APP_NAME: &str = "Guide";
const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn maps_link(&self) -> String {
        format!("https://maps.google.com/?q={},{}", self.lat, self.lng)
    }

    /// Five decimals, for on-screen display.
    pub fn display(&self) -> String {
        format!("{:.5}, {:.5}", self.lat, self.lng)
    }
}

#[derive(Clone, Debug)]
pub struct SosMessage {
    pub user_name: String,
    pub app_name: String,
    pub location: GeoPoint,
}

impl SosMessage {
    pub fn new(user_name: Option<&str>, location: GeoPoint) -> Self {
        let user_name = user_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_USER_NAME);
        Self {
            user_name: user_name.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
            location,
        }
    }

    pub fn body(&self) -> String {
        format!(
            "SOS EMERGENCY!\n{} needs help urgently!\nLive Location: {}\nSent via {}",
            self.user_name,
            self.location.maps_link(),
            self.app_name
        )
    }
}

/// Trim and check a guardian phone number: optional leading '+', then 7 to
/// 15 digits with spaces or dashes allowed between them.
pub fn validate_guardian_number(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("no guardian number configured"));
    }
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if !digits
        .chars()
        .all(|c| c.is_ascii_digit() || c == ' ' || c == '-')
    {
        return Err(anyhow!("guardian number contains invalid characters"));
    }
    let count = digits.chars().filter(|c| c.is_ascii_digit()).count();
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&count) {
        return Err(anyhow!(
            "guardian number must have {}-{} digits, got {}",
            MIN_PHONE_DIGITS,
            MAX_PHONE_DIGITS,
            count
        ));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_includes_name_and_link() {
        let msg = SosMessage::new(
            Some("  Asha "),
            GeoPoint {
                lat: 13.0827,
                lng: 80.2707,
            },
        );
        let body = msg.body();
        assert!(body.starts_with("SOS EMERGENCY!\nAsha needs help urgently!"));
        assert!(body.contains("https://maps.google.com/?q=13.0827,80.2707"));
        assert_eq!(msg.location.display(), "13.08270, 80.27070");
    }

    #[test]
    fn blank_name_uses_default() {
        let msg = SosMessage::new(Some(" "), GeoPoint { lat: 0.0, lng: 0.0 });
        assert_eq!(msg.user_name, DEFAULT_USER_NAME);
    }

    #[test]
    fn guardian_number_validation() {
        assert_eq!(
            validate_guardian_number(" +91 98765-43210 ").unwrap(),
            "+91 98765-43210"
        );
        assert!(validate_guardian_number("").is_err());
        assert!(validate_guardian_number("12345").is_err());
        assert!(validate_guardian_number("call-me").is_err());
    }
}
