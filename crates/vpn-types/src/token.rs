//! OAuth token set (§3 "OAuth token set").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokenSet {
    pub access: String,
    pub refresh: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub expires_in: u64,
    /// Unix timestamp: `issue_time + expires_in`.
    pub expires_at: i64,
}

impl OAuthTokenSet {
    pub fn new(access: String, refresh: String, token_type: String, expires_in: u64, issued_at: i64) -> Self {
        Self {
            access,
            refresh,
            token_type,
            expires_in,
            expires_at: issued_at + expires_in as i64,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Applies a refresh response. Per the 2.x server quirk in §3: an empty
    /// `refresh_token` in the response means "keep using the old one".
    pub fn apply_refresh(&mut self, access: String, refresh: Option<String>, token_type: String, expires_in: u64, issued_at: i64) {
        self.access = access;
        if let Some(r) = refresh {
            if !r.is_empty() {
                self.refresh = r;
            }
        }
        self.token_type = token_type;
        self.expires_in = expires_in;
        self.expires_at = issued_at + expires_in as i64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_at_matches_issue_time_plus_expires_in() {
        let t = OAuthTokenSet::new("a".into(), "r".into(), "bearer".into(), 3600, 1000);
        assert_eq!(t.expires_at, 4600);
    }

    #[test]
    fn empty_refresh_token_on_refresh_retains_previous() {
        let mut t = OAuthTokenSet::new("a".into(), "r1".into(), "bearer".into(), 3600, 1000);
        t.apply_refresh("a2".into(), Some(String::new()), "bearer".into(), 3600, 2000);
        assert_eq!(t.refresh, "r1");
        assert_eq!(t.access, "a2");
    }

    #[test]
    fn non_empty_refresh_token_replaces_previous() {
        let mut t = OAuthTokenSet::new("a".into(), "r1".into(), "bearer".into(), 3600, 1000);
        t.apply_refresh("a2".into(), Some("r2".into()), "bearer".into(), 3600, 2000);
        assert_eq!(t.refresh, "r2");
    }

    #[test]
    fn is_expired_boundary() {
        let t = OAuthTokenSet::new("a".into(), "r".into(), "bearer".into(), 3600, 1000);
        assert!(!t.is_expired(4599));
        assert!(t.is_expired(4600));
    }
}
