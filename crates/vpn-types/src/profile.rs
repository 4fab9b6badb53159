//! Connection profile (§3 "Profile").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VpnProtocol {
    Wireguard,
    Openvpn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    pub supported_vpn_protocols: Vec<VpnProtocol>,
    pub default_gateway: bool,
    pub dns_search_domains: Vec<String>,
}

impl Profile {
    pub fn supports(&self, protocol: VpnProtocol) -> bool {
        self.supported_vpn_protocols.contains(&protocol)
    }
}

/// A server's profile list plus raw `/info` JSON (kept for the embedder) and
/// the currently selected profile id, if any.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileSet {
    pub profiles: Vec<Profile>,
    pub current: Option<String>,
    pub raw: Option<serde_json::Value>,
}

impl ProfileSet {
    pub fn new(profiles: Vec<Profile>, raw: serde_json::Value) -> Self {
        let current = if profiles.len() == 1 {
            Some(profiles[0].id.clone())
        } else {
            None
        };
        Self {
            profiles,
            current,
            raw: Some(raw),
        }
    }

    pub fn current_profile(&self) -> Option<&Profile> {
        let id = self.current.as_ref()?;
        self.profiles.iter().find(|p| &p.id == id)
    }

    /// `SetProfileID` never fails on unknown ids (§4.6 "Profile selection");
    /// it simply records the choice. Freshness against `/info` is enforced
    /// by `reconcile_selection`.
    pub fn set_profile_id(&mut self, id: impl Into<String>) {
        self.current = Some(id.into());
    }

    /// Called after a fresh `/info` fetch. If the stored selection no longer
    /// exists, clears it so the orchestrator re-queries via `AskProfile`.
    /// If exactly one profile exists, it is chosen implicitly.
    pub fn reconcile_selection(&mut self) {
        if self.profiles.len() == 1 {
            self.current = Some(self.profiles[0].id.clone());
            return;
        }
        if let Some(id) = &self.current {
            if !self.profiles.iter().any(|p| &p.id == id) {
                self.current = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str) -> Profile {
        Profile {
            id: id.to_string(),
            display_name: id.to_string(),
            supported_vpn_protocols: vec![VpnProtocol::Wireguard],
            default_gateway: true,
            dns_search_domains: vec![],
        }
    }

    #[test]
    fn single_profile_is_implicitly_selected() {
        let mut set = ProfileSet::new(vec![profile("employees")], serde_json::json!({}));
        set.reconcile_selection();
        assert_eq!(set.current.as_deref(), Some("employees"));
    }

    #[test]
    fn stale_selection_is_cleared() {
        let mut set = ProfileSet::new(vec![profile("a"), profile("b")], serde_json::json!({}));
        set.set_profile_id("stale");
        set.reconcile_selection();
        assert_eq!(set.current, None);
    }

    #[test]
    fn set_profile_id_never_fails_on_unknown_id() {
        let mut set = ProfileSet::new(vec![profile("a")], serde_json::json!({}));
        set.set_profile_id("does-not-exist");
        assert_eq!(set.current.as_deref(), Some("does-not-exist"));
    }

    #[test]
    fn set_profile_id_is_idempotent() {
        let mut set = ProfileSet::new(vec![profile("a"), profile("b")], serde_json::json!({}));
        set.set_profile_id("a");
        set.set_profile_id("a");
        assert_eq!(set.current.as_deref(), Some("a"));
    }
}
