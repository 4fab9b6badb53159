//! Baked-in baseline catalog used until a real fetch succeeds (§4.3 "The
//! component has an embedded baseline ... used when no cached version has
//! been seen").

use crate::catalog::{CatalogList, OrganizationListEntry, ServerListEntry};

const EMBEDDED_SERVER_LIST: &str = include_str!("embedded_data/server_list.json");
const EMBEDDED_ORGANIZATION_LIST: &str = include_str!("embedded_data/organization_list.json");

pub fn embedded_servers() -> CatalogList<ServerListEntry> {
    serde_json::from_str(EMBEDDED_SERVER_LIST).expect("embedded server_list.json must parse")
}

pub fn embedded_organizations() -> CatalogList<OrganizationListEntry> {
    serde_json::from_str(EMBEDDED_ORGANIZATION_LIST).expect("embedded organization_list.json must parse")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_catalogs_parse() {
        let servers = embedded_servers();
        assert!(!servers.list.is_empty());
        let orgs = embedded_organizations();
        assert!(!orgs.list.is_empty());
    }
}
