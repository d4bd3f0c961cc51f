//! Privacy-aware projection: every read path that can expose a domain or
//! client value routes through here, consulting the privacy level frozen on
//! the query record at ingest time (never the current global setting).
//!
//! Grounded directly in the reference resolver's `getDomainString` /
//! `getClientIPString` / `getClientNameString`: domain fields hide starting
//! at `hide_domains`, client fields starting at `hide_domains_clients`.

use crate::model::PrivacyLevel;

pub const HIDDEN_DOMAIN: &str = "hidden";
pub const HIDDEN_CLIENT: &str = "0.0.0.0";

/// Projects a domain name for display, given the privacy level recorded on
/// the query that owns it.
pub fn project_domain<'a>(level: PrivacyLevel, domain: &'a str) -> &'a str {
    if level >= PrivacyLevel::HideDomains {
        HIDDEN_DOMAIN
    } else {
        domain
    }
}

/// Projects a client IP address for display.
pub fn project_client_ip<'a>(level: PrivacyLevel, ip: &'a str) -> &'a str {
    if level >= PrivacyLevel::HideDomainsClients {
        HIDDEN_CLIENT
    } else {
        ip
    }
}

/// Projects a client hostname for display.
pub fn project_client_name<'a>(level: PrivacyLevel, name: &'a str) -> &'a str {
    if level >= PrivacyLevel::HideDomainsClients {
        HIDDEN_CLIENT
    } else {
        name
    }
}

/// Whether query history should be suppressed entirely for this level
/// (spec.md §4.F, `maximum`).
pub fn history_suppressed(level: PrivacyLevel) -> bool {
    level >= PrivacyLevel::Maximum
}

/// Whether a record at this level should ever be written to the durable
/// store. `nostats` and above discard new records for persistence
/// (spec.md §4.F); `maximum` additionally never even keeps them in memory.
pub fn persistable(level: PrivacyLevel) -> bool {
    level < PrivacyLevel::NoStats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_discloses_everything() {
        assert_eq!(project_domain(PrivacyLevel::None, "example.com"), "example.com");
        assert_eq!(project_client_ip(PrivacyLevel::None, "10.0.0.1"), "10.0.0.1");
    }

    #[test]
    fn hide_domains_only_hides_domain() {
        assert_eq!(project_domain(PrivacyLevel::HideDomains, "example.com"), HIDDEN_DOMAIN);
        assert_eq!(project_client_ip(PrivacyLevel::HideDomains, "10.0.0.1"), "10.0.0.1");
    }

    #[test]
    fn hide_domains_clients_hides_both() {
        assert_eq!(
            project_domain(PrivacyLevel::HideDomainsClients, "example.com"),
            HIDDEN_DOMAIN
        );
        assert_eq!(
            project_client_ip(PrivacyLevel::HideDomainsClients, "10.0.0.1"),
            HIDDEN_CLIENT
        );
    }

    #[test]
    fn maximum_suppresses_history() {
        assert!(history_suppressed(PrivacyLevel::Maximum));
        assert!(!history_suppressed(PrivacyLevel::NoStats));
        assert!(!persistable(PrivacyLevel::Maximum));
        assert!(!persistable(PrivacyLevel::NoStats));
    }
}
