//! Append-only entity tables: domains, clients, and upstreams.
//!
//! Lookup is a linear scan with a first-character fast reject, mirroring the
//! reference resolver's `findDomainID`/`findClientID`/`findForwardID`. A
//! hashed index would also satisfy the find-or-insert contract; this is the
//! straightforward version and table sizes stay small enough in practice
//! that the scan doesn't show up.

use crate::interner::{Handle, StringInterner};

/// Tri-state outcome of the regex/blocklist classifier for a domain.
/// Transitions monotonically: `Unknown` -> `Blocked` or `Unknown` -> `NotBlocked`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RegexState {
    #[default]
    Unknown,
    Blocked,
    NotBlocked,
}

#[derive(Clone, Debug)]
pub struct DomainEntry {
    pub name: Handle,
    pub total: u32,
    pub blocked: u32,
    pub regex_state: RegexState,
}

#[derive(Clone, Debug)]
pub struct ClientEntry {
    pub ip: Handle,
    pub hostname: Handle,
    pub total: u32,
    pub blocked: u32,
    pub needs_reverse_lookup: bool,
    pub last_seen: i64,
}

#[derive(Clone, Debug)]
pub struct UpstreamEntry {
    pub ip: Handle,
    pub hostname: Handle,
    pub total: u32,
    pub failed: u32,
    pub needs_reverse_lookup: bool,
}

fn first_byte(s: &str) -> u8 {
    s.as_bytes().first().copied().unwrap_or(0)
}

#[derive(Default)]
pub struct EntityTables {
    pub domains: Vec<DomainEntry>,
    pub clients: Vec<ClientEntry>,
    pub upstreams: Vec<UpstreamEntry>,
}

impl EntityTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds `name` in the domain table or creates it. Does not bump
    /// `total`; callers increment counters explicitly as part of ingest so a
    /// bootstrap import and a live ingest share this one entry point without
    /// double-counting.
    pub fn find_or_insert_domain(&mut self, interner: &mut StringInterner, name: &str) -> usize {
        let c = first_byte(name);
        for (i, d) in self.domains.iter().enumerate() {
            if first_byte(interner.resolve(d.name)) != c {
                continue;
            }
            if interner.resolve(d.name) == name {
                return i;
            }
        }
        let id = self.domains.len();
        self.domains.push(DomainEntry {
            name: interner.intern(name),
            total: 0,
            blocked: 0,
            regex_state: RegexState::Unknown,
        });
        id
    }

    /// Finds `ip` in the client table or creates it. Returns `(index, is_new)`
    /// so the caller can extend the time-bucket accumulator's per-client
    /// column exactly once, on first sighting (spec.md §4.B).
    pub fn find_or_insert_client(&mut self, interner: &mut StringInterner, ip: &str) -> (usize, bool) {
        let c = first_byte(ip);
        for (i, cl) in self.clients.iter().enumerate() {
            if first_byte(interner.resolve(cl.ip)) != c {
                continue;
            }
            if interner.resolve(cl.ip) == ip {
                return (i, false);
            }
        }
        let id = self.clients.len();
        self.clients.push(ClientEntry {
            ip: interner.intern(ip),
            hostname: crate::interner::EMPTY,
            total: 0,
            blocked: 0,
            needs_reverse_lookup: true,
            last_seen: 0,
        });
        (id, true)
    }

    /// Finds `ip` in the upstream table or creates it.
    pub fn find_or_insert_upstream(&mut self, interner: &mut StringInterner, ip: &str) -> usize {
        let c = first_byte(ip);
        for (i, u) in self.upstreams.iter().enumerate() {
            if first_byte(interner.resolve(u.ip)) != c {
                continue;
            }
            if interner.resolve(u.ip) == ip {
                return i;
            }
        }
        let id = self.upstreams.len();
        self.upstreams.push(UpstreamEntry {
            ip: interner.intern(ip),
            hostname: crate::interner::EMPTY,
            total: 0,
            failed: 0,
            needs_reverse_lookup: true,
        });
        id
    }
}
