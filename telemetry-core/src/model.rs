//! Shared enums for the query record and its aggregations.

/// DNS query type. `per_type` counters in a time bucket are indexed by
/// `QueryType as usize`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum QueryType {
    A = 0,
    Aaaa = 1,
    Any = 2,
    Srv = 3,
    Soa = 4,
    Ptr = 5,
    Txt = 6,
    Unknown = 7,
}

pub const QUERY_TYPE_COUNT: usize = 8;

impl QueryType {
    pub const ALL: [QueryType; QUERY_TYPE_COUNT] = [
        QueryType::A,
        QueryType::Aaaa,
        QueryType::Any,
        QueryType::Srv,
        QueryType::Soa,
        QueryType::Ptr,
        QueryType::Txt,
        QueryType::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueryType::A => "A",
            QueryType::Aaaa => "AAAA",
            QueryType::Any => "ANY",
            QueryType::Srv => "SRV",
            QueryType::Soa => "SOA",
            QueryType::Ptr => "PTR",
            QueryType::Txt => "TXT",
            QueryType::Unknown => "UNKN",
        }
    }

    pub fn from_db(value: i64) -> Option<QueryType> {
        match value {
            0 => Some(QueryType::A),
            1 => Some(QueryType::Aaaa),
            2 => Some(QueryType::Any),
            3 => Some(QueryType::Srv),
            4 => Some(QueryType::Soa),
            5 => Some(QueryType::Ptr),
            6 => Some(QueryType::Txt),
            7 => Some(QueryType::Unknown),
            _ => None,
        }
    }
}

/// Outcome of a query as classified by ingest (the gravity/blacklist/regex
/// classifier itself is an external collaborator; this records its verdict).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum QueryStatus {
    Unknown = 0,
    Gravity = 1,
    Forwarded = 2,
    Cached = 3,
    Wildcard = 4,
    Blacklist = 5,
    ExternalBlocked = 6,
}

impl QueryStatus {
    pub fn is_blocked(self) -> bool {
        matches!(
            self,
            QueryStatus::Gravity
                | QueryStatus::Wildcard
                | QueryStatus::Blacklist
                | QueryStatus::ExternalBlocked
        )
    }

    pub fn from_db(value: i64) -> Option<QueryStatus> {
        match value {
            0 => Some(QueryStatus::Unknown),
            1 => Some(QueryStatus::Gravity),
            2 => Some(QueryStatus::Forwarded),
            3 => Some(QueryStatus::Cached),
            4 => Some(QueryStatus::Wildcard),
            5 => Some(QueryStatus::Blacklist),
            6 => Some(QueryStatus::ExternalBlocked),
            _ => None,
        }
    }
}

/// DNSSEC validation outcome, set when the upstream answer arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DnssecStatus {
    #[default]
    Unknown,
    Secure,
    Insecure,
    Bogus,
    Abandoned,
}

/// Coarse classification of the upstream reply, set when the answer arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReplyType {
    #[default]
    Unknown,
    NoData,
    NxDomain,
    Cname,
    Ip,
    DomainOnly,
    ServFail,
    Refused,
}

/// Ordinal redaction level, captured per-query at ingest and frozen for the
/// life of the record (spec.md §4.F — never reread from global state).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum PrivacyLevel {
    None = 0,
    HideDomains = 1,
    HideDomainsClients = 2,
    NoStats = 3,
    Maximum = 4,
}

impl PrivacyLevel {
    pub fn from_config(value: u8) -> PrivacyLevel {
        match value {
            0 => PrivacyLevel::None,
            1 => PrivacyLevel::HideDomains,
            2 => PrivacyLevel::HideDomainsClients,
            3 => PrivacyLevel::NoStats,
            _ => PrivacyLevel::Maximum,
        }
    }
}
