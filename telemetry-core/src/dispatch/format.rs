//! Response formatting: line-protocol text and hand-assembled JSON
//! fragments. No `serde_json` — fragments here are small, fixed-shape, and
//! writing them by hand keeps the dispatcher free of a serialization
//! round-trip for what is, at bottom, string concatenation.

use super::aggregate::{
    DbStats, DomainRow, ForwardNameRow, ForwardRow, HistoryRow, MemoryReport, OverTimeRow, QueryTypeRow,
    QueryTypesOverTimeRow, StatsSummary,
};

/// The line-protocol response terminator (spec.md §6).
pub const RECORD_SEPARATOR: char = '\u{4}';

pub fn finish(lines: Vec<String>) -> String {
    let mut body = lines.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    body.push(RECORD_SEPARATOR);
    body
}

pub fn unknown_command_line(text: &str) -> String {
    finish(vec![format!("unknown command: {text}")])
}

pub fn stats_lines(s: &StatsSummary) -> Vec<String> {
    vec![format!(
        "dns_queries_today {} ads_blocked_today {} unique_domains {} unique_clients {} \
         queries_forwarded {} queries_cached {}",
        s.total, s.blocked, s.domains, s.clients, s.forwarded, s.cached,
    )]
}

pub fn over_time_lines(rows: &[OverTimeRow]) -> Vec<String> {
    rows.iter().map(|r| format!("{} {} {}", r.timestamp, r.total, r.blocked)).collect()
}

pub fn query_types_over_time_lines(rows: &[QueryTypesOverTimeRow]) -> Vec<String> {
    rows.iter()
        .map(|r| {
            let counts: Vec<String> = r.per_type.iter().map(u32::to_string).collect();
            format!("{} {}", r.timestamp, counts.join(" "))
        })
        .collect()
}

pub fn domain_rows_lines(rows: &[DomainRow]) -> Vec<String> {
    rows.iter().enumerate().map(|(i, r)| format!("{} {} {}", i, r.count, r.domain)).collect()
}

pub fn client_rows_lines(rows: &[super::aggregate::ClientRow]) -> Vec<String> {
    rows.iter().enumerate().map(|(i, r)| format!("{} {} {}", i, r.count, r.client)).collect()
}

pub fn forward_dest_lines(rows: &[ForwardRow]) -> Vec<String> {
    rows.iter().map(|r| format!("{:.2} {} {}", r.percentage * 100.0, r.count, r.name)).collect()
}

pub fn forward_names_lines(rows: &[ForwardNameRow]) -> Vec<String> {
    rows.iter()
        .enumerate()
        .map(|(i, r)| format!("{} {} {}", i, r.ip, if r.hostname.is_empty() { "-" } else { &r.hostname }))
        .collect()
}

pub fn query_types_lines(rows: &[QueryTypeRow]) -> Vec<String> {
    rows.iter().map(|r| format!("{} {}", r.qtype, r.count)).collect()
}

pub fn history_lines(rows: &[HistoryRow]) -> Vec<String> {
    rows.iter()
        .map(|r| format!("{} {} {} {} {}", r.timestamp, r.qtype, r.status, r.domain, r.client))
        .collect()
}

pub fn memory_lines(m: &MemoryReport) -> Vec<String> {
    vec![format!(
        "domains {} clients {} upstreams {} queries {} interned_strings {}",
        m.domains, m.clients, m.upstreams, m.queries, m.interned_strings
    )]
}

pub fn db_stats_lines(d: &DbStats) -> Vec<String> {
    vec![format!("filesize {}", d.filesize)]
}

pub fn version_lines(version: &str) -> Vec<String> {
    vec![version.to_string()]
}

// --- JSON fragments -------------------------------------------------------

pub fn json_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

pub fn not_found_json() -> String {
    "{\"status\":\"not_found\"}".to_string()
}

pub fn stats_json(s: &StatsSummary) -> String {
    format!(
        "{{\"domains_being_blocked\":{},\"dns_queries_today\":{},\"ads_blocked_today\":{},\
         \"ads_percentage_today\":{:.4},\"unique_domains\":{},\"queries_forwarded\":{},\
         \"queries_cached\":{},\"unique_clients\":{},\"status\":\"{}\"}}",
        s.blocked,
        s.total,
        s.blocked,
        if s.total > 0 { s.blocked as f64 / s.total as f64 * 100.0 } else { 0.0 },
        s.domains,
        s.forwarded,
        s.cached,
        s.clients,
        if s.blocking_enabled { "enabled" } else { "disabled" },
    )
}

pub fn over_time_json(rows: &[OverTimeRow]) -> String {
    let entries: Vec<String> = rows
        .iter()
        .map(|r| format!("{{\"timestamp\":{},\"total\":{},\"blocked\":{}}}", r.timestamp, r.total, r.blocked))
        .collect();
    format!("{{\"over_time\":[{}]}}", entries.join(","))
}

pub fn top_domains_json(rows: &[DomainRow]) -> String {
    let entries: Vec<String> = rows
        .iter()
        .map(|r| format!("{{\"domain\":\"{}\",\"count\":{}}}", json_escape(&r.domain), r.count))
        .collect();
    format!("{{\"top_domains\":[{}]}}", entries.join(","))
}

pub fn top_ads_json(rows: &[DomainRow]) -> String {
    let entries: Vec<String> = rows
        .iter()
        .map(|r| format!("{{\"domain\":\"{}\",\"count\":{}}}", json_escape(&r.domain), r.count))
        .collect();
    format!("{{\"top_ads\":[{}]}}", entries.join(","))
}

pub fn top_clients_json(rows: &[super::aggregate::ClientRow]) -> String {
    let entries: Vec<String> = rows
        .iter()
        .map(|r| format!("{{\"client\":\"{}\",\"count\":{}}}", json_escape(&r.client), r.count))
        .collect();
    format!("{{\"top_clients\":[{}]}}", entries.join(","))
}

pub fn forward_dest_json(rows: &[ForwardRow]) -> String {
    let entries: Vec<String> = rows
        .iter()
        .map(|r| {
            format!(
                "{{\"name\":\"{}\",\"count\":{},\"percentage\":{:.4}}}",
                json_escape(&r.name),
                r.count,
                r.percentage * 100.0
            )
        })
        .collect();
    format!("{{\"forward_destinations\":[{}]}}", entries.join(","))
}

pub fn query_types_json(rows: &[QueryTypeRow]) -> String {
    let entries: Vec<String> =
        rows.iter().map(|r| format!("\"{}\":{}", r.qtype, r.count)).collect();
    format!("{{\"querytypes\":{{{}}}}}", entries.join(","))
}

pub fn query_types_over_time_json(rows: &[QueryTypesOverTimeRow]) -> String {
    let entries: Vec<String> = rows
        .iter()
        .map(|r| {
            let counts: Vec<String> = r.per_type.iter().map(u32::to_string).collect();
            format!("{{\"timestamp\":{},\"per_type\":[{}]}}", r.timestamp, counts.join(","))
        })
        .collect();
    format!("{{\"over_time\":[{}]}}", entries.join(","))
}

pub fn history_json(rows: &[HistoryRow]) -> String {
    let entries: Vec<String> = rows
        .iter()
        .map(|r| {
            format!(
                "{{\"timestamp\":{},\"type\":\"{}\",\"status\":\"{}\",\"domain\":\"{}\",\"client\":\"{}\"}}",
                r.timestamp,
                r.qtype,
                r.status,
                json_escape(&r.domain),
                json_escape(&r.client)
            )
        })
        .collect();
    format!("{{\"data\":[{}]}}", entries.join(","))
}

/// Strips the outer `{`/`}` from a single-key JSON fragment so the dashboard
/// super-handler (spec.md §4.I) can splice several fragments' bodies
/// together with `,` separators inside one enclosing object.
pub fn inner_body(fragment: &str) -> &str {
    fragment.strip_prefix('{').and_then(|s| s.strip_suffix('}')).unwrap_or(fragment)
}

pub fn dashboard_json(
    summary: &StatsSummary,
    over_time: &[OverTimeRow],
    top_domains: &[DomainRow],
    top_clients: &[super::aggregate::ClientRow],
    forward_dest: &[ForwardRow],
) -> String {
    let stats = stats_json(summary);
    let over_time_s = over_time_json(over_time);
    let top_domains_s = top_domains_json(top_domains);
    let top_clients_s = top_clients_json(top_clients);
    let forward_dest_s = forward_dest_json(forward_dest);
    let parts = [
        inner_body(&stats),
        inner_body(&over_time_s),
        inner_body(&top_domains_s),
        inner_body(&top_clients_s),
        inner_body(&forward_dest_s),
    ];
    format!("{{{}}}", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_appends_record_separator() {
        let out = finish(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(out, "a\nb\n\u{4}");
    }

    #[test]
    fn empty_response_is_just_the_separator() {
        assert_eq!(finish(vec![]), "\u{4}");
    }

    #[test]
    fn json_escape_handles_quotes_and_backslashes() {
        assert_eq!(json_escape("a\"b\\c"), "a\\\"b\\\\c");
    }

    #[test]
    fn inner_body_strips_braces() {
        assert_eq!(inner_body("{\"a\":1}"), "\"a\":1");
    }
}
