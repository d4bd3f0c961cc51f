//! Request dispatcher (spec.md §4.I): three framings over one handler set.
//! Line protocol and HTTP/JSON are implemented here; binary framing exposes
//! the same aggregations through `dispatch::binary`'s tagged encoder. Routing
//! itself — accepting sockets, reading the handshake byte, running the
//! `axum` router — belongs to the daemon binary, which calls into this
//! module per request.

pub mod aggregate;
pub mod binary;
pub mod commands;
pub mod format;

use crate::engine::Engine;
use commands::{Command, HistoryArgs, TopClientArgs, TopListArgs};
use std::sync::atomic::{AtomicBool, Ordering};

pub struct LineOutcome {
    pub body: String,
    pub close_connection: bool,
}

fn ok(body: String) -> LineOutcome {
    LineOutcome { body, close_connection: false }
}

/// Dispatches one line-protocol request. `killed` is the shared shutdown
/// flag; `>kill` sets it, `>quit` just closes this connection. Both are
/// honoured only after this call returns — the caller finishes writing the
/// response before acting on `close_connection` (spec.md §4.I).
pub fn dispatch_line(engine: &Engine, killed: &AtomicBool, line: &str) -> LineOutcome {
    match commands::parse(line) {
        Command::Stats => ok(format::finish(format::stats_lines(&aggregate::stats(engine)))),
        Command::OverTime => ok(format::finish(format::over_time_lines(&aggregate::over_time(engine)))),
        Command::TopDomains(args) => {
            ok(format::finish(format::domain_rows_lines(&aggregate::top_domains(engine, &args))))
        }
        Command::TopAds(args) => {
            ok(format::finish(format::domain_rows_lines(&aggregate::top_ads(engine, &args))))
        }
        Command::TopClients(args) => {
            ok(format::finish(format::client_rows_lines(&aggregate::top_clients(engine, &args))))
        }
        Command::ForwardDest { unsorted } => {
            ok(format::finish(format::forward_dest_lines(&aggregate::forward_dest(engine, unsorted))))
        }
        Command::ForwardNames => {
            ok(format::finish(format::forward_names_lines(&aggregate::forward_names(engine))))
        }
        Command::QueryTypes => ok(format::finish(format::query_types_lines(&aggregate::query_types(engine)))),
        Command::GetAllQueries(args) => {
            ok(format::finish(format::history_lines(&aggregate::history(engine, &args))))
        }
        Command::RecentBlocked { limit } => {
            ok(format::finish(format::history_lines(&aggregate::recent_blocked(engine, limit))))
        }
        Command::Memory => ok(format::finish(format::memory_lines(&aggregate::memory(engine)))),
        // No per-connection client identity is tracked on the line protocol;
        // the reference resolver's `>clientID` only ever matters on the API
        // socket's authenticated session, which this line protocol isn't.
        Command::ClientId => ok(format::finish(vec!["0".to_string()])),
        Command::ForwardedOverTime => {
            ok(format::finish(format::over_time_lines(&aggregate::forwarded_over_time(engine))))
        }
        Command::QueryTypesOverTime => ok(format::finish(format::query_types_over_time_lines(
            &aggregate::query_types_over_time(engine),
        ))),
        Command::Version => ok(format::finish(format::version_lines(env!("CARGO_PKG_VERSION")))),
        Command::DbStats => ok(format::finish(format::db_stats_lines(&aggregate::db_stats(engine)))),
        Command::Quit => LineOutcome { body: format::finish(vec![]), close_connection: true },
        Command::Kill => {
            killed.store(true, Ordering::SeqCst);
            LineOutcome { body: format::finish(vec!["killed".to_string()]), close_connection: true }
        }
        Command::Unknown(text) => ok(format::unknown_command_line(&text)),
    }
}

/// Dispatches one HTTP resource path, returning its JSON body. `None` means
/// the caller should answer 404 with the standard not-found body.
pub fn dispatch_http(engine: &Engine, path: &str) -> Option<String> {
    match path {
        "/stats/summary" => Some(format::stats_json(&aggregate::stats(engine))),
        "/stats/overTime/graph" => Some(format::over_time_json(&aggregate::over_time(engine))),
        "/stats/top_domains" => {
            Some(format::top_domains_json(&aggregate::top_domains(engine, &TopListArgs::default())))
        }
        "/stats/top_ads" => Some(format::top_ads_json(&aggregate::top_ads(engine, &TopListArgs::default()))),
        "/stats/top_clients" => {
            Some(format::top_clients_json(&aggregate::top_clients(engine, &TopClientArgs::default())))
        }
        "/stats/forward_dest" => Some(format::forward_dest_json(&aggregate::forward_dest(engine, false))),
        "/stats/query_types" => Some(format::query_types_json(&aggregate::query_types(engine))),
        "/stats/history" => Some(format::history_json(&aggregate::history(engine, &HistoryArgs::default()))),
        "/stats/recent_blocked" => Some(format::history_json(&aggregate::recent_blocked(engine, None))),
        "/stats/overTime/forward_dest" => {
            Some(format::over_time_json(&aggregate::forwarded_over_time(engine)))
        }
        "/stats/overTime/query_types" => {
            Some(format::query_types_over_time_json(&aggregate::query_types_over_time(engine)))
        }
        "/stats/dashboard" => Some(format::dashboard_json(
            &aggregate::stats(engine),
            &aggregate::over_time(engine),
            &aggregate::top_domains(engine, &TopListArgs::default()),
            &aggregate::top_clients(engine, &TopClientArgs::default()),
            &aggregate::forward_dest(engine, false),
        )),
        "/dns/status" => {
            Some(format!("{{\"status\":\"{}\"}}", if engine.blocking_enabled() { "enabled" } else { "disabled" }))
        }
        // Whitelist/blacklist membership belongs to the gravity/blacklist
        // classifier, an external collaborator this engine only consults
        // (spec.md §1) — it owns no list data of its own to report here.
        "/dns/whitelist" | "/dns/blacklist" => Some("{\"data\":[]}".to_string()),
        _ => None,
    }
}

/// Encodes the `>stats` aggregation for the binary framing.
pub fn dispatch_binary_stats(engine: &Engine) -> Vec<u8> {
    let s = aggregate::stats(engine);
    binary::encode_map(&[
        ("dns_queries_today", binary::Value::I64(s.total as i64)),
        ("ads_blocked_today", binary::Value::I64(s.blocked as i64)),
        ("unique_domains", binary::Value::I64(s.domains as i64)),
        ("unique_clients", binary::Value::I64(s.clients as i64)),
        ("queries_forwarded", binary::Value::I64(s.forwarded as i64)),
        ("queries_cached", binary::Value::I64(s.cached as i64)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::model::{QueryStatus, QueryType};
    use std::sync::atomic::AtomicBool;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default())
    }

    #[test]
    fn stats_line_matches_scenario_one() {
        let engine = engine();
        engine
            .on_new_query(
                1_700_000_000,
                QueryType::A,
                "example.com",
                "10.0.0.1",
                QueryStatus::Forwarded,
                Some("8.8.8.8"),
            )
            .unwrap();
        let killed = AtomicBool::new(false);
        let outcome = dispatch_line(&engine, &killed, ">stats");
        assert_eq!(
            outcome.body,
            "dns_queries_today 1 ads_blocked_today 0 unique_domains 1 unique_clients 1 \
             queries_forwarded 1 queries_cached 0\n\u{4}"
        );
    }

    #[test]
    fn top_ads_line_matches_scenario_two() {
        let engine = engine();
        engine
            .on_new_query(1_700_000_000, QueryType::A, "example.com", "10.0.0.1", QueryStatus::Gravity, None)
            .unwrap();
        let killed = AtomicBool::new(false);
        let outcome = dispatch_line(&engine, &killed, ">top-ads (5)");
        assert_eq!(outcome.body, "0 1 example.com\n\u{4}");
    }

    #[test]
    fn unknown_command_reports_the_text() {
        let engine = engine();
        let killed = AtomicBool::new(false);
        let outcome = dispatch_line(&engine, &killed, ">bogus");
        assert!(outcome.body.starts_with("unknown command: >bogus"));
    }

    #[test]
    fn kill_sets_the_shared_flag_and_closes() {
        let engine = engine();
        let killed = AtomicBool::new(false);
        let outcome = dispatch_line(&engine, &killed, ">kill");
        assert!(killed.load(Ordering::SeqCst));
        assert!(outcome.close_connection);
    }

    #[test]
    fn quit_closes_without_touching_the_flag() {
        let engine = engine();
        let killed = AtomicBool::new(false);
        let outcome = dispatch_line(&engine, &killed, ">quit");
        assert!(!killed.load(Ordering::SeqCst));
        assert!(outcome.close_connection);
    }

    #[test]
    fn unknown_http_path_is_none() {
        let engine = engine();
        assert!(dispatch_http(&engine, "/nonsense").is_none());
    }

    #[test]
    fn dashboard_json_splices_fragments_into_one_object() {
        let engine = engine();
        let body = dispatch_http(&engine, "/stats/dashboard").unwrap();
        assert!(body.starts_with('{') && body.ends_with('}'));
        assert!(body.contains("dns_queries_today"));
        assert!(body.contains("top_domains"));
    }
}
