//! Line-protocol command parsing, grounded in the reference resolver's
//! `process_socket_request` / `command()` prefix matching. Unlike the
//! original's `strstr`-based fuzzy prefix match, token boundaries here are
//! exact — the command set is small and fixed, so exactness costs nothing
//! and avoids `>stats` accidentally matching `>statsfoo`.

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopListArgs {
    pub audit: bool,
    pub ascending: bool,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopClientArgs {
    pub withzero: bool,
    pub blocked: bool,
    pub ascending: bool,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryArgs {
    pub time_range: Option<(i64, i64)>,
    pub qtype: Option<String>,
    pub forward: Option<String>,
    pub domain: Option<String>,
    pub client: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Stats,
    OverTime,
    TopDomains(TopListArgs),
    TopAds(TopListArgs),
    TopClients(TopClientArgs),
    ForwardDest { unsorted: bool },
    ForwardNames,
    QueryTypes,
    GetAllQueries(HistoryArgs),
    RecentBlocked { limit: Option<usize> },
    Memory,
    ClientId,
    ForwardedOverTime,
    QueryTypesOverTime,
    Version,
    DbStats,
    Quit,
    Kill,
    Unknown(String),
}

pub fn parse(line: &str) -> Command {
    let line = line.trim();
    let mut tokens = line.split_whitespace();
    let Some(head) = tokens.next() else {
        return Command::Unknown(String::new());
    };
    let rest: Vec<&str> = tokens.collect();

    if let Some(suffix) = head.strip_prefix(">getallqueries") {
        return Command::GetAllQueries(parse_history_args(suffix, &rest));
    }

    match head {
        ">stats" => Command::Stats,
        ">overTime" => Command::OverTime,
        ">top-domains" => Command::TopDomains(parse_top_list_args(&rest)),
        ">top-ads" => Command::TopAds(parse_top_list_args(&rest)),
        ">top-clients" => Command::TopClients(parse_top_client_args(&rest)),
        ">forward-dest" => Command::ForwardDest { unsorted: rest.contains(&"unsorted") },
        ">forward-names" => Command::ForwardNames,
        ">querytypes" => Command::QueryTypes,
        ">recentBlocked" => Command::RecentBlocked { limit: parse_limit(&rest) },
        ">memory" => Command::Memory,
        ">clientID" => Command::ClientId,
        ">ForwardedoverTime" => Command::ForwardedOverTime,
        ">QueryTypesoverTime" => Command::QueryTypesOverTime,
        ">version" => Command::Version,
        ">dbstats" => Command::DbStats,
        ">quit" => Command::Quit,
        ">kill" => Command::Kill,
        other => Command::Unknown(other.to_string()),
    }
}

fn parse_limit(tokens: &[&str]) -> Option<usize> {
    tokens.iter().find_map(|t| t.strip_prefix('(')?.strip_suffix(')')?.parse().ok())
}

fn parse_top_list_args(tokens: &[&str]) -> TopListArgs {
    TopListArgs {
        audit: tokens.windows(2).any(|w| w == ["for", "audit"]),
        ascending: tokens.contains(&"asc"),
        limit: parse_limit(tokens),
    }
}

fn parse_top_client_args(tokens: &[&str]) -> TopClientArgs {
    TopClientArgs {
        withzero: tokens.contains(&"withzero"),
        blocked: tokens.contains(&"blocked"),
        ascending: tokens.contains(&"asc"),
        limit: parse_limit(tokens),
    }
}

fn parse_history_args(suffix: &str, rest: &[&str]) -> HistoryArgs {
    let mut args = HistoryArgs { limit: parse_limit(rest), ..Default::default() };
    match suffix {
        "-time" if rest.len() >= 2 => {
            if let (Ok(a), Ok(b)) = (rest[0].parse(), rest[1].parse()) {
                args.time_range = Some((a, b));
            }
        }
        "-qtype" => args.qtype = rest.first().map(|s| s.to_string()),
        "-forward" => args.forward = rest.first().map(|s| s.to_string()),
        "-domain" => args.domain = rest.first().map(|s| s.to_string()),
        "-client" => args.client = rest.first().map(|s| s.to_string()),
        _ => {}
    }
    args
}
