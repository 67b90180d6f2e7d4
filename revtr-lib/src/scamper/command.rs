//! Translation of measurement requests into probe-daemon command lines.
//!
//! Each measurement kind has a static table mapping request fields to
//! command-line flags. Empty strings, `None` and `false` are left out.

use std::fmt::Write;
use std::net::Ipv4Addr;

use crate::model::{PingMeasurement, TracerouteMeasurement};
use crate::spoof;

/// One entry of an option table.
enum Arg<T> {
    /// Emitted verbatim when the predicate holds.
    Switch(&'static str, fn(&T) -> bool),
    /// Emitted followed by its value when a value is present.
    Value(&'static str, fn(&T) -> Option<String>),
    /// The user id minted by the session.
    UserId,
}

fn text(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

const PING_ARGS: &[Arg<PingMeasurement>] = &[
    Arg::Switch("-O spoof", |p| p.spoof),
    Arg::Value("-S", |p| p.saddr.map(|a| a.to_string())),
    Arg::Switch("-R", |p| p.rr),
    Arg::Value("-B", |p| text(&p.payload)),
    Arg::Value("-c", |p| text(&p.count)),
    Arg::Value("-C", |p| text(&p.icmp_sum)),
    Arg::Value("-d", |p| text(&p.dport)),
    Arg::Value("-F", |p| text(&p.sport)),
    Arg::Value("-i", |p| text(&p.wait)),
    Arg::Value("-m", |p| text(&p.ttl)),
    Arg::Value("-M", |p| text(&p.mtu)),
    Arg::Value("-o", |p| text(&p.reply_count)),
    Arg::Value("-p", |p| text(&p.pattern)),
    Arg::Value("-P", |p| text(&p.method)),
    Arg::Value("-s", |p| text(&p.size)),
    Arg::UserId,
    Arg::Value("-z", |p| text(&p.tos)),
    Arg::Value("-T", |p| text(&p.timestamp)),
];

const TRACE_ARGS: &[Arg<TracerouteMeasurement>] = &[
    Arg::Value("-c", |t| text(&t.confidence)),
    Arg::Value("-d", |t| text(&t.dport)),
    Arg::Value("-f", |t| text(&t.first_hop)),
    Arg::Value("-g", |t| text(&t.gap_limit)),
    Arg::Value("-G", |t| text(&t.gap_action)),
    Arg::Value("-l", |t| text(&t.loops)),
    Arg::Value("-m", |t| text(&t.max_ttl)),
    Arg::Switch("-M", |t| t.path_discovery),
    Arg::Value("-P", |t| text(&t.method)),
    Arg::Value("-q", |t| text(&t.attempts)),
    Arg::Switch("-Q", |t| t.all_attempts),
    Arg::Value("-s", |t| text(&t.sport)),
    Arg::Value("-S", |t| text(&t.saddr)),
    Arg::Value("-t", |t| text(&t.tos)),
    Arg::UserId,
    Arg::Value("-w", |t| text(&t.wait)),
    Arg::Value("-W", |t| text(&t.wait_probe)),
];

fn render<T>(keyword: &str, table: &[Arg<T>], req: &T, user_id: u32, dst: Ipv4Addr) -> String {
    let mut out = String::from(keyword);
    for arg in table {
        match arg {
            Arg::Switch(flag, pred) => {
                if pred(req) {
                    out.push(' ');
                    out.push_str(flag);
                }
            }
            Arg::Value(flag, value) => {
                if let Some(v) = value(req) {
                    let _ = write!(out, " {flag} {v}");
                }
            }
            Arg::UserId => {
                let _ = write!(out, " -U {user_id}");
            }
        }
    }
    let _ = writeln!(out, " {dst}");
    out
}

/// A measurement submitted to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping(PingMeasurement),
    Traceroute(TracerouteMeasurement),
}

impl Request {
    pub fn src(&self) -> Ipv4Addr {
        match self {
            Request::Ping(p) => p.src,
            Request::Traceroute(t) => t.src,
        }
    }

    pub fn dst(&self) -> Ipv4Addr {
        match self {
            Request::Ping(p) => p.dst,
            Request::Traceroute(t) => t.dst,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Request::Ping(_) => "ping",
            Request::Traceroute(_) => "trace",
        }
    }

    /// Command line with `user_id` injected, newline terminated.
    ///
    /// Spoofed pings always carry the ICMP id and sequence the vantage point
    /// monitor filters on, and a correlation payload when none was given.
    pub fn command(&self, user_id: u32) -> String {
        match self {
            Request::Ping(p) if p.spoof => {
                let mut p = p.clone();
                p.sport = spoof::ICMP_ID.to_string();
                p.dport = spoof::ICMP_SEQ.to_string();
                if p.payload.is_empty() {
                    p.payload = spoof::payload(p.src, p.spoof_id);
                }
                render("ping", PING_ARGS, &p, user_id, p.dst)
            }
            Request::Ping(p) => render("ping", PING_ARGS, p, user_id, p.dst),
            Request::Traceroute(t) => render("trace", TRACE_ARGS, t, user_id, t.dst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_omits_empty_options() {
        let req = Request::Ping(PingMeasurement {
            src: Ipv4Addr::new(10, 0, 0, 1),
            dst: Ipv4Addr::new(8, 8, 8, 8),
            count: "1".to_string(),
            rr: true,
            ..PingMeasurement::default()
        });
        assert_eq!(req.command(7), "ping -R -c 1 -U 7 8.8.8.8\n");
    }

    #[test]
    fn spoofed_ping_pins_ports_and_payload() {
        let req = Request::Ping(PingMeasurement {
            src: Ipv4Addr::new(10, 0, 0, 1),
            dst: Ipv4Addr::new(8, 8, 8, 8),
            spoof: true,
            saddr: Some(Ipv4Addr::new(10, 0, 0, 2)),
            spoof_id: 5,
            sport: "1".to_string(),
            ..PingMeasurement::default()
        });
        assert_eq!(
            req.command(1),
            "ping -O spoof -S 10.0.0.2 -B 0a00000100000005 -d 62195 -F 61681 -U 1 8.8.8.8\n"
        );
    }

    #[test]
    fn traceroute_switches() {
        let req = Request::Traceroute(TracerouteMeasurement {
            src: Ipv4Addr::new(10, 0, 0, 1),
            dst: Ipv4Addr::new(1, 1, 1, 1),
            path_discovery: true,
            attempts: "2".to_string(),
            wait_probe: "5".to_string(),
            ..TracerouteMeasurement::default()
        });
        assert_eq!(req.command(3), "trace -M -q 2 -U 3 -W 5 1.1.1.1\n");
    }
}
