//! emerge.log line grammar.
//!
//! Every line Portage writes to `emerge.log` starts with an epoch timestamp and
//! a colon. Only a handful of line shapes matter for sync and world update
//! tracking; everything else classifies as [`LogEvent::Other`].
//!
//! ```text
//! 1700000000: === Sync completed for gentoo
//! 1700000100:  *** emerge --keep-going --update --deep @world
//! 1700000105:  >>> emerge (1 of 3) dev-libs/foo-1.2 to /
//! 1700000110:  ::: completed emerge (1 of 3) dev-libs/foo-1.2 to /
//! 1700000200:  *** exiting unsuccessfully with status '1'.
//! 1700000300:  *** exiting successfully.
//! ```

use std::sync::LazyLock;

use regex::Regex;

static LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<ts>\d+):\s+(?P<body>.*?)\s*$").expect("Invalid LINE_REGEX")
});

static INVOCATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\*\*\* emerge\s+(?P<args>.*)$").expect("Invalid INVOCATION_REGEX")
});

static PACKAGE_START_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^>>> emerge \((?P<index>\d+) of (?P<total>\d+)\) (?P<name>\S+) to \S+")
        .expect("Invalid PACKAGE_START_REGEX")
});

static PACKAGE_COMPLETE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^::: completed emerge \((?P<index>\d+) of (?P<total>\d+)\) (?P<name>\S+) to \S+",
    )
    .expect("Invalid PACKAGE_COMPLETE_REGEX")
});

static EXIT_FAILURE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\*\*\* exiting unsuccessfully with status '(?P<status>-?\d+)'")
        .expect("Invalid EXIT_FAILURE_REGEX")
});

static EXIT_SUCCESS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\*\*\* exiting successfully\.?$").expect("Invalid EXIT_SUCCESS_REGEX")
});

static SYNC_COMPLETED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^=== Sync completed for (?P<repo>\S+)$").expect("Invalid SYNC_COMPLETED_REGEX")
});

/// A classified emerge.log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent<'a> {
    /// `*** emerge ... @world ...`
    WorldStart { ts: i64, keep_going: bool },
    /// `>>> emerge (i of N) <pkg> to <root>`
    PackageStart {
        ts: i64,
        index: u32,
        total: u32,
        name: &'a str,
    },
    /// `::: completed emerge (i of N) <pkg> to <root>`
    PackageComplete {
        ts: i64,
        index: u32,
        total: u32,
        name: &'a str,
    },
    /// `*** exiting unsuccessfully with status 'N'.`
    ExitFailure { ts: i64, status: i32 },
    /// `*** exiting successfully.`
    ExitSuccess { ts: i64 },
    /// `=== Sync completed for <repo>`
    SyncCompleted { ts: i64, repo: &'a str },
    /// Anything else, including lines with an unparsable timestamp
    Other,
}

impl<'a> LogEvent<'a> {
    /// Classify a single log line
    pub fn parse(line: &'a str) -> Self {
        let Some(caps) = LINE_REGEX.captures(line) else {
            return LogEvent::Other;
        };
        let Ok(ts) = caps["ts"].parse::<i64>() else {
            return LogEvent::Other;
        };
        let Some(body) = caps.name("body").map(|m| m.as_str()) else {
            return LogEvent::Other;
        };

        if let Some(event) = parse_package_line(&PACKAGE_START_REGEX, body, ts, false) {
            return event;
        }
        if let Some(event) = parse_package_line(&PACKAGE_COMPLETE_REGEX, body, ts, true) {
            return event;
        }
        if let Some(caps) = INVOCATION_REGEX.captures(body) {
            let args = caps.name("args").map(|m| m.as_str()).unwrap_or("");
            return match parse_invocation(args) {
                Some(keep_going) => LogEvent::WorldStart { ts, keep_going },
                None => LogEvent::Other,
            };
        }
        if let Some(caps) = EXIT_FAILURE_REGEX.captures(body) {
            let status = caps["status"].parse().unwrap_or(1);
            return LogEvent::ExitFailure { ts, status };
        }
        if EXIT_SUCCESS_REGEX.is_match(body) {
            return LogEvent::ExitSuccess { ts };
        }
        if let Some(caps) = SYNC_COMPLETED_REGEX.captures(body) {
            if let Some(repo) = caps.name("repo") {
                return LogEvent::SyncCompleted {
                    ts,
                    repo: repo.as_str(),
                };
            }
        }

        LogEvent::Other
    }

    /// Timestamp of the line, if it was classified
    pub fn timestamp(&self) -> Option<i64> {
        match *self {
            LogEvent::WorldStart { ts, .. }
            | LogEvent::PackageStart { ts, .. }
            | LogEvent::PackageComplete { ts, .. }
            | LogEvent::ExitFailure { ts, .. }
            | LogEvent::ExitSuccess { ts }
            | LogEvent::SyncCompleted { ts, .. } => Some(ts),
            LogEvent::Other => None,
        }
    }
}

fn parse_package_line<'a>(
    regex: &Regex,
    body: &'a str,
    ts: i64,
    completed: bool,
) -> Option<LogEvent<'a>> {
    let caps = regex.captures(body)?;
    let index = caps["index"].parse().ok()?;
    let total = caps["total"].parse().ok()?;
    let name = caps.name("name")?.as_str();

    Some(if completed {
        LogEvent::PackageComplete {
            ts,
            index,
            total,
            name,
        }
    } else {
        LogEvent::PackageStart {
            ts,
            index,
            total,
            name,
        }
    })
}

/// Returns `Some(keep_going)` for a world invocation, `None` for anything else
fn parse_invocation(args: &str) -> Option<bool> {
    let mut world = false;
    let mut keep_going = false;

    for token in args.split_whitespace() {
        match token {
            "world" | "@world" => world = true,
            "--keep-going" | "--keep-going=y" => keep_going = true,
            "--keep-going=n" => keep_going = false,
            _ => {}
        }
    }

    world.then_some(keep_going)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_start_plain() {
        assert_eq!(
            LogEvent::parse("1000:  *** emerge --update --deep --newuse world"),
            LogEvent::WorldStart {
                ts: 1000,
                keep_going: false
            }
        );
    }

    #[test]
    fn test_world_start_with_keep_going_and_at_world() {
        assert_eq!(
            LogEvent::parse("1000:  *** emerge --keep-going --update @world --ask"),
            LogEvent::WorldStart {
                ts: 1000,
                keep_going: true
            }
        );
        assert_eq!(
            LogEvent::parse("1000:  *** emerge --keep-going=y -uDN @world"),
            LogEvent::WorldStart {
                ts: 1000,
                keep_going: true
            }
        );
        assert_eq!(
            LogEvent::parse("1000:  *** emerge --keep-going=n -uDN @world"),
            LogEvent::WorldStart {
                ts: 1000,
                keep_going: false
            }
        );
    }

    #[test]
    fn test_non_world_invocation_is_other() {
        assert_eq!(
            LogEvent::parse("1000:  *** emerge --oneshot dev-libs/world-utils"),
            LogEvent::Other
        );
        assert_eq!(LogEvent::parse("1000:  *** emerge --sync"), LogEvent::Other);
    }

    #[test]
    fn test_package_start() {
        assert_eq!(
            LogEvent::parse("1005:  >>> emerge (1 of 3) dev-libs/foo-1.2 to /"),
            LogEvent::PackageStart {
                ts: 1005,
                index: 1,
                total: 3,
                name: "dev-libs/foo-1.2"
            }
        );
    }

    #[test]
    fn test_package_complete() {
        assert_eq!(
            LogEvent::parse("1010:  ::: completed emerge (2 of 3) sys-apps/bar-0.1-r2 to /"),
            LogEvent::PackageComplete {
                ts: 1010,
                index: 2,
                total: 3,
                name: "sys-apps/bar-0.1-r2"
            }
        );
    }

    #[test]
    fn test_exit_lines() {
        assert_eq!(
            LogEvent::parse("1030:  *** exiting successfully."),
            LogEvent::ExitSuccess { ts: 1030 }
        );
        assert_eq!(
            LogEvent::parse("1030:  *** exiting unsuccessfully with status '1'."),
            LogEvent::ExitFailure {
                ts: 1030,
                status: 1
            }
        );
    }

    #[test]
    fn test_sync_completed() {
        assert_eq!(
            LogEvent::parse("900: === Sync completed for gentoo"),
            LogEvent::SyncCompleted {
                ts: 900,
                repo: "gentoo"
            }
        );
        assert_eq!(
            LogEvent::parse("900: === Sync completed for guru"),
            LogEvent::SyncCompleted {
                ts: 900,
                repo: "guru"
            }
        );
    }

    #[test]
    fn test_garbage_lines_are_other() {
        assert_eq!(LogEvent::parse(""), LogEvent::Other);
        assert_eq!(LogEvent::parse("not a log line"), LogEvent::Other);
        assert_eq!(
            LogEvent::parse("99999999999999999999999: *** exiting successfully."),
            LogEvent::Other
        );
        assert_eq!(
            LogEvent::parse("1000:  === (1 of 3) Cleaning (dev-libs/foo-1.2::/usr/portage)"),
            LogEvent::Other
        );
    }

    #[test]
    fn test_trailing_whitespace_tolerated() {
        assert_eq!(
            LogEvent::parse("1030:  *** exiting successfully.   "),
            LogEvent::ExitSuccess { ts: 1030 }
        );
    }

    #[test]
    fn test_timestamp_accessor() {
        assert_eq!(
            LogEvent::parse("42:  *** exiting successfully.").timestamp(),
            Some(42)
        );
        assert_eq!(LogEvent::Other.timestamp(), None);
    }
}
