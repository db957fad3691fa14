//! `emerge --pretend` output parsing

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static TOTAL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Total:\s+(?P<count>\d+)\s+packages?\b").expect("Invalid TOTAL_REGEX")
});

static MERGE_LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(?:ebuild|binary)\s+(?P<flags>[^\]]*)\]\s+(?P<atom>\S+)")
        .expect("Invalid MERGE_LINE_REGEX")
});

static PORTAGE_ATOM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^sys-apps/portage-\d").expect("Invalid PORTAGE_ATOM_REGEX")
});

/// What a dry run would merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PretendReport {
    /// Package count from the `Total:` line; `None` when emerge printed none
    pub packages: Option<u32>,
    /// Merge lines seen, used when the summary line is missing
    pub merge_lines: u32,
    /// A newer Portage is among the upgrades
    pub portage_update: bool,
}

impl PretendReport {
    /// Best available package count
    pub fn pending(&self) -> u32 {
        self.packages.unwrap_or(self.merge_lines)
    }
}

/// Parse the stdout of `emerge --pretend --verbose`
pub fn parse_pretend_output<'a, I>(lines: I) -> PretendReport
where
    I: IntoIterator<Item = &'a str>,
{
    let mut report = PretendReport::default();

    for line in lines {
        let line = line.trim();
        if let Some(caps) = TOTAL_REGEX.captures(line) {
            report.packages = caps["count"].parse().ok();
            continue;
        }
        if let Some(caps) = MERGE_LINE_REGEX.captures(line) {
            report.merge_lines += 1;
            let upgrade = caps["flags"].contains('U');
            if upgrade && PORTAGE_ATOM_REGEX.is_match(&caps["atom"]) {
                report.portage_update = true;
            }
        }
    }

    report
}
