//! Budget line classification: detention versus community programs.

use std::sync::LazyLock;

use regex::Regex;

pub const DETENTION: &str = "detention";
pub const COMMUNITY: &str = "community";

const DETENTION_KEYWORDS: &[&str] = &[
    "detention",
    "cleveland",
    "west moreton",
    "secure facility",
    "custody",
    "remand",
    "secure accommodation",
];

const COMMUNITY_KEYWORDS: &[&str] = &[
    "community",
    "diversion",
    "restorative",
    "supervision",
    "bail support",
    "family support",
    "early intervention",
    "prevention",
    "rehabilitation",
    "reintegration",
];

/// Named detention centres.
const FACILITIES: &[&str] = &["cleveland", "west moreton", "wacol"];

/// Default row filter for budget tables and sentences.
pub const YOUTH_JUSTICE_KEYWORDS: &[&str] = &[
    "youth justice",
    "youth detention",
    "juvenile justice",
    "cleveland youth detention",
    "west moreton youth detention",
    "youth crime",
    "young offender",
    "youth offender",
    "community youth justice",
    "youth engagement",
    "supervised community accommodation",
    "restorative justice",
    "youth bail",
    "youth court",
    "children's court",
    "youth rehabilitation",
    "youth diversion",
];

static PROGRAM_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"\b(?i:for|to|in)\s+([A-Z][^.]{10,50}?)\s+(?i:program|initiative|service)").unwrap(),
        Regex::new(r"([A-Z][^.]{10,50}?)\s+(?i:program|initiative|service|centre|facility)").unwrap(),
    ]
});

/// `detention` or `community`, by keyword score. Facility names break ties.
pub fn categorize(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    let detention = DETENTION_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
    let community = COMMUNITY_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();

    if detention > community {
        DETENTION
    } else if community > detention {
        COMMUNITY
    } else if FACILITIES.iter().any(|f| lower.contains(f)) {
        DETENTION
    } else {
        COMMUNITY
    }
}

/// Whether `text` mentions any of `keywords`, case-insensitively.
pub fn mentions_any<S: AsRef<str>>(text: &str, keywords: &[S]) -> bool {
    let lower = text.to_lowercase();
    keywords
        .iter()
        .any(|k| lower.contains(&k.as_ref().to_lowercase()))
}

/// Best-effort program name from a sentence.
pub fn program_name(text: &str) -> String {
    for pattern in PROGRAM_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(text) {
            return caps[1].trim().to_string();
        }
    }
    text.chars().take(100).collect::<String>().trim().to_string()
}

/// Program name from a table row: the first cell that holds words.
pub fn row_program_name(cells: &[String]) -> Option<String> {
    cells
        .iter()
        .map(|c| c.trim())
        .find(|c| c.chars().filter(|ch| ch.is_alphabetic()).count() >= 3)
        .map(|c| c.to_string())
}
