//! Query normalization, lyric cleaning and cache keys.
//!
//! Title and artist normalization are idempotent: feeding a normalized
//! string back in returns it unchanged.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*(\([^)]*\)|\[[^\]]*\])").expect("valid bracket regex"));

static EDITION_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s+-\s+(\d{4}\s+)?(remaster(ed)?|live|acoustic|demo|radio edit|single version|album version|mono|stereo|version|edit|mix|remix)\b.*$",
    )
    .expect("valid edition regex")
});

static FEATURED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*[(\[]?\s*\b(feat\.?|ft\.?|featuring|with)\s.*$").expect("valid featured regex")
});

// 前段含逗號或括號時視為單一團名 (例如 "Earth, Wind & Fire")，不切割
static SECONDARY_ARTIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([^,(\[]*?)\s*(&|\band\b|\bx\b|\bvs\.?)\s.*$")
        .expect("valid conjunction regex")
});

static UNCLOSED_BRACKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[(\[][^)\]]*$").expect("valid unclosed bracket regex"));

static SECTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\[[^\]\n]*\][ \t]*\n?").expect("valid section regex"));

static SECTION_INLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]\n]*\]").expect("valid inline section regex"));

static EMBED_TRAILER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d*\s*Embed\s*$").expect("valid embed regex"));

static CONTRIBUTORS_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\d+\s+Contributors?.*?Lyrics").expect("valid header regex")
});

static RELATED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*you might also like[ \t]*\n").expect("valid footer line regex")
});

static RELATED_INLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)you might also like|see [^\n]*?live ?get tickets as low as \$\d+")
        .expect("valid footer regex")
});

static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").expect("valid space regex"));

static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid blank-line regex"));

/// Strips bracketed suffixes and trailing edition markers from a title.
pub fn normalize_title(title: &str) -> String {
    let trimmed = collapse_spaces(title);
    let without_brackets = BRACKETED.replace_all(&trimmed, "");
    let without_edition = EDITION_SUFFIX.replace(&without_brackets, "");
    let normalized = collapse_spaces(&without_edition);

    // 全部被刪掉時保留原字串 (例如標題本身就是 "(Intro)")
    if normalized.is_empty() {
        trimmed
    } else {
        normalized
    }
}

/// Keeps only the primary artist: drops featured annotations and anything
/// after a secondary-artist conjunction.
pub fn normalize_artist(artist: &str) -> String {
    let trimmed = collapse_spaces(artist);
    let without_featured = FEATURED.replace(&trimmed, "");
    let primary = SECONDARY_ARTIST.replace(&without_featured, "${1}");
    let balanced = UNCLOSED_BRACKET.replace(&primary, "");
    let normalized = collapse_spaces(&balanced);

    if normalized.is_empty() {
        trimmed
    } else {
        normalized
    }
}

/// Cleans raw lyric text for storage.
///
/// Removes section markers such as `[Chorus]`, the trailing embed counter,
/// contributor headers and "related content" footers, then normalizes
/// whitespace. Runs of blank lines collapse to a single blank line.
pub fn clean_lyrics(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let text = CONTRIBUTORS_HEADER.replace(&text, "");
    let text = SECTION_LINE.replace_all(&text, "");
    let text = SECTION_INLINE.replace_all(&text, "");
    let text = RELATED_LINE.replace_all(&text, "");
    let text = RELATED_INLINE.replace_all(&text, "");
    let text = EMBED_TRAILER.replace(text.trim_end(), "");

    let lines: Vec<String> = text
        .lines()
        .map(|line| HORIZONTAL_SPACE.replace_all(line, " ").trim().to_string())
        .collect();

    BLANK_RUN
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Deterministic key for a (title, artist) pair, insensitive to case and
/// surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(title: &str, artist: &str) -> Self {
        let material = format!(
            "{}:{}",
            title.trim().to_lowercase(),
            artist.trim().to_lowercase()
        );
        Self(format!("{:x}", md5::compute(material)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn collapse_spaces(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
