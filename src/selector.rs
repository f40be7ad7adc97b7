//! Glob-based entry selection.
//!
//! No published crate implements quite the right semantics here: `*`
//! matches within one path segment, `**` matches across segment
//! boundaries (and can match zero segments), `?` matches exactly one
//! character, and `[...]` matches a POSIX-style character class. The
//! `glob` crate comes close but is wired to the filesystem; `globset`
//! compiles the same kind of pattern but assumes one match target per
//! call rather than an include/exclude stack. Rather than bend either
//! crate's assumptions, this is a small hand-rolled matcher, in the
//! spirit of the hand-rolled parsers this crate already has for the
//! archive format itself.

/// A compiled glob pattern over archive paths (always `/`-separated).
#[derive(Debug, Clone)]
pub struct Pattern {
    segments: Vec<Segment>,
    case_insensitive: bool,
    /// The pattern text itself ended with `/`: only directory entries
    /// (paths that themselves end with `/`) can match it.
    dir_only: bool,
    /// The pattern's last component is `**`, which (unlike a plain
    /// literal or glob component) matches both files and directories.
    matches_directories: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// A literal path component, e.g. from `foo/bar`.
    Literal(String),
    /// A single path component containing `*`/`?` wildcards.
    Glob(Vec<GlobToken>),
    /// `**`: matches any number of path components, including zero.
    DoubleStar,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum GlobToken {
    Literal(char),
    AnyChar,
    AnyRun,
    Class(CharClass),
}

/// A `[...]` bracket expression: `!` or `^` right after the `[` negates
/// the set, and `a-z`-style ranges are expanded lazily at match time.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CharClass {
    negated: bool,
    items: Vec<ClassItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ClassItem {
    Char(char),
    Range(char, char),
}

impl CharClass {
    fn matches(&self, c: char, case_insensitive: bool) -> bool {
        let is_member = self.items.iter().any(|item| item.matches(c, case_insensitive));
        is_member != self.negated
    }
}

impl ClassItem {
    fn matches(&self, c: char, case_insensitive: bool) -> bool {
        match *self {
            ClassItem::Char(ch) => chars_eq(ch, c, case_insensitive),
            ClassItem::Range(lo, hi) => {
                if case_insensitive {
                    (lo.to_ascii_lowercase()..=hi.to_ascii_lowercase()).contains(&c.to_ascii_lowercase())
                } else {
                    (lo..=hi).contains(&c)
                }
            }
        }
    }
}

impl Pattern {
    pub fn new(pattern: &str, case_insensitive: bool) -> Self {
        let dir_only = pattern.ends_with('/');
        let segments: Vec<Segment> = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|segment| {
                if segment == "**" {
                    Segment::DoubleStar
                } else if segment.contains('*') || segment.contains('?') || segment.contains('[') {
                    Segment::Glob(compile_component(segment))
                } else {
                    Segment::Literal(segment.to_owned())
                }
            })
            .collect();
        let matches_directories = dir_only || matches!(segments.last(), Some(Segment::DoubleStar));
        Self {
            segments,
            case_insensitive,
            dir_only,
            matches_directories,
        }
    }

    /// Whether `path` (archive-style, `/`-separated, no leading slash)
    /// matches this pattern. A trailing `/` on `path` marks a directory
    /// entry, which only matches patterns ending in `/` or `**`.
    pub fn matches(&self, path: &str) -> bool {
        let path_is_dir = path.ends_with('/');
        if path_is_dir && !self.matches_directories {
            return false;
        }
        if !path_is_dir && self.dir_only {
            return false;
        }
        let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.matches_from(&self.segments, &components)
    }

    fn matches_from(&self, pattern: &[Segment], components: &[&str]) -> bool {
        match pattern.first() {
            None => components.is_empty(),
            Some(Segment::DoubleStar) => {
                // Try consuming zero components, then one, then two, ...
                // until the rest of the pattern matches or we run out.
                for split in 0..=components.len() {
                    if self.matches_from(&pattern[1..], &components[split..]) {
                        return true;
                    }
                }
                false
            }
            Some(Segment::Literal(lit)) => match components.first() {
                Some(head) if self.component_eq(lit, head) => self.matches_from(&pattern[1..], &components[1..]),
                _ => false,
            },
            Some(Segment::Glob(tokens)) => match components.first() {
                Some(head) if glob_component_matches(tokens, head, self.case_insensitive) => {
                    self.matches_from(&pattern[1..], &components[1..])
                }
                _ => false,
            },
        }
    }

    fn component_eq(&self, a: &str, b: &str) -> bool {
        if self.case_insensitive {
            a.eq_ignore_ascii_case(b)
        } else {
            a == b
        }
    }
}

fn compile_component(segment: &str) -> Vec<GlobToken> {
    let chars: Vec<char> = segment.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                tokens.push(GlobToken::AnyRun);
                i += 1;
            }
            '?' => {
                tokens.push(GlobToken::AnyChar);
                i += 1;
            }
            '[' => match parse_class(&chars[i..]) {
                Some((class, consumed)) => {
                    tokens.push(GlobToken::Class(class));
                    i += consumed;
                }
                // No closing bracket: `[` just means `[`.
                None => {
                    tokens.push(GlobToken::Literal('['));
                    i += 1;
                }
            },
            other => {
                tokens.push(GlobToken::Literal(other));
                i += 1;
            }
        }
    }
    tokens
}

/// Parses a `[...]` bracket expression starting at `chars[0] == '['`.
/// Returns the compiled class and how many characters (including both
/// brackets) it consumed. A `]` immediately after `[` or `[!`/`[^` is
/// taken as a literal member rather than the closing bracket, matching
/// POSIX glob behavior.
fn parse_class(chars: &[char]) -> Option<(CharClass, usize)> {
    let mut idx = 1;
    let negated = matches!(chars.get(idx), Some('!') | Some('^'));
    if negated {
        idx += 1;
    }
    let set_start = idx;
    if chars.get(idx) == Some(&']') {
        idx += 1;
    }
    while idx < chars.len() && chars[idx] != ']' {
        idx += 1;
    }
    if idx >= chars.len() {
        return None;
    }
    let body = &chars[set_start..idx];

    let mut items = Vec::new();
    let mut j = 0;
    while j < body.len() {
        if j + 2 < body.len() && body[j + 1] == '-' {
            items.push(ClassItem::Range(body[j], body[j + 2]));
            j += 3;
        } else {
            items.push(ClassItem::Char(body[j]));
            j += 1;
        }
    }
    Some((CharClass { negated, items }, idx + 1))
}

fn glob_component_matches(tokens: &[GlobToken], text: &str, case_insensitive: bool) -> bool {
    let chars: Vec<char> = text.chars().collect();
    matches_tokens(tokens, &chars, case_insensitive)
}

fn matches_tokens(tokens: &[GlobToken], text: &[char], case_insensitive: bool) -> bool {
    match tokens.first() {
        None => text.is_empty(),
        Some(GlobToken::AnyRun) => {
            for split in 0..=text.len() {
                if matches_tokens(&tokens[1..], &text[split..], case_insensitive) {
                    return true;
                }
            }
            false
        }
        Some(GlobToken::AnyChar) => !text.is_empty() && matches_tokens(&tokens[1..], &text[1..], case_insensitive),
        Some(GlobToken::Literal(c)) => match text.first() {
            Some(head) if chars_eq(*c, *head, case_insensitive) => matches_tokens(&tokens[1..], &text[1..], case_insensitive),
            _ => false,
        },
        Some(GlobToken::Class(class)) => match text.first() {
            Some(&head) if class.matches(head, case_insensitive) => matches_tokens(&tokens[1..], &text[1..], case_insensitive),
            _ => false,
        },
    }
}

fn chars_eq(a: char, b: char, case_insensitive: bool) -> bool {
    if case_insensitive {
        a.to_ascii_lowercase() == b.to_ascii_lowercase()
    } else {
        a == b
    }
}

/// An include/exclude stack of patterns, evaluated last-match-wins within
/// each group the way `zip -x`/`-i` and `tar --exclude` behave: an entry
/// is selected if it matches at least one include pattern (or there are
/// none, meaning "everything"), and is then dropped if it matches any
/// exclude pattern.
#[derive(Debug, Clone, Default)]
pub struct EntrySelector {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl EntrySelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, pattern: &str, case_insensitive: bool) -> Self {
        self.includes.push(Pattern::new(pattern, case_insensitive));
        self
    }

    pub fn exclude(mut self, pattern: &str, case_insensitive: bool) -> Self {
        self.excludes.push(Pattern::new(pattern, case_insensitive));
        self
    }

    pub fn selects(&self, path: &str) -> bool {
        let included = self.includes.is_empty() || self.includes.iter().any(|p| p.matches(path));
        if !included {
            return false;
        }
        !self.excludes.iter().any(|p| p.matches(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_matches_exactly() {
        let p = Pattern::new("foo/bar.txt", false);
        assert!(p.matches("foo/bar.txt"));
        assert!(!p.matches("foo/bar.txt.bak"));
        assert!(!p.matches("bar.txt"));
    }

    #[test]
    fn star_stays_within_one_component() {
        let p = Pattern::new("src/*.rs", false);
        assert!(p.matches("src/lib.rs"));
        assert!(!p.matches("src/nested/lib.rs"));
    }

    #[test]
    fn double_star_crosses_components() {
        let p = Pattern::new("src/**/*.rs", false);
        assert!(p.matches("src/lib.rs"));
        assert!(p.matches("src/a/b/c.rs"));
        assert!(!p.matches("tests/lib.rs"));
    }

    #[test]
    fn double_star_can_match_nothing_at_all() {
        let p = Pattern::new("**/Cargo.toml", false);
        assert!(p.matches("Cargo.toml"));
        assert!(p.matches("sub/Cargo.toml"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        let p = Pattern::new("file?.txt", false);
        assert!(p.matches("file1.txt"));
        assert!(!p.matches("file12.txt"));
        assert!(!p.matches("file.txt"));
    }

    #[test]
    fn selector_applies_excludes_after_includes() {
        let selector = EntrySelector::new()
            .include("src/**", false)
            .exclude("src/**/*.bak", false);
        assert!(selector.selects("src/lib.rs"));
        assert!(!selector.selects("src/lib.rs.bak"));
        assert!(!selector.selects("README.md"));
    }

    #[test]
    fn selector_with_no_includes_selects_everything() {
        let selector = EntrySelector::new().exclude("*.log", false);
        assert!(selector.selects("a.txt"));
        assert!(!selector.selects("a.log"));
    }

    #[test]
    fn case_insensitive_matching() {
        let p = Pattern::new("README.MD", true);
        assert!(p.matches("readme.md"));
    }

    #[test]
    fn character_class_matches_a_range() {
        let p = Pattern::new("file[0-9].txt", false);
        assert!(p.matches("file1.txt"));
        assert!(p.matches("file9.txt"));
        assert!(!p.matches("filea.txt"));
        assert!(!p.matches("file10.txt"));
    }

    #[test]
    fn negated_character_class() {
        let p = Pattern::new("file[!0-9].txt", false);
        assert!(p.matches("filea.txt"));
        assert!(!p.matches("file1.txt"));
    }

    #[test]
    fn character_class_with_literal_members() {
        let p = Pattern::new("[abc].txt", false);
        assert!(p.matches("a.txt"));
        assert!(!p.matches("d.txt"));
    }

    #[test]
    fn unterminated_bracket_is_literal() {
        let p = Pattern::new("odd[bracket.txt", false);
        assert!(p.matches("odd[bracket.txt"));
    }

    #[test]
    fn directory_only_pattern_does_not_match_a_file() {
        let p = Pattern::new("dir/", false);
        assert!(p.matches("dir/"));
        assert!(!p.matches("dir"));
    }

    #[test]
    fn plain_pattern_does_not_match_a_directory_entry() {
        let p = Pattern::new("dir", false);
        assert!(p.matches("dir"));
        assert!(!p.matches("dir/"));
    }

    #[test]
    fn double_star_pattern_matches_both_files_and_directories() {
        let p = Pattern::new("src/**", false);
        assert!(p.matches("src/lib.rs"));
        assert!(p.matches("src/nested/"));
    }
}
