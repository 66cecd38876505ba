//! Turning portal display text into safe path segments.

/// Collapses whitespace runs (including newlines) into single spaces and trims.
#[must_use]
pub fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

/// Returns the first non-empty line of an element's text, whitespace-normalized.
#[must_use]
pub fn first_line(s: &str) -> String {
    s.lines()
        .map(normalize_ws)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
}

/// Makes `name` usable as a single directory name on common file systems.
///
/// Separators and reserved characters become `_`, whitespace is normalized,
/// and leading or trailing dots and spaces are dropped so the segment can
/// never mean `.` or `..`. Falls back to `fallback` when nothing is left.
#[must_use]
pub fn path_segment(name: &str, fallback: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() && !c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    let out = normalize_ws(&replaced);
    let out = out.trim_matches(|c: char| c == '.' || c == ' ');
    if out.is_empty() {
        fallback.to_string()
    } else {
        out.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_whitespace() {
        assert_eq!(normalize_ws("  Course \t Documents\n"), "Course Documents");
    }

    #[test]
    fn first_line_skips_blank_lines() {
        assert_eq!(first_line("\n 15-213: Intro  \nInstructor: Smith"), "15-213: Intro");
        assert_eq!(first_line(""), "");
    }

    #[test]
    fn replaces_separators_and_reserved() {
        assert_eq!(path_segment("Lectures/Slides", "x"), "Lectures_Slides");
        assert_eq!(path_segment("15-213: Intro", "x"), "15-213_ Intro");
        assert_eq!(path_segment("What? <Now>", "x"), "What_ _Now_");
    }

    #[test]
    fn never_yields_dot_segments() {
        assert_eq!(path_segment("..", "folder_1"), "folder_1");
        assert_eq!(path_segment(" . ", "folder_1"), "folder_1");
        assert_eq!(path_segment("...hidden.", "x"), "hidden");
    }

    #[test]
    fn empty_falls_back() {
        assert_eq!(path_segment("", "course_3"), "course_3");
        assert_eq!(path_segment("   ", "course_3"), "course_3");
    }
}
