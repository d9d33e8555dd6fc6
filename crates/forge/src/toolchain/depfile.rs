//! Make-style dependency files (`obj.o: src.c a.h b.h`)

use camino::{Utf8Path, Utf8PathBuf};

use crate::Result;

/// Read the prerequisites listed in a dependency file.
///
/// A missing file is not an error: the source simply has not been compiled
/// yet.
pub fn read_depfile(path: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(parse_depfile(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Parse the prerequisites of every rule in `content`.
///
/// Handles line continuations, `\ ` escaped spaces, `\#`, `$$`, and Windows
/// drive letters (a `:` only separates a rule when followed by whitespace or
/// the end of the line).
pub fn parse_depfile(content: &str) -> Vec<Utf8PathBuf> {
    let joined = content.replace("\\\r\n", " ").replace("\\\n", " ");
    let mut prerequisites = Vec::new();

    for line in joined.lines() {
        let Some(rest) = split_rule(line) else {
            continue;
        };
        for token in tokenize(rest) {
            let path = Utf8PathBuf::from(token);
            if !prerequisites.contains(&path) {
                prerequisites.push(path);
            }
        }
    }

    prerequisites
}

/// Render a dependency file for `target`
pub fn write_depfile(target: &Utf8Path, prerequisites: &[Utf8PathBuf]) -> String {
    let mut out = format!("{}:", escape(target.as_str()));
    for prerequisite in prerequisites {
        out.push_str(" \\\n  ");
        out.push_str(&escape(prerequisite.as_str()));
    }
    out.push('\n');
    out
}

/// Return the text after the rule separator, if the line is a rule
fn split_rule(line: &str) -> Option<&str> {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b':' => {
                let next = bytes.get(i + 1);
                if next.is_none() || next.is_some_and(|b| b.is_ascii_whitespace()) {
                    return Some(&line[i + 1..]);
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if matches!(chars.peek(), Some(' ') | Some('#')) => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '$' if chars.peek() == Some(&'$') => {
                chars.next();
                current.push('$');
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

fn escape(path: &str) -> String {
    path.replace('$', "$$").replace(' ', "\\ ").replace('#', "\\#")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gcc_output() {
        let content = "build/obj/main.c.o: src/main.c include/app.h \\\n include/util.h\n";
        let deps = parse_depfile(content);

        assert_eq!(
            deps,
            vec![
                Utf8PathBuf::from("src/main.c"),
                Utf8PathBuf::from("include/app.h"),
                Utf8PathBuf::from("include/util.h"),
            ]
        );
    }

    #[test]
    fn test_parse_escaped_spaces() {
        let content = "a.o: my\\ dir/a.c my\\ dir/a.h\n";
        let deps = parse_depfile(content);

        assert_eq!(
            deps,
            vec![Utf8PathBuf::from("my dir/a.c"), Utf8PathBuf::from("my dir/a.h")]
        );
    }

    #[test]
    fn test_parse_windows_paths() {
        let content = "C:\\proj\\a.obj: C:\\proj\\a.cpp \\\r\n  C:\\proj\\inc\\a.h\r\n";
        let deps = parse_depfile(content);

        assert_eq!(
            deps,
            vec![
                Utf8PathBuf::from("C:\\proj\\a.cpp"),
                Utf8PathBuf::from("C:\\proj\\inc\\a.h"),
            ]
        );
    }

    #[test]
    fn test_parse_empty_and_garbage() {
        assert!(parse_depfile("").is_empty());
        assert!(parse_depfile("not a rule").is_empty());
    }

    #[test]
    fn test_write_then_parse() {
        let headers = vec![
            Utf8PathBuf::from("src/a b.c"),
            Utf8PathBuf::from("inc/x$y.h"),
        ];
        let rendered = write_depfile(Utf8Path::new("obj/a.obj"), &headers);

        assert_eq!(parse_depfile(&rendered), headers);
    }

    #[test]
    fn test_read_missing_depfile() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(temp_dir.path()).unwrap().join("none.d");

        assert!(read_depfile(&path).unwrap().is_empty());
    }
}
