use crate::error::RescueError;

/// Builder for shell scripts assembled from single-line fragments.
///
/// Invariants:
/// - Each pushed line must not contain `\n`, `\r`, or `\0`.
/// - `build()` joins lines with `\n` and ends with exactly one trailing `\n` when non-empty.
#[derive(Debug, Default)]
pub struct ShellFile {
    lines: Vec<String>,
}

impl ShellFile {
    pub fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Push one logical line (no embedded newlines).
    pub fn push(&mut self, line: impl Into<String>) -> &mut Self {
        self.lines.push(line.into());
        self
    }

    pub fn extend<I>(&mut self, lines: I) -> &mut Self
    where
        I: IntoIterator<Item = String>,
    {
        for l in lines {
            self.lines.push(l);
        }
        self
    }

    pub fn build(&self) -> Result<String, RescueError> {
        for (i, l) in self.lines.iter().enumerate() {
            if l.contains('\n') || l.contains('\r') || l.contains('\0') {
                return Err(RescueError::Template(format!(
                    "shell line {i} contains a newline or NUL; use atomic lines"
                )));
            }
        }

        if self.lines.is_empty() {
            return Ok(String::new());
        }

        let mut out = self.lines.join("\n");
        out.push('\n');
        Ok(out)
    }
}

/// Renders free text as shell comment lines, one `# ` line per input line.
///
/// Keeps the text verbatim apart from line breaks and NULs, which a comment cannot carry.
pub fn comment_lines(text: &str) -> Vec<String> {
    let body: Vec<String> = text
        .lines()
        .map(|l| {
            let l: String = l.chars().filter(|c| *c != '\r' && *c != '\0').collect();
            if l.trim().is_empty() {
                "#".to_string()
            } else {
                format!("#   {}", l.trim_end())
            }
        })
        .collect();

    if body.is_empty() {
        vec!["#   (none given)".to_string()]
    } else {
        body
    }
}

/// Wraps `s` in single quotes for literal use in a shell word.
pub fn single_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_empty_is_empty() {
        assert_eq!(ShellFile::new().build().unwrap(), "");
    }

    #[test]
    fn build_appends_trailing_newline() {
        let mut sf = ShellFile::new();
        sf.push("a").push("").push("b");
        assert_eq!(sf.build().unwrap(), "a\n\nb\n");
    }

    #[test]
    fn rejects_newline_in_line() {
        let mut sf = ShellFile::new();
        sf.push("ok").push("bad\nline");
        assert!(sf.build().is_err());
    }

    #[test]
    fn comments_carry_every_line_of_multiline_text() {
        let lines = comment_lines("black screen\r\nafter grub\n\nstuck");
        assert_eq!(
            lines,
            vec!["#   black screen", "#   after grub", "#", "#   stuck"]
        );
        assert!(lines.iter().all(|l| l.starts_with('#')));
    }

    #[test]
    fn empty_comment_text_gets_placeholder() {
        assert_eq!(comment_lines(""), vec!["#   (none given)"]);
    }

    #[test]
    fn single_quote_escapes_embedded_quotes() {
        assert_eq!(single_quote("it's"), r"'it'\''s'");
    }
}
