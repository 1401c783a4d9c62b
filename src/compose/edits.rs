//! Idempotent text edits applied inside the chroot.
//!
//! Each edit has two faces: `apply`, a Rust model of the transformation used
//! as the tested reference, and `shell_lines`, the commands the repair script
//! runs to perform the same transformation on the real file.

/// Bootloader defaults file edited inside the chroot.
pub const GRUB_DEFAULTS: &str = "/etc/default/grub";
/// Kernel tuning file for the optional optimizations.
pub const SYSCTL_CONF: &str = "/etc/sysctl.conf";

const CMDLINE_KEY: &str = "GRUB_CMDLINE_LINUX_DEFAULT";

// ── Kernel command line ───────────────────────────────────────────────────────

/// Value grammar of an unquoted assignment, as an ERE bracket run.
const BARE_VALUE: &str = r#"[^"'[:space:]#]*"#;

/// Guarantees one `require` flag and no `remove` flags on the
/// `GRUB_CMDLINE_LINUX_DEFAULT` line, leaving other parameters in order.
///
/// A line is rewritten only when it is well-formed: `KEY=` followed by a
/// double-quoted, single-quoted or bare value, then nothing but blanks or a
/// blank-led `# comment`. The quote style of quoted values and any trailing
/// comment are kept. Bare values come out double-quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdlineEdit {
    pub require: &'static str,
    pub remove: &'static [&'static str],
}

/// `nomodeset` in, `splash` out.
pub const GRAPHICS_SAFE_CMDLINE: CmdlineEdit = CmdlineEdit {
    require: "nomodeset",
    remove: &["splash"],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Double,
    Single,
    Bare,
}

impl CmdlineEdit {
    /// Applies the edit to a whole defaults file.
    pub fn apply(&self, content: &str) -> String {
        let mut out = ensure_trailing_newline(content);

        if !out.lines().any(|l| l.starts_with(&format!("{CMDLINE_KEY}="))) {
            out.push_str(&format!("{CMDLINE_KEY}=\"{}\"\n", self.require));
        }

        let mut rewritten = String::with_capacity(out.len() + self.require.len());
        for line in out.lines() {
            match self.rewrite_line(line) {
                Some(new) => rewritten.push_str(&new),
                None => rewritten.push_str(line),
            }
            rewritten.push('\n');
        }
        rewritten
    }

    /// Rewrites one line, or `None` when it is not a well-formed cmdline assignment.
    pub fn rewrite_line(&self, line: &str) -> Option<String> {
        let rest = line.strip_prefix(CMDLINE_KEY)?.strip_prefix('=')?;
        let (quote, value, tail) = split_assignment(rest)?;

        let mut tokens: Vec<&str> = value
            .split(is_blank)
            .filter(|t| !t.is_empty() && *t != self.require && !self.remove.contains(t))
            .collect();
        tokens.push(self.require);

        let q = if quote == Quote::Single { '\'' } else { '"' };
        Some(format!("{CMDLINE_KEY}={q}{}{q}{tail}", tokens.join(" ")))
    }

    /// True when every cmdline line is quoted, ends in `require` and carries
    /// no other `require` or `remove` token, and at least one such line exists.
    pub fn holds(&self, content: &str) -> bool {
        let prefix = format!("{CMDLINE_KEY}=");
        let mut found = false;
        for line in content.lines() {
            let Some(rest) = line.strip_prefix(&prefix) else {
                continue;
            };
            found = true;
            let Some((quote, value, _)) = split_assignment(rest) else {
                return false;
            };
            if quote == Quote::Bare {
                return false;
            }
            let tokens: Vec<&str> = value.split(' ').collect();
            let Some((last, earlier)) = tokens.split_last() else {
                return false;
            };
            if *last != self.require
                || earlier
                    .iter()
                    .any(|t| *t == self.require || self.remove.contains(t))
            {
                return false;
            }
        }
        found
    }

    fn alternation(&self) -> String {
        let mut flags = vec![self.require];
        flags.extend(self.remove.iter().copied());
        flags.join("|")
    }

    /// Commands performing [`apply`](Self::apply) on `file` (a shell word).
    pub fn shell_lines(&self, file: &str) -> Vec<String> {
        let k = CMDLINE_KEY;
        let req = self.require;
        let alternation = self.alternation();

        // Written with plain quotes, then escaped for the single-quoted sed argument.
        let program = [
            format!(r#"/^{k}=("[^"]*"|'[^']*'|{BARE_VALUE})([[:space:]]+(#.*)?)?$/ {{"#),
            "  h".to_string(),
            format!(r#"  s/^{k}="([^"]*)".*$/ \1 /"#),
            format!(r#"  s/^{k}='([^']*)'.*$/ \1 /"#),
            format!(r#"  s/^{k}=({BARE_VALUE}).*$/ \1 /"#),
            ":strip".to_string(),
            format!("  s/[[:space:]]({alternation})[[:space:]]/ /"),
            "  t strip".to_string(),
            "  s/[[:space:]]+/ /g".to_string(),
            "  s/^ //".to_string(),
            "  s/ $//".to_string(),
            format!(r"  s/^(.*)$/\1 {req}/"),
            format!("  s/^ {req}$/{req}/"),
            "  G".to_string(),
            format!(r#"  s/^(.*)\n{k}='[^']*'(.*)$/{k}='\1'\2/"#),
            format!(r#"  s/^(.*)\n{k}="[^"]*"(.*)$/{k}="\1"\2/"#),
            format!(r#"  s/^(.*)\n{k}={BARE_VALUE}(.*)$/{k}="\1"\2/"#),
        ];

        let mut out = vec![
            format!("sed -i -e '$a\\' {file}"),
            format!("grep -q '^{k}=' {file} || echo '{k}=\"{req}\"' >> {file}"),
            "sed -i -E '".to_string(),
        ];
        out.extend(program.iter().map(|l| l.replace('\'', r"'\''")));
        out.push(format!("}}' {file}"));
        out
    }

    /// Commands that exit 1 with the offending lines on stderr unless
    /// [`holds`](Self::holds) is true for `file`.
    pub fn verify_lines(&self, file: &str) -> Vec<String> {
        let k = CMDLINE_KEY;
        let req = self.require;
        let alternation = self.alternation();
        let edited =
            format!(r#"^{k}=(\"([^\"]* )?{req}\"|'([^']* )?{req}')([[:space:]]+(#.*)?)?\$"#);
        let leftover =
            format!(r#"^{k}=(\"([^\"]* )?({alternation}) [^\"]*\"|'([^']* )?({alternation}) [^']*')"#);

        vec![
            format!("CMDLINE_LINES=\"$(grep -E '^{k}=' {file} || true)\""),
            "if [ -z \"$CMDLINE_LINES\" ] \\".to_string(),
            format!("  || printf '%s\\n' \"$CMDLINE_LINES\" | grep -Evq \"{edited}\" \\"),
            format!("  || printf '%s\\n' \"$CMDLINE_LINES\" | grep -Eq \"{leftover}\"; then"),
            format!("  echo \"ERROR: {k} could not be made graphics-safe:\" >&2"),
            "  printf '%s\\n' \"$CMDLINE_LINES\" >&2".to_string(),
            "  echo \"Fix the line by hand, then run this script again.\" >&2".to_string(),
            "  exit 1".to_string(),
            "fi".to_string(),
        ]
    }
}

/// `[[:space:]]` in the C locale, minus newline.
fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\x0b' | '\x0c' | '\r')
}

/// Splits the text after `KEY=` into quote style, value and trailing text.
///
/// `None` unless the trailing text is empty, blank, or a blank-led comment.
fn split_assignment(rest: &str) -> Option<(Quote, &str, &str)> {
    let (quote, value, tail) = match rest.chars().next() {
        Some(q @ ('"' | '\'')) => {
            let body = &rest[1..];
            let end = body.find(q)?;
            let quote = if q == '"' { Quote::Double } else { Quote::Single };
            (quote, &body[..end], &body[end + 1..])
        }
        _ => {
            let end = rest
                .find(|c: char| is_blank(c) || matches!(c, '"' | '\'' | '#'))
                .unwrap_or(rest.len());
            (Quote::Bare, &rest[..end], &rest[end..])
        }
    };

    let after = tail.trim_start_matches(is_blank);
    let well_formed =
        tail.is_empty() || (after.len() < tail.len() && (after.is_empty() || after.starts_with('#')));
    well_formed.then_some((quote, value, tail))
}

// ── Line append ───────────────────────────────────────────────────────────────

/// Appends each line to a file unless an identical line is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAppend {
    pub lines: &'static [&'static str],
}

/// VM tuning for low-memory machines.
pub const VM_TUNING: LineAppend = LineAppend {
    lines: &["vm.swappiness=10", "vm.vfs_cache_pressure=50"],
};

impl LineAppend {
    pub fn apply(&self, content: &str) -> String {
        let mut out = ensure_trailing_newline(content);
        for wanted in self.lines {
            if !out.lines().any(|l| l == *wanted) {
                out.push_str(wanted);
                out.push('\n');
            }
        }
        out
    }

    /// Commands performing [`apply`](Self::apply) on `file` (a shell word).
    pub fn shell_lines(&self, file: &str) -> Vec<String> {
        let mut out = vec![
            format!("touch {file}"),
            format!("sed -i -e '$a\\' {file}"),
        ];
        for wanted in self.lines {
            out.push(format!(
                "grep -qxF '{wanted}' {file} || echo '{wanted}' >> {file}"
            ));
        }
        out
    }
}

/// `sed '$a\'` semantics: add a final newline to non-empty text lacking one.
fn ensure_trailing_newline(content: &str) -> String {
    let mut out = content.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::process::{Command, Stdio};

    use super::*;

    const EDIT: CmdlineEdit = GRAPHICS_SAFE_CMDLINE;

    fn cmdline_of(content: &str) -> Vec<&str> {
        content
            .lines()
            .filter(|l| l.starts_with("GRUB_CMDLINE_LINUX_DEFAULT="))
            .collect()
    }

    #[test]
    fn stock_ubuntu_line_loses_splash_and_gains_nomodeset() {
        let out = EDIT.apply("GRUB_DEFAULT=0\nGRUB_CMDLINE_LINUX_DEFAULT=\"quiet splash\"\n");
        assert_eq!(
            out,
            "GRUB_DEFAULT=0\nGRUB_CMDLINE_LINUX_DEFAULT=\"quiet nomodeset\"\n"
        );
    }

    #[test]
    fn cmdline_edit_is_idempotent_for_assorted_inputs() {
        let inputs = [
            "GRUB_CMDLINE_LINUX_DEFAULT=\"quiet splash\"\n",
            "GRUB_CMDLINE_LINUX_DEFAULT=\"\"\n",
            "GRUB_CMDLINE_LINUX_DEFAULT=\"splash splash nomodeset quiet nomodeset  vt.handoff=7\"",
            "GRUB_CMDLINE_LINUX_DEFAULT=quiet\n",
            "GRUB_CMDLINE_LINUX_DEFAULT=\"nosplash plymouth.splash\"\n",
            "GRUB_TIMEOUT=5\n",
            "",
        ];
        for input in inputs {
            let once = EDIT.apply(input);
            let twice = EDIT.apply(&once);
            assert_eq!(once, twice, "not idempotent for {input:?}");

            let lines = cmdline_of(&once);
            assert_eq!(lines.len(), 1, "{input:?}");
            let tokens: Vec<&str> = lines[0]
                .trim_start_matches("GRUB_CMDLINE_LINUX_DEFAULT=")
                .trim_matches('"')
                .split_whitespace()
                .collect();
            assert_eq!(tokens.iter().filter(|t| **t == "nomodeset").count(), 1);
            assert!(!tokens.contains(&"splash"));
        }
    }

    #[test]
    fn other_parameters_keep_their_order() {
        let out = EDIT.apply("GRUB_CMDLINE_LINUX_DEFAULT=\"splash acpi=off quiet\"\n");
        assert_eq!(out, "GRUB_CMDLINE_LINUX_DEFAULT=\"acpi=off quiet nomodeset\"\n");
    }

    #[test]
    fn similar_tokens_are_not_mistaken_for_splash() {
        let out = EDIT.apply("GRUB_CMDLINE_LINUX_DEFAULT=\"nosplash plymouth.splash\"\n");
        assert!(out.contains("nosplash plymouth.splash nomodeset"));
    }

    #[test]
    fn missing_line_is_added() {
        let out = EDIT.apply("GRUB_TIMEOUT=5");
        assert_eq!(
            out,
            "GRUB_TIMEOUT=5\nGRUB_CMDLINE_LINUX_DEFAULT=\"nomodeset\"\n"
        );
    }

    #[test]
    fn malformed_line_is_left_alone() {
        let line = "GRUB_CMDLINE_LINUX_DEFAULT=\"a \\\"b\\\"\"";
        assert_eq!(EDIT.rewrite_line(line), None);
        assert_eq!(EDIT.apply(line), format!("{line}\n"));
    }

    #[test]
    fn commented_line_is_not_rewritten() {
        let out = EDIT.apply("#GRUB_CMDLINE_LINUX_DEFAULT=\"splash\"\n");
        assert!(out.starts_with("#GRUB_CMDLINE_LINUX_DEFAULT=\"splash\"\n"));
        assert_eq!(cmdline_of(&out), vec!["GRUB_CMDLINE_LINUX_DEFAULT=\"nomodeset\""]);
    }

    #[test]
    fn single_quoted_value_keeps_its_quotes() {
        let out = EDIT.apply("GRUB_CMDLINE_LINUX_DEFAULT='quiet splash'\n");
        assert_eq!(out, "GRUB_CMDLINE_LINUX_DEFAULT='quiet nomodeset'\n");
        assert!(EDIT.holds(&out));
    }

    #[test]
    fn trailing_comment_survives_the_rewrite() {
        let out = EDIT.apply("GRUB_CMDLINE_LINUX_DEFAULT=\"quiet splash\"  # default\n");
        assert_eq!(out, "GRUB_CMDLINE_LINUX_DEFAULT=\"quiet nomodeset\"  # default\n");
        assert!(EDIT.holds(&out));

        let bare = EDIT.apply("GRUB_CMDLINE_LINUX_DEFAULT=  # nothing yet\n");
        assert_eq!(bare, "GRUB_CMDLINE_LINUX_DEFAULT=\"nomodeset\"  # nothing yet\n");
    }

    #[test]
    fn unparseable_line_fails_the_postcondition() {
        for line in [
            "GRUB_CMDLINE_LINUX_DEFAULT=\"a \\\"b\\\"\"",
            "GRUB_CMDLINE_LINUX_DEFAULT=\"quiet\" splash",
            "GRUB_CMDLINE_LINUX_DEFAULT=#x",
        ] {
            let out = EDIT.apply(line);
            assert_eq!(out, format!("{line}\n"));
            assert!(!EDIT.holds(&out), "{line:?} passed");
        }
    }

    #[test]
    fn postcondition_rejects_leftover_flags() {
        assert!(EDIT.holds("GRUB_CMDLINE_LINUX_DEFAULT=\"quiet nomodeset\"\n"));
        assert!(!EDIT.holds("GRUB_CMDLINE_LINUX_DEFAULT=\"splash nomodeset\"\n"));
        assert!(!EDIT.holds("GRUB_CMDLINE_LINUX_DEFAULT=\"nomodeset quiet nomodeset\"\n"));
        assert!(!EDIT.holds("GRUB_CMDLINE_LINUX_DEFAULT=nomodeset\n"));
        assert!(!EDIT.holds("GRUB_TIMEOUT=5\n"));
    }

    #[test]
    fn cmdline_shell_is_a_single_sed_program_over_the_file() {
        let lines = EDIT.shell_lines("\"$GRUB_FILE\"");
        let seds = lines.iter().filter(|l| l.starts_with("sed -i -E")).count();
        assert_eq!(seds, 1);
        assert!(lines.iter().any(|l| l.contains("(nomodeset|splash)")));
        assert!(lines.last().unwrap().ends_with("' \"$GRUB_FILE\""));
        assert!(lines.iter().all(|l| !l.contains('\n')));
    }

    #[test]
    fn tuning_append_is_idempotent() {
        let once = VM_TUNING.apply("kernel.panic=10");
        let twice = VM_TUNING.apply(&once);
        assert_eq!(once, twice);
        assert_eq!(
            once,
            "kernel.panic=10\nvm.swappiness=10\nvm.vfs_cache_pressure=50\n"
        );
        for wanted in VM_TUNING.lines {
            assert_eq!(twice.lines().filter(|l| l == wanted).count(), 1);
        }
    }

    #[test]
    fn tuning_append_skips_lines_already_present() {
        let out = VM_TUNING.apply("vm.vfs_cache_pressure=50\n");
        assert_eq!(out, "vm.vfs_cache_pressure=50\nvm.swappiness=10\n");
    }

    #[test]
    fn tuning_shell_guards_every_append() {
        let lines = VM_TUNING.shell_lines("/etc/sysctl.conf");
        for wanted in VM_TUNING.lines {
            assert!(lines.contains(&format!(
                "grep -qxF '{wanted}' /etc/sysctl.conf || echo '{wanted}' >> /etc/sysctl.conf"
            )));
        }
        assert!(!lines.iter().any(|l| l.starts_with("echo")));
    }

    // ── Shell against model ───────────────────────────────────────────────────

    fn shell_tools_available() -> bool {
        ["bash", "sed"].iter().all(|tool| {
            Command::new(tool)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        })
    }

    /// Runs `lines` under `set -e` with `$var` naming a file holding
    /// `content`. Returns the file afterwards and whether the run succeeded.
    fn run_on_file(var: &str, lines: &[String], content: &str) -> (String, bool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edited");
        fs::write(&path, content).unwrap();

        let mut script = format!("set -e\n{var}='{}'\n", path.display());
        for line in lines {
            script.push_str(line);
            script.push('\n');
        }
        let status = Command::new("bash")
            .arg("-c")
            .arg(&script)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .unwrap();
        (fs::read_to_string(&path).unwrap(), status.success())
    }

    fn quoted_tokens(line: &str) -> Vec<&str> {
        let rest = line.trim_start_matches("GRUB_CMDLINE_LINUX_DEFAULT=");
        let quote = rest.chars().next().unwrap();
        rest[1..].split(quote).next().unwrap().split(' ').collect()
    }

    #[test]
    fn cmdline_shell_matches_model_and_settles_after_one_run() {
        if !shell_tools_available() {
            eprintln!("skipping: bash or GNU sed not found in PATH");
            return;
        }
        let mut lines = EDIT.shell_lines("\"$GRUB_FILE\"");
        lines.extend(EDIT.verify_lines("\"$GRUB_FILE\""));

        let inputs = [
            "GRUB_DEFAULT=0\nGRUB_CMDLINE_LINUX_DEFAULT=\"quiet splash\"\nGRUB_CMDLINE_LINUX=\"\"\n",
            "GRUB_CMDLINE_LINUX_DEFAULT='quiet splash'\n",
            "GRUB_CMDLINE_LINUX_DEFAULT=\"quiet splash\"  # default\n",
            "GRUB_CMDLINE_LINUX_DEFAULT='splash' # keep 'this'",
            "GRUB_CMDLINE_LINUX_DEFAULT=quiet\n",
            "GRUB_CMDLINE_LINUX_DEFAULT=\t# empty\n",
            "GRUB_CMDLINE_LINUX_DEFAULT=\"it's splash nomodeset\tnomodeset splash\"\n",
            "GRUB_CMDLINE_LINUX_DEFAULT=\"nosplash plymouth.splash\"\n",
            "#GRUB_CMDLINE_LINUX_DEFAULT=\"splash\"\nGRUB_TIMEOUT=5",
            "",
            "GRUB_CMDLINE_LINUX_DEFAULT=\"a \\\"b\\\"\"\n",
            "GRUB_CMDLINE_LINUX_DEFAULT=\"quiet\" splash\n",
        ];
        for input in inputs {
            let (once, ok) = run_on_file("GRUB_FILE", &lines, input);
            assert_eq!(once, EDIT.apply(input), "shell and model differ for {input:?}");
            assert_eq!(ok, EDIT.holds(&once), "check disagrees for {input:?}");

            let (twice, ok_again) = run_on_file("GRUB_FILE", &lines, &once);
            assert_eq!(twice, once, "second run changed {input:?}");
            assert_eq!(ok_again, ok);

            if ok {
                for line in cmdline_of(&once) {
                    let tokens = quoted_tokens(line);
                    assert_eq!(tokens.iter().filter(|t| **t == "nomodeset").count(), 1);
                    assert!(!tokens.contains(&"splash"), "{line:?}");
                }
            }
        }
    }

    #[test]
    fn malformed_cmdline_stops_the_shell_with_a_failure() {
        if !shell_tools_available() {
            eprintln!("skipping: bash or GNU sed not found in PATH");
            return;
        }
        let mut lines = EDIT.shell_lines("\"$GRUB_FILE\"");
        lines.extend(EDIT.verify_lines("\"$GRUB_FILE\""));
        lines.push("echo reached > \"$GRUB_FILE.after\"".to_string());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grub");
        fs::write(&path, "GRUB_CMDLINE_LINUX_DEFAULT=\"quiet\" splash\n").unwrap();
        let script = format!("set -e\nGRUB_FILE='{}'\n{}\n", path.display(), lines.join("\n"));
        let out = Command::new("bash").arg("-c").arg(&script).output().unwrap();

        assert_eq!(out.status.code(), Some(1));
        assert!(String::from_utf8_lossy(&out.stderr).contains("could not be made graphics-safe"));
        assert!(!dir.path().join("grub.after").exists());
    }

    #[test]
    fn tuning_shell_matches_model_and_settles_after_one_run() {
        if !shell_tools_available() {
            eprintln!("skipping: bash or GNU sed not found in PATH");
            return;
        }
        let lines = VM_TUNING.shell_lines("\"$SYSCTL_FILE\"");
        for input in [
            "",
            "kernel.panic=10",
            "vm.swappiness=10\n",
            "# tuned\nvm.vfs_cache_pressure=50\nvm.swappiness=60\n",
        ] {
            let (once, ok) = run_on_file("SYSCTL_FILE", &lines, input);
            assert!(ok);
            assert_eq!(once, VM_TUNING.apply(input), "shell and model differ for {input:?}");

            let (twice, _) = run_on_file("SYSCTL_FILE", &lines, &once);
            assert_eq!(twice, once);
            for wanted in VM_TUNING.lines {
                assert_eq!(twice.lines().filter(|l| l == wanted).count(), 1);
            }
        }
    }
}
