use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// ── Terminal helpers ──────────────────────────────────────────────────────────

fn term_width() -> usize {
    Term::stdout().size().1.max(60) as usize
}

// ── Banner ────────────────────────────────────────────────────────────────────

pub fn print_banner() {
    let logo = [
        r"    ___ ___ _   _ ___   ___ ___ ___  ___ _   _ ___ ",
        r"   / __| _ \ | | | _ ) | _ \ __/ __|/ __| | | | __|",
        r"  | (_ |   / |_| | _ \ |   / _|\__ \ (__| |_| | _| ",
        r"   \___|_|_\\___/|___/ |_|_\___|___/\___|\___/|___|",
    ];

    println!();
    for line in &logo {
        println!("{}", style(line).cyan().bold());
    }
    println!();
    println!(
        "{}",
        style(format!(
            "   macOS USB builder  ·  chroot repair  ·  v{}",
            env!("CARGO_PKG_VERSION")
        ))
        .dim()
        .italic()
    );
    println!();
    println!("{}", style("─".repeat(term_width().min(52))).dim());
    println!();
}

// ── Step header ───────────────────────────────────────────────────────────────

/// Prints a visually distinct numbered step header.
pub fn print_step(step: u8, total: u8, title: &str) {
    println!();
    let tag = style(format!(" {}/{} ", step, total)).black().on_cyan().bold();
    let heading = style(format!("  {}", title)).white().bold();
    println!("{}{}", tag, heading);
    println!("{}", style("─".repeat(term_width().min(52))).dim());
}

// ── Feedback messages ─────────────────────────────────────────────────────────

/// Green ✓: operation completed successfully.
pub fn print_success(msg: &str) {
    println!("  {}  {}", style("✓").green().bold(), style(msg).green());
}

/// Blue →: neutral info / progress note.
pub fn print_info(msg: &str) {
    println!("  {}  {}", style("→").blue().bold(), msg);
}

/// Yellow ⚠ : non-fatal notice.
pub fn print_warning(msg: &str) {
    println!("  {}  {}", style("⚠").yellow().bold(), style(msg).yellow());
}

/// Red ✗: error (written to stderr).
pub fn print_error(msg: &str) {
    eprintln!("  {}  {}", style("✗").red().bold(), style(msg).red());
}

// ── Info box ──────────────────────────────────────────────────────────────────

/// Renders a bordered key→value box in the terminal.
///
/// ```text
/// ┌─ Rescue Bundle ───────────────────────┐
/// │  Target disk  disk4                   │
/// │  Distro       Ubuntu                  │
/// │  VM tuning    off                     │
/// └───────────────────────────────────────┘
/// ```
///
/// The key column is as wide as the longest key plus a two-space gutter.
pub fn print_kv_box(title: &str, rows: &[(&str, &str)]) {
    const BOX_INNER: usize = 38;

    let dashes = "─".repeat(BOX_INNER.saturating_sub(title.chars().count() + 2));
    println!(
        "  ┌─ {} {}┐",
        style(title).white().bold(),
        style(&dashes).dim()
    );

    let width = key_width(rows);
    for (key, val) in rows {
        println!(
            "  │  {}{}",
            style(pad_key(key, width)).dim(),
            style(*val).white().bold()
        );
    }

    println!("  └{}┘", style("─".repeat(BOX_INNER + 2)).dim());
}

fn key_width(rows: &[(&str, &str)]) -> usize {
    rows.iter().map(|(k, _)| k.chars().count()).max().unwrap_or(0) + 2
}

/// Pads before styling so escape codes never count toward the width.
fn pad_key(key: &str, width: usize) -> String {
    format!("{key:<width$}")
}

// ── Spinner ───────────────────────────────────────────────────────────────────

/// Returns a running braille spinner. Finish it with [`done_spinner`].
pub fn spinner(msg: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let tpl = ProgressStyle::with_template("  {spinner:.cyan.bold}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(tpl);
    pb.set_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Clears the spinner and prints a success message in its place.
pub fn done_spinner(pb: ProgressBar, msg: &str) {
    pb.finish_and_clear();
    print_success(msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_column_fits_the_longest_key() {
        let rows = [("Arch", "x86_64"), ("A much longer key", "v")];
        let width = key_width(&rows);
        assert_eq!(width, "A much longer key".len() + 2);
        assert_eq!(pad_key("Arch", width), format!("Arch{}", " ".repeat(15)));
        assert!(pad_key("A much longer key", width).ends_with("key  "));
    }

    #[test]
    fn key_width_counts_characters_not_bytes() {
        assert_eq!(key_width(&[("Größe", "1")]), 7);
        assert_eq!(key_width(&[]), 2);
    }
}
