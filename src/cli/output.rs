//! Terminal rendering for the CLI.
//!
//! Every line is built as a `String` first and printed second, so the plain
//! (`--no-color`) rendering can be asserted on directly.

use crate::queries::DashboardStats;
use owo_colors::OwoColorize;

/// Width of the label column in dashboard listings.
const LABEL_WIDTH: usize = 22;

/// Kind of a one-line status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Ok,
    Info,
    Warn,
    Error,
}

impl Tone {
    fn tag(self) -> &'static str {
        match self {
            Tone::Ok => "OK",
            Tone::Info => "INFO",
            Tone::Warn => "WARN",
            Tone::Error => "ERROR",
        }
    }
}

pub struct Output {
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    pub fn new() -> Self {
        Self { colored: true }
    }

    pub fn no_color() -> Self {
        Self { colored: false }
    }

    // ============== Rendering ==============

    /// One status line, e.g. `  [WARN] lease expired` without color.
    pub fn status_line(&self, tone: Tone, message: &str) -> String {
        if !self.colored {
            return format!("  [{}] {}", tone.tag(), message);
        }
        match tone {
            Tone::Ok => format!("  {} {}", "✓".green().bold(), message.green()),
            Tone::Info => format!("  {} {}", "•".blue(), message),
            Tone::Warn => format!("  {} {}", "⚠".yellow().bold(), message.yellow()),
            Tone::Error => format!("  {} {}", "✗".red().bold(), message.red()),
        }
    }

    /// A scaffolded file or directory.
    pub fn created_line(&self, kind: &str, path: &str) -> String {
        if self.colored {
            format!("  {} {} {}", "✓".green().bold(), kind.dimmed(), path.bright_white())
        } else {
            format!("  [CREATED] {} {}", kind, path)
        }
    }

    pub fn kv_line(&self, key: &str, value: &str) -> String {
        let key = format!("{:<width$}", format!("{}:", key), width = LABEL_WIDTH);
        if self.colored {
            format!("    {} {}", key.dimmed(), value.bright_white())
        } else {
            format!("    {} {}", key, value)
        }
    }

    pub fn list_line(&self, item: &str) -> String {
        if self.colored {
            format!("    {} {}", "•".blue(), item)
        } else {
            format!("    - {}", item)
        }
    }

    /// Dashboard counts: task states, knowledge base and recent findings.
    pub fn dashboard_lines(&self, stats: &DashboardStats) -> Vec<String> {
        let mut lines = vec![self.heading("Tasks")];
        for (label, value) in [
            ("active", stats.active_tasks),
            ("completed", stats.completed_tasks),
            ("blocked", stats.blocked_tasks),
            ("total", stats.total_tasks),
        ] {
            lines.push(self.kv_line(label, &value.to_string()));
        }

        lines.push(self.heading("Knowledge"));
        for (label, value) in [
            ("verified findings", stats.verified_findings),
            ("hypotheses testing", stats.hypotheses_testing),
            ("hypotheses supported", stats.hypotheses_supported),
            ("hypotheses refuted", stats.hypotheses_refuted),
            ("contributors", stats.contributor_count),
        ] {
            lines.push(self.kv_line(label, &value.to_string()));
        }

        if !stats.recent_findings.is_empty() {
            lines.push(self.subheading("Recent findings"));
            lines.extend(stats.recent_findings.iter().map(|f| {
                self.list_line(&format!("{} [{}] {}", f.finding_id, f.confidence, f.title))
            }));
        }
        lines
    }

    fn heading(&self, title: &str) -> String {
        if self.colored {
            format!("\n  {}", title.bright_white().bold().underline())
        } else {
            format!("\n  === {} ===", title)
        }
    }

    fn subheading(&self, title: &str) -> String {
        if self.colored {
            format!("\n  {}", title.cyan().bold())
        } else {
            format!("\n  --- {} ---", title)
        }
    }

    // ============== Printing ==============

    pub fn banner(&self) {
        let version = format!("v{}", env!("CARGO_PKG_VERSION"));
        if self.colored {
            println!(
                "\n   {}{} {}\n   {}\n",
                "Open".bright_cyan().bold(),
                "Lab".blue().bold(),
                version.dimmed(),
                "Task orchestration & verification consensus".bright_white()
            );
        } else {
            println!("\n   OpenLab {}\n   Task orchestration & verification consensus\n", version);
        }
    }

    pub fn success(&self, message: &str) {
        println!("{}", self.status_line(Tone::Ok, message));
    }

    pub fn info(&self, message: &str) {
        println!("{}", self.status_line(Tone::Info, message));
    }

    pub fn warning(&self, message: &str) {
        println!("{}", self.status_line(Tone::Warn, message));
    }

    pub fn error(&self, message: &str) {
        eprintln!("{}", self.status_line(Tone::Error, message));
    }

    pub fn created(&self, file_type: &str, path: &str) {
        println!("{}", self.created_line(file_type, path));
    }

    pub fn created_dir(&self, path: &str) {
        println!("{}", self.created_line("directory", path));
    }

    pub fn skipped(&self, path: &str, reason: &str) {
        if self.colored {
            println!("  {} {} {}", "○".yellow(), path.dimmed(), format!("({})", reason).yellow());
        } else {
            println!("  [SKIPPED] {} ({})", path, reason);
        }
    }

    pub fn header(&self, title: &str) {
        println!("{}", self.heading(title));
    }

    pub fn subheader(&self, title: &str) {
        println!("{}", self.subheading(title));
    }

    pub fn kv(&self, key: &str, value: &str) {
        println!("{}", self.kv_line(key, value));
    }

    pub fn list_item(&self, item: &str) {
        println!("{}", self.list_line(item));
    }

    /// A follow-up suggestion, usually before [`Self::command`] lines.
    pub fn hint(&self, message: &str) {
        if self.colored {
            println!("\n  {} {}", "›".dimmed(), message.dimmed().italic());
        } else {
            println!("\n  [TIP] {}", message);
        }
    }

    pub fn command(&self, cmd: &str) {
        let cmd = format!("$ {}", cmd);
        if self.colored {
            println!("     {}", cmd.bright_cyan());
        } else {
            println!("     {}", cmd);
        }
    }

    pub fn complete(&self, message: &str) {
        if self.colored {
            println!("\n  {}", message.bright_green().bold());
        } else {
            println!("\n  [DONE] {}", message);
        }
    }

    pub fn dashboard(&self, stats: &DashboardStats) {
        for line in self.dashboard_lines(stats) {
            println!("{}", line);
        }
    }

    pub fn newline(&self) {
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, Finding};

    fn finding(finding_id: &str, title: &str) -> Finding {
        Finding {
            id: format!("id-{}", finding_id),
            project_id: "p".to_string(),
            finding_id: finding_id.to_string(),
            title: title.to_string(),
            confidence: Confidence::High,
            source: "IEDB".to_string(),
            implications: String::new(),
            summary_l0: None,
            summary_l1: None,
            created_by_task: "t".to_string(),
            created_by: "c".to_string(),
            created_at: 0,
        }
    }

    #[test]
    fn test_plain_status_lines_are_tagged() {
        let output = Output::no_color();

        assert_eq!(output.status_line(Tone::Ok, "saved"), "  [OK] saved");
        assert_eq!(output.status_line(Tone::Warn, "stale"), "  [WARN] stale");
        assert_eq!(output.status_line(Tone::Error, "boom"), "  [ERROR] boom");
        assert_eq!(
            output.created_line("config", "openlab.toml"),
            "  [CREATED] config openlab.toml"
        );
    }

    #[test]
    fn test_colored_lines_keep_the_message() {
        let output = Output::new();
        let line = output.status_line(Tone::Info, "reclaimed 2 tasks");
        assert!(line.contains("reclaimed 2 tasks"));
        assert_ne!(line, Output::no_color().status_line(Tone::Info, "reclaimed 2 tasks"));
    }

    #[test]
    fn test_dashboard_lists_counts_and_recent_findings() {
        let stats = DashboardStats {
            active_tasks: 4,
            completed_tasks: 9,
            total_tasks: 13,
            verified_findings: 1,
            recent_findings: vec![finding("F-001", "P2 anchors drive immunogenicity")],
            ..DashboardStats::default()
        };

        let lines = Output::no_color().dashboard_lines(&stats);
        assert!(lines.iter().any(|l| l.trim_start().starts_with("completed:") && l.ends_with(" 9")));
        assert!(lines.iter().any(|l| l.ends_with("- F-001 [HIGH] P2 anchors drive immunogenicity")));
        assert!(lines.contains(&"\n  --- Recent findings ---".to_string()));
    }

    #[test]
    fn test_empty_dashboard_has_no_findings_section() {
        let lines = Output::no_color().dashboard_lines(&DashboardStats::default());
        assert!(lines.iter().all(|l| !l.contains("Recent findings")));
        assert_eq!(lines.len(), 11);
    }
}
