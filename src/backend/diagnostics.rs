//! Compiler diagnostics and output parsing.
//!
//! Recognized line shapes:
//! - MSBuild/csc: `Assets/Player.cs(12,5): error CS0103: The name 'x' does not exist`
//! - GCC/rustc-like: `src/main.c:12:5: warning: unused variable 'x'`
//! - Bare: `error: linking failed`

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        })
    }
}

/// One compiler message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            file: None,
            line: None,
            column: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    /// Attach a source location.
    pub fn at(mut self, file: impl Into<PathBuf>, line: u32, column: Option<u32>) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self.column = column;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}", file.display())?;
            if let Some(line) = self.line {
                write!(f, ":{line}")?;
                if let Some(column) = self.column {
                    write!(f, ":{column}")?;
                }
            }
            f.write_str(": ")?;
        }
        write!(f, "{}: {}", self.severity, self.message)
    }
}

static PAREN_LOCATION: OnceLock<Regex> = OnceLock::new();
static COLON_LOCATION: OnceLock<Regex> = OnceLock::new();
static BARE: OnceLock<Regex> = OnceLock::new();

fn paren_location() -> &'static Regex {
    PAREN_LOCATION.get_or_init(|| {
        Regex::new(
            r"^(?P<file>[^(]+)\((?P<line>\d+)(?:,(?P<col>\d+))?\)\s*:\s*(?P<sev>error|warning|info)(?:\s+[A-Za-z]+\d+)?\s*:\s*(?P<msg>.*)$",
        )
        .expect("valid regex")
    })
}

fn colon_location() -> &'static Regex {
    COLON_LOCATION.get_or_init(|| {
        Regex::new(
            r"^(?P<file>[^:\s][^:]*):(?P<line>\d+):(?:(?P<col>\d+):)?\s*(?P<sev>error|warning|note|info)(?:\[[^\]]*\])?\s*:\s*(?P<msg>.*)$",
        )
        .expect("valid regex")
    })
}

fn bare() -> &'static Regex {
    BARE.get_or_init(|| {
        Regex::new(r"^(?P<sev>error|warning)(?:\s+[A-Za-z]+\d+|\[[^\]]*\])?\s*:\s*(?P<msg>.*)$")
            .expect("valid regex")
    })
}

fn severity(s: &str) -> Severity {
    match s {
        "error" => Severity::Error,
        "warning" => Severity::Warning,
        _ => Severity::Info,
    }
}

/// Parse one line of compiler output. Returns `None` for unrecognized lines.
pub fn parse_line(line: &str) -> Option<Diagnostic> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    for re in [paren_location(), colon_location()] {
        if let Some(caps) = re.captures(line) {
            let mut diagnostic = Diagnostic::new(severity(&caps["sev"]), caps["msg"].trim());
            diagnostic.file = Some(PathBuf::from(caps["file"].trim()));
            diagnostic.line = caps["line"].parse().ok();
            diagnostic.column = caps.name("col").and_then(|c| c.as_str().parse().ok());
            return Some(diagnostic);
        }
    }

    bare()
        .captures(line)
        .map(|caps| Diagnostic::new(severity(&caps["sev"]), caps["msg"].trim()))
}

/// Parse every recognized line of `output`.
pub fn parse_output(output: &str) -> Vec<Diagnostic> {
    output.lines().filter_map(parse_line).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csc_error() {
        let d = parse_line(
            "Assets/Scripts/Player.cs(12,5): error CS0103: The name 'speed' does not exist in the current context",
        )
        .unwrap();
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.file, Some(PathBuf::from("Assets/Scripts/Player.cs")));
        assert_eq!(d.line, Some(12));
        assert_eq!(d.column, Some(5));
        assert_eq!(
            d.message,
            "The name 'speed' does not exist in the current context"
        );
    }

    #[test]
    fn test_parse_csc_warning_without_column() {
        let d = parse_line("Foo.cs(3): warning CS0168: Variable declared but never used").unwrap();
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.line, Some(3));
        assert_eq!(d.column, None);
    }

    #[test]
    fn test_parse_colon_style() {
        let d = parse_line("src/main.c:7:13: warning: unused variable 'x'").unwrap();
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.file, Some(PathBuf::from("src/main.c")));
        assert_eq!(d.line, Some(7));
        assert_eq!(d.column, Some(13));

        let note = parse_line("src/main.c:7: note: declared here").unwrap();
        assert_eq!(note.severity, Severity::Info);
    }

    #[test]
    fn test_parse_bare_error() {
        let d = parse_line("error: linking failed").unwrap();
        assert!(d.is_error());
        assert_eq!(d.file, None);

        let coded = parse_line("error CS2001: Source file 'x.cs' could not be found").unwrap();
        assert!(coded.is_error());
        assert_eq!(coded.message, "Source file 'x.cs' could not be found");
    }

    #[test]
    fn test_unrecognized_lines_are_skipped() {
        let output = "Microsoft (R) Visual C# Compiler\n\nCompilation succeeded\nerror: boom\n";
        let diagnostics = parse_output(output);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "boom");
    }

    #[test]
    fn test_display() {
        let d = Diagnostic::error("boom").at("a.cs", 3, Some(4));
        assert_eq!(d.to_string(), "a.cs:3:4: error: boom");
        assert_eq!(Diagnostic::warning("hm").to_string(), "warning: hm");
    }
}
