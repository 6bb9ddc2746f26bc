//! Styled stderr output shared by the subcommands.

use std::io::IsTerminal;
use std::sync::OnceLock;

/// Global presentation flags, set once from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFlags {
    pub quiet: bool,
    pub verbose: bool,
    pub no_color: bool,
}

static FLAGS: OnceLock<OutputFlags> = OnceLock::new();

/// Record the global flags. Later calls are ignored.
pub fn init(flags: OutputFlags) {
    let _ = FLAGS.set(flags);
}

fn flags() -> OutputFlags {
    FLAGS.get().copied().unwrap_or_default()
}

pub fn is_quiet() -> bool {
    flags().quiet
}

pub fn is_verbose() -> bool {
    flags().verbose
}

/// Color is on for a terminal unless `--no-color` or `NO_COLOR` says otherwise.
pub fn color_enabled() -> bool {
    if flags().no_color || std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::io::stderr().is_terminal()
}

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

pub struct Styled {
    use_color: bool,
}

impl Default for Styled {
    fn default() -> Self {
        Self::new()
    }
}

impl Styled {
    pub fn new() -> Self {
        Self {
            use_color: color_enabled(),
        }
    }

    pub fn plain() -> Self {
        Self { use_color: false }
    }

    pub fn ok_sym(&self) -> &'static str {
        if self.use_color {
            "\x1b[32m\u{2713}\x1b[0m"
        } else {
            "OK"
        }
    }

    pub fn fail_sym(&self) -> &'static str {
        if self.use_color {
            "\x1b[31m\u{2717}\x1b[0m"
        } else {
            "!!"
        }
    }

    pub fn warn_sym(&self) -> &'static str {
        if self.use_color {
            "\x1b[33m\u{26a0}\x1b[0m"
        } else {
            "??"
        }
    }

    fn paint(&self, code: &str, s: &str) -> String {
        if self.use_color {
            format!("{code}{s}{RESET}")
        } else {
            s.to_string()
        }
    }

    pub fn green(&self, s: &str) -> String {
        self.paint(GREEN, s)
    }

    pub fn red(&self, s: &str) -> String {
        self.paint(RED, s)
    }

    pub fn yellow(&self, s: &str) -> String {
        self.paint(YELLOW, s)
    }

    pub fn dim(&self, s: &str) -> String {
        self.paint(DIM, s)
    }

    pub fn bold(&self, s: &str) -> String {
        self.paint(BOLD, s)
    }
}

pub fn print_header(s: &Styled) {
    eprintln!(
        "  {} {}",
        s.bold("evidence-batch"),
        s.dim(&format!("v{}", env!("CARGO_PKG_VERSION")))
    );
    eprintln!();
}

pub fn print_section(s: &Styled, title: &str) {
    eprintln!("  {}", s.bold(title));
}

/// One check line: symbol, padded label, value.
pub fn print_check(symbol: &str, label: &str, value: &str) {
    eprintln!("    {symbol} {label:<16} {value}");
}

/// Indented fix hint under a check.
pub fn print_detail(msg: &str) {
    eprintln!("                        {msg}");
}

pub fn print_status(s: &Styled, status: &str, msg: &str) {
    eprintln!();
    eprintln!("  {}: {status} ({msg})", s.bold("Status"));
}

/// Human-readable duration, e.g. `2m 5s`.
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
