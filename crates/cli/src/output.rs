use owo_colors::{OwoColorize as _, Style};

pub const RULE_WIDTH: usize = 80;

/// Optional ANSI styling for terminal output. Disabled for pipes and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Colors on when stdout is a terminal and `NO_COLOR` is unset.
    #[must_use]
    pub fn for_stdout() -> Self {
        use std::io::IsTerminal as _;
        Self::new(std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none())
    }

    fn paint(self, text: &str, style: Style) -> String {
        if self.enabled {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }

    #[must_use]
    pub fn ok(self, text: &str) -> String {
        self.paint(text, Style::new().green())
    }

    #[must_use]
    pub fn error(self, text: &str) -> String {
        self.paint(text, Style::new().red().bold())
    }

    #[must_use]
    pub fn warn(self, text: &str) -> String {
        self.paint(text, Style::new().yellow())
    }

    #[must_use]
    pub fn heading(self, text: &str) -> String {
        self.paint(text, Style::new().bold())
    }

    #[must_use]
    pub fn dim(self, text: &str) -> String {
        self.paint(text, Style::new().dimmed())
    }
}

#[must_use]
pub fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}
