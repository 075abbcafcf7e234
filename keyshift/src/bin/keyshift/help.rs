//! Styled `--help` output: colors from the theme, per-command examples and an
//! environment-variable appendix.

use std::fmt::Write;

use clap::{
    ColorChoice, Command,
    builder::{
        Styles,
        styling::{AnsiColor, Color as ClapColor, RgbColor, Style},
    },
};
use colored::{Color, Colorize, control::ShouldColorize};

use crate::examples::{COMMAND_EXAMPLES, ExampleGroup};
use crate::theme::{ICONS, THEME};

const ENVIRONMENT_VARIABLES: &[(&str, &str)] = &[
    ("REDIS_URL", "Redis connection URL for migrations"),
    ("KEYSHIFT_CONTROL_HOST", "Control channel address for 'control' commands"),
    ("RUST_LOG", "Log filter, e.g. keyshift=info"),
];

/// Attach styles, examples and the appendix to the derived command.
pub fn decorate(command: Command) -> Command {
    let painter = Painter {
        enabled: ShouldColorize::from_env().should_colorize(),
    };

    let mut command = command
        .styles(styles())
        .color(if painter.enabled { ColorChoice::Auto } else { ColorChoice::Never })
        .after_long_help(painter.appendix());

    for (name, groups) in COMMAND_EXAMPLES {
        let text = painter.examples(groups);
        command = command.mut_subcommand(*name, |sub| sub.after_long_help(text));
    }
    command
}

fn styles() -> Styles {
    let style = |color: Color| Style::new().fg_color(Some(clap_color(color)));
    Styles::styled()
        .usage(style(THEME.primary).bold())
        .header(style(THEME.highlight).bold())
        .literal(style(THEME.secondary))
        .placeholder(style(THEME.muted))
        .valid(style(THEME.success))
        .invalid(style(THEME.warning))
        .error(style(THEME.error).bold())
}

fn clap_color(color: Color) -> ClapColor {
    let ansi = match color {
        Color::Black => AnsiColor::Black,
        Color::Red => AnsiColor::Red,
        Color::Green => AnsiColor::Green,
        Color::Yellow => AnsiColor::Yellow,
        Color::Blue => AnsiColor::Blue,
        Color::Magenta => AnsiColor::Magenta,
        Color::Cyan => AnsiColor::Cyan,
        Color::White => AnsiColor::White,
        Color::BrightBlack => AnsiColor::BrightBlack,
        Color::BrightRed => AnsiColor::BrightRed,
        Color::BrightGreen => AnsiColor::BrightGreen,
        Color::BrightYellow => AnsiColor::BrightYellow,
        Color::BrightBlue => AnsiColor::BrightBlue,
        Color::BrightMagenta => AnsiColor::BrightMagenta,
        Color::BrightCyan => AnsiColor::BrightCyan,
        Color::BrightWhite => AnsiColor::BrightWhite,
        Color::TrueColor { r, g, b } => return ClapColor::Rgb(RgbColor(r, g, b)),
    };
    ClapColor::Ansi(ansi)
}

struct Painter {
    enabled: bool,
}

impl Painter {
    fn paint(&self, text: &str, color: Color, bold: bool) -> String {
        match (self.enabled, bold) {
            (false, _) => text.to_string(),
            (true, true) => text.color(color).bold().to_string(),
            (true, false) => text.color(color).to_string(),
        }
    }

    fn examples(&self, groups: &[ExampleGroup]) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.paint("Examples:", THEME.highlight, true));
        for (index, group) in groups.iter().enumerate() {
            if index > 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "  {}", self.paint(group.title, THEME.primary, true));
            for line in group.commands {
                let _ = writeln!(
                    out,
                    "    {} {}",
                    self.paint(ICONS.arrow, THEME.secondary, false),
                    self.paint(line, THEME.secondary, false)
                );
            }
        }
        out
    }

    fn appendix(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.paint("Environment Variables:", THEME.highlight, true));
        for (name, description) in ENVIRONMENT_VARIABLES {
            let _ = writeln!(
                out,
                "  {}  {}",
                self.paint(name, THEME.key, true),
                self.paint(description, THEME.value, false)
            );
        }
        let _ = writeln!(
            out,
            "\n{} {}",
            self.paint("Tip:", THEME.highlight, true),
            self.paint(
                "Use 'keyshift <command> --help' to view examples for each command.",
                THEME.secondary,
                false
            )
        );
        out
    }
}
