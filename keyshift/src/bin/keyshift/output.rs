use anyhow::Result;
use clap::ValueEnum;
use colored::{Color, Colorize};
use comfy_table::{
    Attribute, Cell, Color as TableColor, Table,
    presets::{ASCII_FULL, UTF8_FULL_CONDENSED},
};
use keyshift::admin::BooleanReply;
use serde::Serialize;
use std::io::Write;

use crate::theme::{ICONS, THEME};

/// Output format options for CLI commands
#[derive(Clone, Debug, ValueEnum, Default, PartialEq)]
pub enum OutputFormat {
    /// Formatted table output (default)
    #[default]
    Table,
    /// JSON output for scripting
    Json,
    /// Compact single-line output
    Compact,
}

/// Global CLI options that affect output and behavior
#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub output_format: OutputFormat,
    pub quiet: bool,
    pub verbose: bool,
    pub no_color: bool,
}

/// Data that can be rendered in every output format
pub trait TableDisplay {
    fn to_table(&self, output: &OutputManager) -> Table;
    fn to_compact(&self) -> String;
}

/// Output manager handles formatting and display
pub struct OutputManager {
    pub options: GlobalOptions,
}

impl OutputManager {
    pub fn new(options: GlobalOptions) -> Self {
        Self { options }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.options.output_format, OutputFormat::Json)
    }

    /// Display data according to the configured output format
    pub fn display<T>(&self, data: &T) -> Result<()>
    where
        T: Serialize + TableDisplay,
    {
        if self.options.quiet {
            return Ok(());
        }

        match self.options.output_format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                println!("{json}");
            }
            OutputFormat::Table => {
                let table = data.to_table(self);
                println!("{table}");
            }
            OutputFormat::Compact => {
                println!("{}", data.to_compact());
            }
        }
        Ok(())
    }

    fn human(&self) -> bool {
        !self.options.quiet && !self.is_json()
    }

    fn tint(&self, text: &str, color: Color) -> String {
        if self.options.no_color {
            text.to_string()
        } else {
            text.color(color).to_string()
        }
    }

    /// Icon and message in one color. Suppressed in quiet and JSON modes.
    fn line(&self, icon: &str, color: Color, message: &str) {
        if self.human() {
            println!("{} {}", self.tint(icon, color), self.tint(message, color));
        }
    }

    pub fn success(&self, message: &str) {
        self.line(ICONS.success, THEME.success, message);
    }

    /// Errors go to stderr regardless of --quiet
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", self.tint(ICONS.error, THEME.error), self.tint(message, THEME.error));
    }

    pub fn warning(&self, message: &str) {
        self.line(ICONS.warning, THEME.warning, message);
    }

    pub fn info(&self, message: &str) {
        self.line(ICONS.info, THEME.info, message);
    }

    /// Diagnostics on stderr, only with --verbose
    pub fn verbose(&self, message: &str) {
        if self.options.verbose && !self.options.quiet {
            eprintln!("{} {}", self.tint(ICONS.arrow, THEME.muted), self.tint(message, THEME.muted));
        }
    }

    pub fn heading(&self, text: &str) {
        if !self.human() {
            return;
        }
        if self.options.no_color {
            println!("\n{text}\n{}", "=".repeat(text.chars().count()));
        } else {
            println!("\n{}", text.color(THEME.primary).bold());
        }
    }

    pub fn bullet(&self, text: &str) {
        if self.human() {
            println!("  {} {text}", self.tint(ICONS.bullet, THEME.muted));
        }
    }

    /// Show a host reply as success or warning
    pub fn reply(&self, reply: &BooleanReply) {
        if reply.success {
            self.success(&reply.message);
        } else {
            self.warning(&reply.message);
        }
    }

    /// UTF-8 borders in color mode, plain ASCII otherwise
    pub fn create_table(&self) -> Table {
        let preset = if self.options.no_color { ASCII_FULL } else { UTF8_FULL_CONDENSED };
        let mut table = Table::new();
        table.load_preset(preset);
        table
    }

    pub fn add_table_header(&self, table: &mut Table, headers: &[&str]) {
        table.set_header(
            headers
                .iter()
                .map(|header| self.state_cell(header, TableColor::Cyan).add_attribute(Attribute::Bold)),
        );
    }

    /// Cell colored unless --no-color
    pub fn state_cell(&self, label: &str, color: TableColor) -> Cell {
        let cell = Cell::new(label);
        if self.options.no_color { cell } else { cell.fg(color) }
    }

    /// Transient status on the current line; pair with `clear_line`
    pub fn progress(&self, message: &str) {
        if !self.human() {
            return;
        }
        let icon = if self.options.no_color {
            ICONS.loading.to_string()
        } else {
            ICONS.loading.color(THEME.highlight).bold().to_string()
        };
        print!("\r{icon} {}...", self.tint(message, THEME.highlight));
        std::io::stdout().flush().ok();
    }

    pub fn clear_line(&self) {
        if self.human() {
            print!("\r{:80}\r", "");
            std::io::stdout().flush().ok();
        }
    }
}
