//! Example invocations shown under each command's `--help`.

use crate::commands::{control, init, migrate};

#[derive(Clone, Copy)]
pub struct ExampleGroup {
    pub title: &'static str,
    pub commands: &'static [&'static str],
}

/// Subcommand name and the example groups rendered after its long help.
pub const COMMAND_EXAMPLES: &[(&str, &[ExampleGroup])] = &[
    ("init", init::EXAMPLES),
    ("migrate", migrate::EXAMPLES),
    ("control", control::EXAMPLES),
];
