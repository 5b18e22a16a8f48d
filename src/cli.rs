//! Command-line interface definitions.

use clap::Parser;

use crate::project::ProjectOptions;
use crate::transpile::BackendKind;

/// Run a TypeScript/JavaScript command, compiling sources on demand and
/// restarting on change.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Read stdin for control commands (`rs` = restart)
    #[arg(short = 'c', long)]
    pub commands: bool,

    /// Restart when source files change
    #[arg(short = 'w', long, action = clap::ArgAction::Set, num_args = 0..=1, default_value_t = true, default_missing_value = "true", require_equals = false)]
    pub watch: bool,

    /// Keep running after the child exits; await the next restart trigger
    #[arg(short = 's', long)]
    pub supervise: bool,

    /// Use the per-file backend instead of the group-build backend
    #[arg(long)]
    pub swc: bool,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long)]
    pub verbose: bool,

    /// The command to run and its arguments. Everything from the first
    /// positional on is passed to the child untouched, flags included.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true, value_name = "COMMAND")]
    pub argv: Vec<String>,
}

impl Cli {
    pub const fn backend_kind(&self) -> BackendKind {
        if self.swc {
            BackendKind::PerFile
        } else {
            BackendKind::Group
        }
    }

    pub const fn options(&self) -> ProjectOptions {
        ProjectOptions {
            watch: self.watch,
            commands: self.commands,
            supervise: self.supervise,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["tsrun", "main.ts"]);
        assert!(cli.watch);
        assert!(!cli.commands);
        assert!(!cli.supervise);
        assert!(!cli.swc);
        assert_eq!(cli.argv, vec!["main.ts"]);
        assert_eq!(cli.backend_kind(), BackendKind::Group);
    }

    #[test]
    fn test_watch_can_be_disabled() {
        let cli = Cli::parse_from(["tsrun", "--watch", "false", "main.ts"]);
        assert!(!cli.watch);

        let cli = Cli::parse_from(["tsrun", "-w", "main.ts"]);
        assert!(cli.watch);
    }

    #[test]
    fn test_swc_selects_per_file_backend() {
        let cli = Cli::parse_from(["tsrun", "--swc", "main.ts"]);
        assert_eq!(cli.backend_kind(), BackendKind::PerFile);
    }

    #[test]
    fn test_child_flags_pass_through() {
        let cli = Cli::parse_from(["tsrun", "-cs", "main.ts", "--port", "3000", "-v"]);
        assert!(cli.commands);
        assert!(cli.supervise);
        assert_eq!(cli.argv, vec!["main.ts", "--port", "3000", "-v"]);
    }
}
