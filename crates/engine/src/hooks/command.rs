//! Post-commit hook command lines
//!
//! The command line is split on whitespace only. There is no quoting and no
//! shell: the first token is the program, the rest are literal arguments.
//! Data about the upload reaches the hook through the environment, never
//! through the argument list.

use std::path::PathBuf;

/// Environment variable carrying the zone name into the hook process
pub const ZONE_NAME_ENV: &str = "DNS_ZONE_RECEIVER_ZONENAME";

/// A parsed hook command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookCommand {
    program: String,
    args: Vec<String>,
}

impl HookCommand {
    /// Parse a command line, returning `None` when it is blank
    ///
    /// # Examples
    ///
    /// ```
    /// use zone_receiver_engine::hooks::HookCommand;
    ///
    /// let cmd = HookCommand::parse("rndc  reload\texample.com").unwrap();
    /// assert_eq!(cmd.program(), "rndc");
    /// assert_eq!(cmd.args(), ["reload", "example.com"]);
    ///
    /// assert!(HookCommand::parse("   ").is_none());
    /// ```
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Program name or path (resolved through `PATH` when it has no separator)
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Literal arguments
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Locate the program the same way process spawning will
    ///
    /// Returns `None` if it cannot be found; the hook may still appear later,
    /// so callers should treat this as a warning.
    pub fn resolve_program(&self) -> Option<PathBuf> {
        which::which(&self.program).ok()
    }
}

impl std::fmt::Display for HookCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
