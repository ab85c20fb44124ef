//! Colored terminal output for release commands
//!
//! Symbols are drawn in the configured theme colors; message text stays in
//! the terminal's default color.

use crate::history::{ThemeColors, theme_color};
use std::io::Write;
use termcolor::{BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

/// Output manager for consistent colored terminal output
#[derive(Debug)]
pub struct OutputManager {
    bufwtr: BufferWriter,
    theme: ThemeColors,
    verbose: bool,
    quiet: bool,
}

impl Clone for OutputManager {
    fn clone(&self) -> Self {
        Self {
            bufwtr: BufferWriter::stdout(ColorChoice::Auto),
            theme: self.theme.clone(),
            verbose: self.verbose,
            quiet: self.quiet,
        }
    }
}

impl OutputManager {
    /// Create an output manager using the default theme
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self::with_theme(ThemeColors::default(), verbose, quiet)
    }

    /// Create an output manager drawing symbols in `theme`
    pub fn with_theme(theme: ThemeColors, verbose: bool, quiet: bool) -> Self {
        Self {
            bufwtr: BufferWriter::stdout(ColorChoice::Auto),
            theme,
            verbose,
            quiet,
        }
    }

    fn symbol_line(&self, color: Option<Color>, symbol: &str, message: &str) -> std::io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        let mut buffer = self.bufwtr.buffer();
        let _ = buffer.set_color(ColorSpec::new().set_fg(color).set_bold(true));
        let _ = write!(&mut buffer, "{}", symbol);
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, " {}", message);
        self.bufwtr.print(&buffer)
    }

    /// Print an info message
    pub fn info(&self, message: &str) -> std::io::Result<()> {
        self.symbol_line(theme_color(&self.theme.accent), "ℹ", message)
    }

    /// Print a success message
    pub fn success(&self, message: &str) -> std::io::Result<()> {
        self.symbol_line(theme_color(&self.theme.success), "✓", message)
    }

    /// Print a warning message
    pub fn warn(&self, message: &str) -> std::io::Result<()> {
        self.symbol_line(theme_color(&self.theme.warning), "⚠", message)
    }

    /// Print an error message to stderr (always shown)
    pub fn error(&self, message: &str) {
        let bufwtr = BufferWriter::stderr(ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();
        let color = theme_color(&self.theme.error).unwrap_or(Color::Red);

        if buffer.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true)).is_err()
            || write!(&mut buffer, "✗").is_err()
            || buffer.reset().is_err()
            || writeln!(&mut buffer, " {}", message).is_err()
            || bufwtr.print(&buffer).is_err()
        {
            println!("[STDERR ERROR] ✗ {}", message);
        }
    }

    /// Print a message only in verbose mode
    pub fn verbose(&self, message: &str) -> std::io::Result<()> {
        if !self.verbose {
            return Ok(());
        }
        self.symbol_line(theme_color(&self.theme.foreground), "→", message)
    }

    /// Print a progress message
    pub fn progress(&self, message: &str) -> std::io::Result<()> {
        self.symbol_line(theme_color(&self.theme.accent), "⋯", message)
    }

    /// Print a section header
    pub fn section(&self, title: &str) -> std::io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        let mut buffer = self.bufwtr.buffer();
        let _ = writeln!(&mut buffer);
        let _ = buffer.set_color(
            ColorSpec::new()
                .set_fg(theme_color(&self.theme.accent))
                .set_bold(true),
        );
        let _ = writeln!(&mut buffer, "═══ {} ═══", title);
        let _ = buffer.reset();
        self.bufwtr.print(&buffer)
    }

    /// Print indented text (for sub-items)
    pub fn indent(&self, message: &str) -> std::io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        let mut buffer = self.bufwtr.buffer();
        for line in message.lines() {
            let _ = writeln!(&mut buffer, "    {}", line);
        }
        self.bufwtr.print(&buffer)
    }

    /// Print a line prefixed with a colored status dot
    pub fn dot(&self, success: bool, message: &str) -> std::io::Result<()> {
        let color = if success {
            &self.theme.success
        } else {
            &self.theme.error
        };
        self.symbol_line(theme_color(color), "●", message)
    }

    /// Print a plain message (respects quiet mode)
    pub fn println(&self, message: &str) -> std::io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        let mut buffer = self.bufwtr.buffer();
        let _ = writeln!(&mut buffer, "{}", message);
        self.bufwtr.print(&buffer)
    }

    /// Print text that may carry its own color escapes, bypassing the color
    /// choice so stored excerpts keep their colors
    pub fn raw(&self, text: &str) -> std::io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", text)
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}
