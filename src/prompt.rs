// src/prompt.rs

//! Yes/no confirmation before building or removing a package

use crate::error::{Error, Result};
use std::io::{self, BufRead, Write};

/// Something that can approve or decline an action
pub trait Confirm {
    /// Show `message` and ask `question`; `true` only on an explicit yes
    fn confirm(&mut self, message: &str, question: &str) -> Result<bool>;
}

/// Interactive prompt over a line reader and a writer
///
/// Only `y` or `yes` (any case) approves. An empty line, end of input or
/// anything else declines.
pub struct Prompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl Prompt<io::StdinLock<'static>, io::Stdout> {
    /// Prompt on the process's terminal
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Confirm for Prompt<R, W> {
    fn confirm(&mut self, message: &str, question: &str) -> Result<bool> {
        if !message.is_empty() {
            writeln!(self.output, "{}", message)?;
        }
        write!(self.output, "{} [y/N] ", question)?;
        self.output.flush()?;

        let mut answer = String::new();
        let read = self
            .input
            .read_line(&mut answer)
            .map_err(|e| Error::IoError(format!("Failed to read confirmation: {}", e)))?;
        if read == 0 {
            writeln!(self.output)?;
            return Ok(false);
        }

        let answer = answer.trim();
        Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
    }
}

/// Approves everything without asking (`--yes`)
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _message: &str, _question: &str) -> Result<bool> {
        Ok(true)
    }
}
