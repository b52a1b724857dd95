//! Disambiguation: asking someone which candidate a broken reference means.

use std::io::{BufRead, Write};

use crate::error::Error;
use crate::types::Candidate;

/// Everything a decision-maker needs to pick a candidate.
#[derive(Debug)]
pub struct SelectionRequest<'a> {
    /// Candidates in presentation order.
    pub candidates: &'a [Candidate],
    /// Broken value currently in the descriptor.
    pub current_value: &'a str,
    /// Property being repaired.
    pub key: &'a str,
    /// Song title for context.
    pub song: &'a str,
}

/// Answer to a [`SelectionRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Input ended; stop asking for the rest of the run.
    Cancelled,
    /// Zero-based index into the request's candidates.
    Chosen(usize),
    /// Leave the reference as it is.
    KeepCurrent,
}

/// Presents candidates and returns a validated choice.
pub trait DisambiguationPort {
    /// Pick one of `request.candidates`, keep the current value, or cancel.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the underlying terminal fails.
    fn select(&mut self, request: &SelectionRequest<'_>) -> Result<Selection, Error>;
}

/// Never picks anything; for unattended runs.
#[derive(Debug, Default)]
pub struct KeepCurrent;

impl DisambiguationPort for KeepCurrent {
    fn select(&mut self, request: &SelectionRequest<'_>) -> Result<Selection, Error> {
        tracing::debug!(key = request.key, song = request.song, "prompt disabled, keeping value");
        return Ok(Selection::KeepCurrent);
    }
}

/// Numbered-menu prompt over any line reader and writer.
pub struct TerminalPrompt<R, W> {
    /// Answers, one per line.
    input: R,
    /// Where the menu is printed.
    output: W,
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    /// Prompt over arbitrary streams.
    pub const fn new(input: R, output: W) -> Self {
        return Self { input, output };
    }

    /// Print the numbered menu. The last option always leaves the value unchanged.
    fn print_menu(&mut self, request: &SelectionRequest<'_>) -> Result<(), Error> {
        writeln!(
            self.output,
            "Select the file for {} in song {}:",
            request.key, request.song
        )?;
        let mut number = 0_usize;
        for candidate in request.candidates {
            number = number.saturating_add(1);
            writeln!(
                self.output,
                "{number}_ {} --- {} MiB",
                candidate.display_path(),
                candidate.size_mib()
            )?;
        }
        writeln!(
            self.output,
            "{}_ Leave unchanged (currently {})",
            number.saturating_add(1),
            request.current_value
        )?;
        return Ok(());
    }
}

impl TerminalPrompt<std::io::StdinLock<'static>, std::io::Stdout> {
    /// Prompt on the process's stdin and stdout.
    pub fn stdio() -> Self {
        return Self::new(std::io::stdin().lock(), std::io::stdout());
    }
}

impl<R: BufRead, W: Write> DisambiguationPort for TerminalPrompt<R, W> {
    fn select(&mut self, request: &SelectionRequest<'_>) -> Result<Selection, Error> {
        self.print_menu(request)?;
        let options = request.candidates.len().saturating_add(1);

        loop {
            write!(self.output, "File number: ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                return Ok(Selection::Cancelled);
            }

            match parse_selection(&line, options) {
                Some(n) if n == options => return Ok(Selection::KeepCurrent),
                Some(n) => return Ok(Selection::Chosen(n.saturating_sub(1))),
                None => writeln!(self.output, "Enter a number from 1 to {options}.")?,
            }
        }
    }
}

/// Parse a 1-based menu answer; `None` unless it is a number in `1..=options`.
pub fn parse_selection(input: &str, options: usize) -> Option<usize> {
    let n: usize = input.trim().parse().ok()?;
    return (1..=options).contains(&n).then_some(n);
}
