//! Line-oriented operator input
//!
//! The REPL and the guided collector share one input session for the whole
//! run. It is passed explicitly so tests can substitute a scripted source.
//! On a terminal the operator gets a [`LineEditor`] with history; anything
//! else reads plain lines through an [`InputSession`].

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, BufRead, Cursor, Write};
use std::path::PathBuf;
use tracing::debug;

/// Source of operator input lines
pub trait InputSource {
    /// Show `prompt`, then return the next line without its terminator.
    ///
    /// `None` means the operator is done: end of input or an interrupt.
    fn read_line(&mut self, prompt: &str, out: &mut dyn Write) -> io::Result<Option<String>>;

    /// Remember a command line for recall; sources without history ignore it
    fn add_history(&mut self, _line: &str) {}
}

/// [`InputSource`] over any buffered reader
pub struct InputSession<R> {
    reader: R,
}

impl<R: BufRead> InputSession<R> {
    pub fn new(reader: R) -> Self {
        InputSession { reader }
    }
}

impl InputSession<io::StdinLock<'static>> {
    /// Session over the process's standard input
    pub fn stdin() -> Self {
        InputSession::new(io::stdin().lock())
    }
}

impl InputSession<Cursor<Vec<u8>>> {
    /// Session that replays `script` line by line, then reports end of input
    pub fn scripted(script: &str) -> Self {
        InputSession::new(Cursor::new(script.as_bytes().to_vec()))
    }
}

impl<R: BufRead> InputSource for InputSession<R> {
    fn read_line(&mut self, prompt: &str, out: &mut dyn Write) -> io::Result<Option<String>> {
        write!(out, "{}", prompt)?;
        out.flush()?;

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }

        let trimmed_len = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed_len);
        Ok(Some(line))
    }
}

/// Terminal input with line editing and persistent history
pub struct LineEditor {
    editor: DefaultEditor,
    history_path: Option<PathBuf>,
}

impl LineEditor {
    /// Open an editor on the controlling terminal, loading history from `history_path`
    pub fn new(history_path: Option<PathBuf>) -> io::Result<Self> {
        let mut editor = DefaultEditor::new().map_err(readline_io_error)?;

        if let Some(path) = &history_path {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if editor.load_history(path).is_err() {
                debug!("No history loaded from {}", path.display());
            }
        }

        Ok(LineEditor {
            editor,
            history_path,
        })
    }
}

impl InputSource for LineEditor {
    fn read_line(&mut self, prompt: &str, out: &mut dyn Write) -> io::Result<Option<String>> {
        // the editor redraws its prompt line, so pending output goes first
        out.flush()?;

        match self.editor.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Eof) => Ok(None),
            Err(ReadlineError::Interrupted) => {
                debug!("Input interrupted");
                Ok(None)
            }
            Err(e) => Err(readline_io_error(e)),
        }
    }

    fn add_history(&mut self, line: &str) {
        let _ = self.editor.add_history_entry(line);
    }
}

impl Drop for LineEditor {
    fn drop(&mut self) {
        if let Some(path) = &self.history_path {
            if let Err(e) = self.editor.save_history(path) {
                debug!("Failed to save history to {}: {}", path.display(), e);
            }
        }
    }
}

fn readline_io_error(error: ReadlineError) -> io::Error {
    match error {
        ReadlineError::Io(e) => e,
        other => io::Error::other(other.to_string()),
    }
}
