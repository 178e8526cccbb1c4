//! Read loop and script runner.
//!
//! By default we use `rustyline` for line editing and tab completion.
//! A minimal stdin-based editor is used when the feature is off or when
//! stdin is not a terminal.

use std::fs;
use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::completion::CompletionEngine;
use crate::interpreter::{Control, Interpreter};

/// Outcome of one blocking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    Line(String),
    Interrupted,
    Eof,
}

pub trait LineEditor {
    fn read_line(&mut self, prompt: &str) -> Result<ReadResult>;

    fn add_history(&mut self, _line: &str) {}
}

/// Pick the best editor for the current stdin.
///
/// `interrupt` is the flag raised by SIGINT; the stdin editor consults it
/// because a blocking read is restarted after the handler runs.
pub fn default_editor(engine: CompletionEngine, interrupt: Arc<AtomicBool>) -> Result<Box<dyn LineEditor>> {
    #[cfg(feature = "repl-rustyline")]
    {
        if io::stdin().is_terminal() {
            return Ok(Box::new(RustylineEditor::new(engine)?));
        }
    }
    #[cfg(not(feature = "repl-rustyline"))]
    drop(engine);
    Ok(Box::new(StdinEditor::new(interrupt)))
}

/// Drive `interp` from `editor` until `exit`/`quit` or end of input.
pub fn run_session(interp: &mut Interpreter, editor: &mut dyn LineEditor, prompt: &str) -> Result<()> {
    loop {
        let line = match editor.read_line(prompt)? {
            ReadResult::Line(line) => line,
            ReadResult::Interrupted => {
                writeln!(interp.session_mut().out())?;
                interp.session_mut().flush()?;
                continue;
            }
            ReadResult::Eof => {
                writeln!(interp.session_mut().out())?;
                interp.session_mut().flush()?;
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        editor.add_history(line);

        // A Ctrl-C that arrived while reading belongs to the read.
        interp.session().clear_interrupt();
        if interp.handle_line(line) == Control::Exit {
            break;
        }
    }
    Ok(())
}

/// Lines from `script` (a file, or `-` for stdin) followed by `commands`.
pub fn collect_script_lines(script: Option<&Path>, commands: &[String]) -> Result<Vec<String>> {
    let mut lines: Vec<String> = Vec::new();

    if let Some(script_path) = script {
        let text = if script_path.as_os_str() == "-" {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        } else {
            fs::read_to_string(script_path)
                .with_context(|| format!("failed to read script {}", script_path.display()))?
        };
        lines.extend(text.lines().map(str::to_string));
    }

    lines.extend(commands.iter().cloned());
    Ok(lines)
}

/// Execute `lines` in order; blank lines and `#` comments are skipped.
pub fn run_script(interp: &mut Interpreter, lines: &[String], prompt: &str, quiet: bool) -> Result<()> {
    for raw_line in lines {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if !quiet {
            writeln!(interp.session_mut().out(), "{prompt}{line}")?;
        }

        // An interrupt only aborts the command that was running.
        interp.session().clear_interrupt();
        if interp.handle_line(line) == Control::Exit {
            break;
        }
    }
    Ok(())
}

/// Line reader over stdin without editing or completion.
///
/// A line that was being typed when SIGINT arrived is discarded and
/// reported as `Interrupted`.
pub struct StdinEditor {
    reader: Box<dyn BufRead>,
    interactive: bool,
    interrupt: Arc<AtomicBool>,
}

impl StdinEditor {
    pub fn new(interrupt: Arc<AtomicBool>) -> Self {
        let stdin = io::stdin();
        Self {
            interactive: stdin.is_terminal(),
            reader: Box::new(stdin.lock()),
            interrupt,
        }
    }

    pub fn with_reader(reader: Box<dyn BufRead>, interrupt: Arc<AtomicBool>) -> Self {
        Self {
            reader,
            interactive: false,
            interrupt,
        }
    }
}

impl LineEditor for StdinEditor {
    fn read_line(&mut self, prompt: &str) -> Result<ReadResult> {
        if self.interactive {
            print!("{prompt}");
            io::stdout().flush()?;
        }
        let mut line = String::new();
        let read = match self.reader.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                self.interrupt.store(false, Ordering::SeqCst);
                return Ok(ReadResult::Interrupted);
            }
            Err(err) => return Err(err.into()),
        };
        if self.interrupt.swap(false, Ordering::SeqCst) {
            return Ok(ReadResult::Interrupted);
        }
        if read == 0 {
            return Ok(ReadResult::Eof);
        }
        Ok(ReadResult::Line(line))
    }
}

#[cfg(feature = "repl-rustyline")]
pub struct RustylineEditor {
    editor: rustyline::Editor<ReplLineHelper, rustyline::history::DefaultHistory>,
}

#[cfg(feature = "repl-rustyline")]
impl RustylineEditor {
    pub fn new(engine: CompletionEngine) -> Result<Self> {
        use rustyline::config::{CompletionType, Config};

        let config = Config::builder()
            .completion_type(CompletionType::List)
            .auto_add_history(false)
            .build();
        let mut editor = rustyline::Editor::with_config(config)
            .map_err(|e| anyhow!("failed to init rustyline: {e}"))?;
        editor.set_helper(Some(ReplLineHelper { engine }));
        Ok(Self { editor })
    }
}

#[cfg(feature = "repl-rustyline")]
impl LineEditor for RustylineEditor {
    fn read_line(&mut self, prompt: &str) -> Result<ReadResult> {
        use rustyline::error::ReadlineError;

        match self.editor.readline(prompt) {
            Ok(line) => Ok(ReadResult::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(ReadResult::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadResult::Eof),
            Err(e) => Err(anyhow!("readline error: {e}")),
        }
    }

    fn add_history(&mut self, line: &str) {
        if let Err(err) = self.editor.add_history_entry(line) {
            tracing::debug!(error = %err, "failed to record history");
        }
    }
}

#[cfg(feature = "repl-rustyline")]
struct ReplLineHelper {
    engine: CompletionEngine,
}

#[cfg(feature = "repl-rustyline")]
impl rustyline::Helper for ReplLineHelper {}

#[cfg(feature = "repl-rustyline")]
impl rustyline::highlight::Highlighter for ReplLineHelper {}

#[cfg(feature = "repl-rustyline")]
impl rustyline::hint::Hinter for ReplLineHelper {
    type Hint = String;
    fn hint(&self, _line: &str, _pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        None
    }
}

#[cfg(feature = "repl-rustyline")]
impl rustyline::validate::Validator for ReplLineHelper {}

#[cfg(feature = "repl-rustyline")]
impl rustyline::completion::Completer for ReplLineHelper {
    type Candidate = rustyline::completion::Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        let text = &line[..pos];
        let start = pos - CompletionEngine::current_word(text).len();
        let pairs = self
            .engine
            .complete(text)
            .into_iter()
            .map(|c| rustyline::completion::Pair {
                display: c.display,
                replacement: c.replacement,
            })
            .collect();
        Ok((start, pairs))
    }
}
