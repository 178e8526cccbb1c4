//! Line dispatch: reserved words, `show`, and model-declared commands.

use std::any::Any;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use anyhow::anyhow;
use colored::Colorize;
use thiserror::Error;
use yangcli_dsl::{ArgStyle, CommandModel, RpcCommand};

use crate::builtins;
use crate::registry::{Handler, HandlerRegistry, Payload, ResolutionError};
use crate::session::Session;

pub const SHOW_COMMAND: &str = "show";
pub const SHELL_COMMAND: &str = "bash";
pub const SHOW_USAGE: &str = "show <field> [<args>]";

/// Width the usage column is padded to in `help`.
const HELP_USAGE_WIDTH: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Exit,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("parse error: {0}")]
    Tokenize(String),
    #[error("Unknown command: {name}")]
    UnknownCommand { name: String },
    #[error("usage: {usage}")]
    Usage { usage: String },
    #[error("Unknown status field: {name}")]
    UnknownStatusField { name: String },
    #[error("invalid argument `{token}` ({reason})")]
    MalformedArgument { token: String, reason: &'static str },
    #[error("cannot resolve handler for {target}: {source}")]
    HandlerResolution {
        target: String,
        #[source]
        source: ResolutionError,
    },
    #[error("error while executing handler for {target}: {cause:#}")]
    HandlerExecution { target: String, cause: anyhow::Error },
    #[error("rpc '{name}' is declared but not implemented")]
    NotImplemented { name: String },
    #[error("shell passthrough: {0}")]
    Shell(String),
    #[error(transparent)]
    Output(#[from] io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// Program started by `bash`; `None` disables the passthrough.
    pub shell: Option<PathBuf>,
}

pub struct Interpreter {
    model: Arc<CommandModel>,
    registry: HandlerRegistry,
    session: Session,
    config: InterpreterConfig,
}

impl Interpreter {
    pub fn new(
        model: Arc<CommandModel>,
        registry: HandlerRegistry,
        session: Session,
        config: InterpreterConfig,
    ) -> Self {
        let symbols = model
            .commands()
            .iter()
            .filter_map(|c| c.handler.as_deref())
            .chain(
                model
                    .status_fields()
                    .iter()
                    .filter_map(|f| f.handler.as_deref()),
            );
        for symbol in symbols {
            if let Err(err) = registry.resolve(symbol) {
                tracing::warn!(symbol, error = %err, "schema names an unresolvable handler");
            }
        }

        Self {
            model,
            registry,
            session,
            config,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn shell_enabled(&self) -> bool {
        self.config.shell.is_some()
    }

    /// Top-level words that are not model commands.
    pub fn builtin_names(&self) -> Vec<String> {
        let mut names = vec![SHOW_COMMAND.to_string()];
        if self.shell_enabled() {
            names.push(SHELL_COMMAND.to_string());
        }
        names.extend(["exit", "quit", "help", "?"].map(String::from));
        names
    }

    /// Handle one line, reporting any error on the session output.
    pub fn handle_line(&mut self, line: &str) -> Control {
        let control = match self.execute(line) {
            Ok(control) => control,
            Err(err) => {
                tracing::debug!(line, error = %err, "command failed");
                if let Err(write_err) = writeln!(self.session.out(), "{} {err}", "error:".red().bold()) {
                    tracing::warn!(error = %write_err, "failed to report command error");
                }
                Control::Continue
            }
        };
        if let Err(err) = self.session.flush() {
            tracing::warn!(error = %err, "failed to flush session output");
        }
        control
    }

    pub fn execute(&mut self, line: &str) -> Result<Control, CommandError> {
        let line = line.trim();
        match line {
            "" => return Ok(Control::Continue),
            "exit" | "quit" => return Ok(Control::Exit),
            "help" | "?" => {
                self.print_help()?;
                return Ok(Control::Continue);
            }
            SHELL_COMMAND => {
                self.run_shell()?;
                return Ok(Control::Continue);
            }
            _ => {}
        }

        let tokens = tokenize(line)?;
        let Some((head, rest)) = tokens.split_first() else {
            return Ok(Control::Continue);
        };

        if head == SHOW_COMMAND {
            self.show(rest)?;
            return Ok(Control::Continue);
        }

        let model = Arc::clone(&self.model);
        let command = model
            .command(head)
            .ok_or_else(|| CommandError::UnknownCommand { name: head.clone() })?;

        if let [word] = rest {
            if word == "help" || word == "?" {
                self.print_command_help(command)?;
                return Ok(Control::Continue);
            }
        }

        self.dispatch_command(command, rest)?;
        Ok(Control::Continue)
    }

    fn show(&mut self, args: &[String]) -> Result<(), CommandError> {
        let Some((name, rest)) = args.split_first() else {
            return Err(CommandError::Usage {
                usage: SHOW_USAGE.to_string(),
            });
        };
        let model = Arc::clone(&self.model);
        let field = model
            .status_field(name)
            .ok_or_else(|| CommandError::UnknownStatusField { name: name.clone() })?;

        if let Some(symbol) = field.handler.as_deref() {
            let target = format!("status field '{}'", field.name);
            return self.invoke(symbol, &target, Payload::Positional(rest.to_vec()));
        }

        let value = self
            .session
            .state()
            .get(&field.name)
            .unwrap_or("(unset)")
            .to_string();
        writeln!(self.session.out(), "state {}: {value}", field.name)?;
        Ok(())
    }

    fn dispatch_command(&mut self, command: &RpcCommand, args: &[String]) -> Result<(), CommandError> {
        let payload = match command.arg_style {
            ArgStyle::Positional => Payload::Positional(args.to_vec()),
            ArgStyle::Kv => Payload::KeyValue(parse_key_value_args(args)?),
        };
        let target = format!("rpc '{}'", command.name);
        tracing::debug!(command = %command.name, style = command.arg_style.as_str(), "dispatch");

        if let Some(symbol) = command.handler.as_deref() {
            return self.invoke(symbol, &target, payload);
        }
        match builtins::fallback(&command.name) {
            Some(fallback) => run_guarded(&mut self.session, &fallback, &target, payload),
            None => Err(CommandError::NotImplemented {
                name: command.name.clone(),
            }),
        }
    }

    fn invoke(&mut self, symbol: &str, target: &str, payload: Payload) -> Result<(), CommandError> {
        let handler = self
            .registry
            .resolve(symbol)
            .map_err(|source| CommandError::HandlerResolution {
                target: target.to_string(),
                source,
            })?;
        run_guarded(&mut self.session, handler, target, payload)
    }

    fn print_command_help(&mut self, command: &RpcCommand) -> Result<(), CommandError> {
        let out = self.session.out();
        writeln!(out, "{}", command.usage_or_name())?;
        if let Some(description) = command.description.as_deref().filter(|d| !d.is_empty()) {
            writeln!(out, "  {description}")?;
        }
        Ok(())
    }

    fn print_help(&mut self) -> Result<(), CommandError> {
        let shell = self
            .config
            .shell
            .as_ref()
            .map(|p| format!("Start {} shell", p.display()));
        let mut commands: Vec<&RpcCommand> = self.model.visible_commands().collect();
        commands.sort_by(|a, b| a.name.cmp(&b.name));

        let out = self.session.out();
        writeln!(out, "Available built-in commands:")?;
        write_help_row(out, SHOW_USAGE, Some("Show a status field"))?;
        if let Some(shell) = shell.as_deref() {
            write_help_row(out, SHELL_COMMAND, Some(shell))?;
        }
        write_help_row(out, "exit, quit", Some("Exit the CLI"))?;
        write_help_row(out, "help, ?", Some("Show this help"))?;

        writeln!(out)?;
        writeln!(out, "Commands (from schema):")?;
        for command in commands {
            write_help_row(
                out,
                command.usage_or_name(),
                command.description.as_deref().filter(|d| !d.is_empty()),
            )?;
        }
        Ok(())
    }

    fn run_shell(&mut self) -> Result<(), CommandError> {
        let Some(shell) = self.config.shell.clone() else {
            return Err(CommandError::Shell("disabled".to_string()));
        };
        self.session.flush()?;
        match Command::new(&shell).status() {
            Ok(status) => {
                tracing::debug!(shell = %shell.display(), %status, "shell exited");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(CommandError::Shell(
                format!("{} not found", shell.display()),
            )),
            Err(err) => Err(CommandError::Shell(format!(
                "failed to start {}: {err}",
                shell.display()
            ))),
        }
    }
}

fn write_help_row(out: &mut dyn Write, usage: &str, description: Option<&str>) -> io::Result<()> {
    match description {
        Some(description) => writeln!(out, "  {usage:<width$} - {description}", width = HELP_USAGE_WIDTH),
        None => writeln!(out, "  {usage}"),
    }
}

/// Shell-style split; unbalanced quotes are an error.
pub fn tokenize(line: &str) -> Result<Vec<String>, CommandError> {
    shlex::split(line).ok_or_else(|| CommandError::Tokenize("unbalanced quotes".to_string()))
}

/// Split `key=value` at the only `=`; the key must be non-empty.
pub fn split_key_value(token: &str) -> Result<(&str, &str), &'static str> {
    let (key, value) = token.split_once('=').ok_or("expected key=value")?;
    if key.is_empty() {
        return Err("empty key");
    }
    if value.contains('=') {
        return Err("more than one '='");
    }
    Ok((key, value))
}

/// All-or-nothing: one malformed token rejects the whole list.
pub fn parse_key_value_args(tokens: &[String]) -> Result<BTreeMap<String, String>, CommandError> {
    let mut args = BTreeMap::new();
    for token in tokens {
        let (key, value) =
            split_key_value(token).map_err(|reason| CommandError::MalformedArgument {
                token: token.clone(),
                reason,
            })?;
        args.insert(key.to_string(), value.to_string());
    }
    Ok(args)
}

/// Run `handler`, restoring the session state if it fails or panics.
fn run_guarded(
    session: &mut Session,
    handler: &dyn Handler,
    target: &str,
    payload: Payload,
) -> Result<(), CommandError> {
    let snapshot = session.state().clone();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.call(session, payload)));
    let cause = match outcome {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) => err,
        Err(panic) => anyhow!("handler panicked: {}", panic_message(panic.as_ref())),
    };
    *session.state_mut() = snapshot;
    Err(CommandError::HandlerExecution {
        target: target.to_string(),
        cause,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::{LAST_ADD_RESULT_FIELD, LAST_HELLO_FIELD};
    use crate::session::{SessionState, SharedBuffer, HOSTNAME_FIELD};
    use proptest::prelude::*;
    use std::path::PathBuf;
    use yangcli_dsl::load_schema_sources;

    const SCHEMA: &str = r#"
module t {
  prefix t;
  rpc hello { t:cli-handler "core:hello"; t:cli-usage "hello name=<name>"; description "Say hello"; input { leaf name; } }
  rpc add { description "Add two integers"; input { leaf x; leaf y; } }
  rpc set-hostname { t:cli-handler "core:set-hostname"; input { leaf hostname; } }
  rpc ping { t:cli-handler "core:ping"; t:cli-arg-style positional; }
  rpc dump-state { t:cli-handler "core:dump-state"; t:cli-arg-style positional; t:cli-hidden; description "Dump state"; }
  rpc reboot { description "Reboot"; }
  rpc broken { t:cli-handler "nowhere:fn"; }
  rpc explode { t:cli-handler "test:explode"; }
  rpc fail-late { t:cli-handler "test:fail-late"; }
  container state {
    config false;
    leaf hostname { description "Host name"; }
    leaf route { t:cli-state-handler "core:show-route"; t:cli-completion "ipv4 ipv6 <CR>"; }
    leaf last-hello;
    leaf last-add-result;
  }
}
"#;

    fn interpreter() -> (Interpreter, SharedBuffer) {
        let model = Arc::new(
            load_schema_sources([(PathBuf::from("t.yang"), SCHEMA.to_string())])
                .expect("load")
                .model,
        );
        let mut registry = HandlerRegistry::with_builtins();
        registry
            .register("test:explode", |_: &mut Session, _: Payload| -> anyhow::Result<()> {
                panic!("boom")
            })
            .expect("register");
        registry
            .register("test:fail-late", |session: &mut Session, _: Payload| -> anyhow::Result<()> {
                session.state_mut().set(LAST_HELLO_FIELD, "partial");
                Err(anyhow!("gave up"))
            })
            .expect("register");

        let buf = SharedBuffer::default();
        let session = Session::new(SessionState::for_model(&model), Box::new(buf.clone()));
        (
            Interpreter::new(model, registry, session, InterpreterConfig::default()),
            buf,
        )
    }

    fn state(interp: &Interpreter) -> SessionState {
        interp.session().state().clone()
    }

    struct ClosedOutput;

    impl Write for ClosedOutput {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn unwritable_output_does_not_end_the_session() {
        let (interp, _buf) = interpreter();
        let model = Arc::clone(&interp.model);
        let session = Session::new(SessionState::for_model(&model), Box::new(ClosedOutput));
        let mut interp = Interpreter::new(
            model,
            HandlerRegistry::with_builtins(),
            session,
            InterpreterConfig::default(),
        );
        assert_eq!(interp.handle_line("nope"), Control::Continue);
        assert_eq!(interp.handle_line("set-hostname hostname=r9"), Control::Continue);
        assert_eq!(interp.handle_line("quit"), Control::Exit);
    }

    #[test]
    fn reserved_words() {
        let (mut interp, _buf) = interpreter();
        assert_eq!(interp.execute("  exit  ").expect("exit"), Control::Exit);
        assert_eq!(interp.execute("quit").expect("quit"), Control::Exit);
        assert_eq!(interp.execute("").expect("blank"), Control::Continue);
    }

    #[test]
    fn show_hostname_reflects_set_hostname() {
        let (mut interp, buf) = interpreter();
        let initial = interp
            .session()
            .state()
            .get(HOSTNAME_FIELD)
            .expect("default hostname")
            .to_string();
        interp.execute("show hostname").expect("show");
        assert_eq!(buf.contents(), format!("state hostname: {initial}\n"));

        interp.execute("set-hostname hostname=foo").expect("set");
        buf.clear();
        interp.execute("show hostname").expect("show");
        assert_eq!(buf.contents(), "state hostname: foo\n");
    }

    #[test]
    fn show_unset_and_unknown_fields() {
        let (mut interp, buf) = interpreter();
        interp.execute("show last-hello").expect("show");
        assert_eq!(buf.contents(), "state last-hello: (unset)\n");

        assert!(matches!(
            interp.execute("show nope"),
            Err(CommandError::UnknownStatusField { .. })
        ));
        assert!(matches!(
            interp.execute("show"),
            Err(CommandError::Usage { .. })
        ));
    }

    #[test]
    fn show_delegates_to_field_handler() {
        let (mut interp, buf) = interpreter();
        interp.execute("show route ipv6").expect("show");
        assert!(buf.contents().starts_with("state route ipv6:"));
    }

    #[test]
    fn kv_dispatch_uses_fallback_when_no_handler() {
        let (mut interp, buf) = interpreter();
        interp.execute("add x=2 y=40").expect("add");
        assert_eq!(buf.contents(), "result=42\n");
        assert_eq!(interp.session().state().get(LAST_ADD_RESULT_FIELD), Some("42"));
    }

    #[test]
    fn later_duplicate_keys_overwrite() {
        let (mut interp, buf) = interpreter();
        interp.execute("hello name=a name=b").expect("hello");
        assert_eq!(buf.contents(), "greeting=Hello, b!\n");
    }

    #[test]
    fn quoted_values_are_single_tokens() {
        let (mut interp, buf) = interpreter();
        interp.execute(r#"hello "name=big world""#).expect("hello");
        assert_eq!(buf.contents(), "greeting=Hello, big world!\n");
    }

    #[test]
    fn malformed_argument_leaves_state_unchanged() {
        let (mut interp, _buf) = interpreter();
        let before = state(&interp);
        for line in [
            "hello name=x oops",
            "hello =x",
            "hello name=a=b",
            "set-hostname hostname=foo junk",
        ] {
            let err = interp.execute(line).expect_err(line);
            assert!(matches!(err, CommandError::MalformedArgument { .. }), "{line}: {err}");
        }
        assert_eq!(state(&interp), before);
    }

    #[test]
    fn unknown_command_leaves_state_unchanged() {
        let (mut interp, buf) = interpreter();
        let before = state(&interp);
        assert_eq!(interp.handle_line("frobnicate x=1"), Control::Continue);
        assert!(buf.contents().contains("Unknown command: frobnicate"));
        assert_eq!(state(&interp), before);
    }

    #[test]
    fn unbalanced_quotes_are_reported() {
        let (mut interp, _buf) = interpreter();
        assert!(matches!(
            interp.execute("hello \"name=x"),
            Err(CommandError::Tokenize(_))
        ));
    }

    #[test]
    fn declared_but_not_implemented() {
        let (mut interp, _buf) = interpreter();
        let err = interp.execute("reboot").expect_err("reboot");
        assert!(matches!(err, CommandError::NotImplemented { .. }));
    }

    #[test]
    fn resolution_failure_is_non_fatal() {
        let (mut interp, buf) = interpreter();
        let before = state(&interp);
        assert_eq!(interp.handle_line("broken"), Control::Continue);
        assert!(buf.contents().contains("cannot resolve handler for rpc 'broken'"));
        assert_eq!(state(&interp), before);
        assert_eq!(interp.handle_line("exit"), Control::Exit);
    }

    #[test]
    fn failing_handler_is_rolled_back() {
        let (mut interp, buf) = interpreter();
        let before = state(&interp);
        assert_eq!(interp.handle_line("fail-late"), Control::Continue);
        assert!(buf.contents().contains("gave up"));
        assert_eq!(state(&interp), before);
    }

    #[test]
    fn panicking_handler_is_reported() {
        let (mut interp, _buf) = interpreter();
        let err = interp.execute("explode").expect_err("explode");
        match err {
            CommandError::HandlerExecution { cause, .. } => {
                assert!(cause.to_string().contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn help_lists_visible_commands_sorted() {
        let (mut interp, buf) = interpreter();
        interp.execute("?").expect("help");
        let text = buf.contents();
        assert!(!text.contains("dump-state"));
        assert!(!text.contains("bash"));
        assert!(text.contains(&format!("  {:<24} - Say hello", "hello name=<name>")));
        let add = text.find("  add").expect("add listed");
        let reboot = text.find("  reboot").expect("reboot listed");
        assert!(add < reboot);
    }

    #[test]
    fn hidden_command_is_still_invocable() {
        let (mut interp, buf) = interpreter();
        interp.execute("dump-state").expect("dump");
        assert!(buf.contents().starts_with("state:\n"));
    }

    #[test]
    fn command_help_prints_usage_and_description() {
        let (mut interp, buf) = interpreter();
        interp.execute("hello ?").expect("help");
        assert_eq!(buf.contents(), "hello name=<name>\n  Say hello\n");

        buf.clear();
        interp.execute("set-hostname help").expect("help");
        assert_eq!(buf.contents(), "set-hostname\n");
    }

    #[test]
    fn shell_passthrough_disabled() {
        let (mut interp, _buf) = interpreter();
        assert!(!interp.builtin_names().contains(&SHELL_COMMAND.to_string()));
        assert!(matches!(interp.execute("bash"), Err(CommandError::Shell(_))));
    }

    #[test]
    fn missing_shell_program_is_non_fatal() {
        let (interp, _buf) = interpreter();
        let Interpreter {
            model,
            registry,
            session,
            ..
        } = interp;
        let mut interp = Interpreter::new(
            model,
            registry,
            session,
            InterpreterConfig {
                shell: Some(PathBuf::from("/definitely/not/a/shell")),
            },
        );
        let err = interp.execute("bash").expect_err("missing shell");
        assert!(err.to_string().contains("not found"), "{err}");
    }

    fn kv_token() -> impl Strategy<Value = String> {
        ("[a-z][a-z0-9]{0,6}", "[a-z0-9.]{0,6}").prop_map(|(k, v)| format!("{k}={v}"))
    }

    proptest! {
        #[test]
        fn one_malformed_token_rejects_the_whole_command(
            good in prop::collection::vec(kv_token(), 0..6),
            bad in "[a-z0-9]{1,8}".prop_filter("help is reserved", |b| b != "help"),
            at in any::<prop::sample::Index>(),
            command in prop::sample::select(vec!["hello", "add", "set-hostname"]),
        ) {
            let (mut interp, _buf) = interpreter();
            let before = state(&interp);

            let mut tokens = good;
            let slot = at.index(tokens.len() + 1);
            tokens.insert(slot, bad);
            let line = format!("{command} {}", tokens.join(" "));

            let is_malformed = matches!(
                interp.execute(&line),
                Err(CommandError::MalformedArgument { .. })
            );
            prop_assert!(is_malformed, "line={}", line);
            prop_assert_eq!(state(&interp), before);
        }
    }

    #[test]
    fn split_key_value_rules() {
        assert_eq!(split_key_value("a=b"), Ok(("a", "b")));
        assert_eq!(split_key_value("a="), Ok(("a", "")));
        assert!(split_key_value("ab").is_err());
        assert!(split_key_value("=b").is_err());
        assert!(split_key_value("a=b=c").is_err());
    }
}
