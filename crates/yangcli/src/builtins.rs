//! Reference command implementations.
//!
//! These back the `core` handler namespace and double as the fallbacks the
//! interpreter uses for commands that are declared without a handler.

use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Result;

use crate::registry::{HandlerRegistry, Payload};
use crate::session::{Session, HOSTNAME_FIELD};

pub const CORE_NAMESPACE: &str = "core";

pub const LAST_HELLO_FIELD: &str = "last-hello";
pub const LAST_ADD_RESULT_FIELD: &str = "last-add-result";
pub const LAST_PING_TARGET_FIELD: &str = "last-ping-target";
pub const LAST_PING_SUCCESS_FIELD: &str = "last-ping-success";

const PING_PROGRAM: &str = "ping";
const DEFAULT_PING_COUNT: u32 = 4;
const PING_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub type BuiltinFn = fn(&mut Session, Payload) -> Result<()>;

/// Register every builtin under `core:<name>`.
pub fn register(registry: &mut HandlerRegistry) {
    let entries: [(&str, BuiltinFn); 6] = [
        ("hello", hello),
        ("add", add),
        ("set-hostname", set_hostname),
        ("ping", ping),
        ("show-route", show_route),
        ("dump-state", dump_state),
    ];
    for (name, handler) in entries {
        let symbol = format!("{CORE_NAMESPACE}:{name}");
        if let Err(err) = registry.register(&symbol, handler) {
            tracing::warn!(%symbol, error = %err, "failed to register builtin");
        }
    }
}

/// Implementation used when a command with one of these names has no handler.
pub fn fallback(command: &str) -> Option<BuiltinFn> {
    match command {
        "hello" => Some(hello),
        "add" => Some(add),
        "set-hostname" => Some(set_hostname),
        "ping" => Some(ping),
        _ => None,
    }
}

pub fn hello(session: &mut Session, payload: Payload) -> Result<()> {
    let args = payload.into_key_value("hello")?;
    let name = args.get("name").map(String::as_str).unwrap_or("world");
    let greeting = format!("Hello, {name}!");
    writeln!(session.out(), "greeting={greeting}")?;
    session.state_mut().set(LAST_HELLO_FIELD, greeting);
    Ok(())
}

pub fn add(session: &mut Session, payload: Payload) -> Result<()> {
    let args = payload.into_key_value("add")?;
    let operand = |key: &str| -> Option<i64> {
        args.get(key)
            .map_or(Some(0), |raw| raw.trim().parse::<i64>().ok())
    };
    let (Some(x), Some(y)) = (operand("x"), operand("y")) else {
        writeln!(session.out(), "x and y must be integers (e.g. add x=1 y=2)")?;
        return Ok(());
    };
    let Some(result) = x.checked_add(y) else {
        writeln!(session.out(), "result out of range: {x} + {y}")?;
        return Ok(());
    };
    writeln!(session.out(), "result={result}")?;
    session
        .state_mut()
        .set(LAST_ADD_RESULT_FIELD, result.to_string());
    Ok(())
}

/// Changes the session's notion of the host name only; the OS is untouched.
pub fn set_hostname(session: &mut Session, payload: Payload) -> Result<()> {
    let args = payload.into_key_value("set-hostname")?;
    let Some(hostname) = args.get("hostname").filter(|h| !h.is_empty()) else {
        writeln!(session.out(), "Usage: set-hostname hostname=<name>")?;
        return Ok(());
    };
    session.state_mut().set(HOSTNAME_FIELD, hostname.as_str());
    writeln!(session.out(), "result=hostname set to '{hostname}'")?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    Reachable,
    Unreachable,
    Aborted,
    Unavailable,
}

impl PingOutcome {
    pub fn succeeded(self) -> bool {
        matches!(self, PingOutcome::Reachable)
    }
}

/// Run `program` silently as `program -c <count> <destination>`, polling
/// `interrupt` while it runs.
///
/// A raised interrupt kills the child and is consumed here.
pub fn run_ping_program(
    program: &Path,
    destination: &str,
    count: u32,
    interrupt: &AtomicBool,
) -> PingOutcome {
    if interrupt.swap(false, Ordering::SeqCst) {
        return PingOutcome::Aborted;
    }
    let spawned = Command::new(program)
        .arg("-c")
        .arg(count.to_string())
        .arg(destination)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(err) => {
            tracing::debug!(program = %program.display(), error = %err, "failed to spawn ping");
            return PingOutcome::Unavailable;
        }
    };

    loop {
        if interrupt.swap(false, Ordering::SeqCst) {
            reap(&mut child);
            return PingOutcome::Aborted;
        }
        match child.try_wait() {
            Ok(Some(status)) => return settle(status, interrupt),
            Ok(None) => thread::sleep(PING_POLL_INTERVAL),
            Err(err) => {
                tracing::warn!(error = %err, "failed to poll ping");
                reap(&mut child);
                return PingOutcome::Unreachable;
            }
        }
    }
}

/// Outcome for a program that has already exited.
fn settle(status: ExitStatus, interrupt: &AtomicBool) -> PingOutcome {
    // SIGINT reaches the whole foreground group; prefer the flag.
    if interrupt.swap(false, Ordering::SeqCst) {
        PingOutcome::Aborted
    } else if status.success() {
        PingOutcome::Reachable
    } else {
        PingOutcome::Unreachable
    }
}

fn reap(child: &mut Child) {
    if let Err(err) = child.kill() {
        tracing::debug!(error = %err, "failed to kill ping");
    }
    if let Err(err) = child.wait() {
        tracing::debug!(error = %err, "failed to reap ping");
    }
}

pub fn ping(session: &mut Session, payload: Payload) -> Result<()> {
    ping_with(Path::new(PING_PROGRAM), session, payload)
}

fn ping_with(program: &Path, session: &mut Session, payload: Payload) -> Result<()> {
    let tokens = payload.into_positional("ping")?;
    let Some(destination) = tokens.first() else {
        writeln!(session.out(), "Usage: ping <destination> [count]")?;
        return Ok(());
    };
    let count = match tokens.get(1) {
        None => DEFAULT_PING_COUNT,
        Some(raw) => match raw.parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => {
                writeln!(
                    session.out(),
                    "count must be a positive integer (e.g. ping 192.0.2.1 3)"
                )?;
                return Ok(());
            }
        },
    };

    writeln!(
        session.out(),
        "PING {destination} with {count} packets (system ping)..."
    )?;
    session.flush()?;

    let outcome = run_ping_program(program, destination, count, session.interrupt_flag());
    match outcome {
        PingOutcome::Aborted => writeln!(session.out(), "\nPing aborted by user.")?,
        PingOutcome::Unavailable => {
            writeln!(session.out(), "system 'ping' command not found.")?;
            writeln!(session.out(), "success=false")?;
        }
        PingOutcome::Reachable | PingOutcome::Unreachable => {
            writeln!(session.out(), "success={}", outcome.succeeded())?;
        }
    }
    record_ping(session, destination, outcome);
    Ok(())
}

fn record_ping(session: &mut Session, destination: &str, outcome: PingOutcome) {
    let state = session.state_mut();
    state.set(LAST_PING_TARGET_FIELD, destination);
    state.set(LAST_PING_SUCCESS_FIELD, outcome.succeeded().to_string());
}

const IPV4_ROUTES: [(&str, &str, u32); 2] = [
    ("0.0.0.0/0", "192.0.2.254", 1),
    ("192.0.2.0/24", "0.0.0.0", 0),
];
const IPV6_ROUTES: [(&str, &str, u32); 2] = [
    ("::/0", "2001:db8::ffff", 1),
    ("2001:db8::/64", "::", 0),
];

/// `show route [ipv4|ipv6]`: a fixed demonstration table.
pub fn show_route(session: &mut Session, payload: Payload) -> Result<()> {
    let tokens = payload.into_positional("show route")?;
    let out = session.out();
    match tokens.as_slice() {
        [] => {
            write_ipv4_routes(out)?;
            writeln!(out)?;
            write_ipv6_routes(out)?;
        }
        [family] if family == "ipv4" => write_ipv4_routes(out)?,
        [family] if family == "ipv6" => write_ipv6_routes(out)?,
        _ => writeln!(out, "Usage: show route [ipv4|ipv6]")?,
    }
    Ok(())
}

fn write_ipv4_routes(out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "state route ipv4:")?;
    for (prefix, nexthop, metric) in IPV4_ROUTES {
        writeln!(out, "  {prefix:<18} via {nexthop:<15} metric {metric}")?;
    }
    Ok(())
}

fn write_ipv6_routes(out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "state route ipv6:")?;
    for (prefix, nexthop, metric) in IPV6_ROUTES {
        writeln!(out, "  {prefix:<24} via {nexthop:<20} metric {metric}")?;
    }
    Ok(())
}

/// Print every status field with its current value.
pub fn dump_state(session: &mut Session, payload: Payload) -> Result<()> {
    payload.into_positional("dump-state")?;
    let lines: Vec<String> = session
        .state()
        .iter()
        .map(|(field, value)| format!("  {field}: {}", value.unwrap_or("(unset)")))
        .collect();
    let out = session.out();
    writeln!(out, "state:")?;
    for line in lines {
        writeln!(out, "{line}")?;
    }
    Ok(())
}
