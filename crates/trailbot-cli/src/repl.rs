//! REPL for the Trailbot operator shell.
//!
//! Supported slash-commands:
//!   /help            – show this list
//!   /follow          – start following
//!   /stop            – stop following (sends a zero command)
//!   /status          – print the control loop's current view
//!   /policy <name>   – switch between `blended` and `state_machine`
//!   /quit | /exit    – stop the base and exit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;
use trailbot_runtime::{ControlHandle, LoopStatus};
use trailbot_types::{FollowResult, FollowState, FollowerConfig, Policy};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Follow,
    Stop,
    Status,
    SetPolicy(Policy),
    Quit,
    Empty,
    Invalid(String),
}

/// Parse one input line.
pub fn parse(line: &str) -> Command {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Command::Empty;
    };
    match head {
        "/help" => Command::Help,
        "/follow" => Command::Follow,
        "/stop" => Command::Stop,
        "/status" => Command::Status,
        "/policy" => match words.next().map(str::parse::<Policy>) {
            Some(Ok(policy)) => Command::SetPolicy(policy),
            Some(Err(e)) => Command::Invalid(e.to_string()),
            None => Command::Invalid("usage: /policy <blended|state_machine>".to_string()),
        },
        "/quit" | "/exit" => Command::Quit,
        other => Command::Invalid(format!("Unknown command '{other}'")),
    }
}

/// Operator session bound to a running control loop.
pub struct Session {
    control: ControlHandle,
    runtime: Handle,
    config: FollowerConfig,
}

impl Session {
    pub fn new(control: ControlHandle, runtime: Handle, config: FollowerConfig) -> Self {
        Self { control, runtime, config }
    }

    /// Read commands from stdin until `/quit`, EOF, or `shutdown` is set.
    pub fn run(mut self, shutdown: Arc<AtomicBool>) {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            print!("{} ", "trailbot>".bold().cyan());
            stdout.flush().ok();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    eprintln!("{}: {}", "Read error".red(), e);
                    break;
                }
            }

            if !self.dispatch(parse(&line)) {
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
        }
    }

    /// Returns `false` once the session should end.
    fn dispatch(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Empty => {}
            Command::Help => cmd_help(),
            Command::Follow => self.set_following(FollowState::Follow),
            Command::Stop => self.set_following(FollowState::Stopped),
            Command::Status => match self.runtime.block_on(self.control.status()) {
                Ok(status) => print_status(&status),
                Err(e) => println!("{}: {}", "Status unavailable".red(), e),
            },
            Command::SetPolicy(policy) => self.set_policy(policy),
            Command::Quit => {
                self.set_following(FollowState::Stopped);
                println!("{}", "Goodbye.".green());
                return false;
            }
            Command::Invalid(msg) => println!(
                "{} {}. Type {} for available commands.",
                "Error:".red(),
                msg.yellow(),
                "/help".bold()
            ),
        }
        true
    }

    fn set_following(&self, state: FollowState) {
        match self.runtime.block_on(self.control.set_following(state)) {
            FollowResult::Ok => println!("  {} {:?}", "✓".green().bold(), state),
            FollowResult::Error => println!("{}", "  Control loop is not running.".red()),
        }
    }

    fn set_policy(&mut self, policy: Policy) {
        let mut next = self.config.clone();
        next.policy = policy;
        match self.runtime.block_on(self.control.reconfigure(next.clone())) {
            Ok(()) => {
                self.config = next;
                println!("  {} policy is now {}", "✓".green().bold(), policy.to_string().bold());
            }
            Err(e) => println!("{}: {}", "Reconfigure failed".red(), e),
        }
    }
}

fn cmd_help() {
    println!();
    println!("{}", "Trailbot Commands".bold().underline());
    println!("  {}          – start following", "/follow".bold().cyan());
    println!("  {}            – stop and hold still", "/stop".bold().cyan());
    println!("  {}          – show loop state and signals", "/status".bold().cyan());
    println!("  {}   – blended | state_machine", "/policy <name>".bold().cyan());
    println!("  {}     – stop the base and exit", "/quit  /exit".bold().cyan());
    println!();
}

fn print_status(status: &LoopStatus) {
    let s = &status.signals;
    println!();
    println!("{}", "Control Loop".bold().underline());
    println!(
        "  Following : {}",
        if status.enabled { "yes".green() } else { "no".yellow() }
    );
    println!("  Policy    : {}", status.policy);
    if let Some(state) = status.state {
        println!("  State     : {}", state.to_string().bold());
    }
    println!(
        "  Depth     : {} points, nearest {:.2} m",
        s.point_count, s.nearest_z
    );
    println!(
        "  Face      : {}  Color: {}  Close: {}",
        s.face_found, s.color_found, s.close_to_human
    );
    match status.last_command {
        Some(cmd) => println!(
            "  Last cmd  : linear {:.2} m/s, angular {:.2} rad/s ({} sent)",
            cmd.linear_x, cmd.angular_z, status.commands_sent
        ),
        None => println!("  Last cmd  : none"),
    }
    println!();
}
