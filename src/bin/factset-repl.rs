use std::path::PathBuf;
use std::time::Instant;

use factset::Environment;
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Editor, Helper};
use tracing_subscriber::EnvFilter;

const HEADER: &str = "
#=====================#
# Factset REPL v0.1.0 #
#=====================#
";

fn main() {
    // install global collector configured based on RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("{}", HEADER);

    let mut rl = Editor::<AppState, DefaultHistory>::new().expect("Failed to initialize REPL");

    // ================= SETUP HISTORY ========================
    let history_path = get_history_path();
    if let Some(history_path) = history_path.as_ref() {
        match rl.load_history(history_path.as_path()) {
            Ok(()) => tracing::debug!("History loaded"),
            Err(ReadlineError::Io(ioerr)) if ioerr.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No previous history")
            }
            Err(err) => tracing::error!("Failed to load history: {}", err),
        }
    }

    // ================= INITIALIZE STATE ========================

    let state = AppState::new();

    // ================= CTRL-C HANDLING ========================

    // rustyline handles Ctrl-C during prompts. A running command is interrupted by halting the
    // environment, which loops and queries check between steps.
    let halt = state.env.halt_signal();
    if let Err(err) = ctrlc::set_handler(move || halt.set()) {
        tracing::error!(
            "Could not install Ctrl-C handler, evaluations cannot be interrupted: {}",
            err
        );
    }

    rl.set_helper(Some(state));

    // ================= ACTUAL REPL ========================

    loop {
        match rl.readline("CLIPS> ") {
            Ok(line) => {
                if let Err(err) = rl.add_history_entry(&line) {
                    tracing::warn!("Couldn't add history: {}", err);
                }
                if let Some(state) = rl.helper_mut() {
                    dispatch(state, line)
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C also halts running commands, so it must not close the REPL.
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                tracing::error!("readline: {}", err);
                break;
            }
        }
    }

    // ================= CLEANUP ========================

    if let Some(history_path) = history_path.as_ref() {
        if let Err(err) = rl.save_history(history_path) {
            tracing::error!("Failed to save history: {}", err);
        } else {
            tracing::debug!("History saved");
        }
    }
}

struct AppState {
    env: Environment,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }
}

impl Helper for AppState {}
impl Highlighter for AppState {}
impl Hinter for AppState {
    type Hint = String;
}
impl Completer for AppState {
    type Candidate = String;
}

impl Validator for AppState {
    /// Keep reading lines until all parens are closed, so forms can span several lines.
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        let input = ctx.input();
        if input.starts_with(':') {
            return Ok(ValidationResult::Valid(None));
        }
        let mut depth = 0i64;
        let mut in_string = false;
        let mut escaped = false;
        let mut in_comment = false;
        for c in input.chars() {
            match c {
                '\n' if in_comment => in_comment = false,
                _ if in_comment => {}
                _ if escaped => escaped = false,
                '\\' if in_string => escaped = true,
                '"' => in_string = !in_string,
                _ if in_string => {}
                ';' => in_comment = true,
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
        }
        if depth > 0 || in_string {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

fn dispatch(state: &mut AppState, line: String) {
    if line.starts_with(':') {
        let (command, args) = line.split_once(' ').unwrap_or((&line, ""));
        for cmd in COMMANDS {
            if command == cmd.name {
                return (cmd.run)(state, args.trim());
            }
        }
        println!("No such command: {}", command);
    } else if !line.trim().is_empty() {
        eval(state, &line);
    }
}

fn eval(state: &mut AppState, source: &str) {
    match state.env.eval_str(source) {
        Ok(value) => {
            println!("{}", state.env.pretty().value_to_string(&value));
            if state.env.is_halted() {
                println!("Halted!");
            }
        }
        Err(err) => println!("Error: {}", err),
    }
}

static COMMANDS: &[Command] = &[
    Command {
        name: ":facts",
        args: "",
        help: "List all facts.",
        run: &|state, _args| {
            let facts = state.env.facts.all_facts();
            for fact in &facts {
                println!(
                    "f-{:<5}{}",
                    fact.index,
                    state.env.pretty().fact_to_string(fact)
                );
            }
            println!("For a total of {} facts.", facts.len());
        },
    },
    Command {
        name: ":help",
        args: "",
        help: "Show this help message.",
        run: &|_state, _args| {
            println!("Available commands:");
            let max_width = COMMANDS
                .iter()
                .map(|cmd| cmd.name.len() + cmd.args.len() + 1)
                .max()
                .unwrap_or(0);
            let spaces: String = " ".repeat(max_width + 2);
            for cmd in COMMANDS {
                let width = cmd.name.len() + cmd.args.len() + 1;
                let num_spaces = max_width - width + 2;
                println!(
                    "  {} {}{}{}",
                    cmd.name,
                    cmd.args,
                    &spaces[0..num_spaces],
                    cmd.help
                );
            }
        },
    },
    Command {
        name: ":load",
        args: "<filename>",
        help: "Load constructs and run expressions from the given file.",
        run: &|state, args| {
            if args.is_empty() {
                println!("Usage:\n\t:load <filename>");
                return;
            }
            match std::fs::read_to_string(args) {
                Ok(contents) => match state.env.load_str(&contents) {
                    Ok(()) => {
                        println!("Loaded!");
                    }
                    Err(err) => {
                        println!("Failed to load: {}", err);
                    }
                },
                Err(err) => {
                    println!("Failed to read: {}", err);
                }
            }
        },
    },
    Command {
        name: ":reset",
        args: "",
        help: "Forget all templates, facts, functions and globals.",
        run: &|state, _args| {
            // keep the handle the Ctrl-C handler holds
            let halt = state.env.halt_signal();
            state.env = Environment::with_halt_signal(halt);
        },
    },
    Command {
        name: ":time",
        args: "<expr>",
        help: "Time the evaluation of the expression.",
        run: &|state, args| {
            let start = Instant::now();
            eval(state, args);
            let duration = start.elapsed();
            println!("Took {:.4}s", duration.as_secs_f64());
        },
    },
];

struct Command {
    name: &'static str,
    args: &'static str,
    help: &'static str,
    run: &'static (dyn Fn(&mut AppState, &str) + Sync + Send + 'static),
}

fn get_history_path() -> Option<PathBuf> {
    if let Some(mut config_path) = dirs::config_dir() {
        config_path.push("factset");
        match std::fs::create_dir(&config_path) {
            Ok(()) => (),
            Err(ioerr) if ioerr.kind() == std::io::ErrorKind::AlreadyExists => (),
            Err(other) => {
                tracing::error!(
                    "Failed to create config dir {}: {}",
                    config_path.display(),
                    other
                );
                return None;
            }
        };
        config_path.push("history.txt");
        tracing::info!("Using history file: {}", config_path.display());
        Some(config_path)
    } else {
        tracing::error!("Could not determine config folder, history will not be persisted");
        None
    }
}
