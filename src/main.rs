use std::{cell::RefCell, io::Write, rc::Rc};

use clap::{Args, Parser, Subcommand};
use meat::{
    builtins::Builtins,
    config::Config,
    interpreter::{ExecutionError, Interpreter},
    ledger::{Ledger, LedgerError},
    tokenizer::{TokenType, TokenizeError, Tokenizer},
};

#[derive(Debug, Parser)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[command(flatten)]
    limits: Limits,
}

impl Cli {
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Repl)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate every statement of a file.
    Run(FileArgs),
    Repl,
    /// Print the token stream of a file.
    Tokens(FileArgs),
    /// Print the syntax tree of every statement of a file.
    Tree(FileArgs),
}

#[derive(Debug, Args)]
struct FileArgs {
    file: String,
}

#[derive(Debug, Args)]
struct Limits {
    /// Most statements a program may hold.
    #[arg(long, global = true)]
    capacity: Option<usize>,
    /// Deepest chain of nested function calls.
    #[arg(long, global = true)]
    max_call_depth: Option<usize>,
    /// Tallest syntax tree a single statement may produce.
    #[arg(long, global = true)]
    max_nesting_depth: Option<usize>,
    /// Deepest chain of nodes evaluated at once.
    #[arg(long, global = true)]
    max_evaluation_depth: Option<usize>,
    /// Absolute difference an ASSERT accepts.
    #[arg(long, global = true)]
    tolerance: Option<f32>,
}

impl Limits {
    fn config(&self) -> Config {
        let default = Config::default();
        Config {
            capacity: self.capacity.unwrap_or(default.capacity),
            max_call_depth: self.max_call_depth.unwrap_or(default.max_call_depth),
            max_nesting_depth: self.max_nesting_depth.unwrap_or(default.max_nesting_depth),
            max_evaluation_depth: self
                .max_evaluation_depth
                .unwrap_or(default.max_evaluation_depth),
            tolerance: self.tolerance.unwrap_or(default.tolerance),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum InterpretError {
    #[error("Could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

fn main() {
    init_tracing();

    let args = Cli::parse();
    let config = args.limits.config();

    let result = match args.command() {
        Command::Repl => {
            repl_command(&config);
            Ok(())
        }
        Command::Run(args) => run_command(args, &config),
        Command::Tokens(args) => tokens_command(args),
        Command::Tree(args) => tree_command(args, &config),
    };

    if let Err(e) = result {
        println!("{e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn repl_command(config: &Config) {
    println!("Welcome to the Meat REPL!");
    println!("EOF to exit. (Ctrl+D on *nix, Ctrl+Z on Windows)");

    loop {
        let mut input = String::new();

        print!("> ");
        std::io::stdout()
            .flush()
            .expect("should be able to flush stdout");

        let read = std::io::stdin()
            .read_line(&mut input)
            .expect("should be able to read line from stdin");

        if read == 0 {
            break;
        }

        if let Err(e) = interpret(input.trim(), config) {
            println!("Error: {}", e)
        }
    }
}

fn run_command(args: &FileArgs, config: &Config) -> Result<(), InterpretError> {
    let source = read_source(&args.file)?;
    interpret(&source, config)
}

fn tokens_command(args: &FileArgs) -> Result<(), InterpretError> {
    let source = read_source(&args.file)?;
    let mut tokenizer = Tokenizer::new(&source);
    let mut line = 0;
    loop {
        let token = tokenizer.token()?;
        if token.span.start_line != line {
            print!("{:4} ", token.span.start_line);
            line = token.span.start_line;
        } else {
            print!("   | ");
        }

        println!("{:<10} {}", format!("{:?}", token.token_type), token.lexeme);

        if token.token_type == TokenType::Eof {
            break;
        }
    }

    Ok(())
}

fn tree_command(args: &FileArgs, config: &Config) -> Result<(), InterpretError> {
    let source = read_source(&args.file)?;
    let ledger = Ledger::parse(&source, &Builtins::standard(), config)?;
    for (id, statement) in ledger.statements() {
        println!("[{}] {}: {}", id.index(), statement.kind(), ledger.display(id));
        print!("{}", ledger.tree().dump(statement.root()));
    }
    Ok(())
}

fn read_source(path: &str) -> Result<String, InterpretError> {
    std::fs::read_to_string(path).map_err(|source| InterpretError::Read {
        path: path.to_string(),
        source,
    })
}

fn interpret(source: &str, config: &Config) -> Result<(), InterpretError> {
    let builtins = Builtins::standard();
    let ledger = Ledger::parse(source, &builtins, config)?;
    let stdout = Rc::new(RefCell::new(std::io::stdout()));
    let mut interpreter = Interpreter::new(&ledger, &builtins, stdout).with_config(*config);
    interpreter.interpret()?;
    Ok(())
}
