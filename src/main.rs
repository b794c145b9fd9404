//! gitlite - command-line interface
//!
//! Every invocation loads the repository from `.gitlite/`, runs one
//! command, and persists the tracking state again.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gitlite::repo::{MergeOutcome, RepoError, RepoResult, Repository, RepositoryConfig};

#[derive(Parser, Debug)]
#[command(
    name = "gitlite",
    version,
    about = "gitlite: a small local version-control system",
    long_about = None
)]
struct Cli {
    /// Working directory to operate in.
    #[arg(short = 'C', long = "dir", global = true, default_value = ".")]
    dir: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new repository in the working directory
    Init,

    /// Stage a file for the next commit
    Add { file: String },

    /// Record the staged changes
    Commit { message: String },

    /// Unstage a file, or stop tracking it and delete it
    Rm { file: String },

    /// Show the history of the current head
    Log,

    /// Show every commit ever made
    #[command(name = "global-log")]
    GlobalLog,

    /// Print the ids of commits with the given message
    Find { message: String },

    /// Show branches, staged files and working-directory changes
    Status,

    /// Switch branches, or restore a file
    #[command(after_help = "EXAMPLES:\n    gitlite checkout feature\n    gitlite checkout -- notes.txt\n    gitlite checkout a1b2c3 -- notes.txt")]
    Checkout {
        /// Branch to switch to, or commit to restore the file from
        target: Option<String>,

        /// File to restore
        #[arg(last = true)]
        file: Option<String>,
    },

    /// Create a branch at the current head
    Branch { name: String },

    /// Delete a branch pointer
    #[command(name = "rm-branch")]
    RmBranch { name: String },

    /// Move the current branch to a commit
    Reset { commit: String },

    /// Merge a branch into the current one
    Merge { branch: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = RepositoryConfig::new(&cli.dir);
    match run(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}

fn run(command: Commands, config: RepositoryConfig) -> RepoResult<()> {
    if let Commands::Init = command {
        return Repository::init(config)?.close();
    }

    let mut repo = Repository::load(config)?;
    match command {
        // created before loading
        Commands::Init => {}
        Commands::Add { file } => repo.add(&file)?,
        Commands::Commit { message } => {
            repo.commit(&message)?;
        }
        Commands::Rm { file } => repo.rm(&file)?,
        Commands::Log => {
            for commit in repo.log() {
                println!("{}", commit.log_entry());
            }
        }
        Commands::GlobalLog => {
            for commit in repo.global_log() {
                println!("{}", commit.log_entry());
            }
        }
        Commands::Find { message } => {
            for id in repo.find(&message)? {
                println!("{}", id);
            }
        }
        Commands::Status => print!("{}", repo.status()?),
        Commands::Checkout { target, file } => match (target, file) {
            (commit, Some(file)) => repo.checkout_file(&file, commit.as_deref())?,
            (Some(branch), None) => repo.checkout_branch(&branch)?,
            (None, None) => Cli::command()
                .error(
                    ErrorKind::MissingRequiredArgument,
                    "checkout needs a branch, or a file after `--`",
                )
                .exit(),
        },
        Commands::Branch { name } => repo.branch(&name)?,
        Commands::RmBranch { name } => repo.rm_branch(&name)?,
        Commands::Reset { commit } => repo.reset(&commit)?,
        Commands::Merge { branch } => match repo.merge(&branch)? {
            MergeOutcome::AlreadyUpToDate => {
                println!("Given branch is an ancestor of the current branch.");
            }
            MergeOutcome::FastForward(_) => println!("Current branch fast-forwarded."),
            MergeOutcome::Merged { conflicted, .. } => {
                if !conflicted.is_empty() {
                    println!("Encountered a merge conflict.");
                }
            }
        },
    }
    repo.close()
}

fn report(error: &RepoError) -> ExitCode {
    if error.is_corruption() {
        tracing::error!(error = %error, "store failed consistency checks");
        println!("File structures may be corrupted. Please delete .gitlite and retry.");
    } else if error.is_user_error() {
        println!("{}", error);
    } else {
        eprintln!("error: {}", error);
    }
    ExitCode::FAILURE
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("GITLITE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "gitlite=debug"
        } else {
            "gitlite=warn"
        })
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}
