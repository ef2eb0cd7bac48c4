use anyhow::{bail, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use taxonomist::presentation::cli_summary::{
    print_analysis, print_delete_outcome, print_merge_report, print_perf_summary, print_tree,
};
use taxonomist::{
    AppConfig, DeleteChoice, DeletePrompt, DeleteStatus, DeletionSummary, EntityKind, LogLevel,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser, Debug)]
#[command(
    name = "taxonomist",
    about = "Taxonomist: dependency-aware delete and merge for spreadsheet-backed product taxonomies."
)]
struct Cli {
    /// Config file; defaults to <config dir>/taxonomist/config.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,

    /// Print store timings after the command.
    #[arg(long)]
    perf: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show what deleting the given ids would affect.
    Analyze {
        kind: EntityKind,
        #[arg(required = true)]
        ids: Vec<String>,
        /// Print the analysis as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Delete ids, asking how to handle dependents.
    Delete {
        kind: EntityKind,
        #[arg(required = true)]
        ids: Vec<String>,
        /// Answer the safe/cascade question up front.
        #[arg(long, value_enum)]
        choice: Option<ChoiceArg>,
        /// Skip the plain confirmation when nothing depends on the selection.
        #[arg(short, long)]
        yes: bool,
    },
    /// Fold losers into a master record.
    Merge {
        kind: EntityKind,
        #[arg(long)]
        master: String,
        #[arg(required = true)]
        losers: Vec<String>,
    },
    /// Print the category hierarchy.
    Tree,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ChoiceArg {
    Safe,
    Cascade,
}

/// Answers from flags when given, from stdin otherwise.
struct TerminalPrompt {
    choice: Option<ChoiceArg>,
    yes: bool,
}

async fn ask(question: &str) -> String {
    let mut stdout = tokio::io::stdout();
    let _ = stdout.write_all(question.as_bytes()).await;
    let _ = stdout.flush().await;
    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    match stdin.read_line(&mut line).await {
        Ok(_) => line.trim().to_ascii_lowercase(),
        Err(_) => String::new(),
    }
}

#[async_trait]
impl DeletePrompt for TerminalPrompt {
    async fn confirm(&self, kind: EntityKind, count: usize) -> bool {
        if self.yes {
            return true;
        }
        let answer = ask(&format!("Delete {} {}? [y/N] ", count, kind)).await;
        matches!(answer.as_str(), "y" | "yes")
    }

    async fn choose(&self, summary: &DeletionSummary) -> DeleteChoice {
        print!("{}", summary);
        match self.choice {
            Some(ChoiceArg::Safe) => return DeleteChoice::Safe,
            Some(ChoiceArg::Cascade) => return DeleteChoice::Cascade,
            None => {}
        }
        let mut options = Vec::new();
        if summary.offers_safe() {
            options.push("[s]afe");
        }
        if summary.offers_cascade() {
            options.push("[c]ascade");
        }
        options.push("[N] cancel");
        let answer = ask(&format!("{}? ", options.join(" / "))).await;
        match answer.as_str() {
            "s" | "safe" if summary.offers_safe() => DeleteChoice::Safe,
            "c" | "cascade" if summary.offers_cascade() => DeleteChoice::Cascade,
            _ => DeleteChoice::Cancel,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match (cli.verbose, cli.quiet) {
        (true, _) => LogLevel::Debug,
        (_, true) => LogLevel::Error,
        _ => LogLevel::Info,
    };
    taxonomist::init_tracing(level);

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let cfg = AppConfig::load(&config_path)?;
    let ctx = taxonomist::open(&cfg).await?;

    match cli.command {
        Command::Analyze { kind, ids, json } => {
            let analysis = ctx.analyze(kind, &ids).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else {
                print_analysis(&analysis);
            }
        }
        Command::Delete {
            kind,
            ids,
            choice,
            yes,
        } => {
            let prompt = TerminalPrompt { choice, yes };
            let outcome = ctx.confirm_and_delete(kind, &ids, &prompt).await;
            print_delete_outcome(&outcome);
            if outcome.status == DeleteStatus::Error {
                if cli.perf {
                    print_perf_summary(&ctx.perf_report());
                }
                bail!("delete failed");
            }
        }
        Command::Merge {
            kind,
            master,
            losers,
        } => {
            let report = ctx.merge(kind, &master, &losers).await?;
            print_merge_report(&report);
        }
        Command::Tree => {
            let tree = ctx.category_tree().await?;
            print_tree(&tree);
        }
    }

    if cli.perf {
        print_perf_summary(&ctx.perf_report());
    }
    Ok(())
}
