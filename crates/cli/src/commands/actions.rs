//! Read the store-action journal.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;

use campaign_core::StoreAction;
use sync_runtime::repository::{FileRepository, JOURNAL_FILENAME};

/// Summarize or dump the journaled store actions
#[derive(Parser)]
pub struct Actions {
    /// Data directory or journal file
    #[arg(value_name = "JOURNAL")]
    journal: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "summary")]
    format: OutputFormat,

    /// Limit number of actions to display (0 = unlimited)
    #[arg(short, long, default_value = "100")]
    limit: usize,

    /// Skip first N actions
    #[arg(long, default_value = "0")]
    skip: usize,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    /// Action kinds and counts
    Summary,
    /// One line per action
    List,
    /// Full JSON output
    Json,
}

impl Actions {
    pub fn execute(self) -> Result<()> {
        let data_dir = super::journal_dir(&self.journal)?;
        let journal: FileRepository<StoreAction> =
            FileRepository::open(&data_dir, JOURNAL_FILENAME)
                .with_context(|| format!("No journal in {}", data_dir.display()))?;
        let (actions, end) = journal.read_all()?;

        println!("{} {}", style("Journal:").bold().cyan(), journal.path().display());
        println!("{} {}", style("Total Actions:").bold().cyan(), actions.len());
        if end < journal.size() {
            println!(
                "{} {} trailing bytes",
                style("Torn tail:").bold().yellow(),
                journal.size() - end
            );
        }
        println!();

        let limit = if self.limit == 0 {
            usize::MAX
        } else {
            self.limit
        };
        let shown: Vec<(usize, &StoreAction)> = actions
            .iter()
            .enumerate()
            .skip(self.skip)
            .take(limit)
            .collect();

        match self.format {
            OutputFormat::Summary => print_summary(&actions),
            OutputFormat::List => print_list(&shown),
            OutputFormat::Json => {
                let values: Vec<&StoreAction> = shown.iter().map(|(_, a)| *a).collect();
                println!("{}", serde_json::to_string_pretty(&values)?);
            }
        }
        Ok(())
    }
}

fn print_summary(actions: &[StoreAction]) {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for action in actions {
        *counts.entry(action.kind()).or_default() += 1;
    }

    println!("{}", style("Action Summary:").bold().green());
    for (kind, count) in &counts {
        println!("  {:<28} {}", kind, style(count).bold());
    }
    if let (Some(first), Some(last)) = (actions.first(), actions.last()) {
        println!();
        println!(
            "{} {} .. {}",
            style("Span:").bold().cyan(),
            first.now().to_rfc3339(),
            last.now().to_rfc3339()
        );
    }
}

fn print_list(actions: &[(usize, &StoreAction)]) {
    for (index, action) in actions {
        println!(
            "{:>6}  {}  {}",
            style(index).dim(),
            action.now().format("%Y-%m-%d %H:%M:%S"),
            style(action.kind()).bold()
        );
    }
}
