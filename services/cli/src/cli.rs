use crate::commands::{
    run_issue_report, run_issue_search, run_seed_destination, run_wiki_report, ReportArgs,
    SearchArgs, SeedArgs,
};
use clap::{Parser, Subcommand};
use ops_reports::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "ops-reports",
    about = "Publish scheduled wiki reports and issue digests, search the tracker and seed localization data",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish last month's app review and market share pages
    WikiReport(ReportArgs),
    /// Send the stale issue digest to chat and email
    IssueReport(ReportArgs),
    /// Search the issue tracker and optionally export the results
    IssueSearch(SearchArgs),
    /// Append a randomly named destination to a localization YAML file
    SeedDestination(SeedArgs),
}

pub(crate) fn run() -> Result<(), AppError> {
    match Cli::parse().command {
        Command::WikiReport(args) => run_wiki_report(args),
        Command::IssueReport(args) => run_issue_report(args),
        Command::IssueSearch(args) => run_issue_search(args),
        Command::SeedDestination(args) => run_seed_destination(args),
    }
}
