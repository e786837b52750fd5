use chrono::Local;
use clap::Args;
use ops_reports::config::{
    load_json, IssueReportConfig, RuntimeConfig, SearchConfig, WikiReportConfig,
};
use ops_reports::error::AppError;
use ops_reports::pipeline::StageOutcome;
use ops_reports::telemetry;
use ops_reports::workflows::issue_search::{
    self, export_rows, render_table, SearchOptions, DEFAULT_MAX_RESULTS, DEFAULT_OUTPUT_NAME,
};
use ops_reports::workflows::localization::{self, NameAlphabet, SeedOptions, DEFAULT_NAME_LENGTH};
use ops_reports::workflows::wiki_report::{self, ReportContext};
use ops_reports::workflows::issue_report;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug)]
pub(crate) struct ReportArgs {
    /// JSON configuration file (defaults to OPS_REPORTS_CONFIG, then a file in the working directory)
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// Directory for temporary CSV exports
    #[arg(long, default_value = ".")]
    pub(crate) export_dir: PathBuf,
}

#[derive(Args, Debug)]
pub(crate) struct SearchArgs {
    /// JSON configuration file holding the tracker connection
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// Query to run; prompts on stdin when omitted
    #[arg(long)]
    pub(crate) query: Option<String>,
    /// Maximum number of issues to fetch (default 1000)
    #[arg(long)]
    pub(crate) max_results: Option<usize>,
    /// Export the results to CSV
    #[arg(long)]
    pub(crate) export: bool,
    /// Export file name (default jira_issues.csv)
    #[arg(long)]
    pub(crate) output: Option<String>,
    /// Directory the export is written to
    #[arg(long, default_value = ".")]
    pub(crate) export_dir: PathBuf,
}

#[derive(Args, Debug)]
pub(crate) struct SeedArgs {
    /// Existing YAML document
    #[arg(long)]
    pub(crate) input: PathBuf,
    /// Where the updated document is written
    #[arg(long)]
    pub(crate) output: PathBuf,
    /// Number of random characters in the generated name
    #[arg(long, default_value_t = DEFAULT_NAME_LENGTH)]
    pub(crate) length: usize,
    /// Fixed prefix placed before the random characters
    #[arg(long, default_value = "")]
    pub(crate) prefix: String,
    /// Leave Hangul syllables out of the name
    #[arg(long)]
    pub(crate) no_hangul: bool,
    /// Leave Hiragana and Katakana out of the name
    #[arg(long)]
    pub(crate) no_kana: bool,
    /// Leave digits out of the name
    #[arg(long)]
    pub(crate) no_digits: bool,
    /// Leave ASCII punctuation out of the name
    #[arg(long)]
    pub(crate) no_punctuation: bool,
}

fn bootstrap() -> Result<RuntimeConfig, AppError> {
    let runtime = RuntimeConfig::load();
    telemetry::init(&runtime.telemetry)?;
    info!(environment = ?runtime.environment, "runtime configured");
    Ok(runtime)
}

pub(crate) fn run_wiki_report(args: ReportArgs) -> Result<(), AppError> {
    let runtime = bootstrap()?;
    let path = runtime.resolve_config_path(args.config, "wiki_report_config.json");
    let config: WikiReportConfig = load_json(&path)?;

    let context = ReportContext::for_run(Local::now().naive_local(), args.export_dir);
    let summary = wiki_report::run(&config, &context)?;

    let mut published = 0;
    for outcome in std::iter::once(&summary.reviews).chain(summary.market_share.as_ref()) {
        let page = match &outcome.publication.page {
            StageOutcome::Data(handle) => {
                published += 1;
                format!("page {}", handle.id)
            }
            other => other.label().to_string(),
        };
        println!(
            "{}: {} rows, {}, attachment {}",
            outcome.title,
            outcome.total_count,
            page,
            outcome.publication.attachment.label()
        );
        if let Some(kept) = &outcome.publication.kept_export {
            println!("  export kept at {}", kept.display());
        }
    }

    if published == 0 {
        return Err(AppError::Undelivered("wiki report".to_string()));
    }
    Ok(())
}

pub(crate) fn run_issue_report(args: ReportArgs) -> Result<(), AppError> {
    let runtime = bootstrap()?;
    let path = runtime.resolve_config_path(args.config, "issue_report_config.json");
    let config: IssueReportConfig = load_json(&path)?;

    let outcome = issue_report::run(&config, Local::now().naive_local(), &args.export_dir)?;
    for bucket in &outcome.buckets {
        println!(
            "{}: {} issues (search {}, chat {})",
            bucket.title,
            bucket.total_count,
            bucket.collection,
            bucket.chat.label()
        );
    }
    println!(
        "total {} issues, mail {}, reminders posted {}",
        outcome.total_count,
        outcome.mail.label(),
        outcome.comments_posted
    );

    if !outcome.delivered_anywhere() {
        return Err(AppError::Undelivered("issue digest".to_string()));
    }
    Ok(())
}

fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W, label: &str) -> io::Result<String> {
    write!(output, "{label}")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Query and result cap read interactively. A non-numeric cap falls back to
/// the default.
pub(crate) fn prompt_search_options<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> io::Result<SearchOptions> {
    writeln!(output, "Issue tracker query search")?;
    writeln!(output, "Example: project = QA AND status = \"In Progress\" ORDER BY created DESC")?;
    writeln!(output, "Assignee and reporter terms must use account ids.\n")?;

    let query = prompt(input, output, "Query: ")?;
    if query.is_empty() {
        return Ok(SearchOptions::default());
    }
    let max_results = prompt(input, output, &format!("Maximum issues to fetch (default {DEFAULT_MAX_RESULTS}): "))?
        .parse::<usize>()
        .ok()
        .filter(|max| *max > 0)
        .unwrap_or(DEFAULT_MAX_RESULTS);

    Ok(SearchOptions {
        query,
        max_results,
        ..SearchOptions::default()
    })
}

/// Export decision asked after the results are shown. `None` means no export.
pub(crate) fn prompt_export<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> io::Result<Option<String>> {
    let answer = prompt(input, output, "\nSave as CSV? (y/N): ")?;
    if !answer.eq_ignore_ascii_case("y") {
        return Ok(None);
    }
    let name = prompt(input, output, &format!("File name (default {DEFAULT_OUTPUT_NAME}): "))?;
    Ok(Some(if name.is_empty() {
        DEFAULT_OUTPUT_NAME.to_string()
    } else {
        name
    }))
}

pub(crate) fn run_issue_search(args: SearchArgs) -> Result<(), AppError> {
    let runtime = bootstrap()?;
    let path = runtime.resolve_config_path(args.config, "search_config.json");
    let config: SearchConfig = load_json(&path)?;

    let interactive = args.query.is_none();
    let options = match args.query {
        Some(query) => SearchOptions {
            query,
            max_results: args.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
            export: args.export,
            output_name: args.output.unwrap_or_else(|| DEFAULT_OUTPUT_NAME.to_string()),
        },
        None => {
            let stdin = io::stdin();
            prompt_search_options(&mut stdin.lock(), &mut io::stdout())?
        }
    };

    let result = issue_search::run(&config, &options, &args.export_dir)?;
    print!("{}", render_table(&result.rows));
    if result.truncated {
        println!("(stopped at {} issues)", options.max_results);
    }

    let exported = if interactive {
        let stdin = io::stdin();
        match prompt_export(&mut stdin.lock(), &mut io::stdout())? {
            Some(name) => export_rows(&result.rows, &args.export_dir, &name)?,
            None => None,
        }
    } else {
        result.export
    };
    if let Some(path) = exported {
        println!("CSV saved: {}", path.display());
    }
    Ok(())
}

pub(crate) fn run_seed_destination(args: SeedArgs) -> Result<(), AppError> {
    bootstrap()?;
    let options = SeedOptions {
        input: args.input,
        output: args.output,
        length: args.length,
        prefix: args.prefix,
        alphabet: NameAlphabet {
            hangul: !args.no_hangul,
            kana: !args.no_kana,
            digits: !args.no_digits,
            punctuation: !args.no_punctuation,
        },
    };
    let seeded = localization::run(&options)?;
    println!("{} {}", seeded.name, seeded.kind);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn prompts_fill_options_with_defaults() {
        let mut input = Cursor::new("project = QA\nabc\n");
        let mut output = Vec::new();
        let options = prompt_search_options(&mut input, &mut output).expect("prompts");
        assert_eq!(options.query, "project = QA");
        assert_eq!(options.max_results, DEFAULT_MAX_RESULTS);
        assert!(!options.export);
        assert!(String::from_utf8(output).expect("utf8").contains("Query: "));
    }

    #[test]
    fn blank_query_leaves_options_empty() {
        let mut input = Cursor::new("\n");
        let options = prompt_search_options(&mut input, &mut Vec::new()).expect("prompts");
        assert!(options.query.is_empty());
    }

    #[test]
    fn export_prompt_defaults_file_name() {
        let mut input = Cursor::new("Y\n\n");
        assert_eq!(
            prompt_export(&mut input, &mut Vec::new()).expect("prompts"),
            Some(DEFAULT_OUTPUT_NAME.to_string())
        );
        let mut declined = Cursor::new("n\n");
        assert_eq!(prompt_export(&mut declined, &mut Vec::new()).expect("prompts"), None);
    }
}
