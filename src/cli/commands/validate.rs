use anyhow::Result;
use clap::Args;

use crate::cli::output;
use crate::services::diagnostics::{run_suites, DiagnosticSuite};
use crate::state::AppState;

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// database, settings, cache, mail, backups, jobs, permissions or all
    #[arg(default_value = "all", value_parser = parse_suites)]
    pub suite: SuiteSelection,
}

/// Suites named on the command line, `all` already expanded
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteSelection(pub Vec<DiagnosticSuite>);

fn parse_suites(s: &str) -> Result<SuiteSelection, String> {
    DiagnosticSuite::parse_selection(s).map(SuiteSelection).ok_or_else(|| {
        let known: Vec<&str> = DiagnosticSuite::all().iter().map(|s| s.as_str()).collect();
        format!("unknown suite '{}' (expected all, {})", s, known.join(", "))
    })
}

pub async fn run(state: &AppState, args: ValidateArgs) -> Result<()> {
    let suites = run_suites(state, &args.suite.0).await;

    let mut failed = 0;
    for suite in &suites {
        println!("{}", suite.render_table());
        failed += suite.failed;
    }

    let total: usize = suites.iter().map(|s| s.passed + s.failed).sum();
    if failed > 0 {
        anyhow::bail!("{} of {} check(s) failed", failed, total);
    }
    output::success(format!("All {} check(s) passed", total));
    Ok(())
}
