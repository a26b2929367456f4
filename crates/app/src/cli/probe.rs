use ka_agent::probe::EnvStatus;
use ka_agent::{run_probe, CheckOutcome, CheckResult, ProbeReport};
use ka_domain::config::Config;

/// Run the connectivity probe and print a summary.
///
/// Returns `true` when no check failed.
pub async fn run(config: &Config) -> bool {
    println!("kbagent probe");
    println!("=============\n");

    let report = run_probe(config).await;
    print_report(&report);

    let passed = report.all_passed();
    println!();
    if passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }
    passed
}

fn print_report(report: &ProbeReport) {
    print_check(&report.clients);
    for check in &report.checks {
        print_check(check);
    }

    println!("\n=== Environment Variables ===");
    for status in &report.env {
        println!("{}", env_line(status));
    }
}

// ── Formatting helpers ────────────────────────────────────────────────

fn print_check(check: &CheckResult) {
    println!("{}", check_line(check));
    for detail in &check.details {
        println!("      {detail}");
    }
}

fn check_line(check: &CheckResult) -> String {
    let (status, detail) = match &check.outcome {
        CheckOutcome::Passed(d) => ("PASS", d),
        CheckOutcome::Failed(d) => ("FAIL", d),
        CheckOutcome::Skipped(d) => ("SKIP", d),
    };
    format!("  [{status}] {}: {detail}", check.name)
}

fn env_line(status: &EnvStatus) -> String {
    let state = if status.set { "Set" } else { "Not set" };
    format!("{}: {state}", status.name)
}
