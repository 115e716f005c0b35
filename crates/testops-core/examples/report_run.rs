use testops_core::ReporterFactory;
use testops_proto::{Status, Step, TestResult};

/// Reports a few results using `qase.config.json` and `QASE_*` variables
/// from the current directory, e.g. `QASE_MODE=report`.
fn main() -> anyhow::Result<()> {
    let mut reporter = ReporterFactory::create("cargo-example", "testops-core")?;

    println!("=== TestOps demo run ===\n");
    reporter.start_run();

    let mut login = TestResult::new("User can log in").with_suites(["Auth", "Login"]);
    login.steps.push(Step::new("Open login page").with_status(Status::Passed));
    login.steps.push(Step::new("Submit credentials").with_status(Status::Passed));
    login.execution.finish();
    reporter.add_result(login.with_status(Status::Passed));

    let mut logout = TestResult::new("User can log out").with_suites(["Auth"]);
    logout.message = Some("Session cookie was not cleared".to_string());
    logout.execution.finish();
    reporter.add_result(logout.with_status(Status::Failed));

    reporter.complete_run();

    match reporter.active_sink() {
        Some(sink) => println!("Results delivered through the {} sink", sink),
        None => println!("Reporting is disabled"),
    }
    Ok(())
}
