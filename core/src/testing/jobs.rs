use super::{failure::CheckResult, session::Session};
use crate::{config::JobsConfig, fail};

/// Asks the candidate (through its own prompt) for the scheduling state of `process`.
///
/// The session must be sitting at a prompt; on success it is again.
pub async fn query_job_status(
    session: &mut Session,
    jobs: &JobsConfig,
    process: &str,
) -> CheckResult<String> {
    session.send_line(&jobs.ps_command).await?;
    session.expect("$").await?;
    let listing = session.before().to_owned();

    match find_status_token(&listing, process, jobs.status_column) {
        Some(status) => {
            log::debug!("'{}' has status {}", process, status);
            Ok(status.to_owned())
        }
        None => fail!("`{}` not found in background.", process),
    }
}

/// Status column of the first listing line mentioning `process`.
pub fn find_status_token<'a>(listing: &'a str, process: &str, column: usize) -> Option<&'a str> {
    listing
        .lines()
        .find(|line| line.contains(process))
        .and_then(|line| line.split_whitespace().nth(column))
}
