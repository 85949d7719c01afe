//! Notarization of a published package with `notarytool`.
//!
//! The flow is an explicit state machine:
//!
//! ```text
//! NotStarted -> Submitted -> Polling -> Accepted -> Stapling -> Stapled
//!                               |          |                 \-> StapleFailed
//!                               |          \-> (stapling skipped)
//!                               \-> Invalid | Rejected | TimedOut
//! ```
//!
//! Polling starts immediately after the upload. Every `In Progress` answer
//! is followed by a sleep that grows by five seconds each time, clamped so
//! the accumulated wait never passes `staple_timeout`. Time is read from an
//! injected [`Clock`] so the schedule can be tested without waiting.

use crate::bundler::{
    builder::tools,
    error::{NotarizationError, StapleError},
    process::{CommandSpec, ProcessOutput, ProcessRunner},
    settings::NotarizationInfo,
};
use serde::{Deserialize, de::DeserializeOwned};
use std::{
    io::Cursor,
    path::Path,
    time::{Duration, Instant},
};

/// Growth step of the polling interval.
pub const POLL_INTERVAL_STEP: Duration = Duration::from_secs(5);

/// Time source for the polling loop.
#[allow(async_fn_in_trait)]
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Suspends for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How `notarytool` authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum NotaryAuth {
    /// Apple ID with an app-specific password.
    Password {
        /// Apple ID.
        apple_id: String,
        /// Developer team.
        team_id: String,
        /// App-specific password.
        password: String,
    },
    /// App Store Connect API key.
    ApiKey {
        /// Path of the `.p8` private key.
        key_path: String,
        /// Key ID.
        key_id: String,
        /// Issuer UUID.
        issuer: String,
    },
    /// Credentials stored with `notarytool store-credentials`.
    KeychainProfile(String),
}

impl std::fmt::Debug for NotaryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotaryAuth::Password {
                apple_id, team_id, ..
            } => f
                .debug_struct("Password")
                .field("apple_id", apple_id)
                .field("team_id", team_id)
                .field("password", &"<redacted>")
                .finish(),
            NotaryAuth::ApiKey {
                key_path,
                key_id,
                issuer,
            } => f
                .debug_struct("ApiKey")
                .field("key_path", key_path)
                .field("key_id", key_id)
                .field("issuer", issuer)
                .finish(),
            NotaryAuth::KeychainProfile(profile) => {
                f.debug_tuple("KeychainProfile").field(profile).finish()
            }
        }
    }
}

impl NotaryAuth {
    /// Picks credentials from the build settings.
    ///
    /// A complete password triple wins, then a complete API key, then a
    /// keychain profile. `team_id` falls back to `asc_provider`.
    pub fn from_info(info: &NotarizationInfo) -> Result<Self, NotarizationError> {
        let team_id = info.team_id.as_ref().or(info.asc_provider.as_ref());
        if let (Some(password), Some(apple_id), Some(team_id)) =
            (&info.password, &info.apple_id, team_id)
        {
            return Ok(NotaryAuth::Password {
                apple_id: apple_id.clone(),
                team_id: team_id.clone(),
                password: password.clone(),
            });
        }

        if let (Some(key_id), Some(key_path), Some(issuer)) =
            (&info.api_key, &info.api_key_path, &info.api_issuer)
        {
            return Ok(NotaryAuth::ApiKey {
                key_path: key_path.clone(),
                key_id: key_id.clone(),
                issuer: issuer.clone(),
            });
        }

        let partial_api_key =
            info.api_key.is_some() || info.api_key_path.is_some() || info.api_issuer.is_some();
        if let Some(profile) = &info.keychain_profile {
            if info.password.is_some() || partial_api_key {
                log::warn!(
                    "incomplete notarization password or API key settings; using keychain_profile instead"
                );
            }
            return Ok(NotaryAuth::KeychainProfile(profile.clone()));
        }

        let reason = if info.password.is_some() {
            "password requires apple_id and team_id (or asc_provider)"
        } else if partial_api_key {
            "an API key requires api_key, api_key_path and api_issuer"
        } else {
            "one of password (with apple_id and team_id), api_key (with api_key_path and api_issuer) or keychain_profile is required"
        };
        Err(NotarizationError::MissingCredentials(reason.to_string()))
    }

    fn args(&self) -> Vec<String> {
        match self {
            NotaryAuth::Password {
                apple_id,
                team_id,
                password,
            } => vec![
                "--apple-id".into(),
                apple_id.clone(),
                "--team-id".into(),
                team_id.clone(),
                "--password".into(),
                password.clone(),
            ],
            NotaryAuth::ApiKey {
                key_path,
                key_id,
                issuer,
            } => vec![
                "--key".into(),
                key_path.clone(),
                "--key-id".into(),
                key_id.clone(),
                "--issuer".into(),
                issuer.clone(),
            ],
            NotaryAuth::KeychainProfile(profile) => {
                vec!["--keychain-profile".into(), profile.clone()]
            }
        }
    }
}

/// Status reported by the notary service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    /// Still being processed.
    InProgress,
    /// Notarized.
    Accepted,
    /// Processed and found to have issues.
    Invalid,
    /// Refused outright.
    Rejected,
}

impl SubmissionStatus {
    /// Parses the status string `notarytool` prints.
    pub fn parse(status: &str) -> Option<Self> {
        match status.trim() {
            "In Progress" => Some(SubmissionStatus::InProgress),
            "Accepted" => Some(SubmissionStatus::Accepted),
            "Invalid" => Some(SubmissionStatus::Invalid),
            "Rejected" => Some(SubmissionStatus::Rejected),
            _ => None,
        }
    }

    /// Status as the service spells it.
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::InProgress => "In Progress",
            SubmissionStatus::Accepted => "Accepted",
            SubmissionStatus::Invalid => "Invalid",
            SubmissionStatus::Rejected => "Rejected",
        }
    }
}

/// One upload to the notary service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotarizationSubmission {
    /// Identifier returned by `notarytool submit`.
    pub submission_id: String,
    /// Last known status.
    pub status: SubmissionStatus,
    /// When the upload finished; polling is timed from here.
    pub submitted_at: Instant,
    /// When the status was last queried.
    pub last_polled_at: Option<Instant>,
    /// `In Progress` answers seen so far.
    pub in_progress_polls: u32,
}

/// Position in the notarization flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotarizationState {
    /// Nothing submitted. Also the state of a skipped or misconfigured run.
    NotStarted,
    /// Uploaded, not yet queried.
    Submitted(NotarizationSubmission),
    /// Waiting for the service.
    Polling(NotarizationSubmission),
    /// Notarized.
    Accepted(NotarizationSubmission),
    /// Service found issues.
    Invalid {
        /// Submission.
        submission_id: String,
        /// Service log or status message.
        detail: String,
    },
    /// Service refused the package.
    Rejected {
        /// Submission.
        submission_id: String,
        /// Service log or status message.
        detail: String,
    },
    /// Still in progress when the wait budget ran out.
    TimedOut {
        /// Submission, which may still complete remotely.
        submission_id: String,
        /// Accumulated wait.
        waited: Duration,
    },
    /// Attaching the ticket.
    Stapling(NotarizationSubmission),
    /// Ticket attached.
    Stapled(NotarizationSubmission),
    /// Notarized, but the ticket could not be attached.
    StapleFailed {
        /// Submission.
        submission: NotarizationSubmission,
        /// Stapler diagnostics.
        error: StapleError,
    },
}

impl NotarizationState {
    /// Short name for logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            NotarizationState::NotStarted => "not started",
            NotarizationState::Submitted(_) => "submitted",
            NotarizationState::Polling(_) => "polling",
            NotarizationState::Accepted(_) => "accepted",
            NotarizationState::Invalid { .. } => "invalid",
            NotarizationState::Rejected { .. } => "rejected",
            NotarizationState::TimedOut { .. } => "timed out",
            NotarizationState::Stapling(_) => "stapling",
            NotarizationState::Stapled(_) => "stapled",
            NotarizationState::StapleFailed { .. } => "staple failed",
        }
    }

    /// Whether the package ended up notarized.
    pub fn is_notarized(&self) -> bool {
        matches!(
            self,
            NotarizationState::Accepted(_)
                | NotarizationState::Stapled(_)
                | NotarizationState::StapleFailed { .. }
        )
    }

    /// Terminal state corresponding to a failed run.
    pub fn from_failure(error: &NotarizationError) -> Self {
        match error {
            NotarizationError::Rejected {
                submission_id,
                status,
                detail,
            } if status == SubmissionStatus::Invalid.as_str() => NotarizationState::Invalid {
                submission_id: submission_id.clone(),
                detail: detail.clone(),
            },
            NotarizationError::Rejected {
                submission_id,
                detail,
                ..
            } => NotarizationState::Rejected {
                submission_id: submission_id.clone(),
                detail: detail.clone(),
            },
            NotarizationError::TimedOut {
                submission_id,
                waited,
            } => NotarizationState::TimedOut {
                submission_id: submission_id.clone(),
                waited: *waited,
            },
            _ => NotarizationState::NotStarted,
        }
    }
}

/// `xcrun notarytool submit`.
pub fn submit_command(package: &Path, auth: &NotaryAuth) -> CommandSpec {
    CommandSpec::new(tools::XCRUN)
        .args(["notarytool", "submit"])
        .path_arg(package)
        .args(["--output-format", "plist"])
        .args(auth.args())
}

/// `xcrun notarytool info`.
pub fn info_command(submission_id: &str, auth: &NotaryAuth) -> CommandSpec {
    CommandSpec::new(tools::XCRUN)
        .args(["notarytool", "info", submission_id])
        .args(["--output-format", "plist"])
        .args(auth.args())
}

/// `xcrun notarytool log`, which prints the service's JSON report.
pub fn log_command(submission_id: &str, auth: &NotaryAuth) -> CommandSpec {
    CommandSpec::new(tools::XCRUN)
        .args(["notarytool", "log", submission_id])
        .args(auth.args())
}

/// `xcrun stapler staple`.
pub fn staple_command(package: &Path) -> CommandSpec {
    CommandSpec::new(tools::XCRUN)
        .args(["stapler", "staple"])
        .path_arg(package)
}

/// Drives the notarization state machine for one package.
#[derive(Debug)]
pub struct NotarizationCoordinator<'a, R, C> {
    runner: &'a R,
    clock: &'a C,
    info: &'a NotarizationInfo,
    skip_stapling: bool,
}

impl<'a, R: ProcessRunner, C: Clock> NotarizationCoordinator<'a, R, C> {
    /// Creates a coordinator using `info` for credentials and timeout.
    pub fn new(runner: &'a R, clock: &'a C, info: &'a NotarizationInfo) -> Self {
        Self {
            runner,
            clock,
            info,
            skip_stapling: false,
        }
    }

    /// Stop at `Accepted` instead of stapling.
    pub fn skip_stapling(mut self, skip: bool) -> Self {
        self.skip_stapling = skip;
        self
    }

    /// Runs until a terminal state.
    ///
    /// Returns `Accepted`, `Stapled` or `StapleFailed`; every other outcome
    /// is an error.
    pub async fn run(&self, package: &Path) -> Result<NotarizationState, NotarizationError> {
        let auth = NotaryAuth::from_info(self.info)?;
        if let Some(bundle_id) = &self.info.primary_bundle_id {
            log::debug!("primary_bundle_id {} is not used by notarytool", bundle_id);
        }

        let mut state = NotarizationState::NotStarted;
        loop {
            state = self.advance(state, package, &auth).await?;
            log::debug!("Notarization state: {}", state.name());

            match state {
                NotarizationState::Accepted(_) if self.skip_stapling => return Ok(state),
                NotarizationState::Stapled(_) | NotarizationState::StapleFailed { .. } => {
                    return Ok(state);
                }
                NotarizationState::Invalid {
                    submission_id,
                    detail,
                } => {
                    return Err(NotarizationError::Rejected {
                        submission_id,
                        status: SubmissionStatus::Invalid.as_str().to_string(),
                        detail,
                    });
                }
                NotarizationState::Rejected {
                    submission_id,
                    detail,
                } => {
                    return Err(NotarizationError::Rejected {
                        submission_id,
                        status: SubmissionStatus::Rejected.as_str().to_string(),
                        detail,
                    });
                }
                NotarizationState::TimedOut {
                    submission_id,
                    waited,
                } => {
                    return Err(NotarizationError::TimedOut {
                        submission_id,
                        waited,
                    });
                }
                other => state = other,
            }
        }
    }

    /// Performs one transition.
    async fn advance(
        &self,
        state: NotarizationState,
        package: &Path,
        auth: &NotaryAuth,
    ) -> Result<NotarizationState, NotarizationError> {
        Ok(match state {
            NotarizationState::NotStarted => {
                NotarizationState::Submitted(self.submit(package, auth).await?)
            }
            NotarizationState::Submitted(submission) => {
                log::info!("Waiting for submission {}", submission.submission_id);
                NotarizationState::Polling(submission)
            }
            NotarizationState::Polling(submission) => self.poll(submission, auth).await,
            NotarizationState::Accepted(submission) => NotarizationState::Stapling(submission),
            NotarizationState::Stapling(submission) => self.staple(submission, package).await,
            terminal => terminal,
        })
    }

    async fn submit(
        &self,
        package: &Path,
        auth: &NotaryAuth,
    ) -> Result<NotarizationSubmission, NotarizationError> {
        log::info!("Uploading {} for notarization", package.display());
        let command = submit_command(package, auth);
        let output = self
            .runner
            .run(&command)
            .await
            .map_err(|e| NotarizationError::Process(Box::new(e)))?;
        if !output.success() {
            return Err(NotarizationError::Submission(output.diagnostics()));
        }

        let SubmitResponse { id: submission_id } = parse_response(&output).ok_or_else(|| {
            NotarizationError::UnexpectedOutput(format!(
                "no submission id in notarytool submit output: {}",
                output.stdout.trim()
            ))
        })?;
        log::info!("✓ Uploaded, submission id {}", submission_id);

        Ok(NotarizationSubmission {
            submission_id,
            status: SubmissionStatus::InProgress,
            submitted_at: self.clock.now(),
            last_polled_at: None,
            in_progress_polls: 0,
        })
    }

    /// Queries the status once and sleeps if the service is still working.
    async fn poll(
        &self,
        mut submission: NotarizationSubmission,
        auth: &NotaryAuth,
    ) -> NotarizationState {
        let (status, message) = self.query_status(&submission.submission_id, auth).await;
        submission.status = status;
        submission.last_polled_at = Some(self.clock.now());

        match status {
            SubmissionStatus::Accepted => {
                log::info!("✓ Notarization accepted");
                NotarizationState::Accepted(submission)
            }
            SubmissionStatus::Invalid | SubmissionStatus::Rejected => {
                let detail = self
                    .fetch_log(&submission.submission_id, auth)
                    .await
                    .or(message)
                    .unwrap_or_else(|| status.as_str().to_string());
                let submission_id = submission.submission_id;
                if status == SubmissionStatus::Invalid {
                    NotarizationState::Invalid {
                        submission_id,
                        detail,
                    }
                } else {
                    NotarizationState::Rejected {
                        submission_id,
                        detail,
                    }
                }
            }
            SubmissionStatus::InProgress => {
                let timeout = self.info.staple_timeout;
                let waited = self.clock.now().saturating_duration_since(submission.submitted_at);
                if waited >= timeout {
                    return NotarizationState::TimedOut {
                        submission_id: submission.submission_id,
                        waited,
                    };
                }

                submission.in_progress_polls += 1;
                let interval = POLL_INTERVAL_STEP * submission.in_progress_polls;
                let sleep = interval.min(timeout - waited);
                log::info!(
                    "Notarization in progress, checking again in {}s",
                    sleep.as_secs()
                );
                self.clock.sleep(sleep).await;
                NotarizationState::Polling(submission)
            }
        }
    }

    /// Status and message of a submission. Any failure reads as in progress.
    async fn query_status(
        &self,
        submission_id: &str,
        auth: &NotaryAuth,
    ) -> (SubmissionStatus, Option<String>) {
        let command = info_command(submission_id, auth);
        let output = match self.runner.run(&command).await {
            Ok(output) if output.success() => output,
            Ok(output) => {
                log::warn!("notarytool info failed: {}", output.diagnostics());
                return (SubmissionStatus::InProgress, None);
            }
            Err(e) => {
                log::warn!("notarytool info failed: {}", e);
                return (SubmissionStatus::InProgress, None);
            }
        };

        let response: Option<InfoResponse> = parse_response(&output);
        match response.and_then(|r| Some((SubmissionStatus::parse(&r.status)?, r.message))) {
            Some((status, message)) => (status, message),
            None => {
                log::warn!("could not read notarization status: {}", output.stdout.trim());
                (SubmissionStatus::InProgress, None)
            }
        }
    }

    async fn fetch_log(&self, submission_id: &str, auth: &NotaryAuth) -> Option<String> {
        let command = log_command(submission_id, auth);
        match self.runner.run(&command).await {
            Ok(output) if output.success() && !output.stdout.trim().is_empty() => {
                Some(output.stdout)
            }
            Ok(output) => {
                log::debug!("notarytool log failed: {}", output.diagnostics());
                None
            }
            Err(e) => {
                log::debug!("notarytool log failed: {}", e);
                None
            }
        }
    }

    async fn staple(
        &self,
        submission: NotarizationSubmission,
        package: &Path,
    ) -> NotarizationState {
        log::info!("Stapling notarization ticket to {}", package.display());
        let command = staple_command(package);
        let failure = match self.runner.run(&command).await {
            Ok(output) if output.success() => {
                log::info!("✓ Stapled");
                return NotarizationState::Stapled(submission);
            }
            Ok(output) => output.diagnostics(),
            Err(e) => e.to_string(),
        };
        let error = StapleError { output: failure };
        log::debug!("{}", error);
        NotarizationState::StapleFailed { submission, error }
    }
}

/// `notarytool submit --output-format plist`
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

/// `notarytool info --output-format plist`
#[derive(Debug, Deserialize)]
struct InfoResponse {
    status: String,
    message: Option<String>,
}

/// Decodes a plist printed on stdout.
fn parse_response<T: DeserializeOwned>(output: &ProcessOutput) -> Option<T> {
    match plist::from_reader(Cursor::new(output.stdout.as_bytes())) {
        Ok(response) => Some(response),
        Err(e) => {
            log::debug!("unreadable notarytool output: {}", e);
            None
        }
    }
}
