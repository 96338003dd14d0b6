// Uploader: health check, PUT with fixed-delay retries, and deletion of
// pipelines or enrich policies. Every network call is blocking and
// sequential; the caller decides what a failure means for the process.

use crate::api::{ApiError, ApiRequest, ApiResponse, ClusterTransport, ResourceKind, StatusClass, HEALTH_PATH};
use crate::config::Settings;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Method;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid file pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("cluster health check failed with status code {status}")]
    Unhealthy { status: u16 },
    #[error("error uploading {file_name}: status code {status}")]
    FatalStatus {
        file_name: String,
        status: u16,
        attempts: u32,
    },
    #[error("error uploading {file_name}: gave up after {attempts} attempts")]
    RetriesExhausted {
        file_name: String,
        attempts: u32,
        last_status: Option<u16>,
    },
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Fixed-delay retry bound. At least one attempt is always made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        RetryPolicy {
            max_attempts: settings.retry_bound.max(1),
            delay: settings.retry_delay,
        }
    }
}

/// A file read from disk and the resource it is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub file_name: String,
    pub kind: ResourceKind,
    pub body: Vec<u8>,
}

impl UploadJob {
    pub fn new(file_name: impl Into<String>, body: Vec<u8>) -> Self {
        let file_name = file_name.into();
        UploadJob {
            kind: ResourceKind::for_upload(&file_name),
            file_name,
            body,
        }
    }

    /// Read `dir/file_name` in full. Contents are not inspected.
    pub fn read(dir: &Path, file_name: &str) -> Result<Self, UploadError> {
        let path = dir.join(file_name);
        let body = std::fs::read(&path).map_err(|source| UploadError::Read { path, source })?;
        Ok(UploadJob::new(file_name, body))
    }

    pub fn path(&self) -> String {
        self.kind.path(&self.file_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub file_name: String,
    pub succeeded: bool,
    pub last_status: Option<u16>,
    pub attempts_used: u32,
}

/// Names of regular files in `dir` matching `pattern`, sorted.
pub fn discover(dir: &Path, pattern: &str) -> Result<Vec<String>, UploadError> {
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        pattern
    );
    let paths = glob::glob(&full).map_err(|source| UploadError::Pattern {
        pattern: full.clone(),
        source,
    })?;

    let mut names = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "skipping unreadable entry"),
        }
    }
    names.sort();
    Ok(names)
}

/// Runs the admin requests against one cluster through a transport.
pub struct Uploader<T> {
    transport: T,
    retry: RetryPolicy,
    check_timeout: Duration,
    upload_timeout: Duration,
    show_progress: bool,
    pause: Box<dyn Fn(Duration)>,
}

impl<T: ClusterTransport> Uploader<T> {
    pub fn new(transport: T, settings: &Settings) -> Self {
        Uploader {
            transport,
            retry: RetryPolicy::from_settings(settings),
            check_timeout: settings.check_timeout,
            upload_timeout: settings.upload_timeout,
            show_progress: false,
            pause: Box::new(std::thread::sleep),
        }
    }

    /// Show a spinner while each upload is in flight.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Replace how the retry delay is waited out.
    pub fn with_pause<F>(mut self, pause: F) -> Self
    where
        F: Fn(Duration) + 'static,
    {
        self.pause = Box::new(pause);
        self
    }

    /// Absolute URL of a resource path on this cluster.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.transport.base_url(), path)
    }

    /// GET the index listing. Any 2xx passes; a 400..=500 response is
    /// printed and followed by the retry delay before failing.
    pub fn verify_connectivity(&self) -> Result<(), UploadError> {
        let response = self
            .transport
            .send(ApiRequest::new(Method::GET, HEALTH_PATH, self.check_timeout))?;
        if (200..300).contains(&response.status) {
            tracing::info!(status = response.status, "cluster reachable");
            return Ok(());
        }
        if StatusClass::of(response.status) == StatusClass::Retryable {
            print_error_body(&ProgressBar::hidden(), &response);
            (self.pause)(self.retry.delay);
        }
        Err(UploadError::Unhealthy {
            status: response.status,
        })
    }

    /// PUT the job's body until the cluster answers 200, a fatal status
    /// comes back, or the retry bound is used up. Transport failures count
    /// as a retryable attempt without a status code.
    pub fn upload(&self, job: &UploadJob) -> Result<UploadOutcome, UploadError> {
        let spinner = self.spinner(format!("Uploading {}...", job.file_name));
        let result = self.upload_attempts(job, &spinner);
        spinner.finish_and_clear();
        result
    }

    fn upload_attempts(&self, job: &UploadJob, spinner: &ProgressBar) -> Result<UploadOutcome, UploadError> {
        let path = job.path();
        let mut last_status = None;

        for attempt in 1..=self.retry.max_attempts {
            let request = ApiRequest::new(Method::PUT, path.as_str(), self.upload_timeout)
                .with_body(job.body.clone());
            match self.transport.send(request) {
                Ok(response) => {
                    last_status = Some(response.status);
                    match StatusClass::of(response.status) {
                        StatusClass::Success => {
                            tracing::info!(file = %job.file_name, attempt, "uploaded");
                            return Ok(UploadOutcome {
                                file_name: job.file_name.clone(),
                                succeeded: true,
                                last_status,
                                attempts_used: attempt,
                            });
                        }
                        StatusClass::Retryable => {
                            print_error_body(spinner, &response);
                            tracing::warn!(file = %job.file_name, attempt, status = response.status, "upload rejected");
                        }
                        StatusClass::Fatal => {
                            spinner.suspend(|| {
                                eprintln!(
                                    "Error uploading {} status code {}",
                                    job.file_name, response.status
                                )
                            });
                            return Err(UploadError::FatalStatus {
                                file_name: job.file_name.clone(),
                                status: response.status,
                                attempts: attempt,
                            });
                        }
                    }
                }
                Err(err) => {
                    spinner.suspend(|| println!("Error uploading {}: {}", job.file_name, err));
                    tracing::warn!(file = %job.file_name, attempt, error = %err, "upload request failed");
                }
            }
            if attempt < self.retry.max_attempts {
                (self.pause)(self.retry.delay);
            }
        }

        spinner.suspend(|| {
            eprintln!(
                "Error uploading {} after {} attempts",
                job.file_name, self.retry.max_attempts
            )
        });
        Err(UploadError::RetriesExhausted {
            file_name: job.file_name.clone(),
            attempts: self.retry.max_attempts,
            last_status,
        })
    }

    /// DELETE a pipeline, or an enrich policy when the name ends in
    /// "-policy". Stops on 200, 404 or a fatal status and returns the last
    /// status code; only transport failures are errors.
    pub fn delete_pipeline(&self, name: &str) -> Result<u16, UploadError> {
        let path = ResourceKind::for_delete(name).path(name);
        println!("deleting uri = {}", self.url_for(&path));

        let mut status = 0;
        for attempt in 1..=self.retry.max_attempts {
            let response = self
                .transport
                .send(ApiRequest::new(Method::DELETE, path.as_str(), self.check_timeout))?;
            status = response.status;
            if status == 404 || StatusClass::of(status) != StatusClass::Retryable {
                break;
            }
            print_error_body(&ProgressBar::hidden(), &response);
            tracing::warn!(name, attempt, status, "delete rejected");
            if attempt < self.retry.max_attempts {
                (self.pause)(self.retry.delay);
            }
        }
        Ok(status)
    }

    fn spinner(&self, message: String) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(message);
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    }
}

/// Prints with the spinner line cleared so the two never interleave.
fn print_error_body(spinner: &ProgressBar, response: &ApiResponse) {
    if let Some(reason) = response.error_reason() {
        tracing::warn!(status = response.status, %reason, "cluster returned an error");
    }
    spinner.suspend(|| println!("{}", response.display_body()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Replays canned statuses and records what was sent.
    struct Scripted {
        replies: RefCell<VecDeque<Result<u16, &'static str>>>,
        sent: RefCell<Vec<(Method, String)>>,
        timeouts: RefCell<Vec<(Method, Duration)>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<u16, &'static str>>) -> Self {
            Scripted {
                replies: RefCell::new(replies.into()),
                sent: RefCell::new(Vec::new()),
                timeouts: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.sent.borrow().len()
        }
    }

    impl ClusterTransport for Scripted {
        fn base_url(&self) -> &str {
            "http://es.test:9200"
        }

        fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
            self.timeouts
                .borrow_mut()
                .push((request.method.clone(), request.timeout));
            self.sent
                .borrow_mut()
                .push((request.method.clone(), request.path.clone()));
            match self.replies.borrow_mut().pop_front() {
                Some(Ok(status)) => Ok(ApiResponse {
                    status,
                    body: r#"{"error":{"type":"x","reason":"y"}}"#.into(),
                }),
                Some(Err(msg)) => Err(ApiError::Transport {
                    url: request.path,
                    source: msg.into(),
                }),
                None => panic!("unexpected request {} {}", request.method, request.path),
            }
        }
    }

    fn fast_settings() -> Settings {
        Settings {
            retry_delay: Duration::ZERO,
            ..Settings::default()
        }
    }

    /// Uploader whose pauses are recorded instead of slept.
    fn recording<'a>(
        transport: &'a Scripted,
        settings: &Settings,
    ) -> (Uploader<&'a Scripted>, Rc<RefCell<Vec<Duration>>>) {
        let pauses = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&pauses);
        let uploader = Uploader::new(transport, settings)
            .with_pause(move |d| seen.borrow_mut().push(d));
        (uploader, pauses)
    }

    fn job(name: &str) -> UploadJob {
        UploadJob::new(name, br#"{"processors":[]}"#.to_vec())
    }

    #[test]
    fn health_check_accepts_200() {
        let transport = Scripted::new(vec![Ok(200)]);
        let uploader = Uploader::new(&transport, &fast_settings());
        uploader.verify_connectivity().unwrap();
        assert_eq!(transport.sent.borrow()[0], (Method::GET, HEALTH_PATH.to_string()));
    }

    #[test]
    fn health_check_rejects_other_statuses() {
        for status in [401, 503, 302] {
            let transport = Scripted::new(vec![Ok(status)]);
            let uploader = Uploader::new(&transport, &fast_settings());
            match uploader.verify_connectivity() {
                Err(UploadError::Unhealthy { status: s }) => assert_eq!(s, status),
                other => panic!("expected unhealthy, got {other:?}"),
            }
        }
    }

    #[test]
    fn health_check_surfaces_transport_failure() {
        let transport = Scripted::new(vec![Err("connection refused")]);
        let uploader = Uploader::new(&transport, &fast_settings());
        assert!(matches!(uploader.verify_connectivity(), Err(UploadError::Api(_))));
    }

    #[test]
    fn succeeds_on_fourth_attempt_after_client_errors() {
        let transport = Scripted::new(vec![Ok(400), Ok(400), Ok(400), Ok(200)]);
        let uploader = Uploader::new(&transport, &fast_settings());
        let outcome = uploader.upload(&job("corelight_conn")).unwrap();
        assert_eq!(
            outcome,
            UploadOutcome {
                file_name: "corelight_conn".into(),
                succeeded: true,
                last_status: Some(200),
                attempts_used: 4,
            }
        );
        assert!(transport
            .sent
            .borrow()
            .iter()
            .all(|(m, p)| *m == Method::PUT && p == "/_ingest/pipeline/corelight_conn"));
    }

    #[test]
    fn gives_up_after_retry_bound() {
        let transport = Scripted::new(vec![Ok(500); 4]);
        let uploader = Uploader::new(&transport, &fast_settings());
        match uploader.upload(&job("template_corelight_conn")) {
            Err(UploadError::RetriesExhausted {
                attempts,
                last_status,
                ..
            }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last_status, Some(500));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(transport.calls(), 4);
        assert_eq!(transport.sent.borrow()[0].1, "/_template/template_corelight_conn");
    }

    #[test]
    fn fatal_status_stops_without_retry() {
        let transport = Scripted::new(vec![Ok(503)]);
        let uploader = Uploader::new(&transport, &fast_settings());
        match uploader.upload(&job("corelight_dns")) {
            Err(UploadError::FatalStatus { status, attempts, .. }) => {
                assert_eq!(status, 503);
                assert_eq!(attempts, 1);
            }
            other => panic!("expected fatal, got {other:?}"),
        }
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn redirect_is_fatal() {
        let transport = Scripted::new(vec![Ok(400), Ok(301)]);
        let uploader = Uploader::new(&transport, &fast_settings());
        assert!(matches!(
            uploader.upload(&job("corelight_http")),
            Err(UploadError::FatalStatus { status: 301, attempts: 2, .. })
        ));
    }

    #[test]
    fn transport_failures_are_retried() {
        let transport = Scripted::new(vec![Err("timed out"), Ok(200)]);
        let uploader = Uploader::new(&transport, &fast_settings());
        let outcome = uploader.upload(&job("corelight_ssl")).unwrap();
        assert_eq!(outcome.attempts_used, 2);
    }

    #[test]
    fn retry_bound_of_zero_still_attempts_once() {
        let settings = Settings {
            retry_bound: 0,
            ..fast_settings()
        };
        let transport = Scripted::new(vec![Ok(400)]);
        let uploader = Uploader::new(&transport, &settings);
        assert!(matches!(
            uploader.upload(&job("corelight_x")),
            Err(UploadError::RetriesExhausted { attempts: 1, .. })
        ));
    }

    #[test]
    fn delete_targets_policy_or_pipeline() {
        let transport = Scripted::new(vec![Ok(200), Ok(200)]);
        let uploader = Uploader::new(&transport, &fast_settings());
        assert_eq!(uploader.delete_pipeline("corelight-geo-policy").unwrap(), 200);
        assert_eq!(uploader.delete_pipeline("corelight_conn").unwrap(), 200);
        let sent = transport.sent.borrow();
        assert_eq!(sent[0], (Method::DELETE, "/_enrich/policy/corelight-geo-policy".to_string()));
        assert_eq!(sent[1], (Method::DELETE, "/_ingest/pipeline/corelight_conn".to_string()));
    }

    #[test]
    fn delete_returns_final_status_without_exiting() {
        let transport = Scripted::new(vec![Ok(404)]);
        let uploader = Uploader::new(&transport, &fast_settings());
        assert_eq!(uploader.delete_pipeline("corelight_missing").unwrap(), 404);

        let transport = Scripted::new(vec![Ok(500), Ok(500), Ok(500), Ok(500)]);
        let uploader = Uploader::new(&transport, &fast_settings());
        assert_eq!(uploader.delete_pipeline("corelight_busy").unwrap(), 500);
        assert_eq!(transport.calls(), 4);
    }

    #[test]
    fn discover_matches_files_only_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["corelight_b", "corelight_a", "template_corelight_a", "readme.md"] {
            std::fs::write(dir.path().join(name), b"{}").unwrap();
        }
        std::fs::create_dir(dir.path().join("corelight_dir")).unwrap();

        assert_eq!(
            discover(dir.path(), "corelight*").unwrap(),
            vec!["corelight_a".to_string(), "corelight_b".to_string()]
        );
        assert_eq!(
            discover(dir.path(), "template_corelight*").unwrap(),
            vec!["template_corelight_a".to_string()]
        );
    }

    #[test]
    fn job_reads_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("corelight_raw"), b"not json \xff").unwrap();
        let job = UploadJob::read(dir.path(), "corelight_raw").unwrap();
        assert_eq!(job.body, b"not json \xff");
        assert_eq!(job.kind, ResourceKind::IngestPipeline);

        assert!(matches!(
            UploadJob::read(dir.path(), "missing"),
            Err(UploadError::Read { .. })
        ));
    }

    #[test]
    fn requests_use_configured_timeouts() {
        let transport = Scripted::new(vec![Ok(200), Ok(400), Ok(200), Ok(200)]);
        let (uploader, _) = recording(&transport, &Settings::default());
        uploader.verify_connectivity().unwrap();
        uploader.upload(&job("corelight_conn")).unwrap();
        uploader.delete_pipeline("corelight_conn").unwrap();

        assert_eq!(
            *transport.timeouts.borrow(),
            vec![
                (Method::GET, Duration::from_secs(5)),
                (Method::PUT, Duration::from_secs(10)),
                (Method::PUT, Duration::from_secs(10)),
                (Method::DELETE, Duration::from_secs(5)),
            ]
        );
    }

    #[test]
    fn pauses_between_attempts_only() {
        let transport = Scripted::new(vec![Ok(500); 4]);
        let (uploader, pauses) = recording(&transport, &Settings::default());
        assert!(uploader.upload(&job("corelight_conn")).is_err());
        assert_eq!(*pauses.borrow(), vec![Duration::from_secs(5); 3]);
    }

    #[test]
    fn no_pause_after_success_or_fatal_status() {
        let transport = Scripted::new(vec![Ok(200), Ok(503)]);
        let (uploader, pauses) = recording(&transport, &Settings::default());
        uploader.upload(&job("corelight_a")).unwrap();
        assert!(uploader.upload(&job("corelight_b")).is_err());
        assert!(pauses.borrow().is_empty());
    }

    #[test]
    fn rejected_health_check_pauses_once() {
        let transport = Scripted::new(vec![Ok(401)]);
        let (uploader, pauses) = recording(&transport, &Settings::default());
        assert!(uploader.verify_connectivity().is_err());
        assert_eq!(*pauses.borrow(), vec![Duration::from_secs(5)]);

        let transport = Scripted::new(vec![Ok(503)]);
        let (uploader, pauses) = recording(&transport, &Settings::default());
        assert!(uploader.verify_connectivity().is_err());
        assert!(pauses.borrow().is_empty());
    }

    #[test]
    fn default_pause_really_sleeps() {
        let settings = Settings {
            retry_delay: Duration::from_millis(20),
            ..Settings::default()
        };
        let transport = Scripted::new(vec![Ok(500); 4]);
        let uploader = Uploader::new(&transport, &settings);
        let started = std::time::Instant::now();
        assert!(uploader.upload(&job("corelight_conn")).is_err());
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn urls_are_built_from_the_base_url() {
        let transport = Scripted::new(vec![]);
        let uploader = Uploader::new(&transport, &fast_settings());
        assert_eq!(
            uploader.url_for("/_ingest/pipeline/corelight_conn"),
            "http://es.test:9200/_ingest/pipeline/corelight_conn"
        );
    }

    #[test]
    fn spinner_is_hidden_unless_enabled() {
        let transport = Scripted::new(vec![Ok(400), Ok(200)]);
        let uploader = Uploader::new(&transport, &fast_settings());
        assert!(uploader.spinner("x".into()).is_hidden());

        let uploader = uploader.with_progress(true);
        let spinner = uploader.spinner("Uploading corelight_conn...".into());
        assert_eq!(spinner.message(), "Uploading corelight_conn...");
        spinner.finish_and_clear();

        // Retry output goes through the spinner without disturbing the result.
        assert_eq!(uploader.upload(&job("corelight_conn")).unwrap().attempts_used, 2);
    }
}
