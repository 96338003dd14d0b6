// UI layer: collects the connection parameters interactively and drives
// the import run. Prompts go through the `Prompter` trait so the same
// flow works on a terminal (dialoguer) and on piped stdin.

use crate::api::{ClusterClient, ClusterEndpoint, ClusterTransport, Credentials, Scheme};
use crate::config::Settings;
use crate::upload::{discover, UploadJob, UploadOutcome, Uploader};
use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use std::io::{self, BufRead, Write};
use std::num::ParseIntError;

/// Source of answers for the interactive questions.
pub trait Prompter {
    /// Free text; an empty answer is allowed.
    fn text(&mut self, prompt: &str) -> io::Result<String>;
    /// Like `text` but not echoed where the input device allows it.
    fn secret(&mut self, prompt: &str) -> io::Result<String>;
    /// Asks until the answer parses as an integer.
    fn integer(&mut self, prompt: &str) -> io::Result<i64>;
    /// Asks until the answer is `y`, `n`, or empty with a default.
    fn confirm(&mut self, question: &str, default: Option<bool>) -> io::Result<bool>;
}

/// Interpret a yes/no answer. `None` means ask again.
pub fn parse_bool_answer(answer: &str, default: Option<bool>) -> Option<bool> {
    match answer.to_lowercase().as_str() {
        "" => default,
        "y" => Some(true),
        "n" => Some(false),
        _ => None,
    }
}

pub fn parse_int_answer(answer: &str) -> Result<i64, ParseIntError> {
    answer.trim().parse()
}

/// `[yn]`, `[Yn]` or `[yN]` depending on the default.
pub fn bool_hint(default: Option<bool>) -> &'static str {
    match default {
        None => "[yn]",
        Some(true) => "[Yn]",
        Some(false) => "[yN]",
    }
}

/// Prompter for an interactive terminal.
#[derive(Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    pub fn new() -> Self {
        TerminalPrompter
    }
}

impl Prompter for TerminalPrompter {
    fn text(&mut self, prompt: &str) -> io::Result<String> {
        Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
    }

    fn secret(&mut self, prompt: &str) -> io::Result<String> {
        Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
    }

    fn integer(&mut self, prompt: &str) -> io::Result<i64> {
        let answer = Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .validate_with(|s: &String| -> Result<(), String> {
                parse_int_answer(s)
                    .map(|_| ())
                    .map_err(|e| format!("Invalid response {e}"))
            })
            .interact_text()?;
        parse_int_answer(&answer).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn confirm(&mut self, question: &str, default: Option<bool>) -> io::Result<bool> {
        let answer = Input::<String>::new()
            .with_prompt(format!("{question} {}", bool_hint(default)))
            .allow_empty(true)
            .validate_with(move |s: &String| -> Result<(), &'static str> {
                parse_bool_answer(s, default)
                    .map(|_| ())
                    .ok_or("Invalid response")
            })
            .interact_text()?;
        parse_bool_answer(&answer, default)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "Invalid response"))
    }
}

/// Prompter reading one answer per line, for piped input. Running out of
/// input is an error rather than an endless re-prompt.
pub struct LinePrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        LinePrompter { input, output }
    }

    fn ask(&mut self, prompt: &str) -> io::Result<String> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input ended before all questions were answered",
            ));
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(line)
    }
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
    fn text(&mut self, prompt: &str) -> io::Result<String> {
        self.ask(&format!("{prompt}: "))
    }

    fn secret(&mut self, prompt: &str) -> io::Result<String> {
        self.ask(&format!("{prompt}: "))
    }

    fn integer(&mut self, prompt: &str) -> io::Result<i64> {
        loop {
            let answer = self.ask(&format!("{prompt}: "))?;
            match parse_int_answer(&answer) {
                Ok(value) => return Ok(value),
                Err(e) => writeln!(self.output, "Invalid response {e}")?,
            }
        }
    }

    fn confirm(&mut self, question: &str, default: Option<bool>) -> io::Result<bool> {
        loop {
            let answer = self.ask(&format!("{question} {}: ", bool_hint(default)))?;
            match parse_bool_answer(&answer, default) {
                Some(value) => return Ok(value),
                None => writeln!(self.output, "Invalid response")?,
            }
        }
    }
}

/// Ask for host, port, credentials and TLS options.
pub fn build_endpoint<P: Prompter + ?Sized>(prompter: &mut P) -> io::Result<ClusterEndpoint> {
    let host = prompter.text("Hostname or IP")?;
    let port = prompter.integer("Port")?;
    let credentials = if prompter.confirm("Use user and password authentication?", Some(true))? {
        let user = prompter.text("User")?;
        let password = prompter.secret("Password")?;
        Some(Credentials::new(user, password))
    } else {
        None
    };
    let secure = prompter.confirm("Use https?", None)?;
    let ignore_cert_errors = secure
        && prompter.confirm("Would you like to ignore certificate errors?", Some(false))?;

    Ok(ClusterEndpoint {
        scheme: if secure { Scheme::Https } else { Scheme::Http },
        host,
        port,
        verify_tls: !ignore_cert_errors,
        credentials,
    })
}

pub const PLAINTEXT_PASSWORD_WARNING: &str =
    "WARNING: the password above is shown in plaintext; clear your terminal scrollback if it is shared.";

/// Echo of the entered parameters, password included, followed by a
/// warning that it was printed in plaintext.
pub fn connection_summary(endpoint: &ClusterEndpoint) -> String {
    let mut out = String::from("You have entered the following parameters to connect to your cluster:\n");
    out.push_str(&format!(" - Host/IP: {}\n", endpoint.host));
    out.push_str(&format!(" - Port: {}\n", endpoint.port));
    out.push_str(&format!(" - HTTP/HTTPS: {}\n", endpoint.scheme));
    if let Some(creds) = &endpoint.credentials {
        out.push_str(&format!(" - User: {}\n", creds.username));
        out.push_str(&format!(" - Password: {}\n", creds.password()));
    }
    if endpoint.scheme == Scheme::Https {
        out.push_str(&format!(
            " - Ignore Certificate Errors: {}\n",
            !endpoint.verify_tls
        ));
    }
    if endpoint.credentials.is_some() {
        out.push_str(PLAINTEXT_PASSWORD_WARNING);
        out.push('\n');
    }
    out
}

/// Full interactive run against a real cluster.
pub fn run<P: Prompter + ?Sized>(prompter: &mut P, settings: &Settings) -> Result<Vec<UploadOutcome>> {
    println!("\nList of pipelines to be installed to Elasticsearch:\n");
    for name in discover(&settings.work_dir, "*corelight*")? {
        println!("{name}");
    }
    println!("\nUse this tool to import Corelight pipeline configurations to your Elasticsearch cluster.\n");
    println!("Enter the information to connect to your Elasticsearch cluster.\n");

    let endpoint = build_endpoint(prompter).context("Failed to read connection parameters")?;
    print!("{}", connection_summary(&endpoint));

    let client = ClusterClient::new(&endpoint)?;
    println!("Uploading schemas to {}", client.base_url());
    let uploader = Uploader::new(client, settings).with_progress(true);
    run_uploads(prompter, &uploader, settings)
}

/// Health check, optional clean-up, then templates followed by pipelines.
/// Returns on the first upload that fails for good.
pub fn run_uploads<P, T>(
    prompter: &mut P,
    uploader: &Uploader<T>,
    settings: &Settings,
) -> Result<Vec<UploadOutcome>>
where
    P: Prompter + ?Sized,
    T: ClusterTransport,
{
    uploader
        .verify_connectivity()
        .context("Cluster connectivity check failed")?;

    let load_pipelines = prompter.confirm(
        "Use ingest pipelines? (if you are using Logstash to perform ECS and normalization then select no)",
        Some(true),
    )?;

    let mut files = discover(&settings.work_dir, &settings.template_pattern)?;
    if load_pipelines {
        let pipelines = discover(&settings.work_dir, &settings.pipeline_pattern)?;
        if !pipelines.is_empty()
            && prompter.confirm("Delete existing pipelines before uploading?", Some(false))?
        {
            delete_existing(uploader, &pipelines)?;
        }
        files.extend(pipelines);
    }

    let mut outcomes = Vec::with_capacity(files.len());
    for name in &files {
        let job = UploadJob::read(&settings.work_dir, name)?;
        println!("Trying to upload pipeline: {name}");
        println!("URI = {}", uploader.url_for(&job.path()));
        let outcome = uploader.upload(&job)?;
        outcomes.push(outcome);
    }

    print_outcomes(&outcomes);
    Ok(outcomes)
}

fn delete_existing<T: ClusterTransport>(uploader: &Uploader<T>, names: &[String]) -> Result<()> {
    for name in names {
        let status = uploader
            .delete_pipeline(name)
            .with_context(|| format!("Failed to delete {name}"))?;
        match status {
            200 => println!("Deleted {name}"),
            404 => println!("{name} is not present on the cluster"),
            other => println!("Could not delete {name}: status code {other}"),
        }
    }
    Ok(())
}

fn print_outcomes(outcomes: &[UploadOutcome]) {
    if outcomes.is_empty() {
        println!("No matching files found, nothing uploaded.");
        return;
    }
    println!("\nUploaded {} file(s):", outcomes.len());
    for o in outcomes {
        let status = o.last_status.map_or_else(|| "-".to_string(), |s| s.to_string());
        println!(" - {} (status {}, attempts {})", o.file_name, status, o.attempts_used);
    }
}
