// Entrypoint for the import tool.
// - Picks a terminal prompter when stdin is a TTY, a line reader otherwise.
// - Any error returned here ends the process with exit code 1.

use pipeline_import_cli::config::Settings;
use pipeline_import_cli::logging::{self, LogConfig};
use pipeline_import_cli::ui::{run, LinePrompter, TerminalPrompter};
use std::io::{self, IsTerminal};

fn main() -> anyhow::Result<()> {
    logging::init(LogConfig::default());
    let settings = Settings::from_env();
    tracing::debug!(?settings, "starting import");

    if io::stdin().is_terminal() {
        run(&mut TerminalPrompter::new(), &settings)?;
    } else {
        let stdin = io::stdin();
        run(&mut LinePrompter::new(stdin.lock(), io::stdout()), &settings)?;
    }
    Ok(())
}
