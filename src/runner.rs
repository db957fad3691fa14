//! Daemon runner - startup, main loop and shutdown

use pdemon_app::{Engine, Settings, SysinfoProcessChecker, ToolAvailability};
use pdemon_core::prelude::*;
use pdemon_daemon::EmergeCommand;

/// Run the daemon until SIGINT/SIGTERM
pub async fn run_daemon(mut settings: Settings) -> Result<()> {
    info!("Emerge log: {}", settings.log.path.display());
    info!("State file: {}", settings.state.path.display());

    disable_missing_tools(&mut settings, &ToolAvailability::check());

    let mut engine = Engine::new(settings, Box::new(SysinfoProcessChecker::new()))
        .context("Failed to create engine")?;
    engine
        .initial_scan()
        .await
        .context("Initial emerge.log scan failed")?;
    engine.start();

    let result = engine.run().await;
    if let Err(ref e) = result {
        error!("Daemon error: {:?}", e);
    }

    info!("Portage Demon exiting");
    result
}

/// Turn off scheduled commands that rely on a missing `emerge`.
/// Custom command lines are left alone.
fn disable_missing_tools(settings: &mut Settings, tools: &ToolAvailability) {
    let Some(message) = tools.emerge_unavailable_message() else {
        return;
    };
    warn!("{}", message);

    let uses_emerge = |command: EmergeCommand| command.program() == "emerge";
    if settings.sync.enabled && uses_emerge(settings.sync_command()) {
        settings.sync.enabled = false;
    }
    if settings.pretend.enabled && uses_emerge(settings.pretend_command()) {
        settings.pretend.enabled = false;
    }
}
