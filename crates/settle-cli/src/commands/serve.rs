//! `settle serve`: run the build command under the dev middleware.

use crate::cli::ServeArgs;
use crate::config::ServeConfig;
use crate::engine::{BuildCommand, CommandEngine};
use crate::error::Result;
use crate::{server, ui};
use settle::{DevMiddleware, LogSinks};

/// Execute the serve command.
///
/// Loads the configuration, creates the command engine, installs the
/// middleware on it (which starts the first build unless lazy) and serves
/// until Ctrl+C.
pub async fn execute(args: ServeArgs, quiet: bool) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config = ServeConfig::load_in(&cwd, &args, quiet)?;
    let addr = config.addr()?;

    let out_dir = config.out_dir_in(&cwd);
    let watch = config.watch_dirs_in(&cwd);
    for dir in &watch {
        if !dir.is_dir() {
            ui::warning(&format!("Watch directory does not exist: {}", dir.display()));
        }
    }

    let engine = CommandEngine::new(BuildCommand {
        command: config.command().to_string(),
        cwd: cwd.clone(),
        out_dir: out_dir.clone(),
        watch: watch.clone(),
    })?;

    let options = config
        .middleware
        .clone()
        .with_sinks(LogSinks::new(ui::info, ui::warning, ui::error));
    let public_path = options.public_path.clone();
    let lazy = options.lazy;
    let middleware = DevMiddleware::new(engine, options)?;

    ui::info(&format!("Build command: {}", config.command()));
    ui::info(&format!("Serving {} from memory", out_dir.display()));
    if lazy {
        ui::info("Lazy mode: building on request");
    } else {
        for dir in &watch {
            ui::info(&format!("Watching {}", dir.display()));
        }
    }
    ui::success(&format!("Dev server running at http://{addr}{public_path}"));
    ui::info("Press Ctrl+C to stop");

    server::run(addr, middleware).await
}
