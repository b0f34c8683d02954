use farming_manager::enforcement::Notifier;
use farming_manager::host::{ConsoleCommandSink, ConsoleNotifier, HostEvent, load_weapon_defines};
use farming_manager::logging;
use farming_manager::manager::build_backend;
use farming_manager::weapons::FileWeaponNames;
use farming_manager::{CONSOLE_TARGET, Error, FarmingConfig, FarmingManager};
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Default configuration file
const CONFIG_FILE: &str = "farming_manager.yaml";

async fn async_main() -> Result<(), Error> {
    logging::init()?;

    let config_path = env::args().nth(1).unwrap_or_else(|| CONFIG_FILE.to_string());
    let config = FarmingConfig::load(&config_path).await?;
    let defines = load_weapon_defines(&config.weapon_defines_file).await?;
    let names = Arc::new(FileWeaponNames::new(config.weapon_names_file.clone()));
    let backend = build_backend(&config, Arc::new(ConsoleCommandSink));
    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);

    let manager = FarmingManager::new(config, defines, names, backend, notifier);
    manager.enable().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match HostEvent::parse(&line) {
                    Ok(event) => event.apply(&manager),
                    Err(e) => warn!(target: CONSOLE_TARGET, error = %e, "Unreadable host event"),
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!(target: CONSOLE_TARGET, "Interrupted");
                break;
            }
        }
    }

    manager.watchdog().monitor();
    manager.disable().await?;
    Ok(())
}

fn main() {
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(Error::from)
        .and_then(|runtime| runtime.block_on(async_main()));

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
