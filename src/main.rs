use env_logger::{Builder, WriteStyle};
use log::error;
use id5001::cli::{Options, USAGE};
use id5001::config::{self, AppConfig};
use id5001::driver::DRIVER_VERSION;

fn main() -> anyhow::Result<()> {
    let options = Options::parse(std::env::args().skip(1))?;

    if options.help {
        println!("{}", USAGE);
        return Ok(());
    }
    if options.version {
        println!("id5001 driver version {}", DRIVER_VERSION);
        return Ok(());
    }
    if options.stanza {
        print!("{}", config::default_stanza());
        return Ok(());
    }

    // Load configuration first (without logging)
    let mut config = match &options.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::new().unwrap_or_else(|e| {
            eprintln!("Failed to load configuration: {}", e);
            // Fall back to default configuration
            AppConfig::default()
        }),
    };
    options.apply(&mut config);

    // Initialise logger with a configured log level
    Builder::new()
        .filter_level(config.get_log_level())
        .write_style(WriteStyle::Always)
        .format_timestamp_secs()
        .init();

    if let Err(e) = id5001::run(&config, &options) {
        error!("Application error: {}", e);
        return Err(e);
    }
    Ok(())
}
