use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Get the log file path
fn get_log_path() -> PathBuf {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fwts")
        .join("logs");

    let _ = fs::create_dir_all(&log_dir);

    log_dir.join(format!("fwts-{}.log", Local::now().format("%Y%m%d-%H%M%S")))
}

/// Initialize logging to both console and file
pub fn init_logging() {
    let log_path = get_log_path();
    let log_path_for_closure = log_path.clone();

    let mut builder = Builder::new();

    // Log level from env or default to INFO for our crate, WARN for others
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        builder.parse_filters(&rust_log);
    } else {
        builder.filter_module("fwts", LevelFilter::Info);
        builder.filter_level(LevelFilter::Warn);
    }

    // Custom format with timestamps and module info
    builder.format(move |buf, record| {
        let log_line = format!(
            "[{} {} {}] {}\n",
            Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        );

        write!(buf, "{log_line}")?;

        // Also write to file
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path_for_closure)
        {
            let _ = file.write_all(log_line.as_bytes());
        }

        Ok(())
    });

    builder.target(env_logger::Target::Stderr);

    builder.init();

    log::debug!("Log file: {}", log_path.display());
}
