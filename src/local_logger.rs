use std::env;
use std::io::Write;

use crate::prelude::*;
use console::Style;
use log::Log;
use simplelog::{CombinedLogger, SharedLogger};

pub const PROCWATCH_U8_COLOR_CODE: u8 = 39; // #00AFFF

pub struct LocalLogger {
    log_level: log::LevelFilter,
}

impl LocalLogger {
    pub fn new() -> Self {
        let log_level = env::var("PROCWATCH_LOG")
            .ok()
            .and_then(|log_level| log_level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info);

        LocalLogger { log_level }
    }
}

impl Default for LocalLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Log for LocalLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.log_level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        print_record(record);
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}

/// Print a log record to the console with the appropriate style
fn print_record(record: &log::Record) {
    let error_style = Style::new().red();
    let info_style = Style::new().white();
    let warn_style = Style::new().yellow();
    let debug_style = Style::new().blue().dim();
    let trace_style = Style::new().black().dim();
    let time = chrono::Local::now().format("%H:%M:%S");

    match record.level() {
        log::Level::Error => eprintln!("{time} {}", error_style.apply_to(record.args())),
        log::Level::Warn => eprintln!("{time} {}", warn_style.apply_to(record.args())),
        log::Level::Info => println!("{time} {}", info_style.apply_to(record.args())),
        log::Level::Debug => println!(
            "{time} {}",
            debug_style.apply_to(format!("[DEBUG::{}] {}", record.target(), record.args())),
        ),
        log::Level::Trace => println!(
            "{time} {}",
            trace_style.apply_to(format!("[TRACE::{}] {}", record.target(), record.args()))
        ),
    }
}

impl SharedLogger for LocalLogger {
    fn level(&self) -> log::LevelFilter {
        self.log_level
    }

    fn config(&self) -> Option<&simplelog::Config> {
        None
    }

    fn as_log(self: Box<Self>) -> Box<dyn Log> {
        Box::new(*self)
    }
}

pub fn init_local_logger() -> Result<()> {
    CombinedLogger::init(vec![Box::new(LocalLogger::new())])?;
    Ok(())
}
