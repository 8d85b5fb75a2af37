//! Defines the console that logs to standard error.

use std::io::{Stderr, Write};

use log::LevelFilter;
use spin::{Mutex, Once};

pub struct Console {
    stderr: Mutex<Stderr>,
}

static GLOBAL: Once<Console> = Once::new();

impl Console {
    pub fn init(level: LevelFilter) -> &'static Self {
        let console = Self::global();
        console.install(level);
        console
    }

    pub fn global() -> &'static Self {
        GLOBAL.call_once(|| Console {
            stderr: Mutex::new(std::io::stderr()),
        })
    }

    pub fn install(&'static self, level: LevelFilter) {
        // A logger may only be set once per process.
        if log::set_logger(self).is_ok() {
            log::set_max_level(level);
        }
    }
}

impl log::Log for Console {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Nowhere left to report a failed write to stderr.
        let _ = write_log_entry_to(&mut *self.stderr.lock(), record);
    }

    fn flush(&self) {
        let _ = self.stderr.lock().flush();
    }
}

fn write_log_entry_to(writer: &mut impl Write, record: &log::Record) -> std::io::Result<()> {
    #[cfg(any(debug_assertions, feature = "detailed-logging"))]
    return writeln!(
        writer,
        "[{} {}:{} {}] {}",
        record.level(),
        record.file().unwrap_or("unknown"),
        record.line().unwrap_or(0),
        record.target(),
        record.args()
    );
    #[cfg(not(any(debug_assertions, feature = "detailed-logging")))]
    return writeln!(writer, "[{:5}] {}", record.level(), record.args());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_level_and_message() {
        let mut output = Vec::new();
        write_log_entry_to(
            &mut output,
            &log::Record::builder()
                .level(log::Level::Warn)
                .target("pmb::synchronize")
                .args(format_args!("slot 03: clearing stale mapping"))
                .build(),
        )
        .unwrap();

        let line = String::from_utf8(output).unwrap();
        assert!(line.starts_with("[WARN"));
        assert!(line.ends_with("] slot 03: clearing stale mapping\n"));
    }
}
