use std::sync::Arc;

use log::{LevelFilter, Metadata, Record, SetLoggerError};
use simplelog::{Config, SimpleLogger};

use crate::event_bus::{Event, EventBus};

fn level_for(verbose: bool) -> LevelFilter {
    if verbose { LevelFilter::Info } else { LevelFilter::Warn }
}

/// Terminal logging for the line-oriented loop.
pub fn init(verbose: bool) {
    let _ = SimpleLogger::init(level_for(verbose), Config::default());
}

/// Route log records onto the event bus so the dashboard can show them in place.
pub fn init_dashboard(event_bus: Arc<EventBus>, verbose: bool) -> Result<(), SetLoggerError> {
    let level = level_for(verbose);
    let logger = Box::leak(Box::new(DashboardLogger { event_bus, level }));
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

pub struct DashboardLogger {
    event_bus: Arc<EventBus>,
    level: LevelFilter,
}

impl log::Log for DashboardLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.event_bus.emit_nowait(Event::LogLine {
                level: record.level().to_string(),
                message: record.args().to_string(),
            });
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    #[tokio::test]
    async fn test_dashboard_logger_forwards_enabled_records() {
        let bus = Arc::new(EventBus::new(8));
        let mut receiver = bus.subscribe();
        let logger = DashboardLogger { event_bus: bus.clone(), level: LevelFilter::Warn };

        logger.log(
            &Record::builder()
                .level(log::Level::Info)
                .args(format_args!("quiet"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(log::Level::Warn)
                .args(format_args!("loud"))
                .build(),
        );

        match receiver.recv().await.unwrap() {
            Event::LogLine { level, message } => {
                assert_eq!(level, "WARN");
                assert_eq!(message, "loud");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(receiver.try_recv().is_err());
    }
}
