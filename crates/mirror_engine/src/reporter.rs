use mirror_logging::{mirror_debug, LogLevel, RunLog};

use crate::{EngineEvent, ProgressSink};

/// Routes run messages to the run log and, as events, to the progress sink.
pub(crate) struct Reporter<'a> {
    sink: &'a dyn ProgressSink,
    log: &'a RunLog,
}

impl<'a> Reporter<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink, log: &'a RunLog) -> Self {
        Self { sink, log }
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        self.sink.emit(event);
    }

    pub(crate) fn info(&self, message: impl Into<String>) {
        self.append(LogLevel::Info, message.into());
    }

    pub(crate) fn warn(&self, message: impl Into<String>) {
        self.append(LogLevel::Warning, message.into());
    }

    pub(crate) fn error(&self, message: impl Into<String>) {
        self.append(LogLevel::Error, message.into());
    }

    /// Diagnostic detail that stays out of the run transcript.
    pub(crate) fn debug(&self, message: impl AsRef<str>) {
        mirror_debug!("{}", message.as_ref());
    }

    fn append(&self, level: LogLevel, message: String) {
        let entry = self.log.append(level, message);
        self.sink.emit(EngineEvent::Log(entry));
    }
}
