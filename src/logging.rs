use std::fmt;

/// Verbosity threshold for a [`ComponentLogger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging capability handed down to each component at construction time.
///
/// The level is fixed configuration, not mutable global state; a component
/// that needs a narrower scope derives one with [`ComponentLogger::child`].
/// Records are emitted through the `log` facade with the component name as
/// the target, so host applications keep their usual sink.
#[derive(Debug, Clone)]
pub struct ComponentLogger {
    component: &'static str,
    level: LogLevel,
}

impl ComponentLogger {
    pub fn new(component: &'static str, level: LogLevel) -> Self {
        Self { component, level }
    }

    /// Derive a logger for a sub-component, inheriting the level.
    pub fn child(&self, component: &'static str) -> Self {
        Self {
            component,
            level: self.level,
        }
    }

    pub fn component(&self) -> &'static str {
        self.component
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::Off && level <= self.level
    }

    pub fn error(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Error) {
            log::error!(target: self.component, "{}", message);
        }
    }

    pub fn warn(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Warn) {
            log::warn!(target: self.component, "{}", message);
        }
    }

    pub fn info(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Info) {
            log::info!(target: self.component, "{}", message);
        }
    }

    pub fn debug(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Debug) {
            log::debug!(target: self.component, "{}", message);
        }
    }
}
