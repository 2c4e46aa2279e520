// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured logging of loader activity.
//!
//! With the `logs` feature enabled and logging switched on in the builder, every
//! cache hit, miss, dispatch and invalidation is emitted as a `tracing` event
//! carrying the loader name, the activity and the number of keys involved.

#[cfg(any(feature = "logs", test))]
use tracing::Level;

pub(crate) mod attributes;
#[cfg(test)]
pub(crate) mod testing;

/// Name identifying a loader in log events.
pub type LoaderName = &'static str;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoaderActivity {
    Hit,
    Miss,
    Dispatch,
    ProbeHit,
    ProbeMiss,
    Backfill,
    Invalidated,
    Cleared,
    Primed,
    FetchFailed,
}

impl LoaderActivity {
    #[cfg_attr(
        not(any(feature = "logs", test)),
        expect(dead_code, reason = "only read when emitting log events")
    )]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "loader.hit",
            Self::Miss => "loader.miss",
            Self::Dispatch => "loader.dispatch",
            Self::ProbeHit => "loader.probe_hit",
            Self::ProbeMiss => "loader.probe_miss",
            Self::Backfill => "loader.backfill",
            Self::Invalidated => "loader.invalidated",
            Self::Cleared => "loader.cleared",
            Self::Primed => "loader.primed",
            Self::FetchFailed => "loader.fetch_failed",
        }
    }

    #[cfg(any(feature = "logs", test))]
    pub fn level(self) -> Level {
        match self {
            Self::Hit | Self::Miss | Self::ProbeHit | Self::ProbeMiss => Level::DEBUG,
            Self::Dispatch | Self::Backfill | Self::Invalidated | Self::Cleared | Self::Primed => Level::INFO,
            Self::FetchFailed => Level::ERROR,
        }
    }
}

/// Records loader activity for one loader instance.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoaderTelemetry {
    name: LoaderName,
    #[cfg(any(feature = "logs", test))]
    logs_enabled: bool,
}

impl LoaderTelemetry {
    #[cfg_attr(
        not(any(feature = "logs", test)),
        expect(unused_variables, reason = "logging is compiled out without the logs feature")
    )]
    pub fn new(name: LoaderName, logs_enabled: bool) -> Self {
        Self {
            name,
            #[cfg(any(feature = "logs", test))]
            logs_enabled,
        }
    }

    pub fn name(self) -> LoaderName {
        self.name
    }

    #[inline]
    #[cfg_attr(
        not(any(feature = "logs", test)),
        expect(unused_variables, reason = "logging is compiled out without the logs feature")
    )]
    pub fn record(self, activity: LoaderActivity, key_count: usize) {
        #[cfg(any(feature = "logs", test))]
        if self.logs_enabled {
            Self::emit(self.name, activity, key_count);
        }
    }

    #[cfg(any(feature = "logs", test))]
    fn emit(name: LoaderName, activity: LoaderActivity, key_count: usize) {
        let activity_name = activity.as_str();

        // Tracing levels must be constant. Field names mirror the constants in attributes.rs.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    loader.name = name,
                    loader.activity = activity_name,
                    loader.key_count = key_count,
                    "loader.event"
                )
            };
        }

        match activity.level() {
            Level::ERROR => emit_event!(error),
            Level::INFO => emit_event!(info),
            _ => emit_event!(debug),
        }
    }
}
