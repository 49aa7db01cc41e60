// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured logs and metrics for coalesced calls.
//!
//! Every call outcome is recorded as a `cache.event` tracing event carrying the
//! cache name, the key and an activity such as `cache.hit`. With the `metrics`
//! feature the same events increment an OpenTelemetry counter.

use std::fmt::Display;

#[cfg(any(feature = "metrics", test))]
use opentelemetry::{
    KeyValue,
    metrics::{Counter, MeterProvider},
};

use crate::CacheKey;

pub(crate) mod attributes;
#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics;
#[cfg(test)]
pub(crate) mod testing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheActivity {
    Hit,
    Miss,
    Deferred,
    Promoted,
    Stored,
    NilSkipped,
    FactoryFailed,
    Invalid,
    Error,
}

impl CacheActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "cache.hit",
            Self::Miss => "cache.miss",
            Self::Deferred => "cache.deferred",
            Self::Promoted => "cache.promoted",
            Self::Stored => "cache.stored",
            Self::NilSkipped => "cache.nil_skipped",
            Self::FactoryFailed => "cache.factory_failed",
            Self::Invalid => "cache.invalid",
            Self::Error => "cache.error",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::Hit | Self::Miss | Self::Deferred | Self::Stored | Self::NilSkipped => Severity::Debug,
            Self::Promoted => Severity::Info,
            Self::FactoryFailed | Self::Invalid => Severity::Warn,
            Self::Error => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// Where cache events go.
#[derive(Clone, Debug)]
pub(crate) struct CacheTelemetry {
    logging_enabled: bool,
    #[cfg(any(feature = "metrics", test))]
    event_counter: Option<Counter<u64>>,
}

impl CacheTelemetry {
    pub(crate) fn new(logging_enabled: bool) -> Self {
        Self {
            logging_enabled,
            #[cfg(any(feature = "metrics", test))]
            event_counter: None,
        }
    }

    pub(crate) fn with_logging(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    #[cfg(any(feature = "metrics", test))]
    pub(crate) fn with_meter_provider(mut self, provider: &dyn MeterProvider) -> Self {
        let meter = metrics::create_meter(provider);
        self.event_counter = Some(metrics::create_event_counter(&meter));
        self
    }

    #[inline]
    pub(crate) fn record(&self, cache_name: &'static str, key: &CacheKey, activity: CacheActivity) {
        self.record_inner(cache_name, key, activity, None);
    }

    #[inline]
    pub(crate) fn record_error(&self, cache_name: &'static str, key: &CacheKey, activity: CacheActivity, error: &dyn Display) {
        self.record_inner(cache_name, key, activity, Some(error));
    }

    fn record_inner(&self, cache_name: &'static str, key: &CacheKey, activity: CacheActivity, error: Option<&dyn Display>) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(counter) = &self.event_counter {
            counter.add(
                1,
                &[
                    KeyValue::new(attributes::CACHE_NAME, cache_name),
                    KeyValue::new(attributes::CACHE_ACTIVITY_NAME, activity.as_str()),
                ],
            );
        }

        if self.logging_enabled {
            Self::emit(cache_name, key, activity, error);
        }
    }

    fn emit(cache_name: &'static str, key: &CacheKey, activity: CacheActivity, error: Option<&dyn Display>) {
        let key = key.as_str();
        let act = activity.as_str();

        // Tracing level must be constant, so a macro selects it.
        // Field names must match constants in attributes.rs.
        macro_rules! emit_event {
            ($level:ident) => {
                match error {
                    Some(error) => tracing::$level!(
                        cache.name = cache_name,
                        cache.key = key,
                        cache.activity = act,
                        error = %error,
                        "cache.event"
                    ),
                    None => tracing::$level!(cache.name = cache_name, cache.key = key, cache.activity = act, "cache.event"),
                }
            };
        }

        match activity.severity() {
            Severity::Error => emit_event!(error),
            Severity::Warn => emit_event!(warn),
            Severity::Info => emit_event!(info),
            Severity::Debug => emit_event!(debug),
        }
    }
}
