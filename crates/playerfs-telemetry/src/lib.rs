//! OpenTelemetry integration for playerfs.
//!
//! Provides the OTel tracing layer and a sampler with differentiated rates
//! by span category.
//!
//! # Activation
//!
//! OTel export activates when standard OTel environment variables are set:
//!
//! ```bash
//! # Minimal: OTLP export to localhost:4317
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 playerfs run
//!
//! # Full control
//! OTEL_SERVICE_NAME=playerfs \
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://jaeger:4317 \
//! OTEL_TRACES_EXPORTER=otlp \
//! playerfs stage
//! ```
//!
//! Set `OTEL_SDK_DISABLED=true` to explicitly disable even when the endpoint is set.

#[cfg(feature = "telemetry")]
mod otel;

#[cfg(feature = "telemetry")]
pub use otel::{OtelGuard, otel_layer};

/// Check whether OTel export should be enabled.
///
/// Returns `true` when standard OTel env vars indicate export is desired:
/// - `OTEL_SDK_DISABLED` is NOT set to `"true"`
/// - AND at least one of:
///   - `OTEL_EXPORTER_OTLP_ENDPOINT` is set
///   - `OTEL_TRACES_EXPORTER` is set (and not `"none"`)
pub fn otel_enabled() -> bool {
    if std::env::var("OTEL_SDK_DISABLED")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        return false;
    }

    if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        return true;
    }

    if let Ok(exporter) = std::env::var("OTEL_TRACES_EXPORTER") {
        return !exporter.eq_ignore_ascii_case("none");
    }

    false
}

/// Sampling rate for a span, by name prefix.
///
/// | Prefix       | Rate | Rationale                                  |
/// |--------------|------|--------------------------------------------|
/// | `compose*`   | 100% | Once per boot                              |
/// | `stage*`     | 100% | Once per boot, gates readiness             |
/// | `upload*`    | 100% | User driven, low volume                    |
/// | `launch*`    | 100% | Runtime boot and start                     |
/// | `vfs*`       | 10%  | Per-file remote fetches                    |
/// | other        | 10%  | Default for unclassified spans             |
///
/// Errors are always sampled regardless of name.
pub fn span_sample_rate(name: &str) -> f64 {
    const FULL: [&str; 4] = ["compose", "stage", "upload", "launch"];
    if FULL.iter().any(|prefix| name.starts_with(prefix)) {
        1.0
    } else {
        0.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_sample_rate() {
        assert_eq!(span_sample_rate("compose"), 1.0);
        assert_eq!(span_sample_rate("stage"), 1.0);
        assert_eq!(span_sample_rate("upload"), 1.0);
        assert_eq!(span_sample_rate("launch.boot"), 1.0);
        assert_eq!(span_sample_rate("vfs.fetch"), 0.1);
        assert_eq!(span_sample_rate("anything"), 0.1);
    }
}
