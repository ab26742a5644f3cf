use opentelemetry_sdk::{logs::LoggerProvider, trace::TracerProvider as SdkTracerProvider};

#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryConfig {
    /// Reported as the OTel `service.name` resource
    pub service_name: String,
    /// Level used when `RUST_LOG` is unset
    pub log_level: String,
    /// OTLP/gRPC collector; stdout JSON logging only when `None`
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "herald".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
        }
    }
}

/// Held until shutdown so pending OTLP batches get flushed
pub struct TelemetryProviders {
    pub tracer_provider: SdkTracerProvider,
    pub logger_provider: LoggerProvider,
}
