//! Metrics for the package engine
//!
//! Exporter wiring is the deployment's concern; the engine only records into
//! the global OpenTelemetry meter.

use std::time::Duration;

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Gauge, Histogram, Meter};
use opentelemetry::KeyValue;

use crate::adapters::PackageAccessor;
use kube::ResourceExt;

/// Global meter for Parcel metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("parcel"));

/// Gauge tracking packages by phase
///
/// Labels:
/// - `package`: package name
/// - `phase`: Pending, Unpacking, Progressing, Available, NotReady
pub static PACKAGES: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("parcel_packages")
        .with_description("Packages observed by the engine, by phase")
        .with_unit("{packages}")
        .build()
});

/// Histogram of end-to-end bundle load duration on first successful unpack
///
/// Labels:
/// - `package`: package name
pub static PACKAGE_LOAD_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("parcel_package_load_duration_seconds")
        .with_description("Duration of the first successful bundle unpack in seconds")
        .with_unit("s")
        .build()
});

/// Record aggregate package state after an error-free reconcile
pub fn record_package<P: PackageAccessor>(pkg: &P) {
    let phase = pkg
        .status()
        .map(|s| s.phase.to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    PACKAGES.record(
        1,
        &[
            KeyValue::new("package", pkg.name_any()),
            KeyValue::new("phase", phase),
        ],
    );
}

/// Record the end-to-end load duration of a first successful unpack
pub fn record_load_duration(package: &str, elapsed: Duration) {
    PACKAGE_LOAD_DURATION.record(
        elapsed.as_secs_f64(),
        &[KeyValue::new("package", package.to_string())],
    );
}
