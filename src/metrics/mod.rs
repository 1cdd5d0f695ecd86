//! Prometheus instrumentation for the benchmark pipeline.
//!
//! A single [`Metrics`] value is created at startup and shared by `Arc`
//! with the bus and the services that record into it.
//!
//! # Example
//!
//! ```ignore
//! use agentbench::metrics::Metrics;
//!
//! let metrics = Metrics::new()?;
//! metrics.record_publish("submission.created", "ok", 0.002);
//! println!("{}", metrics.export());
//! ```

pub mod prometheus;

pub use prometheus::Metrics;
