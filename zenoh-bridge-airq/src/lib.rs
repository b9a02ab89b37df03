//! Zenoh bridge for AirQ CO2/temperature/humidity sensors.
//!
//! This bridge polls AirQ nodes on a shared RS-485 line (Modbus RTU), keeps
//! the latest reading of each metric per device, and answers Zenoh queries
//! with readings that are still fresh.
//!
//! # Key Expressions
//!
//! ```text
//! airq/<address>/<metric>     (queryable)
//! airq/@/register             (subscriber, payload: address)
//! airq/@/status               (bridge status, JSON)
//! ```
//!
//! Where:
//! - `<address>` - RS-485 slave id, 1 - 255
//! - `<metric>` - `co2`, `temperature` or `humidity`
//!
//! # Polling
//!
//! The [`scheduler::DeviceScheduler`] gives every registered device one slot
//! per cycle. In its slot a device is read by the
//! [`sequencer::ReadSequencer`]: CO2, then temperature, then humidity, with a
//! pause between reads. Results land in the [`cache::SensorCache`], which the
//! [`hub::SensorHub`] serves to consumers.

pub mod cache;
pub mod config;
pub mod hub;
pub mod registry;
pub mod scheduler;
pub mod sequencer;
pub mod service;
pub mod status;
pub mod transport;
