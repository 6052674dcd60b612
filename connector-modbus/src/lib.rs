//! Modbus pull connector.
//!
//! Polls Modbus devices over TCP and turns their registers into typed,
//! tagged measurements for a time-series pipeline.
//!
//! # Pipeline
//!
//! For each configured [`Register`](register::Register), in order:
//!
//! 1. the [`ConnectionManager`](connection::ConnectionManager) hands out a live master,
//!    reconnecting from scratch when the previous transport broke;
//! 2. the [`RegisterReader`](reader::RegisterReader) requests
//!    `size × words_per_element` words;
//! 3. the [`decoder`] fixes byte and word order and parses typed values;
//! 4. [`tag`] attaches a `"{unit}:{address}"` tag to each value.
//!
//! # Key Expressions
//!
//! ```text
//! <key_prefix>/<device>/<unit>/<address>
//! ```

pub mod config;
pub mod connection;
pub mod connector;
pub mod decoder;
pub mod endianness;
pub mod error;
pub mod master;
pub mod poller;
pub mod reader;
pub mod register;
pub mod tag;
