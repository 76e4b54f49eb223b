//! # Handler Registry Module
//!
//! Fan-out of normalized events to downstream consumers.
//!
//! ## Overview
//!
//! - Named handlers are invoked synchronously, in registration order
//! - Each invocation is isolated, so one failing handler cannot block others
//! - Slow consumers take a broadcast receiver and run in their own task
//!
//! ## Usage
//!
//! ```rust,ignore
//! use spoolwatch_core::event_bus::HandlerRegistry;
//!
//! let registry: HandlerRegistry<Snapshot> = HandlerRegistry::new();
//! registry.register("inventory", |snapshot| {
//!     println!("{} is {}", snapshot.serial, snapshot.status);
//! });
//!
//! registry.dispatch(&snapshot);
//! registry.unregister("inventory");
//! ```

mod bus;

pub use bus::*;
