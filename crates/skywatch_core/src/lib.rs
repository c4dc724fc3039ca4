//! # Skywatch Core
//!
//! Value types and timing helpers shared by the authoritative side and
//! every observer.
//!
//! ## Contents
//!
//! - [`Position`]: three world-space coordinates, `Pod` so it can go straight
//!   onto the wire
//! - [`EntityId`]: stable identifier of a tracked entity
//! - [`AxisMask`]: which axes the interpolator blends
//! - [`Clock`]: injectable monotonic time source ([`SystemClock`], [`ManualClock`])
//! - [`timing`]: clamp, lerp and time-factor helpers
//!
//! ## Example
//!
//! ```rust
//! use skywatch_core::{Position, timing};
//! use std::time::Duration;
//!
//! let a = Position::new(0.0, 0.0, 0.0);
//! let b = Position::new(30.0, 0.0, 0.0);
//! let t = timing::time_factor(Duration::from_millis(1500), Duration::from_millis(3000));
//! assert_eq!(a.lerp(b, t.unwrap()), Position::new(15.0, 0.0, 0.0));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod clock;
pub mod entity;
pub mod position;
pub mod timing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::EntityId;
pub use position::{AxisMask, Position};
