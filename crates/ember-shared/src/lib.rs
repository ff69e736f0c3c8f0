//! # ember-shared
//!
//! Types shared by every Ember crate: validated identifiers, the closed
//! enums persisted by the store, geodesic and calendar helpers, and the
//! signed session tokens issued by the identity service.

pub mod calendar;
pub mod constants;
pub mod error;
pub mod geo;
pub mod session;
pub mod types;

pub use error::{ParseError, TokenError};
pub use geo::GeoPoint;
pub use types::*;
