//! Error handling.
//!
//! Expected emptiness is never an error: operations that may shrink a zone
//! to nothing report it through their return value or through
//! [`Dbm::is_empty`](crate::dbm::Dbm::is_empty). The variants here cover the
//! genuinely exceptional cases of querying a value that does not exist.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub enum Error {
    /// A clock valuation was requested from an empty zone or federation.
    #[error("no clock valuation exists for an empty zone")]
    EmptyZone,
    /// An infimum valuation was requested but the cost function is
    /// unbounded below over the zone.
    #[error("infimum is unbounded below, no infimum valuation exists")]
    UnboundedInfimum,
}
