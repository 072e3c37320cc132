#![doc = include_str!("../README.md")]

pub mod bound;
pub mod common;
pub mod dbm;
pub mod error;
pub mod federation;
pub mod gen;
pub mod infimum;
pub mod mingraph;
pub mod priced;
pub mod store;

pub mod prelude {
    //! Re-exports of the types needed for everyday zone manipulation.

    pub use crate::{
        bound::{Bound, Strictness},
        common::{ClockSet, Constraint, MergeStyle, Relation, SubtractStyle},
        dbm::{Dbm, Delay},
        error::{Error, Result},
        federation::Federation,
        priced::PricedDbm,
    };
}
