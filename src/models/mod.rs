//! # Models
//!
//! Ordered beta regression for outcomes on a closed interval, and a
//! simulation workflow for planning sample sizes.

pub mod ordbeta;
pub mod simulation;
pub(crate) mod tables;
