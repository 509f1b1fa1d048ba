//! sea-orm entities

pub mod visits;
