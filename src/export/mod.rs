//! Files written for Ryujinx and for the user: update/DLC registry, update report.

pub mod csv;
pub mod registry;
pub mod versions;
