//! Water Quality Testing core: drives the external training binary,
//! aggregates its telemetry and checks predictions against known data.

pub mod api;
pub mod constants;
pub mod logic;
