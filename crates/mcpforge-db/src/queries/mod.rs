pub mod runs;
pub mod servers;
