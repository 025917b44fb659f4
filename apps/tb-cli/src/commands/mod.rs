pub mod ports;
pub mod run;
