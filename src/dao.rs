pub mod export;
pub mod log;
pub mod model;
pub mod result;
pub mod run;
