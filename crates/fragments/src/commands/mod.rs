pub mod compile;
pub mod invalidate;
pub mod prewarm;
pub mod preview;
pub mod serve;
