pub mod correlation;
pub mod exclusion;
mod fourier;
pub mod match_filter;
