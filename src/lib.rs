pub mod app;
pub mod browser;
pub mod cli;
pub mod config;
pub mod detector;
pub mod expander;
pub mod output;
pub mod runner;
pub mod target;
pub mod transform;

#[cfg(test)]
mod tests;
