pub mod assemble;
pub mod build;
pub mod capture;
pub mod color;
pub mod consistency;
pub mod engine;
pub mod metadata;
pub mod pipeline;
pub mod progress;
pub mod scanner;
pub mod segment;
pub mod sort;
