pub mod compile;
pub mod diagnostics;
pub mod frontend;
pub mod pass;
pub mod passes;
pub mod session;
pub mod symbols;
pub mod target;
