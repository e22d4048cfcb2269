// vecgen — ATE vector and test-program generator
//
// Library root. The engine (timesets, clocks, emission, sequence control,
// flows) is usable directly from Rust; the script front end and pipeline
// drive it from the `vecgen` command line.

pub mod ast;
pub mod backend;
pub mod clock;
pub mod diag;
pub mod emitter;
pub mod error;
pub mod flow;
pub mod id;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod pin;
pub mod pipeline;
pub mod sequence;
pub mod session;
pub mod threads;
pub mod time;
pub mod timeset;
