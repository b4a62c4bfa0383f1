pub mod compile;
pub mod lexer;
pub mod parser;
pub mod vm;

pub use compile::{SlotTable, compile};
pub use vm::{ExecEnv, MegaBuf, Program, Vm};
