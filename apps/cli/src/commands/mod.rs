//! 命令定义和实现

pub mod control;
pub mod dump;
pub mod replay;
pub mod run;

pub use dump::DumpCommand;
pub use replay::ReplayCommand;
pub use run::RunCommand;
