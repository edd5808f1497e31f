//! Shared pieces of the `rxtune` command line tool: kernel filesystem
//! readers, output renderers and logging setup.

pub mod args;
pub mod kernelfs;
pub mod logging;
pub mod output;
