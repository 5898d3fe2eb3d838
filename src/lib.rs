//! A demand-paging virtual-memory engine: each process gets an
//! independently-sized virtual address space backed by a small shared pool of
//! physical frames and a growable swap file, with pages faulted in on first
//! touch and reclaimed by a global clock sweep.

pub mod frame_table;
pub mod kernel;
pub mod loader;
pub mod page_table;
pub mod pager;
pub mod process;

pub use kernel::{ExecError, Kernel, ARG_PAGES, STACK_PAGES};
pub use pager::FaultError;
