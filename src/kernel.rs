use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use log::info;

use crate::loader::Executable;
use crate::page_table::AddressSpace;
use crate::pager::Pager;
use crate::process::Process;

/// Pages reserved for each process's stack.
pub const STACK_PAGES: usize = 8;
/// One page for the exec arguments, at the very top of the space.
pub const ARG_PAGES: usize = 1;

#[derive(Debug, PartialEq, Eq)]
pub enum ExecError {
    /// Executable sections must cover vpn 0 upward with no holes.
    NonContiguousSections,
}

/// The kernel context: constructs the pager once and hands every process a
/// shared reference to it. Process layout follows the original scheme: code
/// sections from vpn 0, then the stack pages, then the argument page.
pub struct Kernel<const PAGE_SIZE: usize, const FRAME_COUNT: usize> {
    pager: Pager<PAGE_SIZE, FRAME_COUNT>,
    next_pid: AtomicU32,
}

impl<const PAGE_SIZE: usize, const FRAME_COUNT: usize> Kernel<PAGE_SIZE, FRAME_COUNT> {
    /// Brings the machine up: fresh physical memory, empty frame table, and
    /// a newly created swap file under the given name.
    pub fn new(swap_name: &str) -> Result<Self, std::io::Error> {
        Ok(Self {
            pager: Pager::new(swap_name)?,
            next_pid: AtomicU32::new(0),
        })
    }

    pub fn pager(&self) -> &Pager<PAGE_SIZE, FRAME_COUNT> {
        &self.pager
    }

    /// Builds a process around an executable image. Nothing is loaded here;
    /// the first touch of every page faults it in.
    pub fn exec(
        &self,
        exe: Executable<PAGE_SIZE>,
    ) -> Result<Process<PAGE_SIZE, FRAME_COUNT>, ExecError> {
        let mut code_pages = 0u32;
        for i in 0..exe.section_count() {
            let section = exe.section(i);
            if section.first_vpn() != code_pages {
                return Err(ExecError::NonContiguousSections);
            }
            code_pages += section.length_pages();
        }
        let num_pages = code_pages as usize + STACK_PAGES + ARG_PAGES;
        let table = Arc::new(Mutex::new(AddressSpace::new(num_pages)));
        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        info!(
            "process {} created: {} code pages, {} total pages",
            pid, code_pages, num_pages
        );
        Ok(Process::new(pid, exe, table, self.pager.clone()))
    }
}
