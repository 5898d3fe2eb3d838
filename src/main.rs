use vm_kernel::loader::{Executable, Section};
use vm_kernel::Kernel;

const PAGE_SIZE: usize = 256;
const FRAME_COUNT: usize = 4;

fn main() {
    let kernel = Kernel::<PAGE_SIZE, FRAME_COUNT>::new("main").unwrap();
    println!("---- Kernel initialized ----");

    let exe = Executable::new(vec![
        Section::new(0, true, vec![0x90; 2 * PAGE_SIZE]),
        Section::new(2, false, vec![0x00; PAGE_SIZE]),
    ]);
    let process = kernel.exec(exe).unwrap();
    println!(
        "process {}: {} pages, {} physical frames",
        process.pid(),
        process.num_pages(),
        FRAME_COUNT
    );

    // Touch more distinct pages than there are frames, forcing the clock
    // sweep to start reclaiming.
    for vpn in 0..process.num_pages() as u64 {
        let pattern = vec![vpn as u8; 16];
        let written = process.write(vpn * PAGE_SIZE as u64, &pattern);
        assert_eq!(written, 16);
    }
    println!(
        "touched every page: {} resident, {} evictions so far",
        process.resident_pages(),
        kernel.pager().evictions()
    );

    // Everything written must survive its trips through the swap file.
    for vpn in 0..process.num_pages() as u64 {
        let mut buf = [0u8; 16];
        let read = process.read(vpn * PAGE_SIZE as u64, &mut buf);
        assert_eq!(read, 16);
        assert_eq!(buf, [vpn as u8; 16]);
    }
    println!(
        "read everything back: {} evictions, {} swap slots total",
        kernel.pager().evictions(),
        kernel.pager().swap().slot_count()
    );

    drop(process);
    println!("---- Kernel shut down ----");
    let _ = std::fs::remove_file(swap::make_name("main"));
}
