use grader::{
    abyss::addressing::{PAGE_SIZE, Pa},
    taios::{
        Kernel, KernelError,
        config::Config,
        fs::MemFs,
        loader::FlatBinaryLoader,
        mm::{BlockHeap, KernelMemory},
    },
};

const START: Pa = Pa::new(0x0100_0000);

fn block(n: usize) -> Pa {
    START + n * PAGE_SIZE
}

#[test]
fn allocation_is_first_fit() {
    let mut heap = BlockHeap::new(START, 16 * PAGE_SIZE).unwrap();
    assert_eq!(heap.alloc(1), Some(block(0)));
    let b = heap.alloc(PAGE_SIZE + 1).unwrap();
    assert_eq!(b, block(1));
    assert_eq!(heap.alloc(PAGE_SIZE), Some(block(3)));

    heap.free(b).unwrap();
    // The first hole is two blocks wide.
    assert_eq!(heap.alloc(PAGE_SIZE), Some(block(1)));
    // One block is left in it; a larger request skips past.
    assert_eq!(heap.alloc(3 * PAGE_SIZE), Some(block(4)));
    assert_eq!(heap.alloc(PAGE_SIZE), Some(block(2)));
    assert_eq!(heap.free_blocks(), 16 - 7);
}

#[test]
fn allocation_sizes_are_whole_blocks() {
    let mut heap = BlockHeap::new(START, 16 * PAGE_SIZE).unwrap();
    let a = heap.alloc(100).unwrap();
    let b = heap.alloc(3 * PAGE_SIZE - 1).unwrap();
    assert_eq!(heap.allocation_size(a), Some(PAGE_SIZE));
    assert_eq!(heap.allocation_size(b), Some(3 * PAGE_SIZE));
    // Not the first block of an allocation.
    assert_eq!(heap.allocation_size(b + PAGE_SIZE), None);
    assert!(a.is_page_aligned() && b.is_page_aligned());
}

#[test]
fn exhaustion_and_empty_requests_fail() {
    let mut heap = BlockHeap::new(START, 4 * PAGE_SIZE).unwrap();
    assert_eq!(heap.alloc(0), None);
    assert_eq!(heap.alloc(5 * PAGE_SIZE), None);
    assert_eq!(heap.alloc(4 * PAGE_SIZE), Some(START));
    assert_eq!(heap.alloc(1), None);
    assert_eq!(heap.free_blocks(), 0);
    heap.free(START).unwrap();
    assert_eq!(heap.free_blocks(), heap.total_blocks());
}

#[test]
fn free_rejects_foreign_pointers() {
    let mut heap = BlockHeap::new(START, 8 * PAGE_SIZE).unwrap();
    let a = heap.alloc(2 * PAGE_SIZE).unwrap();
    assert_eq!(heap.free(a + PAGE_SIZE), Err(KernelError::InvalidArgument));
    assert_eq!(heap.free(a + 16), Err(KernelError::InvalidArgument));
    assert_eq!(heap.free(block(8)), Err(KernelError::InvalidArgument));
    assert_eq!(heap.free(Pa::new(0x1000)), Err(KernelError::InvalidArgument));
    assert_eq!(heap.free(block(5)), Err(KernelError::InvalidArgument));
    assert_eq!(heap.free(a), Ok(()));
    assert_eq!(heap.free(a), Err(KernelError::InvalidArgument));
}

#[test]
fn freeing_stops_at_the_end_of_the_chain() {
    let mut heap = BlockHeap::new(START, 8 * PAGE_SIZE).unwrap();
    let a = heap.alloc(2 * PAGE_SIZE).unwrap();
    let b = heap.alloc(PAGE_SIZE).unwrap();
    heap.free(a).unwrap();
    assert_eq!(heap.allocation_size(b), Some(PAGE_SIZE));
    assert_eq!(heap.free_blocks(), 7);
}

#[test]
fn heap_bounds_must_be_block_aligned() {
    assert!(BlockHeap::new(START + 8, PAGE_SIZE).is_err());
    assert!(BlockHeap::new(START, PAGE_SIZE + 1).is_err());
    assert!(BlockHeap::new(START, 0).is_err());
    let heap = BlockHeap::new(START, 2 * PAGE_SIZE).unwrap();
    assert!(heap.contains(START + PAGE_SIZE + 5));
    assert!(!heap.contains(START + 2 * PAGE_SIZE));
}

#[test]
fn kzalloc_hands_out_zeroed_memory() {
    let mut memory = KernelMemory::new(&Config::default()).unwrap();
    let pa = memory.kmalloc(2 * PAGE_SIZE).unwrap();
    memory.write(pa, &[0xAB; 2 * PAGE_SIZE]).unwrap();
    memory.kfree(pa).unwrap();

    let again = memory.kzalloc(2 * PAGE_SIZE - 10).unwrap();
    assert_eq!(again, pa);
    let mut buf = vec![0xFF; 2 * PAGE_SIZE];
    memory.read(again, &mut buf).unwrap();
    assert!(buf.iter().all(|b| *b == 0));
}

#[test]
fn kmalloc_reports_exhaustion() {
    let mut memory = KernelMemory::new(&Config::default()).unwrap();
    assert_eq!(memory.kmalloc(0), Err(KernelError::NoMemory));
    assert_eq!(
        memory.kmalloc(Config::default().heap_size + 1),
        Err(KernelError::NoMemory)
    );
    assert_eq!(memory.kfree(Pa::new(0x1000)), Err(KernelError::InvalidArgument));
}

fn boots(config: Config) -> bool {
    Kernel::new(config, FlatBinaryLoader::new(MemFs::new())).is_ok()
}

#[test]
fn configuration_is_validated() {
    assert!(boots(Config::default()));
    assert!(!boots(Config {
        max_processes: 0,
        ..Config::default()
    }));
    assert!(!boots(Config {
        max_processes: 11,
        ..Config::default()
    }));
    // Overlaps the user program layout.
    assert!(!boots(Config {
        heap_start: Pa::new(0x0030_0000),
        heap_size: 0x0020_0000,
        ..Config::default()
    }));
    // Runs past the installed memory.
    assert!(!boots(Config {
        heap_size: 32 * 1024 * 1024,
        ..Config::default()
    }));
    assert!(!boots(Config {
        heap_start: Pa::new(0x0100_0800),
        ..Config::default()
    }));
}
