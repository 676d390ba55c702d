use grader::{
    LARGE_PROGRAM, PROGRAM,
    abyss::addressing::{PAGE_SIZE, Va},
    taios::{
        KernelError,
        config::{Config, USER_STACK_SIZE, USER_STACK_TOP},
        fs::{FileBlockNumber, MemFs, traits::FileSystem},
        loader::{FlatBinaryLoader, ProgramLoader},
        mm::{KernelMemory, page_table::PteFlags},
    },
};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}

#[test]
fn files_read_at_any_position() {
    let fs = MemFs::new().with("data", pattern(10_000));
    let file = fs.open("data").unwrap();
    assert_eq!(file.size(), 10_000);

    let mut buf = [0; 300];
    assert_eq!(file.read(4000, &mut buf), Ok(300));
    assert_eq!(&buf[..], &pattern(10_000)[4000..4300]);

    // Short read at the end of the file.
    assert_eq!(file.read(9_900, &mut buf), Ok(100));
    assert_eq!(&buf[..100], &pattern(10_000)[9_900..]);
    assert_eq!(file.read(10_000, &mut buf), Ok(0));
    assert_eq!(file.read(20_000, &mut buf), Ok(0));
}

#[test]
fn missing_files_are_reported() {
    let fs = MemFs::new().with("a", PROGRAM);
    assert!(matches!(fs.open("b"), Err(KernelError::NoSuchEntry)));
    assert!(fs.open("a").is_ok());
}

#[test]
fn block_numbers_cover_whole_pages() {
    assert_eq!(FileBlockNumber::from_offset(0), FileBlockNumber(0));
    assert_eq!(FileBlockNumber::from_offset(PAGE_SIZE - 1), FileBlockNumber(0));
    assert_eq!(FileBlockNumber::from_offset(PAGE_SIZE), FileBlockNumber(1));
    assert_eq!(FileBlockNumber(3).into_offset(), 3 * PAGE_SIZE);
}

#[test]
fn flat_binaries_load_as_one_read_only_section() {
    let mut memory = KernelMemory::new(&Config::default()).unwrap();
    let loader = FlatBinaryLoader::new(MemFs::new().with("large", LARGE_PROGRAM));
    let free = memory.heap().free_blocks();

    let program = loader.load("large", &mut memory).unwrap();
    assert_eq!(program.entry(), Va::new(0x0040_0000));
    assert_eq!(program.stack_top(), USER_STACK_TOP);

    let [code] = program.sections() else {
        panic!("Expected one section, got {:?}.", program.sections());
    };
    assert_eq!(code.virt, Va::new(0x0040_0000));
    assert_eq!(code.size, LARGE_PROGRAM.len());
    assert_eq!(code.flags, PteFlags::P | PteFlags::US);
    let mut image = vec![0; LARGE_PROGRAM.len()];
    memory.read(code.phys, &mut image).unwrap();
    assert_eq!(image, LARGE_PROGRAM);

    let stack = program.stack();
    assert_eq!(stack.size, USER_STACK_SIZE);
    assert_eq!(stack.virt_end(), USER_STACK_TOP);
    assert_eq!(stack.flags, PteFlags::P | PteFlags::RW | PteFlags::US);

    assert_eq!(free - memory.heap().free_blocks(), 3 + USER_STACK_SIZE / PAGE_SIZE);
    program.release(&mut memory);
    assert_eq!(memory.heap().free_blocks(), free);
}

#[test]
fn failed_loads_leave_the_heap_untouched() {
    let mut memory = KernelMemory::new(&Config::default()).unwrap();
    let loader = FlatBinaryLoader::new(MemFs::new().with("empty", Vec::<u8>::new()));
    let free = memory.heap().free_blocks();

    assert_eq!(
        loader.load("empty", &mut memory).map(|_| ()),
        Err(KernelError::NoExec)
    );
    assert_eq!(
        loader.load("missing", &mut memory).map(|_| ()),
        Err(KernelError::NoSuchEntry)
    );
    assert_eq!(memory.heap().free_blocks(), free);
}
