use grader::{
    abyss::{
        addressing::{PAGE_SIZE, Pa, Va},
        interrupt::Registers,
        x86::PrivilegeLevel,
    },
    boot, boot_and_launch, boot_with, check_process_table, check_ready_queue, config,
    invoke_raw_syscall, reload_current_space, spawn, syscall, user_buffer, user_command_list,
    user_cstr, user_load, user_load_u32, user_store,
    taios::{
        Kernel, KernelError,
        interrupt::Resume,
        process::Pid,
        syscall::{SyscallNumber, SyscallTable, register_syscalls},
    },
};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 + 1).collect()
}

fn free_blocks(kernel: &Kernel) -> usize {
    kernel.memory().heap().free_blocks()
}

fn nop(_kernel: &mut Kernel, _frame: &Registers) -> Result<Resume, KernelError> {
    Ok(Resume::Continue)
}

#[test]
fn malloc_and_free() {
    let (mut kernel, shell) = boot_and_launch("shell");
    let free = free_blocks(&kernel);

    let x = syscall!(&mut kernel, SyscallNumber::Malloc, 64) as u32;
    let y = syscall!(&mut kernel, SyscallNumber::Malloc, 64) as u32;
    assert_ne!(x, 0);
    assert_ne!(y, 0);
    assert_eq!(x % PAGE_SIZE as u32, 0);
    assert!(kernel.memory().heap().contains(Pa::new(x)));
    assert_eq!(free_blocks(&kernel), free - 2);

    let allocations = kernel.process(shell).unwrap().allocations();
    assert_eq!(allocations.len(), 2);
    assert_eq!(allocations[0].ptr.into_u32(), x);
    assert_eq!(allocations[0].size, 64);

    // Fresh memory is zeroed and usable.
    assert_eq!(user_load(&mut kernel, Va::new(x), 64).unwrap(), [0; 64]);
    user_store(&mut kernel, Va::new(x + 60), b"abcd").unwrap();

    assert_eq!(syscall!(&mut kernel, SyscallNumber::Free, x), 0);
    let allocations = kernel.process(shell).unwrap().allocations();
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0].ptr.into_u32(), y);
    assert_eq!(free_blocks(&kernel), free - 1);
    // The block is gone from the address space.
    let mut buf = [0; 4];
    assert!(kernel.load(Va::new(x), &mut buf).is_err());

    // A second free of the same pointer changes nothing.
    assert_eq!(syscall!(&mut kernel, SyscallNumber::Free, x), 0);
    assert_eq!(kernel.process(shell).unwrap().allocations().len(), 1);
    assert_eq!(free_blocks(&kernel), free - 1);
}

#[test]
fn malloc_failures_return_null() {
    let (mut kernel, shell) = boot_and_launch("shell");
    let free = free_blocks(&kernel);
    assert_eq!(syscall!(&mut kernel, SyscallNumber::Malloc, 0), 0);
    assert_eq!(syscall!(&mut kernel, SyscallNumber::Malloc, 0x7FFF_FFFF), 0);
    assert!(kernel.process(shell).unwrap().allocations().is_empty());
    assert_eq!(free_blocks(&kernel), free);
    assert_eq!(kernel.running_process(), Some(shell));
}

#[test]
fn free_ignores_foreign_pointers() {
    let (mut kernel, shell) = boot_and_launch("shell");
    let x = syscall!(&mut kernel, SyscallNumber::Malloc, 8);
    let free = free_blocks(&kernel);
    assert_eq!(syscall!(&mut kernel, SyscallNumber::Free, 0x1234), 0);
    assert_eq!(syscall!(&mut kernel, SyscallNumber::Free, 0), 0);
    assert_eq!(syscall!(&mut kernel, SyscallNumber::Free, x + 4096), 0);
    assert_eq!(kernel.process(shell).unwrap().allocations().len(), 1);
    assert_eq!(free_blocks(&kernel), free);
}

#[test]
fn the_allocation_table_is_bounded() {
    let (mut kernel, shell) = boot_and_launch("shell");
    let free = free_blocks(&kernel);
    for _ in 0..1024 {
        assert_ne!(syscall!(&mut kernel, SyscallNumber::Malloc, 1), 0);
    }
    let full = free_blocks(&kernel);
    assert_eq!(full, free - 1024);

    assert_eq!(syscall!(&mut kernel, SyscallNumber::Malloc, 1), 0);
    assert_eq!(
        kernel.allocate(shell, 1),
        Err(KernelError::TooManyAllocations)
    );
    assert_eq!(free_blocks(&kernel), full);
    assert_eq!(kernel.process(shell).unwrap().allocations().len(), 1024);

    // Exiting returns all of them.
    syscall!(&mut kernel, SyscallNumber::Exit, 0);
    assert_eq!(free_blocks(&kernel), kernel.memory().heap().total_blocks());
}

#[test]
fn copies_cover_up_to_one_page() {
    let (mut kernel, _) = boot_and_launch("shell");
    let data = pattern(PAGE_SIZE);
    let src = user_buffer(&mut kernel, &data);
    let task = kernel.current_task().unwrap();
    let free = free_blocks(&kernel);

    for size in [1, 2, 7, 100, PAGE_SIZE - 1, PAGE_SIZE] {
        let mut dest = vec![0; size];
        assert_eq!(kernel.copy_from_other_space(task, src, &mut dest), Ok(()));
        assert_eq!(dest, data[..size]);
        // The copy ends in the kernel's space.
        assert_eq!(kernel.cpu().cr3(), Some(kernel.kernel_space().root()));
        reload_current_space(&mut kernel);
    }
    // Unaligned source.
    let mut dest = vec![0; 10];
    kernel.copy_from_other_space(task, src + 3, &mut dest).unwrap();
    assert_eq!(dest, data[3..13]);

    let mut dest = vec![0; PAGE_SIZE + 1];
    assert_eq!(
        kernel.copy_from_other_space(task, src, &mut dest),
        Err(KernelError::InvalidArgument)
    );
    assert_eq!(
        kernel.copy_from_other_space(task, src, &mut []),
        Err(KernelError::InvalidArgument)
    );
    assert_eq!(
        kernel.copy_from_other_space(task, Va::new(0), &mut [0; 4]),
        Err(KernelError::InvalidArgument)
    );
    // The scratch pages are returned.
    assert_eq!(free_blocks(&kernel), free);
}

#[test]
fn copies_read_the_named_space() {
    let (mut kernel, _) = boot_and_launch("shell");
    let prog = spawn(&mut kernel, "prog a").unwrap();
    let shell_task = kernel.current_task().unwrap();
    let prog_task = kernel.process(prog).unwrap().task();
    kernel.tick();
    assert_eq!(kernel.current_task(), Some(prog_task));

    // Both programs find argc at the same address.
    let mut argc = [0; 4];
    kernel
        .copy_from_other_space(shell_task, Va::new(0x003F_F000), &mut argc)
        .unwrap();
    assert_eq!(u32::from_le_bytes(argc), 1);
    kernel
        .copy_from_other_space(prog_task, Va::new(0x003F_F000), &mut argc)
        .unwrap();
    assert_eq!(u32::from_le_bytes(argc), 2);
}

#[test]
fn copies_from_unmapped_memory_fail() {
    let (mut kernel, _) = boot_and_launch("shell");
    let task = kernel.current_task().unwrap();
    let x = syscall!(&mut kernel, SyscallNumber::Malloc, 16) as u32;
    syscall!(&mut kernel, SyscallNumber::Free, x);
    let free = free_blocks(&kernel);

    let mut dest = [0; 16];
    assert_eq!(
        kernel.copy_from_other_space(task, Va::new(x), &mut dest),
        Err(KernelError::BadAddress)
    );
    assert_eq!(free_blocks(&kernel), free);
    assert_eq!(kernel.cpu().cr3(), Some(kernel.kernel_space().root()));

    // A task that is gone.
    let prog = spawn(&mut kernel, "prog").unwrap();
    let stale = kernel.process(prog).unwrap().task();
    kernel.terminate_process(prog, 0);
    assert_eq!(
        kernel.copy_from_other_space(stale, Va::new(0x003F_F000), &mut dest),
        Err(KernelError::InvalidArgument)
    );
}

#[test]
fn arguments_are_read_from_the_saved_stack() {
    let (mut kernel, _) = boot_and_launch("prog a b");
    let task = kernel.current_task().unwrap();
    // Before any syscall, the stack pointer sits on argc and argv.
    assert_eq!(kernel.arg(task, 0), Ok(3));
    assert_eq!(kernel.arg(task, 1), Ok(0x003F_F008));
    assert_eq!(kernel.cpu().cr3(), Some(kernel.kernel_space().root()));
}

#[test]
fn putchar_prints_the_low_byte() {
    let (mut kernel, _) = boot_and_launch("shell");
    assert_eq!(syscall!(&mut kernel, SyscallNumber::Putchar, b'A'), 65);
    assert_eq!(syscall!(&mut kernel, SyscallNumber::Putchar, 0x142), 0x42);
    assert_eq!(kernel.console().text(), "AB");
}

#[test]
fn puts_prints_a_user_buffer() {
    let (mut kernel, _) = boot_and_launch("shell");
    let hello = user_buffer(&mut kernel, b"hello, world");
    assert_eq!(syscall!(&mut kernel, SyscallNumber::Puts, hello.into_u32(), 5), 5);
    assert_eq!(kernel.console().text(), "hello");

    assert_eq!(syscall!(&mut kernel, SyscallNumber::Puts, hello.into_u32(), 0), 0);
    assert_eq!(
        syscall!(&mut kernel, SyscallNumber::Puts, hello.into_u32(), PAGE_SIZE + 1),
        KernelError::InvalidArgument.into_status()
    );
    assert_eq!(
        syscall!(&mut kernel, SyscallNumber::Puts, 0, 4),
        KernelError::InvalidArgument.into_status()
    );
    assert_eq!(kernel.console().text(), "hello");
    assert_eq!(kernel.cpu().privilege(), PrivilegeLevel::Ring3);
}

#[test]
fn puts_of_freed_memory_fails() {
    let (mut kernel, shell) = boot_and_launch("shell");
    let text = user_buffer(&mut kernel, b"gone");
    syscall!(&mut kernel, SyscallNumber::Free, text.into_u32());
    assert_eq!(
        syscall!(&mut kernel, SyscallNumber::Puts, text.into_u32(), 4),
        KernelError::BadAddress.into_status()
    );
    assert!(kernel.console().output().is_empty());
    // A failed syscall does not end the caller.
    assert_eq!(kernel.running_process(), Some(shell));
}

#[test]
fn getchar_reads_the_keyboard() {
    let (mut kernel, shell) = boot_and_launch("shell");
    assert_eq!(syscall!(&mut kernel, SyscallNumber::Getchar), 0);
    kernel.press_key(b'x');
    kernel.press_key(b'y');
    assert_eq!(kernel.process(shell).unwrap().keyboard().len(), 2);
    assert_eq!(syscall!(&mut kernel, SyscallNumber::Getchar), b'x' as i32);
    assert_eq!(syscall!(&mut kernel, SyscallNumber::Getchar), b'y' as i32);
    assert_eq!(syscall!(&mut kernel, SyscallNumber::Getchar), 0);
}

#[test]
fn keys_before_the_first_process_are_kept() {
    let mut kernel = boot();
    kernel.press_key(b'k');
    assert_eq!(kernel.keyboard().len(), 1);
    kernel.launch("shell").unwrap();
    assert_eq!(syscall!(&mut kernel, SyscallNumber::Getchar), b'k' as i32);
    assert!(kernel.keyboard().is_empty());
}

#[test]
fn keys_go_to_the_current_process() {
    let (mut kernel, shell) = boot_and_launch("shell");
    let prog = spawn(&mut kernel, "prog").unwrap();
    assert_eq!(kernel.running_process(), Some(shell));
    kernel.press_key(b'z');
    assert_eq!(kernel.process(prog).unwrap().keyboard().len(), 1);
    assert_eq!(syscall!(&mut kernel, SyscallNumber::Getchar), 0);

    kernel.tick();
    assert_eq!(syscall!(&mut kernel, SyscallNumber::Getchar), b'z' as i32);
}

#[test]
fn exec_starts_a_child_and_exit_returns_to_the_root() {
    let (mut kernel, shell) = boot_and_launch("shell");
    let list = user_command_list(&mut kernel, &["prog", "a", "b"]);
    let free = free_blocks(&kernel);

    assert_eq!(syscall!(&mut kernel, SyscallNumber::Exec, list.into_u32()), 0);
    let prog = kernel.running_process().unwrap();
    assert_ne!(prog, shell);
    assert_eq!(kernel.root_process(), Some(shell));
    assert_eq!(kernel.current_process(), Some(prog));
    assert_eq!(kernel.tasks().len(), 2);
    check_ready_queue(&kernel);
    check_process_table(&kernel);

    // The child sees its arguments.
    let esp = Va::new(kernel.cpu().registers().interrupt_stack_frame.esp);
    assert_eq!(user_load_u32(&mut kernel, esp).unwrap(), 3);
    let argv = Va::new(user_load_u32(&mut kernel, esp + 4).unwrap());
    let last = Va::new(user_load_u32(&mut kernel, argv + 8).unwrap());
    assert_eq!(user_cstr(&mut kernel, last), "b");

    syscall!(&mut kernel, SyscallNumber::Exit, 7);
    assert!(kernel.process(prog).is_none());
    assert_eq!(kernel.running_process(), Some(shell));
    assert_eq!(kernel.current_process(), Some(shell));
    assert_eq!(kernel.tasks().len(), 1);
    // The shell resumes with the result of `exec`.
    assert_eq!(kernel.cpu().registers().gprs.eax, 0);
    assert_eq!(free_blocks(&kernel), free);
    check_ready_queue(&kernel);
    check_process_table(&kernel);
}

#[test]
fn exec_reports_failures_to_the_caller() {
    let (mut kernel, shell) = boot_and_launch("shell");
    let missing = user_command_list(&mut kernel, &["missing"]);
    let empty = user_command_list(&mut kernel, &["empty"]);
    let free = free_blocks(&kernel);

    assert_eq!(
        syscall!(&mut kernel, SyscallNumber::Exec, missing.into_u32()),
        KernelError::NoSuchEntry.into_status()
    );
    assert_eq!(
        syscall!(&mut kernel, SyscallNumber::Exec, empty.into_u32()),
        KernelError::NoExec.into_status()
    );
    assert_eq!(
        syscall!(&mut kernel, SyscallNumber::Exec, 0),
        KernelError::InvalidArgument.into_status()
    );
    assert_eq!(kernel.running_process(), Some(shell));
    assert_eq!(kernel.processes().len(), 1);
    assert_eq!(free_blocks(&kernel), free);
}

#[test]
fn exec_rejects_malformed_lists() {
    let (mut kernel, _) = boot_and_launch("shell");

    // More nodes than words.
    let list = user_command_list(&mut kernel, &["prog", "a"]);
    let blob = user_load_u32(&mut kernel, list).unwrap();
    user_store(&mut kernel, Va::new(blob + 5), &[0]).unwrap();
    assert_eq!(
        syscall!(&mut kernel, SyscallNumber::Exec, list.into_u32()),
        KernelError::InvalidArgument.into_status()
    );

    // A word without its NUL.
    let unterminated = user_buffer(&mut kernel, &[b'a'; 1024]);
    let node = user_buffer(&mut kernel, &[0; 8]);
    user_store(&mut kernel, node, &unterminated.into_u32().to_le_bytes()).unwrap();
    assert_eq!(
        syscall!(&mut kernel, SyscallNumber::Exec, node.into_u32()),
        KernelError::NameTooLong.into_status()
    );
    assert_eq!(kernel.processes().len(), 1);
}

#[test]
fn exec_respects_the_process_limit() {
    let mut kernel = boot_with(config(1));
    let shell = kernel.launch("shell").unwrap();
    let list = user_command_list(&mut kernel, &["prog"]);
    assert_eq!(
        syscall!(&mut kernel, SyscallNumber::Exec, list.into_u32()),
        KernelError::TooManyProcesses.into_status()
    );
    assert_eq!(kernel.running_process(), Some(shell));
    assert_eq!(kernel.process(Pid::new(0)).map(|p| p.pid()), Some(shell));
}

#[test]
fn unknown_syscalls_return_zero() {
    let (mut kernel, shell) = boot_and_launch("shell");
    assert_eq!(invoke_raw_syscall(&mut kernel, 9, &[1, 2]), 0);
    assert_eq!(invoke_raw_syscall(&mut kernel, 15, &[]), 0);
    assert_eq!(invoke_raw_syscall(&mut kernel, 0xFFFF_FFFF, &[]), 0);
    assert_eq!(kernel.running_process(), Some(shell));
}

#[test]
#[should_panic(expected = "Syscall 0 is already registered.")]
fn registering_twice_panics() {
    let mut table = SyscallTable::new();
    register_syscalls(&mut table);
    table.register(SyscallNumber::Exec as usize, nop);
}

#[test]
#[should_panic(expected = "Syscall 16 is out of bounds.")]
fn registering_out_of_range_panics() {
    let mut table = SyscallTable::new();
    table.register(16, nop);
}

#[test]
fn registered_numbers_resolve() {
    let mut table = SyscallTable::new();
    table.register(9, nop);
    assert!(table.get(9).is_some());
    assert!(table.get(8).is_none());
    assert!(table.get(16).is_none());
}
