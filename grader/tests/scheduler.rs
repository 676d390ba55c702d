use grader::{
    abyss::{addressing::Va, interrupt::Registers, x86::PrivilegeLevel},
    boot, boot_and_launch, check_process_table, check_ready_queue,
    spawn,
    taios::{
        process::{Pid, ProcessState},
        task::{ReadyQueue, Task, TaskId},
    },
};

fn task(pid: usize) -> Task {
    Task::new(Pid::new(pid), Va::new(0x0040_0000), Va::new(0x003F_F000))
}

fn queue(n: usize) -> (ReadyQueue, Vec<TaskId>) {
    let mut queue = ReadyQueue::new();
    let ids = (0..n).map(|i| queue.push(task(i))).collect();
    (queue, ids)
}

#[test]
fn push_appends_at_the_tail() {
    let (queue, ids) = queue(3);
    assert_eq!(queue.len(), 3);
    assert_eq!(queue.head(), Some(ids[0]));
    assert_eq!(queue.tail(), Some(ids[2]));
    // The first task pushed becomes current.
    assert_eq!(queue.current(), Some(ids[0]));
    assert_eq!(queue.iter().collect::<Vec<_>>(), ids);
    assert_eq!(queue.links(ids[1]), Some((Some(ids[0]), Some(ids[2]))));
}

#[test]
fn next_visits_every_task_then_wraps() {
    let (mut queue, ids) = queue(4);
    let mut seen = Vec::new();
    for _ in 0..4 {
        let next = queue.next();
        queue.set_current(next);
        seen.push(next);
    }
    assert_eq!(seen, vec![ids[1], ids[2], ids[3], ids[0]]);
    assert_eq!(queue.current(), Some(ids[0]));
}

#[test]
fn a_single_task_is_its_own_successor() {
    let (queue, ids) = queue(1);
    assert_eq!(queue.next(), ids[0]);
}

#[test]
fn removing_from_the_middle_relinks_neighbors() {
    let (mut queue, ids) = queue(4);
    let removed = queue.remove(ids[1]);
    assert_eq!(removed.process(), Pid::new(1));
    assert_eq!(queue.len(), 3);
    assert_eq!(queue.links(ids[0]), Some((None, Some(ids[2]))));
    assert_eq!(queue.links(ids[2]), Some((Some(ids[0]), Some(ids[3]))));
    assert_eq!(queue.iter().collect::<Vec<_>>(), vec![ids[0], ids[2], ids[3]]);
    assert_eq!(queue.current(), Some(ids[0]));
}

#[test]
fn removing_the_ends_moves_head_and_tail() {
    let (mut queue, ids) = queue(3);
    queue.remove(ids[2]);
    assert_eq!(queue.tail(), Some(ids[1]));
    assert_eq!(queue.links(ids[1]), Some((Some(ids[0]), None)));
    queue.remove(ids[0]);
    assert_eq!(queue.head(), Some(ids[1]));
    assert_eq!(queue.tail(), Some(ids[1]));
    assert_eq!(queue.links(ids[1]), Some((None, None)));
}

#[test]
fn removing_current_resumes_at_its_successor() {
    let (mut queue, ids) = queue(4);
    queue.set_current(ids[2]);
    queue.remove(ids[2]);
    assert_eq!(queue.current(), Some(ids[1]));
    assert_eq!(queue.next(), ids[3]);

    // The head's predecessor is the tail.
    queue.set_current(ids[0]);
    queue.remove(ids[0]);
    assert_eq!(queue.current(), Some(ids[3]));
    assert_eq!(queue.next(), ids[1]);
}

#[test]
fn removing_the_last_task_clears_current() {
    let (mut queue, ids) = queue(1);
    queue.remove(ids[0]);
    assert!(queue.is_empty());
    assert_eq!(queue.current(), None);
    assert_eq!(queue.head(), None);
    assert_eq!(queue.tail(), None);
}

#[test]
fn stale_ids_never_resolve() {
    let (mut queue, ids) = queue(2);
    queue.remove(ids[1]);
    let reused = queue.push(task(7));
    assert_ne!(reused, ids[1]);
    assert!(!queue.contains(ids[1]));
    assert!(queue.get(ids[1]).is_none());
    assert_eq!(queue.get(reused).map(|t| t.process()), Some(Pid::new(7)));
}

#[test]
fn tasks_are_found_by_their_root() {
    let (queue, ids) = queue(3);
    for id in &ids {
        let root = queue.get(*id).unwrap().space().root();
        assert_eq!(queue.find_by_root(root), Some(*id));
    }
}

#[test]
#[should_panic(expected = "Scheduling with an empty ready queue.")]
fn next_on_an_empty_queue_panics() {
    ReadyQueue::new().next();
}

#[test]
#[should_panic(expected = "which is not in the ready queue.")]
fn removing_twice_panics() {
    let (mut queue, ids) = queue(2);
    queue.remove(ids[0]);
    queue.remove(ids[0]);
}

#[test]
#[should_panic(expected = "Scheduling with an empty ready queue.")]
fn switching_without_tasks_panics() {
    let mut kernel = boot();
    kernel.switch_task();
}

#[test]
fn timer_rotates_between_processes() {
    let (mut kernel, shell) = boot_and_launch("shell");
    let t1 = kernel.current_task().unwrap();
    let prog = spawn(&mut kernel, "prog").unwrap();
    let t2 = kernel.process(prog).unwrap().task();
    let acks = kernel.pic().acks();

    kernel.tick();
    assert_eq!(kernel.current_task(), Some(t2));
    assert_eq!(kernel.running_process(), Some(prog));
    assert_eq!(kernel.process(prog).unwrap().state(), ProcessState::Running);
    assert_eq!(kernel.cpu().privilege(), PrivilegeLevel::Ring3);
    assert_eq!(kernel.cpu().registers().interrupt_stack_frame.eip, 0x0040_0000);
    assert_eq!(
        kernel.cpu().cr3(),
        Some(kernel.task(t2).unwrap().space().root())
    );

    kernel.tick();
    assert_eq!(kernel.current_task(), Some(t1));
    assert_eq!(kernel.running_process(), Some(shell));
    assert_eq!(kernel.pic().acks(), acks + 2);
    check_ready_queue(&kernel);
    check_process_table(&kernel);
}

#[test]
fn a_preempted_task_resumes_where_it_left_off() {
    let (mut kernel, _) = boot_and_launch("shell");
    spawn(&mut kernel, "prog").unwrap();
    {
        let regs = kernel.cpu_mut().registers_mut();
        regs.gprs.ebx = 0x1234;
        *regs.eip() = 0x0040_0010;
    }
    kernel.tick();
    assert_eq!(kernel.cpu().registers().gprs.ebx, 0);
    kernel.tick();
    assert_eq!(kernel.cpu().registers().gprs.ebx, 0x1234);
    assert_eq!(kernel.cpu().registers().interrupt_stack_frame.eip, 0x0040_0010);
}

#[test]
fn an_undispatched_task_keeps_its_initial_state() {
    let mut kernel = boot();
    let prog = spawn(&mut kernel, "prog").unwrap();
    let task = kernel.process(prog).unwrap().task();
    assert_eq!(kernel.current_task(), Some(task));
    assert_eq!(kernel.process(prog).unwrap().state(), ProcessState::Ready);

    // Some user context that does not belong to the task is interrupted.
    let mut stray = Registers::new();
    *stray.eip() = 0xDEAD_0000;
    kernel.cpu_mut().iret(&stray);
    kernel.tick();

    assert_eq!(kernel.task(task).unwrap().registers().interrupt_stack_frame.eip, 0x0040_0000);
    assert_eq!(kernel.cpu().registers().interrupt_stack_frame.eip, 0x0040_0000);
    assert_eq!(kernel.cpu().registers().interrupt_stack_frame.esp, 0x003F_F000);
    assert_eq!(kernel.process(prog).unwrap().state(), ProcessState::Running);
}

#[test]
#[should_panic(expected = "which is not in the ready queue.")]
fn saving_a_freed_task_panics() {
    let (mut kernel, _) = boot_and_launch("shell");
    let prog = spawn(&mut kernel, "prog").unwrap();
    let task = kernel.process(prog).unwrap().task();
    kernel.terminate_process(prog, 0);
    kernel.save_task_state(task, &Registers::new());
}
