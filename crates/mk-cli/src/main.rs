use clap::{Parser, Subcommand};
use log::info;
use mk_arch::{Memory, PhysAddr, SimpleMemory, VirtAddr, PAGE_SIZE};
use mk_boot::{load_root_task, BootInfo, BootModule};
use mk_kernel::message::Message;
use mk_kernel::thread::ipc::{RecvOutcome, SendOutcome};
use mk_kernel::{Kernel, KernelConfig};
use std::error::Error;

const SCENARIOS: &[&str] = &["boot", "rendezvous", "fifo"];

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a built-in scenario against an in-process kernel and print
    /// the outcome. There is no user binary to load here — see `mk-test`
    /// for the full conformance suite this exercises a slice of.
    Run {
        /// Scenario to run (see `list`).
        #[arg(long, default_value = "rendezvous")]
        scenario: String,

        /// Physical memory given to the simulated machine, in bytes.
        #[arg(long, default_value_t = 4 * 1024 * 1024)]
        memory: usize,
    },
    /// List the scenario names `run --scenario` accepts.
    List,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { scenario, memory } => run_scenario(&scenario, memory)?,
        Commands::List => {
            for name in SCENARIOS {
                println!("{name}");
            }
        }
    }

    Ok(())
}

fn run_scenario(name: &str, memory_size: usize) -> Result<(), Box<dyn Error>> {
    match name {
        "boot" => scenario_boot(memory_size),
        "rendezvous" => scenario_rendezvous(memory_size),
        "fifo" => scenario_fifo(memory_size),
        other => {
            Err(format!("unknown scenario {other:?}; run `mk-cli list` to see valid names").into())
        }
    }
}

fn new_kernel(memory_size: usize) -> (SimpleMemory, Kernel) {
    let mut memory = SimpleMemory::new(memory_size);
    let config = KernelConfig {
        phys_frame_count: (memory_size as u32) / PAGE_SIZE,
        async_queue_capacity: 4,
        reserved_ranges: vec![(0, 16)],
    };
    let kernel = Kernel::new(config, &mut memory).expect("kernel init with a fresh simulated machine cannot fail");
    (memory, kernel)
}

/// Loads a synthetic one-page root task module and drives the boot
/// handoff end to end.
fn scenario_boot(memory_size: usize) -> Result<(), Box<dyn Error>> {
    let (mut memory, mut kernel) = new_kernel(memory_size);

    let module_phys_base = 0x10_0000;
    let body = vec![0x13u8; PAGE_SIZE as usize];
    memory.copy_to(PhysAddr::new(module_phys_base), &body)?;

    let info = BootInfo {
        phys_mem_bound: (memory_size as u32) / PAGE_SIZE,
        modules: vec![BootModule {
            phys_start: PhysAddr::new(module_phys_base),
            phys_end: PhysAddr::new(module_phys_base + body.len() as u32),
            cmdline: Some("sigma0".into()),
        }],
    };

    let thread = load_root_task(&mut kernel, &mut memory, &info)?;
    let tcb = kernel.threads.get(thread).expect("just-created thread is present");
    info!("root task thread {:?} entering at {:#x}", thread, tcb.registers.pc.val());
    println!("root task loaded: thread={thread:?} state={:?} pc={:#x}", tcb.state, tcb.registers.pc.val());
    Ok(())
}

/// Two kernel threads, A sending to B before B calls recv — the basic
/// rendezvous path with no blocking on either side.
fn scenario_rendezvous(memory_size: usize) -> Result<(), Box<dyn Error>> {
    let (mut memory, mut kernel) = new_kernel(memory_size);

    let a = kernel
        .threads
        .create_kthread(&mut kernel.frames, &mut kernel.spaces, VirtAddr::new(0x1000), 0)
        .expect("create thread A");
    let b = kernel
        .threads
        .create_kthread(&mut kernel.frames, &mut kernel.spaces, VirtAddr::new(0x2000), 0)
        .expect("create thread B");
    let _ = &mut memory;

    let msg = Message::new(7, [1, 2, 3, 4]);
    match kernel.threads.send(a, b, msg).expect("send to a live thread") {
        SendOutcome::Delivered => println!("A -> B delivered without blocking"),
        SendOutcome::Blocked => println!("A -> B blocked (unexpected for this scenario)"),
    }

    match kernel.threads.recv(b, Some(a)) {
        RecvOutcome::Delivered(received) => {
            println!(
                "B received from {}: type={} data={:?}",
                received.sender, received.type_, received.data
            );
        }
        RecvOutcome::Blocked => println!("B blocked waiting on A (unexpected for this scenario)"),
    }

    Ok(())
}

/// Three senders queue on one receiver; recv(None) drains them in the
/// order they arrived.
fn scenario_fifo(memory_size: usize) -> Result<(), Box<dyn Error>> {
    let (mut memory, mut kernel) = new_kernel(memory_size);
    let _ = &mut memory;

    let receiver = kernel
        .threads
        .create_kthread(&mut kernel.frames, &mut kernel.spaces, VirtAddr::new(0x1000), 0)
        .expect("create receiver");

    let mut senders = Vec::new();
    for i in 0..3u32 {
        let sender = kernel
            .threads
            .create_kthread(&mut kernel.frames, &mut kernel.spaces, VirtAddr::new(0x2000 + i * 0x1000), 0)
            .expect("create sender");
        let outcome = kernel
            .threads
            .send(sender, receiver, Message::new(i, [i, 0, 0, 0]))
            .expect("send to a live receiver");
        println!("sender {i} -> {:?}", outcome);
        senders.push(sender);
    }

    for _ in 0..senders.len() {
        match kernel.threads.recv(receiver, None) {
            RecvOutcome::Delivered(msg) => {
                println!("receiver got type={} from sender handle {}", msg.type_, msg.sender)
            }
            RecvOutcome::Blocked => println!("receiver blocked (unexpected: senders are queued)"),
        }
    }

    Ok(())
}
