//! HP 2100/1000 microcode core - CLI Entry Point
//!
//! Commands:
//! - `hp2100-ucode run <image.json>` - Execute EAU/UIG instructions from a machine image
//! - `hp2100-ucode decode <octal>` - Show how an instruction word is decoded and routed
//! - `hp2100-ucode test` - Built-in self-test

use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;

use hp2100::cpu::decode::{classify, Group};
use hp2100::cpu::dispatch::{route_uig0, route_uig1, Route};
use hp2100::cpu::eau::{decode_eau, EauDecode};
use hp2100::{
    Cpu, CpuModel, CpuOption, CpuOptions, InstructionWord, MachineImage, MemoryAccess, Status,
};

#[derive(Parser)]
#[command(name = "hp2100-ucode")]
#[command(version = "0.1.0")]
#[command(about = "EAU and firmware option dispatch for HP 2100/1000 CPU simulation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run from a machine image until an unhandled instruction or a stop
    Run {
        /// Path to the JSON machine image
        image: String,
        /// Maximum number of instructions to execute
        #[arg(short, long, default_value = "10000")]
        max_steps: u64,
        /// Print each instruction as it executes
        #[arg(short, long)]
        trace: bool,
        /// Hold the interrupt request line asserted
        #[arg(short, long)]
        interrupt: bool,
        /// Write the final machine state to this image
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Decode an octal instruction word
    Decode {
        /// Instruction word in octal
        word: String,
        /// CPU model (2114, 2115, 2116, 2100, 1000-M, 1000-E, 1000-F)
        #[arg(short, long, default_value = "1000-E")]
        model: CpuModel,
        /// On a 2100, install the I/O Processor instead of the floating-point options
        #[arg(long)]
        iop: bool,
        /// Leave the EAU out on models where it is optional
        #[arg(long)]
        no_eau: bool,
    },
    /// Run the built-in self-test
    Test,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG selects which events are printed.
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?;
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    match cli.command {
        Some(Commands::Run {
            image,
            max_steps,
            trace,
            interrupt,
            output,
        }) => run_image(&image, max_steps, trace, interrupt, output.as_deref()),
        Some(Commands::Decode {
            word,
            model,
            iop,
            no_eau,
        }) => decode_word(&word, model, iop, no_eau),
        Some(Commands::Test) => run_self_test(),
        None => {
            println!("HP 2100/1000 microcode core v0.1.0");
            println!("EAU, User Instruction Group dispatch and operand processing");
            println!();
            println!("Use --help for available commands");
        }
    }
    Ok(())
}

fn run_image(path: &str, max_steps: u64, trace: bool, interrupt: bool, output: Option<&str>) {
    let image = match MachineImage::load(path) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Failed to load image: {}", e);
            std::process::exit(1);
        }
    };
    println!(
        "Loaded {} ({} CPU, {} memory blocks)",
        path,
        image.options.model(),
        image.memory.len()
    );

    let mut cpu = Cpu::with_machine(image.to_machine());

    println!();
    println!("━━━ Execution ━━━");

    let mut steps = 0u64;
    let mut stop = None;
    while cpu.is_running() && steps < max_steps {
        let p = cpu.machine.regs.p;
        let word = cpu.machine.mem.read_word(p);
        match cpu.step(interrupt) {
            Ok(status) => {
                if trace {
                    let regs = &cpu.machine.regs;
                    println!(
                        "{:05o}: {:06o}  {:?}  A={:06o} B={:06o} O={}",
                        p, word, status, regs.a, regs.b, regs.o as u8
                    );
                }
                if status != Status::NotHandled {
                    steps += 1;
                }
            }
            Err(e) => {
                stop = Some(e);
                break;
            }
        }
    }

    let regs = &cpu.machine.regs;
    println!();
    println!("━━━ Result ━━━");
    println!("Steps: {}", steps);
    println!("State: {:?}", cpu.state);
    println!("A: {:06o}", regs.a);
    println!("B: {:06o}", regs.b);
    println!("P: {:05o}", regs.p);
    println!("O: {}", regs.o as u8);

    if let Some(path) = output {
        match MachineImage::capture(&cpu.machine).save(path) {
            Ok(()) => println!("Saved to {}", path),
            Err(e) => {
                eprintln!("Failed to save image: {}", e);
                std::process::exit(1);
            }
        }
    }

    if let Some(e) = stop {
        eprintln!("Stopped at P={:05o}: {}", cpu.machine.regs.p, e);
        std::process::exit(1);
    }
    if steps >= max_steps {
        println!();
        println!("Reached step limit ({}). Use --max-steps to increase.", max_steps);
    }
}

fn decode_word(text: &str, model: CpuModel, iop: bool, no_eau: bool) {
    let digits = text.trim().trim_start_matches("0o");
    let ir = match u16::from_str_radix(digits, 8) {
        Ok(raw) => InstructionWord::new(raw),
        Err(e) => {
            eprintln!("Not an octal word: {} ({})", text, e);
            std::process::exit(1);
        }
    };

    let mut options = CpuOptions::new(model);
    for option in CpuOption::ALL {
        if option == CpuOption::IoProcessor && model == CpuModel::Hp2100 && !iop {
            continue;
        }
        if option == CpuOption::Eau && no_eau {
            continue;
        }
        let _ = options.install(option);
    }

    println!(
        "{}  group {:03o}  module {:02o}  immediate {:02o}",
        ir,
        ir.group(),
        ir.module(),
        ir.immediate()
    );

    let route = match classify(ir) {
        Group::Eau(group) => {
            match decode_eau(&options, group, ir) {
                EauDecode::Op(op) => println!("EAU {} on the {}", op, model),
                EauDecode::Nop => println!("NOP (RRR 16 on the {})", model),
                EauDecode::Undefined if !options.has(CpuOption::Eau) => {
                    println!("EAU {:?} group, no EAU installed on the {}", group, model)
                }
                EauDecode::Undefined => {
                    println!("EAU {:?} group, undefined on the {}", group, model)
                }
            }
            return;
        }
        Group::Uig0 => route_uig0(&options, ir),
        Group::Uig1 => route_uig1(&options, ir),
        Group::Other => {
            println!("Not an EAU or UIG instruction");
            return;
        }
    };
    match route {
        Route::To { feature, ir: routed } if routed == ir => println!("{:?}", feature),
        Route::To { feature, ir: routed } => println!("{:?} as {}", feature, routed),
        Route::Undefined => println!("Undefined on the {}", model),
    }
}

fn run_self_test() {
    use hp2100::cpu::eau::{arithmetic_left, divide};
    use hp2100::cpu::{Feature, Invocation, Machine};
    use hp2100::word::INDIRECT;
    use hp2100::CpuError;

    println!("━━━ HP 2100/1000 Microcode Self-Test ━━━");
    println!();

    let mut passed = 0;
    let mut failed = 0;
    let mut check = |name: &str, ok: bool| {
        if ok {
            println!("{}... ✓", name);
            passed += 1;
        } else {
            println!("{}... ✗", name);
            failed += 1;
        }
    };

    check("ASL overflow on sign change", arithmetic_left(0x4000_0000, 1) == (0, true));
    check("DIV -7 / 2", divide(0xFFFF_FFF9, 2) == Some((0xFFFD, 0xFFFF)));
    check("DIV overflow", divide(0x0001_0000, 1).is_none());

    let mut cpu = Cpu::default();
    cpu.machine.mem.load(0o100, &[0o100200, 0o102, 0o177777]);
    cpu.machine.regs.p = 0o100;
    cpu.machine.regs.a = 0o177777;
    let ok = cpu.step(false).is_ok() && cpu.machine.regs.a == 1 && cpu.machine.regs.b == 0;
    check("MPY -1 * -1", ok);

    let mut cpu = Cpu::default();
    cpu.bind(
        Feature::FloatingPoint,
        |m: &mut Machine, call: Invocation| -> Result<Status, CpuError> {
            m.regs.b = call.ir.raw();
            Ok(Status::Completed)
        },
    );
    let ok = cpu.classify_and_execute(InstructionWord::new(0o105004), false).is_ok()
        && cpu.machine.regs.b == 0o105004;
    check("UIG 0 dispatch to bound handler", ok);

    let undefined = cpu.classify_and_execute(InstructionWord::new(0o105160), false);
    check(
        "Undefined UIG 0 module",
        matches!(undefined, Err(CpuError::UndefinedInstruction(_))),
    );

    let mut cpu = Cpu::default();
    let mem = &mut cpu.machine.mem;
    mem.load(0o100, &[0o104200, INDIRECT | 0o200]);
    mem.load(0o200, &[INDIRECT | 0o201, INDIRECT | 0o202, INDIRECT | 0o203, 0o300]);
    cpu.machine.regs.p = 0o100;
    let deferred = cpu.step(true);
    let ok = deferred == Ok(Status::Deferred) && cpu.machine.regs.p == 0o100;
    check("Indirect chain deferred for interrupt", ok);

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Results: {} passed, {} failed", passed, failed);

    if failed == 0 {
        println!("✓ All tests passed!");
    } else {
        std::process::exit(1);
    }
}
