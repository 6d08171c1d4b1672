//! 6502 single-board computer emulator binary.
//!
//! Builds a board from a JSON description (or the built-in default),
//! loads a program, runs it headless for a cycle budget and prints what
//! the machine ended up showing: registers, LCD contents and serial
//! output.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use emu_sbc::{
    Board, BoardConfig, ClockEngine, EngineError, ImageLoadError, Program, RunRate, StopReason,
    config::parse_address,
};
use hitachi_hd44780::Hd44780;
use mos_acia_6551::Acia6551;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "emu-sbc", about = "Cycle-accurate 6502 single-board computer emulator")]
struct Args {
    /// Board description (JSON). Defaults to RAM, ACIA, VIA, LCD and 32K ROM.
    #[arg(long, value_name = "FILE")]
    board: Option<PathBuf>,

    /// Program to load: a raw binary or a vasm `.lst` listing.
    #[arg(long, value_name = "FILE")]
    load: Option<PathBuf>,

    /// Load address for the program (hex with `$` or `0x`, or decimal).
    /// Listings default to their own origin, binaries to $0000.
    #[arg(long, value_name = "ADDR", value_parser = parse_u16)]
    load_address: Option<u16>,

    /// Start executing here instead of at the reset vector.
    #[arg(long, value_name = "ADDR", value_parser = parse_u16)]
    start: Option<u16>,

    /// Clock rate in Hz. Runs as fast as possible when omitted.
    #[arg(long, value_name = "HZ")]
    rate: Option<u64>,

    /// Cycles to run before stopping.
    #[arg(long, default_value_t = 1_000_000)]
    cycles: u64,

    /// Stop when an instruction is about to be fetched from ADDR.
    #[arg(long = "break", value_name = "ADDR", value_parser = parse_u16)]
    breakpoints: Vec<u16>,

    /// Log every executed instruction.
    #[arg(long, default_value_t = false)]
    trace: bool,

    /// Log filter, e.g. `debug` or `emu_sbc=trace`. Overrides RUST_LOG.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn parse_u16(raw: &str) -> Result<u16, String> {
    let value = parse_address(raw)?;
    u16::try_from(value).map_err(|_| format!("{raw} is outside the 16-bit address space"))
}

fn init_logging(args: &Args) {
    let mut filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    if args.trace {
        if let Ok(directive) = "emu_sbc::board=trace".parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ---------------------------------------------------------------------------
// Headless run
// ---------------------------------------------------------------------------

/// Put the program on the board. RAM targets get ordinary bus writes; a
/// program aimed at ROM is burned in instead.
fn install(
    board: &mut Board,
    program: &Program,
    address: Option<u16>,
) -> Result<u16, ImageLoadError> {
    match board.load_program(program, address) {
        Err(ImageLoadError::ReadOnly { .. }) => {
            let address = address.or(program.origin()).unwrap_or(0);
            board.program_rom(address, program.bytes())?;
            Ok(address)
        }
        other => other,
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let config = match &args.board {
        Some(path) => BoardConfig::from_path(path)?,
        None => BoardConfig::default(),
    };
    let mut board = Board::new(&config)?;
    board.set_trace(args.trace);
    for &address in &args.breakpoints {
        board.debugger_mut().add_breakpoint(address);
    }

    let program = match &args.load {
        Some(path) => {
            let program = Program::from_path(path)?;
            let address = install(&mut board, &program, args.load_address)?;
            tracing::info!(
                path = %path.display(),
                address = format_args!("${address:04X}"),
                len = program.bytes().len(),
                "program loaded"
            );
            Some(program)
        }
        None => None,
    };

    if let Some(start) = args.start {
        board.set_program_counter(start);
    }

    let mut engine = ClockEngine::new(board);
    let rate = args.rate.map_or(RunRate::Unlimited, RunRate::Hz);
    engine.run_for(rate, args.cycles)?;
    let reason = engine.wait()?;

    let shared = engine.board();
    let mut board = shared.lock().map_err(|_| EngineError::Poisoned)?;
    print_summary(&mut board, reason, program.as_ref());
    Ok(())
}

fn print_summary(board: &mut Board, reason: Option<StopReason>, program: Option<&Program>) {
    let snapshot = board.snapshot();
    let regs = snapshot.registers;

    match reason {
        Some(StopReason::Budget) | None => println!("Stopped after {} cycles", snapshot.cycles),
        Some(StopReason::Breakpoint(pc)) => println!("Breakpoint at ${pc:04X}"),
        Some(StopReason::Halted(illegal)) => println!("Halted: {illegal}"),
        Some(StopReason::Requested) => println!("Stopped"),
    }
    println!("{regs} cycles={}", snapshot.cycles);

    if let Some(last) = snapshot.last_instruction {
        let source = program
            .and_then(|p| p.source_at(last.address))
            .map(|line| format!("    ; {}: {}", line.line, line.text.trim()))
            .unwrap_or_default();
        println!("Last: ${:04X}  {last}{source}", last.address);
    }
    if !board.is_halted() {
        for next in board.disassemble(regs.pc, 3) {
            println!("Next: ${:04X}  {next}", next.address);
        }
    }

    let devices: Vec<(String, &'static str)> = board
        .bus()
        .devices()
        .map(|id| (board.bus().name(id).to_string(), board.bus().device(id).kind()))
        .collect();

    for (name, kind) in devices {
        match kind {
            "lcd" => {
                if let Some(lcd) = board.device::<Hd44780>(&name) {
                    println!("{name}:");
                    for row in 0..lcd.lines() {
                        if let Some(text) = lcd.visible_line(row) {
                            println!("  |{text}|");
                        }
                    }
                }
            }
            "acia" => {
                if let Some(acia) = board.device_mut::<Acia6551>(&name) {
                    let sent = acia.take_transmitted();
                    if !sent.is_empty() {
                        println!("{name}: {}", String::from_utf8_lossy(&sent));
                    }
                }
            }
            _ => {}
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
