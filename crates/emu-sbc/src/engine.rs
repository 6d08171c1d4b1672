//! Clock engine: single-step and continuous running.
//!
//! The board sits behind one mutex. Every board-mutating operation takes
//! the lock, so a tick is never observed half-applied and an image load
//! can never overlap a tick. Continuous running happens on a background
//! thread that takes the lock for a batch of about a millisecond of
//! emulated time, checking the stop flag before every cycle. A stop
//! request therefore lands within one cycle and leaves the CPU wherever it
//! was, mid-instruction or not.
//!
//! At a fixed rate the thread sleeps between batches until wall-clock time
//! catches up with emulated time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use emu_core::{MasterClock, Ticks};
use mos_6502::{DecodedInstruction, IllegalOpcode};
use thiserror::Error;

use crate::board::Board;
use crate::error::ImageLoadError;

/// Emulated time covered by one locked batch.
const BATCH_INTERVAL: Duration = Duration::from_millis(1);

/// Cycles per batch when running flat out.
const UNLIMITED_BATCH: u64 = 10_000;

/// Cycles [`ClockEngine::step_over`] waits for a subroutine to return: ten
/// seconds at 1 MHz.
pub const STEP_OVER_CYCLES: u64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunRate {
    /// As fast as the host allows.
    Unlimited,
    /// Paced to this many cycles per second.
    Hz(u64),
}

/// Why continuous running ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called.
    Requested,
    /// The next fetch would come from this breakpoint.
    Breakpoint(u16),
    Halted(IllegalOpcode),
    /// The cycle budget ran out.
    Budget,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("CPU halted: {0}")]
    Halted(IllegalOpcode),

    #[error("subroutine at ${target:04X} did not return within {cycles} cycles")]
    NoReturn { target: u16, cycles: u64 },

    #[error("board is running; stop it first")]
    Running,

    #[error("board lock poisoned by a panic during emulation")]
    Poisoned,

    #[error(transparent)]
    Image(#[from] ImageLoadError),
}

pub struct ClockEngine {
    board: Arc<Mutex<Board>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<Result<StopReason, EngineError>>>,
}

impl ClockEngine {
    #[must_use]
    pub fn new(board: Board) -> Self {
        Self {
            board: Arc::new(Mutex::new(board)),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Shared handle for observers. Hold the lock briefly: the run thread
    /// waits on it between batches.
    #[must_use]
    pub fn board(&self) -> Arc<Mutex<Board>> {
        Arc::clone(&self.board)
    }

    /// Flag that ends a run or a `step_over` when set. Lets another thread
    /// interrupt a subroutine that never returns.
    #[must_use]
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Board>, EngineError> {
        self.board.lock().map_err(|_| EngineError::Poisoned)
    }

    /// Run `f` with exclusive access to the board.
    pub fn with_board<R>(&self, f: impl FnOnce(&mut Board) -> R) -> Result<R, EngineError> {
        Ok(f(&mut *self.lock()?))
    }

    fn idle(&self) -> Result<MutexGuard<'_, Board>, EngineError> {
        if self.is_running() {
            return Err(EngineError::Running);
        }
        self.lock()
    }

    /// Advance exactly one bus cycle.
    pub fn tick(&self) -> Result<(), EngineError> {
        self.idle()?.tick();
        Ok(())
    }

    /// Tick until an instruction completes.
    pub fn step_instruction(&self) -> Result<DecodedInstruction, EngineError> {
        self.idle()?
            .step_instruction()
            .map_err(EngineError::Halted)
    }

    /// Like [`step_instruction`](Self::step_instruction), except that a
    /// JSR runs until its subroutine returns. A breakpoint inside the
    /// subroutine or a `stop()` from another thread ends it early.
    ///
    /// The subroutine has returned once the stack pointer is back at or
    /// above its level before the JSR, so a routine that discards its
    /// return address with PLA/PLA counts as returned. One that never
    /// unwinds fails after [`STEP_OVER_CYCLES`].
    pub fn step_over(&self) -> Result<DecodedInstruction, EngineError> {
        self.step_over_within(STEP_OVER_CYCLES)
    }

    /// [`step_over`](Self::step_over) with a budget of `cycles`.
    pub fn step_over_within(&self, cycles: u64) -> Result<DecodedInstruction, EngineError> {
        let (first, entry_s, deadline) = {
            let mut board = self.idle()?;
            if !board.at_subroutine_call() {
                return board.step_instruction().map_err(EngineError::Halted);
            }
            let entry_s = board.cpu().regs.s;
            let deadline = board.cycles().saturating_add(cycles);
            (board.step_instruction().map_err(EngineError::Halted)?, entry_s, deadline)
        };

        self.stop.store(false, Ordering::SeqCst);
        let mut last = first;
        loop {
            let mut board = self.lock()?;
            // Bytes pushed since the JSR; a pull can overshoot by up to three
            let nested = entry_s.wrapping_sub(board.cpu().regs.s);
            if matches!(nested, 0 | 0xFD..=0xFF) || self.stop.load(Ordering::SeqCst) {
                return Ok(last);
            }
            if board.at_breakpoint() {
                tracing::info!(pc = format_args!("${:04X}", board.cpu().regs.pc), "breakpoint");
                return Ok(last);
            }
            if board.cycles() >= deadline {
                tracing::warn!(
                    target = format_args!("${:04X}", first.operand_value()),
                    cycles,
                    "subroutine did not return"
                );
                return Err(EngineError::NoReturn {
                    target: first.operand_value(),
                    cycles,
                });
            }
            last = board.step_instruction().map_err(EngineError::Halted)?;
        }
    }

    /// Start running continuously on a background thread.
    pub fn run(&mut self, rate: RunRate) -> Result<(), EngineError> {
        self.spawn(rate, None)
    }

    /// Run continuously for at most `cycles` cycles.
    pub fn run_for(&mut self, rate: RunRate, cycles: u64) -> Result<(), EngineError> {
        self.spawn(rate, Some(cycles))
    }

    fn spawn(&mut self, rate: RunRate, budget: Option<u64>) -> Result<(), EngineError> {
        if self.is_running() {
            return Err(EngineError::Running);
        }
        // Collect a finished run so its handle is not leaked
        self.join()?;

        self.stop.store(false, Ordering::SeqCst);
        let board = Arc::clone(&self.board);
        let stop = Arc::clone(&self.stop);
        tracing::info!(?rate, ?budget, "run");
        self.worker = Some(thread::spawn(move || run_loop(&board, &stop, rate, budget)));
        Ok(())
    }

    /// Stop continuous running. Returns why the run ended, or None if the
    /// engine was not running.
    pub fn stop(&mut self) -> Result<Option<StopReason>, EngineError> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = &self.worker {
            worker.thread().unpark();
        }
        self.join()
    }

    /// Block until the current run ends on its own (breakpoint, halt or
    /// budget).
    pub fn wait(&mut self) -> Result<Option<StopReason>, EngineError> {
        self.join()
    }

    fn join(&mut self) -> Result<Option<StopReason>, EngineError> {
        let Some(worker) = self.worker.take() else {
            return Ok(None);
        };
        let reason = worker.join().map_err(|_| EngineError::Poisoned)??;
        tracing::info!(?reason, "stopped");
        Ok(Some(reason))
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Assert RESET on the board. Allowed while running.
    pub fn reset(&self) -> Result<(), EngineError> {
        self.lock()?.reset();
        Ok(())
    }

    /// Write an image through the bus. Never overlaps a tick.
    pub fn load_image(&self, address: u16, bytes: &[u8]) -> Result<(), EngineError> {
        self.lock()?.load_image(address, bytes)?;
        Ok(())
    }
}

impl Drop for ClockEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn run_loop(
    board: &Mutex<Board>,
    stop: &AtomicBool,
    rate: RunRate,
    budget: Option<u64>,
) -> Result<StopReason, EngineError> {
    let (batch, clock) = match rate {
        RunRate::Unlimited => (UNLIMITED_BATCH, None),
        RunRate::Hz(hz) => {
            let clock = MasterClock::new(hz);
            (clock.ticks_in(BATCH_INTERVAL).get(), Some(clock))
        }
    };
    let started = Instant::now();
    let mut executed: u64 = 0;

    loop {
        let limit = budget.map_or(batch, |b| batch.min(b - executed));
        let (count, reason) = {
            let mut board = board.lock().map_err(|_| EngineError::Poisoned)?;
            run_batch(&mut board, stop, limit, executed == 0)
        };
        executed += count;
        if let Some(reason) = reason {
            return Ok(reason);
        }
        if budget.is_some_and(|b| executed >= b) {
            return Ok(StopReason::Budget);
        }

        if let Some(clock) = clock {
            let due = clock.duration_of(Ticks::new(executed));
            let elapsed = started.elapsed();
            if due > elapsed {
                thread::park_timeout(due - elapsed);
            }
        }
    }
}

/// Tick up to `limit` cycles. The first cycle of a run skips the
/// breakpoint check so a run can leave the breakpoint it stopped on.
fn run_batch(
    board: &mut Board,
    stop: &AtomicBool,
    limit: u64,
    first_batch: bool,
) -> (u64, Option<StopReason>) {
    for n in 0..limit {
        if stop.load(Ordering::Relaxed) {
            return (n, Some(StopReason::Requested));
        }
        if let Some(illegal) = board.cpu().illegal_opcode() {
            tracing::warn!(%illegal, "CPU halted");
            return (n, Some(StopReason::Halted(illegal)));
        }
        if board.at_breakpoint() && !(first_batch && n == 0) {
            let pc = board.cpu().regs.pc;
            tracing::info!(pc = format_args!("${pc:04X}"), "breakpoint");
            return (n, Some(StopReason::Breakpoint(pc)));
        }
        board.tick();
    }
    (limit, None)
}
