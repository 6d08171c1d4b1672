//! MOS 6551 Asynchronous Communications Interface Adapter (ACIA).
//!
//! A UART with four registers selected by the low two address bits:
//!
//! | Reg | Read             | Write                 |
//! |-----|------------------|-----------------------|
//! | $0  | Receive data     | Transmit data         |
//! | $1  | Status           | Programmed reset      |
//! | $2  | Command          | Command               |
//! | $3  | Control          | Control               |
//!
//! Serial timing is counted in bus cycles: one character is ten bit times
//! (start, eight data, stop) at the rate selected by control bits 0-3,
//! assuming the usual 1 MHz board clock. The host side feeds received
//! bytes in with [`Acia6551::receive`] and collects transmitted bytes with
//! [`Acia6551::take_transmitted`]. Up to [`TX_BUFFER_LEN`] sent bytes wait
//! to be collected; past that the oldest are dropped.
//!
//! Transmitter-empty always reads as set and transmission raises no
//! interrupt, matching the WDC 65C51 found on most hobby boards.

use std::any::Any;
use std::collections::VecDeque;

use emu_core::{Device, Observable, Ticks, Value};

pub const STATUS_PARITY_ERROR: u8 = 0x01;
pub const STATUS_FRAMING_ERROR: u8 = 0x02;
pub const STATUS_OVERRUN: u8 = 0x04;
pub const STATUS_RX_FULL: u8 = 0x08;
pub const STATUS_TX_EMPTY: u8 = 0x10;
pub const STATUS_DCD: u8 = 0x20;
pub const STATUS_DSR: u8 = 0x40;
pub const STATUS_IRQ: u8 = 0x80;

/// Command bit 1: receiver interrupt disabled.
pub const COMMAND_RX_IRQ_DISABLE: u8 = 0x02;

/// Bit time in cycles for each control-register baud selection. Entry 0
/// is the 16x external clock.
const BIT_TIMES: [u64; 16] = [
    9, 20000, 13333, 9174, 7463, 6667, 3333, 1667, 833, 556, 417, 278, 208, 139, 104, 52,
];

const BITS_PER_CHARACTER: u64 = 10;

/// Sent bytes held until the host collects them.
pub const TX_BUFFER_LEN: usize = 4096;

/// MOS 6551 ACIA.
#[derive(Debug)]
pub struct Acia6551 {
    status: u8,
    command: u8,
    control: u8,
    rx_data: u8,
    tx_data: u8,
    /// Cycles until the character being sent leaves the shift register.
    tx_remaining: Option<u64>,
    /// Cycles until the next queued byte arrives.
    rx_remaining: Option<u64>,
    rx_queue: VecDeque<u8>,
    transmitted: VecDeque<u8>,
}

impl Default for Acia6551 {
    fn default() -> Self {
        Self::new()
    }
}

impl Acia6551 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: STATUS_TX_EMPTY,
            command: 0,
            control: 0,
            rx_data: 0,
            tx_data: 0,
            tx_remaining: None,
            rx_remaining: None,
            rx_queue: VecDeque::new(),
            transmitted: VecDeque::with_capacity(TX_BUFFER_LEN),
        }
    }

    #[must_use]
    pub fn status(&self) -> u8 {
        self.status
    }

    /// Baud selection from control bits 0-3.
    #[must_use]
    pub fn baud_select(&self) -> u8 {
        self.control & 0x0F
    }

    /// Bus cycles to shift one character.
    #[must_use]
    pub fn character_time(&self) -> u64 {
        BIT_TIMES[usize::from(self.baud_select())] * BITS_PER_CHARACTER
    }

    #[must_use]
    pub fn is_transmitting(&self) -> bool {
        self.tx_remaining.is_some()
    }

    #[must_use]
    pub fn is_receiving(&self) -> bool {
        self.rx_remaining.is_some()
    }

    /// Queue bytes arriving on the serial line. Each is delivered one
    /// character time after the previous.
    pub fn receive(&mut self, bytes: &[u8]) {
        self.rx_queue.extend(bytes);
        if self.rx_remaining.is_none() && !self.rx_queue.is_empty() {
            self.rx_remaining = Some(self.character_time());
        }
    }

    /// Drain bytes the CPU has finished sending.
    pub fn take_transmitted(&mut self) -> Vec<u8> {
        self.transmitted.drain(..).collect()
    }

    /// Hardware RESET: everything except the data registers.
    fn hard_reset(&mut self) {
        self.status = STATUS_TX_EMPTY;
        self.command = 0;
        self.control = 0;
    }

    /// Programmed reset by writing the status register.
    fn soft_reset(&mut self) {
        self.status &= !STATUS_OVERRUN;
        self.command &= 0xE0;
    }

    fn deliver(&mut self) {
        let Some(byte) = self.rx_queue.pop_front() else {
            self.rx_remaining = None;
            return;
        };

        if self.status & STATUS_RX_FULL != 0 {
            tracing::debug!(byte, "ACIA receiver overrun");
            self.status |= STATUS_OVERRUN;
        } else {
            self.rx_data = byte;
            self.status |= STATUS_RX_FULL;
            if self.command & COMMAND_RX_IRQ_DISABLE == 0 {
                self.status |= STATUS_IRQ;
            }
        }

        self.rx_remaining = if self.rx_queue.is_empty() {
            None
        } else {
            Some(self.character_time())
        };
    }

    fn step_cycle(&mut self) {
        if let Some(remaining) = self.tx_remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                self.tx_remaining = None;
                if self.transmitted.len() == TX_BUFFER_LEN {
                    tracing::debug!("ACIA transmit buffer full, oldest byte dropped");
                    self.transmitted.pop_front();
                }
                self.transmitted.push_back(self.tx_data);
                tracing::trace!(byte = self.tx_data, "ACIA transmit complete");
            }
        }

        if let Some(remaining) = self.rx_remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                self.deliver();
            }
        }
    }

    fn register(&self, offset: u16) -> u8 {
        match offset & 0x03 {
            0 => self.rx_data,
            1 => self.status,
            2 => self.command,
            _ => self.control,
        }
    }
}

impl Device for Acia6551 {
    fn kind(&self) -> &'static str {
        "acia"
    }

    fn read(&mut self, offset: u16) -> u8 {
        let value = self.register(offset);
        match offset & 0x03 {
            0 => {
                self.status &= !(STATUS_PARITY_ERROR
                    | STATUS_FRAMING_ERROR
                    | STATUS_OVERRUN
                    | STATUS_RX_FULL);
            }
            1 => self.status &= !STATUS_IRQ,
            _ => {}
        }
        value
    }

    fn write(&mut self, offset: u16, value: u8) {
        match offset & 0x03 {
            0 => {
                // A write mid-character replaces the byte in flight
                self.tx_data = value;
                self.status |= STATUS_TX_EMPTY;
                if self.tx_remaining.is_none() {
                    self.tx_remaining = Some(self.character_time());
                }
            }
            1 => self.soft_reset(),
            2 => self.command = value,
            _ => self.control = value,
        }
    }

    fn peek(&self, offset: u16) -> u8 {
        self.register(offset)
    }

    fn tick(&mut self, elapsed: Ticks) {
        for _ in 0..elapsed.get() {
            if self.tx_remaining.is_none() && self.rx_remaining.is_none() {
                break;
            }
            self.step_cycle();
        }
    }

    fn irq(&self) -> bool {
        self.status & STATUS_IRQ != 0
    }

    fn reset(&mut self) {
        self.hard_reset();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Observable for Acia6551 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "rx_data" => Some(self.rx_data.into()),
            "tx_data" => Some(self.tx_data.into()),
            "status" => Some(self.status.into()),
            "command" => Some(self.command.into()),
            "control" => Some(self.control.into()),
            "baud" => Some(self.baud_select().into()),
            "transmitting" => Some(self.is_transmitting().into()),
            "receiving" => Some(self.is_receiving().into()),
            "rx_pending" => Some((self.rx_queue.len() as u64).into()),
            "irq" => Some(self.irq().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "rx_data", "tx_data", "status", "command", "control", "baud", "transmitting",
            "receiving", "rx_pending", "irq",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: u16 = 0;
    const STATUS: u16 = 1;
    const COMMAND: u16 = 2;
    const CONTROL: u16 = 3;

    /// 19200 baud: 52 cycles per bit.
    fn fast_acia() -> Acia6551 {
        let mut acia = Acia6551::new();
        acia.write(CONTROL, 0x1F);
        acia
    }

    #[test]
    fn hard_reset_leaves_transmitter_empty() {
        let mut acia = fast_acia();
        acia.write(COMMAND, 0x0B);
        acia.reset();
        assert_eq!(acia.read(STATUS), STATUS_TX_EMPTY);
        assert_eq!(acia.read(COMMAND), 0);
        assert_eq!(acia.read(CONTROL), 0);
    }

    #[test]
    fn transmit_completes_after_one_character_time() {
        let mut acia = fast_acia();
        assert_eq!(acia.character_time(), 520);

        acia.write(DATA, b'A');
        assert!(acia.is_transmitting());
        acia.tick(Ticks::new(519));
        assert!(acia.take_transmitted().is_empty());

        acia.tick(Ticks::new(1));
        assert_eq!(acia.take_transmitted(), vec![b'A']);
        assert!(!acia.is_transmitting());
        assert_ne!(acia.status() & STATUS_TX_EMPTY, 0);
    }

    #[test]
    fn uncollected_output_keeps_only_the_newest_bytes() {
        let mut acia = fast_acia();
        let character = acia.character_time();
        for i in 0..TX_BUFFER_LEN + 3 {
            acia.write(DATA, i as u8);
            acia.tick(Ticks::new(character));
        }
        let sent = acia.take_transmitted();
        assert_eq!(sent.len(), TX_BUFFER_LEN);
        assert_eq!(sent[0], 3);
        assert_eq!(sent[TX_BUFFER_LEN - 1], (TX_BUFFER_LEN + 2) as u8);
        assert!(acia.take_transmitted().is_empty());
    }

    #[test]
    fn receive_raises_irq_and_data_read_clears_full() {
        let mut acia = fast_acia();
        acia.receive(b"hi");
        acia.tick(Ticks::new(520));

        assert!(acia.irq());
        let status = acia.read(STATUS);
        assert_ne!(status & STATUS_RX_FULL, 0);
        assert_ne!(status & STATUS_IRQ, 0);
        assert!(!acia.irq(), "status read clears IRQ");

        assert_eq!(acia.read(DATA), b'h');
        assert_eq!(acia.status() & STATUS_RX_FULL, 0);

        acia.tick(Ticks::new(520));
        assert_eq!(acia.read(DATA), b'i');
        assert!(!acia.is_receiving());
    }

    #[test]
    fn receiver_irq_can_be_disabled() {
        let mut acia = fast_acia();
        acia.write(COMMAND, COMMAND_RX_IRQ_DISABLE);
        acia.receive(b"x");
        acia.tick(Ticks::new(520));
        assert!(!acia.irq());
        assert_ne!(acia.status() & STATUS_RX_FULL, 0);
    }

    #[test]
    fn unread_byte_causes_overrun() {
        let mut acia = fast_acia();
        acia.receive(b"ab");
        acia.tick(Ticks::new(1040));

        assert_ne!(acia.status() & STATUS_OVERRUN, 0);
        assert_eq!(acia.peek(DATA), b'a');

        let _ = acia.read(DATA);
        assert_eq!(acia.status() & STATUS_OVERRUN, 0);
    }

    #[test]
    fn status_write_is_programmed_reset() {
        let mut acia = fast_acia();
        acia.write(COMMAND, 0xEB);
        acia.receive(b"ab");
        acia.tick(Ticks::new(1040));

        acia.write(STATUS, 0);
        assert_eq!(acia.read(COMMAND), 0xE0);
        assert_eq!(acia.status() & STATUS_OVERRUN, 0);
        assert_eq!(acia.read(CONTROL), 0x1F);
    }

    #[test]
    fn peek_has_no_side_effects() {
        let mut acia = fast_acia();
        acia.receive(b"z");
        acia.tick(Ticks::new(520));
        let _ = acia.peek(STATUS);
        let _ = acia.peek(DATA);
        assert!(acia.irq());
        assert_ne!(acia.status() & STATUS_RX_FULL, 0);
    }
}
