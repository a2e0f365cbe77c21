//! Mock byte transport for testing
//!
//! This module provides an in-memory transport that can be used to test the
//! meter reader without requiring actual hardware. Received bytes are queued
//! by the test; everything the reader writes is collected.

use crate::error::MBusError;
use crate::mbus::frame::pack_frame;
use crate::mbus::serial::ByteTransport;
use std::collections::VecDeque;
use std::io;

/// Mock transport that simulates the meter's side of the line
#[derive(Debug, Default)]
pub struct MockTransport {
    /// Data written by the reader (outgoing)
    pub tx_buffer: Vec<u8>,
    /// Data to be read by the reader (incoming)
    pub rx_buffer: VecDeque<u8>,
    /// Number of flush calls
    pub flushes: usize,
    /// Simulated error for the next operation
    pub next_error: Option<io::ErrorKind>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue data to be read from the line
    pub fn queue_rx_data(&mut self, data: &[u8]) {
        self.rx_buffer.extend(data);
    }

    /// Queue a single character acknowledgment
    pub fn queue_ack(&mut self) {
        self.queue_rx_data(&[0xE5]);
    }

    /// Queue a long frame with a valid checksum
    pub fn queue_long_frame(&mut self, control: u8, address: u8, ci: u8, data: &[u8]) {
        let frame = pack_frame(control, address, ci, data);
        self.queue_rx_data(&frame);
    }

    /// Get data that was written to the line
    pub fn get_tx_data(&self) -> &[u8] {
        &self.tx_buffer
    }

    /// Returns and clears the written data
    pub fn take_tx_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tx_buffer)
    }

    /// Set an error to be returned on the next operation
    pub fn set_next_error(&mut self, kind: io::ErrorKind) {
        self.next_error = Some(kind);
    }

    fn check_error(&mut self) -> Result<(), MBusError> {
        match self.next_error.take() {
            Some(kind) => Err(MBusError::Io(io::Error::new(kind, "simulated transport error"))),
            None => Ok(()),
        }
    }
}

impl ByteTransport for MockTransport {
    fn available(&mut self) -> Result<usize, MBusError> {
        self.check_error()?;
        Ok(self.rx_buffer.len())
    }

    fn read_byte(&mut self) -> Result<Option<u8>, MBusError> {
        self.check_error()?;
        Ok(self.rx_buffer.pop_front())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), MBusError> {
        self.check_error()?;
        self.tx_buffer.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), MBusError> {
        self.check_error()?;
        self.flushes += 1;
        Ok(())
    }
}
