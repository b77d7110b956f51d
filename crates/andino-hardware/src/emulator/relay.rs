//! Relay outputs of the I/O board.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::traits::PinDriver;
use crate::{HardwareError, Result};

#[derive(Debug)]
pub(crate) struct Relay {
    pin: u32,
    active_high: bool,
    on: bool,
    pulse: Option<JoinHandle<()>>,
    /// Bumped on every switch; a pulse only ends the generation it started.
    generation: u64,
}

/// Ordered set of relays addressed 1-based from the outside.
#[derive(Debug, Default)]
pub(crate) struct RelayBank {
    relays: Vec<Relay>,
}

impl RelayBank {
    pub(crate) fn new(pins: &[u32], active_high: impl Fn(usize) -> bool) -> Self {
        let relays = pins
            .iter()
            .enumerate()
            .map(|(i, &pin)| Relay {
                pin,
                active_high: active_high(i),
                on: false,
                pulse: None,
                generation: 0,
            })
            .collect();
        Self { relays }
    }

    pub(crate) fn states(&self) -> Vec<bool> {
        self.relays.iter().map(|r| r.on).collect()
    }

    pub(crate) fn pins(&self) -> impl Iterator<Item = u32> + '_ {
        self.relays.iter().map(|r| r.pin)
    }

    /// Zero-based index of 1-based `relay`.
    pub(crate) fn index(&self, relay: u8) -> Result<usize> {
        let index = usize::from(relay).wrapping_sub(1);
        if index < self.relays.len() {
            Ok(index)
        } else {
            Err(HardwareError::invalid_argument(format!(
                "relay {relay} does not exist ({} fitted)",
                self.relays.len()
            )))
        }
    }

    /// Configure every relay pin as output in state `start(i)`.
    pub(crate) fn setup(&mut self, pins: &Arc<dyn PinDriver>, start: impl Fn(usize) -> bool) -> Result<()> {
        for (i, relay) in self.relays.iter_mut().enumerate() {
            let on = start(i);
            pins.setup_output(relay.pin, on == relay.active_high)?;
            relay.on = on;
        }
        Ok(())
    }

    /// Switch relay `index`, cancelling a pulse in progress.
    ///
    /// Returns the new generation of the relay.
    pub(crate) fn set(&mut self, pins: &Arc<dyn PinDriver>, index: usize, on: bool) -> Result<u64> {
        let relay = &mut self.relays[index];
        relay.generation = relay.generation.wrapping_add(1);
        if let Some(pulse) = relay.pulse.take() {
            pulse.abort();
        }
        pins.write(relay.pin, on == relay.active_high)?;
        relay.on = on;
        Ok(relay.generation)
    }

    /// Turn relay `index` off when the pulse started at `generation` elapses.
    ///
    /// A pulse that already woke up when the relay was switched again loses
    /// the race here and leaves the relay alone. Returns whether it switched.
    pub(crate) fn end_pulse(
        &mut self,
        pins: &Arc<dyn PinDriver>,
        index: usize,
        generation: u64,
    ) -> Result<bool> {
        let relay = &mut self.relays[index];
        if relay.generation != generation {
            return Ok(false);
        }
        relay.pulse = None;
        pins.write(relay.pin, !relay.active_high)?;
        relay.on = false;
        Ok(true)
    }

    pub(crate) fn attach_pulse(&mut self, index: usize, task: JoinHandle<()>) {
        if let Some(previous) = self.relays[index].pulse.replace(task) {
            previous.abort();
        }
    }

    pub(crate) fn abort_pulses(&mut self) {
        for relay in &mut self.relays {
            relay.generation = relay.generation.wrapping_add(1);
            if let Some(pulse) = relay.pulse.take() {
                pulse.abort();
            }
        }
    }
}
