//! In-process bus simulation for running the hub without hardware.
//!
//! [`SimBus`] implements [`I2cTransport`] and emulates the eight-port
//! multiplexer, devices wired directly to the bus, and devices sitting
//! behind each mux port. Faults can be injected (mux latch failure, forced
//! readback, busy bus) and every transaction is counted, so tests can
//! assert on bus traffic as well as on results.
//!
//! [`SimSpectral`] speaks the virtual register protocol of all three
//! sensor families and [`SimButton`] is a plain register file, so the real
//! register-level drivers run unmodified on top of the simulation.

use crate::bus::I2cTransport;
use crate::errors::TransportError;
use crate::mux::{MUX_ADDR, MUX_CHANNELS};
use crate::topology::{AS7262_CODE, AS7263_CODE, AS7265X_CODE};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;

/// A device that can be attached to the simulated bus
pub trait SimDevice: Send {
    /// Non-empty write addressed to this device
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
    fn read(&mut self, buf: &mut [u8]) -> Result<(), TransportError>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[derive(Debug, Clone)]
struct SimMux {
    address: u8,
    mask: u8,
    latch_fault: bool,
    forced_readback: Option<u8>,
}

type DeviceMap = HashMap<u8, Box<dyn SimDevice>>;

/// Simulated I2C bus with an optional multiplexer
pub struct SimBus {
    mux: Option<SimMux>,
    direct: DeviceMap,
    ports: Vec<DeviceMap>,
    transactions: usize,
    per_address: HashMap<u8, usize>,
    resets: usize,
    busy_remaining: u32,
    busy_probes: HashMap<u8, u32>,
    widest_mask: u32,
}

impl SimBus {
    /// A bus without a multiplexer
    pub fn direct() -> Self {
        Self {
            mux: None,
            direct: HashMap::new(),
            ports: (0..MUX_CHANNELS).map(|_| HashMap::new()).collect(),
            transactions: 0,
            per_address: HashMap::new(),
            resets: 0,
            busy_remaining: 0,
            busy_probes: HashMap::new(),
            widest_mask: 0,
        }
    }

    /// A bus with a multiplexer at the default address, all ports off
    pub fn with_mux() -> Self {
        let mut bus = Self::direct();
        bus.mux = Some(SimMux {
            address: MUX_ADDR,
            mask: 0,
            latch_fault: false,
            forced_readback: None,
        });
        bus
    }

    pub fn attach_direct(&mut self, address: u8, device: impl SimDevice + 'static) {
        self.direct.insert(address, Box::new(device));
    }

    /// Attach a device behind mux port `channel`
    pub fn attach(&mut self, channel: u8, address: u8, device: impl SimDevice + 'static) {
        if let Some(port) = self.ports.get_mut(channel as usize) {
            port.insert(address, Box::new(device));
        }
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions
    }

    /// Transactions addressed to `address`, acknowledged or not
    pub fn transactions_to(&self, address: u8) -> usize {
        self.per_address.get(&address).copied().unwrap_or(0)
    }

    pub fn reset_count(&self) -> usize {
        self.resets
    }

    /// Next `count` transactions fail with [`TransportError::Busy`]
    pub fn inject_busy(&mut self, count: u32) {
        self.busy_remaining = count;
    }

    /// Next `count` zero-length probes of `address` fail with [`TransportError::Busy`]
    pub fn inject_busy_probe(&mut self, address: u8, count: u32) {
        self.busy_probes.insert(address, count);
    }

    /// Mux ignores writes while set
    pub fn set_mux_latch_fault(&mut self, fault: bool) {
        if let Some(mux) = self.mux.as_mut() {
            mux.latch_fault = fault;
        }
    }

    /// Mux reports `value` instead of its latched mask
    pub fn force_mux_readback(&mut self, value: Option<u8>) {
        if let Some(mux) = self.mux.as_mut() {
            mux.forced_readback = value;
        }
    }

    pub fn mux_mask(&self) -> Option<u8> {
        self.mux.as_ref().map(|m| m.mask)
    }

    /// Largest number of ports ever latched at once
    pub fn widest_mask(&self) -> u32 {
        self.widest_mask
    }

    fn device_map(&self, channel: Option<u8>) -> Option<&DeviceMap> {
        match channel {
            None => Some(&self.direct),
            Some(ch) => self.ports.get(ch as usize),
        }
    }

    fn device_map_mut(&mut self, channel: Option<u8>) -> Option<&mut DeviceMap> {
        match channel {
            None => Some(&mut self.direct),
            Some(ch) => self.ports.get_mut(ch as usize),
        }
    }

    pub fn spectral(&self, channel: Option<u8>, address: u8) -> Option<&SimSpectral> {
        self.device_map(channel)?.get(&address)?.as_any().downcast_ref()
    }

    pub fn spectral_mut(&mut self, channel: Option<u8>, address: u8) -> Option<&mut SimSpectral> {
        self.device_map_mut(channel)?.get_mut(&address)?.as_any_mut().downcast_mut()
    }

    pub fn button(&self, channel: Option<u8>, address: u8) -> Option<&SimButton> {
        self.device_map(channel)?.get(&address)?.as_any().downcast_ref()
    }

    pub fn button_mut(&mut self, channel: Option<u8>, address: u8) -> Option<&mut SimButton> {
        self.device_map_mut(channel)?.get_mut(&address)?.as_any_mut().downcast_mut()
    }

    fn is_mux(&self, address: u8) -> bool {
        self.mux.as_ref().is_some_and(|m| m.address == address)
    }

    /// Device reachable at `address` given the currently latched mux ports
    fn route(&mut self, address: u8) -> Option<&mut Box<dyn SimDevice>> {
        if self.direct.contains_key(&address) {
            return self.direct.get_mut(&address);
        }
        let mask = self.mux.as_ref().map(|m| m.mask)?;
        let port = (0..self.ports.len())
            .find(|&i| mask & (1 << i) != 0 && self.ports[i].contains_key(&address))?;
        self.ports[port].get_mut(&address)
    }

    fn begin_transaction(&mut self, address: u8) -> Result<(), TransportError> {
        self.transactions += 1;
        *self.per_address.entry(address).or_insert(0) += 1;
        if self.busy_remaining > 0 {
            self.busy_remaining -= 1;
            return Err(TransportError::Busy);
        }
        Ok(())
    }
}

#[async_trait]
impl I2cTransport for SimBus {
    async fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), TransportError> {
        self.begin_transaction(address)?;

        if bytes.is_empty() {
            if let Some(remaining) = self.busy_probes.get_mut(&address).filter(|n| **n > 0) {
                *remaining -= 1;
                return Err(TransportError::Busy);
            }
        }

        if self.is_mux(address) {
            if let (Some(mux), Some(&mask)) = (self.mux.as_mut(), bytes.last()) {
                if !mux.latch_fault {
                    mux.mask = mask;
                    self.widest_mask = self.widest_mask.max(mask.count_ones());
                }
            }
            return Ok(());
        }

        let device = self.route(address).ok_or(TransportError::AddressNack { address })?;
        if bytes.is_empty() {
            return Ok(());
        }
        device.write(bytes)
    }

    async fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), TransportError> {
        self.begin_transaction(address)?;

        if let Some(mux) = self.mux.as_ref().filter(|m| m.address == address) {
            let value = mux.forced_readback.unwrap_or(mux.mask);
            buf.fill(value);
            return Ok(());
        }

        self.route(address)
            .ok_or(TransportError::AddressNack { address })?
            .read(buf)
    }

    async fn reset(&mut self) -> Result<(), TransportError> {
        self.resets += 1;
        self.busy_remaining = 0;
        Ok(())
    }
}

// Physical registers of the virtual register interface
const STATUS_REG: u8 = 0x00;
const WRITE_REG: u8 = 0x01;
const READ_REG: u8 = 0x02;
const RX_VALID: u8 = 0x01;

const CONFIG_REG: u8 = 0x04;
const LED_REG: u8 = 0x07;
const CAL_START: u8 = 0x14;
const DEV_SELECT: u8 = 0x4F;

/// Spectral sensor speaking the virtual register protocol
pub struct SimSpectral {
    banks: Vec<[u8; 128]>,
    selected: usize,
    pointer: u8,
    pending: Option<u8>,
    awaiting: Option<u8>,
    bulbs_on: Vec<bool>,
    bulb_log: Vec<(usize, bool)>,
    readouts: usize,
    stalled: bool,
    slaves: u8,
}

impl SimSpectral {
    fn with_version(version: u8, dies: usize) -> Self {
        let mut banks = vec![[0u8; 128]; dies];
        for bank in banks.iter_mut() {
            bank[0] = version;
        }
        Self {
            banks,
            selected: 0,
            pointer: 0,
            pending: None,
            awaiting: None,
            bulbs_on: vec![false; dies],
            bulb_log: Vec::new(),
            readouts: 0,
            stalled: false,
            slaves: 0b0011_0000,
        }
    }

    pub fn as7262() -> Self {
        Self::with_version(AS7262_CODE, 1)
    }

    pub fn as7263() -> Self {
        Self::with_version(AS7263_CODE, 1)
    }

    pub fn as7265x() -> Self {
        Self::with_version(AS7265X_CODE, 3)
    }

    /// Sensor answering at the sensor address with an unknown version byte
    pub fn unknown(version: u8) -> Self {
        Self::with_version(version, 1)
    }

    fn is_triad(&self) -> bool {
        self.banks.len() > 1
    }

    /// Registers shared by all dies of the triad
    fn is_global(reg: u8) -> bool {
        reg <= 0x06 || reg == DEV_SELECT
    }

    fn bank_for(&self, reg: u8) -> usize {
        if self.is_triad() && !Self::is_global(reg) {
            self.selected
        } else {
            0
        }
    }

    /// Stored value of virtual register `reg` on die `bank`
    pub fn register(&self, bank: usize, reg: u8) -> u8 {
        self.banks.get(bank).map(|b| b[(reg & 0x7F) as usize]).unwrap_or(0)
    }

    /// Preload calibrated channel `index` of die `bank`
    pub fn set_calibrated(&mut self, bank: usize, index: usize, value: f32) {
        if let Some(regs) = self.banks.get_mut(bank) {
            let start = CAL_START as usize + 4 * index;
            regs[start..start + 4].copy_from_slice(&value.to_be_bytes());
        }
    }

    /// Conversions never complete, so data-ready is never raised
    pub fn stall_conversions(&mut self) {
        self.stalled = true;
    }

    /// Slave-present bits the triad reports in its device-select register
    pub fn set_slaves_present(&mut self, bits: u8) {
        self.slaves = bits & 0b0011_0000;
    }

    /// (die, on) each time a bulb changed state
    pub fn bulb_log(&self) -> &[(usize, bool)] {
        &self.bulb_log
    }

    pub fn bulbs_on(&self) -> &[bool] {
        &self.bulbs_on
    }

    /// Number of times the first calibrated value of die 0 was read out
    pub fn readouts(&self) -> usize {
        self.readouts
    }

    fn load(&mut self, reg: u8) -> u8 {
        if self.is_triad() && reg == DEV_SELECT {
            return self.selected as u8 | self.slaves;
        }
        let bank = self.bank_for(reg);
        if bank == 0 && reg == CAL_START {
            self.readouts += 1;
        }
        self.banks[bank][reg as usize]
    }

    fn store(&mut self, reg: u8, value: u8) {
        if self.is_triad() && reg == DEV_SELECT {
            self.selected = (value & 0b11) as usize % self.banks.len();
        }

        let bank = self.bank_for(reg);
        let mut value = value;
        if reg == CONFIG_REG && (value >> 2) & 0b11 >= 2 && !self.stalled {
            // Conversions complete instantly
            value |= 0b10;
        }
        if reg == LED_REG {
            let on = value & 0b1000 != 0;
            if self.bulbs_on[bank] != on {
                self.bulbs_on[bank] = on;
                self.bulb_log.push((bank, on));
            }
        }
        self.banks[bank][reg as usize] = value;
    }

    fn virtual_write(&mut self, value: u8) {
        if let Some(reg) = self.awaiting.take() {
            self.store(reg, value);
        } else if value & 0x80 != 0 {
            self.awaiting = Some(value & 0x7F);
        } else {
            self.pending = Some(self.load(value & 0x7F));
        }
    }
}

impl SimDevice for SimSpectral {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        match bytes {
            [WRITE_REG, value, ..] => self.virtual_write(*value),
            [reg, ..] => self.pointer = *reg,
            [] => {}
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        for byte in buf.iter_mut() {
            *byte = match self.pointer {
                STATUS_REG => {
                    if self.pending.is_some() {
                        RX_VALID
                    } else {
                        0
                    }
                }
                READ_REG => self.pending.take().unwrap_or(0),
                _ => 0,
            };
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

const BUTTON_ID: u8 = 0x5D;
const BUTTON_STATUS: usize = 0x03;
const BUTTON_DEBOUNCE: usize = 0x05;
const BUTTON_BRIGHTNESS: usize = 0x19;

/// Push button register file
pub struct SimButton {
    regs: [u8; 0x20],
    pointer: usize,
    led_on_count: usize,
}

impl Default for SimButton {
    fn default() -> Self {
        Self::new()
    }
}

impl SimButton {
    pub fn new() -> Self {
        let mut regs = [0u8; 0x20];
        regs[0] = BUTTON_ID;
        Self { regs, pointer: 0, led_on_count: 0 }
    }

    /// A button with a click already latched
    pub fn clicked() -> Self {
        let mut button = Self::new();
        button.click();
        button
    }

    pub fn click(&mut self) {
        self.regs[BUTTON_STATUS] |= 0b011;
    }

    pub fn is_click_pending(&self) -> bool {
        self.regs[BUTTON_STATUS] & 0b010 != 0
    }

    pub fn debounce_ms(&self) -> u16 {
        u16::from_le_bytes([self.regs[BUTTON_DEBOUNCE], self.regs[BUTTON_DEBOUNCE + 1]])
    }

    pub fn led_brightness(&self) -> u8 {
        self.regs[BUTTON_BRIGHTNESS]
    }

    /// How many times the LED was switched on
    pub fn led_on_count(&self) -> usize {
        self.led_on_count
    }
}

impl SimDevice for SimButton {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let Some((&reg, data)) = bytes.split_first() else {
            return Ok(());
        };
        self.pointer = reg as usize;
        for (offset, value) in data.iter().enumerate() {
            let index = self.pointer + offset;
            if index == BUTTON_BRIGHTNESS && *value != 0 {
                self.led_on_count += 1;
            }
            if let Some(slot) = self.regs.get_mut(index) {
                *slot = *value;
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        for (offset, byte) in buf.iter_mut().enumerate() {
            *byte = self.regs.get(self.pointer + offset).copied().unwrap_or(0);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
