//! Double-buffered, timer-triggered acquisition driver for the AT91SAM9260
//! ADC.
//!
//! Up to four analog channels are sampled continuously at a configurable
//! rate and resolution. Timer/Counter channel 0 triggers each scan, the
//! PDC moves the conversions into one of two DMA buffers, and every
//! buffer-full interrupt swaps the buffers so the consumer always reads a
//! complete one while the hardware fills the other.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────┐  open/close  ┌──────────────────┐
//!   consumer ───► │   At91Adc    │ ───────────► │    controller    │──► TC0, ADC, PDC
//!                 │  (device)    │              └──────────────────┘
//!                 │              │  read/poll   ┌──────────────────┐
//!                 │              │ ───────────► │ reader (passive) │
//!                 │              │              └────────▲─────────┘
//!                 │              │  read_value           │ swap + wake
//!                 │              │ ──► channel   ┌───────┴──────────┐
//!                 └──────────────┘               │ completion (IRQ) │◄── ENDRX
//!                                                └──────────────────┘
//! ```
//!
//! ## Device Access
//! - [`At91Adc`] - Device context with open/close, streaming read and
//!   attributes; teardown on drop
//! - [`DeviceConfig`] - TOML configuration
//! - [`AcquisitionSettings`] - Resolution, frequency and channel mask
//!
//! ## Platform
//! - [`hal::Hardware`] - Register blocks, interrupt line, clocks and DMA
//!   allocator the driver consumes
//! - [`regs`] - Typed register map
//! - [`sim`] - Simulated SoC for tests and demos
//!
//! # Example
//!
//! ```
//! use daq_driver_at91adc::{At91Adc, DeviceConfig, ReadMode};
//! use daq_driver_at91adc::sim::SimulatedSoc;
//!
//! # fn example() -> daq_driver_at91adc::Result<()> {
//! let soc = SimulatedSoc::new();
//! let adc = At91Adc::new(soc.hardware(), DeviceConfig::default())?;
//!
//! adc.set_attribute("ch2_enable", "0")?;
//! adc.set_attribute("frequency", "500")?;
//! let settings = adc.open()?;
//! assert_eq!(settings.frequency, 500);
//!
//! soc.set_input(1, 0x200);
//! soc.complete_transfer();
//! assert_eq!(adc.read_value(1)?, 0x200);
//!
//! let mut samples = vec![0u8; 4096];
//! let n = adc.read(&mut samples, 4096, ReadMode::NonBlocking)?;
//! assert_eq!(n, 500 * 3 * 2);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod attributes;
pub mod buffer;
pub mod channel;
pub mod completion;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod hal;
pub mod reader;
pub mod regs;
pub mod settings;
pub mod sim;
pub mod timing;
pub mod wait;

pub use attributes::Attribute;
pub use config::DeviceConfig;
pub use device::At91Adc;
pub use error::{AdcError, Result};
pub use hal::{Clock, DmaAllocator, DmaRegion, Hardware, InterruptLine};
pub use reader::{ReadMode, StreamReader};
pub use regs::RegisterBlock;
pub use settings::{AcquisitionSettings, ChannelMask, Resolution};
