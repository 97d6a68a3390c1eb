//! ADC device context.
//!
//! [`At91Adc`] owns everything one ADC instance needs: the platform
//! capabilities, the configuration, the acquisition settings and open flag
//! (behind the coarse device lock), the double buffer and the reader wait
//! queue. There is no global state; a board support layer constructs one
//! context per ADC and drops it to tear the device down.
//!
//! # Locking
//!
//! ```text
//!   device lock (DeviceState)   open / close / read / poll / attributes
//!        │
//!        └─► pool lock (roles)  role swap, cursor; also taken by the
//!                               completion handler, never the other way
//! ```
//!
//! The device lock is never held while a reader sleeps and the completion
//! handler never takes it.
//!
//! # Example
//!
//! ```
//! use daq_driver_at91adc::{At91Adc, DeviceConfig, ReadMode};
//! use daq_driver_at91adc::sim::SimulatedSoc;
//!
//! let soc = SimulatedSoc::new();
//! let adc = At91Adc::new(soc.hardware(), DeviceConfig::default()).unwrap();
//!
//! adc.open().unwrap();
//! soc.complete_transfer();
//!
//! let mut scan = [0u8; 8];
//! assert_eq!(adc.read(&mut scan, 8, ReadMode::NonBlocking).unwrap(), 8);
//! adc.close();
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::attributes::Attribute;
use crate::buffer::{BufferId, BufferPool};
use crate::config::DeviceConfig;
use crate::error::Result;
use crate::hal::Hardware;
use crate::reader::{ReadMode, StreamReader};
use crate::settings::AcquisitionSettings;
use crate::wait::WaitQueue;

/// State guarded by the coarse device lock.
#[derive(Debug)]
pub(crate) struct DeviceState {
    pub(crate) settings: AcquisitionSettings,
    pub(crate) open: bool,
}

/// Device context shared with the completion handler (through a `Weak`).
pub(crate) struct Shared {
    pub(crate) hw: Hardware,
    pub(crate) config: DeviceConfig,
    pub(crate) state: Mutex<DeviceState>,
    pub(crate) pool: BufferPool,
    pub(crate) readers: WaitQueue,
}

/// One AT91 ADC with its trigger timer and double buffer.
pub struct At91Adc {
    shared: Arc<Shared>,
}

impl At91Adc {
    /// Create a device context and allocate both DMA buffers.
    ///
    /// The hardware stays untouched until [`At91Adc::open`].
    pub fn new(hw: Hardware, config: DeviceConfig) -> Result<Self> {
        config.validate()?;

        let first = hw.dma.alloc_coherent(config.dma_buffer_size)?;
        let second = match hw.dma.alloc_coherent(config.dma_buffer_size) {
            Ok(region) => region,
            Err(e) => {
                hw.dma.free_coherent(first);
                return Err(e);
            }
        };

        info!(
            buffer_size = config.dma_buffer_size,
            first = format_args!("{:#010x}", first.address()),
            second = format_args!("{:#010x}", second.address()),
            master_clock_hz = hw.master_clock.rate_hz(),
            "Created AT91 ADC device"
        );

        let settings = config.settings;
        Ok(Self {
            shared: Arc::new(Shared {
                hw,
                config,
                state: Mutex::new(DeviceState {
                    settings,
                    open: false,
                }),
                pool: BufferPool::new(first, second),
                readers: WaitQueue::new(),
            }),
        })
    }

    /// Start continuous acquisition with the current settings.
    ///
    /// Returns the settings in effect, with the frequency replaced by the
    /// rate the trigger timer actually achieves. Fails with
    /// [`AdcError::Busy`](crate::AdcError::Busy) if already open.
    pub fn open(&self) -> Result<AcquisitionSettings> {
        self.shared.open()
    }

    /// Stop acquisition and release the interrupt and clocks. Idempotent.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Whether acquisition is running.
    pub fn is_open(&self) -> bool {
        self.shared.state.lock().open
    }

    /// Copy up to `count` bytes of completed sample data into `dest`.
    pub fn read(&self, dest: &mut [u8], count: usize, mode: ReadMode) -> Result<usize> {
        self.shared.read(dest, count, mode)
    }

    /// Whether a read would return data without blocking.
    pub fn poll(&self) -> bool {
        self.shared.poll()
    }

    /// Current value of one channel, see [`crate::channel`].
    pub fn read_value(&self, channel: u8) -> Result<u16> {
        self.shared.read_value(channel)
    }

    /// Make every reader currently blocked in [`At91Adc::read`] return
    /// [`AdcError::Interrupted`](crate::AdcError::Interrupted).
    pub fn interrupt_readers(&self) {
        debug!("Interrupting blocked readers");
        self.shared.readers.interrupt_all();
    }

    /// Snapshot of the acquisition settings.
    pub fn settings(&self) -> AcquisitionSettings {
        self.shared.state.lock().settings
    }

    /// Read an attribute, formatted as decimal text.
    pub fn attribute(&self, name: &str) -> Result<String> {
        let attribute: Attribute = name.parse()?;
        self.shared.attribute(attribute)
    }

    /// Write an attribute. Fails with `Busy` while acquisition is running.
    pub fn set_attribute(&self, name: &str, value: &str) -> Result<()> {
        let attribute: Attribute = name.parse()?;
        self.shared.set_attribute(attribute, value)
    }

    /// `std::io::Read` adapter over the streaming read path.
    pub fn stream_reader(&self, mode: ReadMode) -> StreamReader<'_> {
        StreamReader::new(self, mode)
    }

    /// Configuration the device was created with.
    pub fn config(&self) -> &DeviceConfig {
        &self.shared.config
    }
}

impl std::fmt::Debug for At91Adc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("At91Adc")
            .field("open", &state.open)
            .field("settings", &state.settings)
            .finish_non_exhaustive()
    }
}

impl Drop for At91Adc {
    fn drop(&mut self) {
        self.shared.close();

        let shared = &self.shared;
        for id in [BufferId::First, BufferId::Second] {
            shared.hw.dma.free_coherent(Arc::clone(shared.pool.buffer(id)));
        }
        if Arc::strong_count(shared) > 1 {
            warn!("Device context still referenced after teardown");
        }
        info!("Released AT91 ADC device");
    }
}
