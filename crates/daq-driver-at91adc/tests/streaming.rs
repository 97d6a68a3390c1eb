//! Streaming acquisition against the simulated SoC: open sequence, buffer
//! swaps, the read path and teardown.

use std::io::{ErrorKind, Read};
use std::thread;
use std::time::Duration;

use daq_driver_at91adc::regs::{trigger_waveform, AdcMode, AdcReg, Status, TcReg, TimerClock};
use daq_driver_at91adc::sim::SimulatedSoc;
use daq_driver_at91adc::{AdcError, At91Adc, DeviceConfig, ReadMode, Resolution};

fn setup() -> (SimulatedSoc, At91Adc) {
    let soc = SimulatedSoc::new();
    let adc = At91Adc::new(soc.hardware(), DeviceConfig::default()).unwrap();
    (soc, adc)
}

fn u16_at(bytes: &[u8], index: usize) -> u16 {
    u16::from_le_bytes([bytes[index * 2], bytes[index * 2 + 1]])
}

/// Keep poking `action` until the reader thread returns.
fn until_finished<T>(handle: thread::ScopedJoinHandle<'_, T>, action: impl Fn()) -> T {
    while !handle.is_finished() {
        action();
        thread::sleep(Duration::from_millis(5));
    }
    handle.join().unwrap()
}

// =============================================================================
// Open sequence
// =============================================================================

#[test]
fn test_open_reference_timing() {
    let (soc, adc) = setup();
    let settings = adc.open().unwrap();

    assert_eq!(settings.frequency, 1000);
    assert_eq!(soc.timer_register(TcReg::Rc), 768);
    assert_eq!(soc.timer_register(TcReg::Ra), 384);
    assert_eq!(soc.timer_register(TcReg::Cv), 0);
    assert_eq!(
        soc.timer_register(TcReg::Cmr),
        trigger_waveform(TimerClock::Clock4)
    );

    // clock disable first, clock enable + software trigger last
    let writes = soc.timer_writes();
    assert_eq!(writes.first(), Some(&(TcReg::Ccr.offset(), 0b010)));
    let tail: Vec<_> = writes.iter().rev().take(2).rev().copied().collect();
    assert_eq!(
        tail,
        vec![(TcReg::Ccr.offset(), 0b001), (TcReg::Ccr.offset(), 0b100)]
    );
}

#[test]
fn test_open_programs_adc_and_pdc() {
    let (soc, adc) = setup();
    adc.open().unwrap();

    let mode = AdcMode::from_bits(soc.adc_register(AdcReg::Mr));
    assert_eq!(mode.prescaler, 48);
    assert_eq!(mode.resolution, Resolution::Bits10);
    assert!(mode.trigger.is_some());

    // 1000 Hz * 4 channels * 2 bytes = 8000 bytes = 4000 samples per buffer
    assert_eq!(soc.adc_register(AdcReg::Rcr), 4000);
    assert_eq!(soc.adc_register(AdcReg::Rncr), 4000);
    assert_ne!(
        soc.adc_register(AdcReg::Rpr),
        soc.adc_register(AdcReg::Rnpr)
    );
    assert_eq!(soc.adc_register(AdcReg::Ptsr) & 1, 1);
    assert_eq!(soc.adc_register(AdcReg::Imr), Status::ENDRX.bits());
    assert_eq!(soc.adc_register(AdcReg::Chsr), 0x0F);

    assert!(soc.irq.is_claimed());
    assert!(soc.adc_clock.is_enabled());
    assert!(soc.trigger_clock.is_enabled());
}

#[test]
fn test_open_8bit_uses_low_res_clock() {
    let (soc, adc) = setup();
    adc.set_attribute("resolution", "8").unwrap();
    adc.open().unwrap();

    let mode = AdcMode::from_bits(soc.adc_register(AdcReg::Mr));
    assert_eq!(mode.prescaler, 8);
    assert_eq!(mode.resolution, Resolution::Bits8);
    // one byte per sample: 1000 Hz * 4 channels
    assert_eq!(soc.adc_register(AdcReg::Rcr), 4000);
}

#[test]
fn test_open_stores_achieved_frequency() {
    let (_soc, adc) = setup();
    adc.set_attribute("frequency", "7000").unwrap();
    let settings = adc.open().unwrap();

    // 768000 / 7000 = 109.7 -> 110 -> 6981 Hz
    assert_eq!(settings.frequency, 6981);
    assert_eq!(adc.settings().frequency, 6981);
    assert_eq!(adc.attribute("frequency").unwrap(), "6981");
}

#[test]
fn test_open_clamps_slow_rates() {
    let (soc, adc) = setup();
    adc.set_attribute("frequency", "1").unwrap();
    let settings = adc.open().unwrap();

    assert_eq!(soc.timer_register(TcReg::Rc), 0xFFFF);
    assert_eq!(settings.frequency, 768_000 / 0xFFFF);
}

#[test]
fn test_open_clamps_buffer_to_capacity() {
    let (soc, adc) = setup();
    adc.set_attribute("frequency", "6000").unwrap();
    adc.set_attribute("ch3_enable", "0").unwrap();
    adc.open().unwrap();

    // 6000 * 6 = 36000 bytes > 32768 -> 32766 (multiple of the 6-byte scan)
    assert_eq!(soc.adc_register(AdcReg::Rcr), 32766 / 2);
}

#[test]
fn test_open_at_maximum_frequency_clamps_buffer() {
    let (soc, adc) = setup();
    adc.set_attribute("frequency", &u32::MAX.to_string()).unwrap();
    let settings = adc.open().unwrap();

    // counter clamps to 1, buffer clamps to the full 32768-byte region
    assert_eq!(soc.timer_register(TcReg::Rc), 1);
    assert_eq!(settings.frequency, 768_000);
    assert_eq!(soc.adc_register(AdcReg::Rcr), 32768 / 2);
    assert!(adc.is_open());
}

#[test]
fn test_second_open_busy_leaves_session_untouched() {
    let (soc, adc) = setup();
    adc.open().unwrap();
    let adc_writes = soc.adc_writes().len();
    let timer_writes = soc.timer_writes().len();

    let err = adc.open().unwrap_err();
    assert!(err.is_busy());
    assert_eq!(err.errno(), libc::EBUSY);
    assert_eq!(soc.adc_writes().len(), adc_writes);
    assert_eq!(soc.timer_writes().len(), timer_writes);
    assert!(adc.is_open());
}

#[test]
fn test_open_with_no_channels_unwinds() {
    let (soc, adc) = setup();
    for channel in 0..4 {
        adc.set_attribute(&format!("ch{channel}_enable"), "0").unwrap();
    }

    let err = adc.open().unwrap_err();
    assert!(matches!(err, AdcError::InvalidArgument { .. }));
    assert!(!adc.is_open());
    assert!(!soc.adc_clock.is_enabled());
    assert!(!soc.trigger_clock.is_enabled());
    assert!(!soc.irq.is_claimed());
}

#[test]
fn test_open_irq_failure_unwinds() {
    let (soc, adc) = setup();
    soc.irq.fail_next_request();

    let err = adc.open().unwrap_err();
    assert!(err.is_busy());
    assert!(!adc.is_open());
    assert_eq!(soc.adc_register(AdcReg::Ptsr) & 1, 0);
    assert_eq!(soc.adc_register(AdcReg::Chsr), 0);
    assert_eq!(soc.adc_register(AdcReg::Imr), 0);
    assert!(!soc.adc_clock.is_enabled());

    // the line is free again, a retry succeeds
    adc.open().unwrap();
}

// =============================================================================
// Completion and read path
// =============================================================================

#[test]
fn test_nothing_readable_before_first_completion() {
    let (_soc, adc) = setup();
    adc.open().unwrap();

    assert!(!adc.poll());
    let mut dest = [0u8; 64];
    let err = adc.read(&mut dest, 64, ReadMode::NonBlocking).unwrap_err();
    assert!(err.is_would_block());
    assert_eq!(err.errno(), libc::EAGAIN);
    // still nothing, no state change
    assert!(!adc.poll());
}

#[test]
fn test_completion_requeues_filled_buffer() {
    let (soc, adc) = setup();
    adc.open().unwrap();
    let first = soc.adc_register(AdcReg::Rpr);
    let second = soc.adc_register(AdcReg::Rnpr);

    assert!(soc.complete_transfer());
    assert_eq!(soc.adc_register(AdcReg::Rpr), second);
    assert_eq!(soc.adc_register(AdcReg::Rnpr), first);
    assert_eq!(soc.adc_register(AdcReg::Rncr), 4000);

    assert!(soc.complete_transfer());
    assert_eq!(soc.adc_register(AdcReg::Rpr), first);
    assert_eq!(soc.adc_register(AdcReg::Rnpr), second);
}

#[test]
fn test_read_drains_passive_buffer() {
    let (soc, adc) = setup();
    for channel in 0..4u8 {
        soc.set_input(channel, 0x100 + u16::from(channel));
    }
    adc.open().unwrap();
    soc.complete_transfer();
    assert!(adc.poll());

    let mut scan = [0u8; 8];
    assert_eq!(adc.read(&mut scan, 8, ReadMode::NonBlocking).unwrap(), 8);
    for channel in 0..4 {
        assert_eq!(u16_at(&scan, channel), 0x100 + channel as u16);
    }

    // asking for more than is left returns only the remainder
    let mut rest = vec![0u8; 16_000];
    assert_eq!(
        adc.read(&mut rest, 16_000, ReadMode::NonBlocking).unwrap(),
        8000 - 8
    );
    assert!(!adc.poll());
    assert!(adc
        .read(&mut rest, 1, ReadMode::NonBlocking)
        .unwrap_err()
        .is_would_block());
}

#[test]
fn test_read_never_spans_a_swap() {
    let (soc, adc) = setup();
    adc.open().unwrap();
    soc.set_input(0, 0x001);
    soc.complete_transfer();

    let mut dest = vec![0u8; 20_000];
    assert_eq!(adc.read(&mut dest, 100, ReadMode::NonBlocking).unwrap(), 100);

    // a swap rewinds the cursor to the start of the new passive buffer
    soc.set_input(0, 0x002);
    soc.complete_transfer();
    let n = adc.read(&mut dest, 20_000, ReadMode::NonBlocking).unwrap();
    assert_eq!(n, 8000);
    assert_eq!(u16_at(&dest, 0), 0x002);
}

#[test]
fn test_swap_during_copy_restarts_on_new_buffer() {
    let (soc, adc) = setup();
    adc.open().unwrap();
    let first = soc.dma.lookup(soc.adc_register(AdcReg::Rpr)).unwrap();
    soc.set_input(0, 0x001);
    soc.complete_transfer();

    // stall the copy out of the passive buffer until the next swap lands
    let guard = first.write();
    let (n, head) = thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut dest = vec![0u8; 100];
            let n = adc.read(&mut dest, 100, ReadMode::NonBlocking).unwrap();
            (n, u16_at(&dest, 0))
        });
        thread::sleep(Duration::from_millis(50));
        soc.set_input(0, 0x002);
        assert!(soc.complete_transfer());
        drop(guard);
        reader.join().unwrap()
    });

    assert_eq!(n, 100);
    assert_eq!(head, 0x002);

    // the cursor advanced once, within the new buffer
    let mut dest = vec![0u8; 20_000];
    assert_eq!(
        adc.read(&mut dest, 20_000, ReadMode::NonBlocking).unwrap(),
        7900
    );
}

#[test]
fn test_late_reader_sees_latest_buffer() {
    let (soc, adc) = setup();
    adc.open().unwrap();
    soc.set_input(3, 0x0AA);
    soc.complete_transfer();
    soc.set_input(3, 0x0BB);
    soc.complete_transfer();

    let mut scan = [0u8; 8];
    adc.read(&mut scan, 8, ReadMode::NonBlocking).unwrap();
    assert_eq!(u16_at(&scan, 3), 0x0BB);
}

#[test]
fn test_short_destination_faults() {
    let (soc, adc) = setup();
    adc.open().unwrap();
    soc.complete_transfer();

    let mut dest = [0u8; 4];
    let err = adc.read(&mut dest, 64, ReadMode::NonBlocking).unwrap_err();
    assert!(matches!(
        err,
        AdcError::Fault {
            requested: 64,
            capacity: 4
        }
    ));
    assert_eq!(err.errno(), libc::EFAULT);
    // nothing consumed
    let mut full = vec![0u8; 8000];
    assert_eq!(adc.read(&mut full, 8000, ReadMode::NonBlocking).unwrap(), 8000);
}

#[test]
fn test_zero_count_read() {
    let (_soc, adc) = setup();
    let mut dest = [0u8; 4];
    assert_eq!(adc.read(&mut dest, 0, ReadMode::Blocking).unwrap(), 0);
}

#[test]
fn test_read_while_closed() {
    let (_soc, adc) = setup();
    let mut dest = [0u8; 4];
    let err = adc.read(&mut dest, 4, ReadMode::Blocking).unwrap_err();
    assert!(matches!(err, AdcError::NotOpen));
    assert!(!adc.poll());
}

#[test]
fn test_blocking_read_wakes_on_completion() {
    let (soc, adc) = setup();
    adc.open().unwrap();

    let n = thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut dest = vec![0u8; 8000];
            adc.read(&mut dest, 8000, ReadMode::Blocking)
        });
        until_finished(reader, || {
            soc.complete_transfer();
        })
    })
    .unwrap();
    assert_eq!(n, 8000);
}

#[test]
fn test_interrupt_readers() {
    let (_soc, adc) = setup();
    adc.open().unwrap();

    let result = thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut dest = [0u8; 8];
            adc.read(&mut dest, 8, ReadMode::Blocking)
        });
        until_finished(reader, || adc.interrupt_readers())
    });

    let err = result.unwrap_err();
    assert!(err.is_interrupted());
    assert_eq!(err.errno(), libc::EINTR);
    // an interrupted wait does not close the device
    assert!(adc.is_open());
}

#[test]
fn test_close_releases_blocked_reader() {
    let (_soc, adc) = setup();
    adc.open().unwrap();

    let result = thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut dest = [0u8; 8];
            adc.read(&mut dest, 8, ReadMode::Blocking)
        });
        until_finished(reader, || adc.close())
    });
    assert!(matches!(result, Err(AdcError::NotOpen)));
}

#[test]
fn test_stream_reader_io_errors() {
    let (soc, adc) = setup();
    adc.open().unwrap();

    let mut reader = adc.stream_reader(ReadMode::NonBlocking);
    let mut buf = [0u8; 32];
    assert_eq!(reader.read(&mut buf).unwrap_err().kind(), ErrorKind::WouldBlock);

    soc.complete_transfer();
    let mut all = Vec::new();
    let mut chunk = [0u8; 1000];
    while let Ok(n) = reader.read(&mut chunk) {
        all.extend_from_slice(&chunk[..n]);
    }
    assert_eq!(all.len(), 8000);
}

// =============================================================================
// Teardown
// =============================================================================

#[test]
fn test_close_returns_hardware_to_idle() {
    let (soc, adc) = setup();
    adc.open().unwrap();
    adc.close();

    assert!(!adc.is_open());
    assert_eq!(soc.adc_register(AdcReg::Imr), 0);
    assert_eq!(soc.adc_register(AdcReg::Chsr), 0);
    assert!(AdcMode::from_bits(soc.adc_register(AdcReg::Mr)).trigger.is_none());
    assert_eq!(soc.adc_register(AdcReg::Ptsr) & 1, 0);
    assert!(!soc.irq.is_claimed());
    assert!(!soc.adc_clock.is_enabled());
    assert!(!soc.trigger_clock.is_enabled());

    // no transfer runs once the receiver is off
    assert!(!soc.complete_transfer());

    // closing again changes nothing
    let writes = soc.adc_writes().len();
    adc.close();
    assert_eq!(soc.adc_writes().len(), writes);
}

#[test]
fn test_reopen_after_close() {
    let (soc, adc) = setup();
    adc.open().unwrap();
    soc.complete_transfer();
    adc.close();

    adc.set_attribute("ch0_enable", "0").unwrap();
    adc.open().unwrap();
    // drained again until the new session completes a buffer
    assert!(!adc.poll());
    soc.complete_transfer();

    let mut dest = vec![0u8; 8000];
    assert_eq!(
        adc.read(&mut dest, 8000, ReadMode::NonBlocking).unwrap(),
        1000 * 3 * 2
    );
}

#[test]
fn test_drop_releases_resources() {
    let soc = SimulatedSoc::new();
    {
        let adc = At91Adc::new(soc.hardware(), DeviceConfig::default()).unwrap();
        assert_eq!(soc.dma.live_regions(), 2);
        adc.open().unwrap();
    }
    assert_eq!(soc.dma.live_regions(), 0);
    assert!(!soc.irq.is_claimed());
    assert!(!soc.adc_clock.is_enabled());
}

#[test]
fn test_allocation_failure() {
    let soc = SimulatedSoc::new();
    soc.dma.fail_next_alloc();
    let err = At91Adc::new(soc.hardware(), DeviceConfig::default()).unwrap_err();
    assert!(matches!(err, AdcError::Allocation { .. }));
    assert_eq!(soc.dma.live_regions(), 0);
}
