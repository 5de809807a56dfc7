// One-button USB HID keyboard: each debounced press toggles between holding
// a fixed key combination (Left Shift + W) and idle. An LED mirrors the
// operating mode, a second LED mirrors the host's num-lock state.

#![no_main]
#![no_std]

use core::cell::RefCell;

use critical_section::Mutex;
use defmt::{error, info};
use defmt_rtt as _;
use embedded_hal::digital::{InputPin, OutputPin};
use fugit::MicrosDurationU32;
use panic_probe as _;
use rp2040_hal::{
    gpio::{bank0::Gpio16, FunctionSioInput, Pin, PullUp},
    pac,
    pac::interrupt,
    timer::{Alarm, Alarm0},
    usb::UsbBus,
    Sio, Timer, Watchdog,
};
use usb_device::{
    bus::UsbBusAllocator,
    device::{StringDescriptors, UsbDeviceBuilder, UsbVidPid},
    UsbError,
};

use crate::{
    debounce::{Debouncer, LineMask},
    hid_class::HidClass,
    keycodes::{led, modifier, KeyCode},
    report::KeyReporter,
};

mod debounce;
mod hid_class;
mod hid_descriptor;
mod keycodes;
mod report;

/// The linker will place this boot block at the start of our program image. We
/// need this to help the ROM bootloader get our code up and running.
#[link_section = ".boot2"]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;

const EXTERNAL_CRYSTAL_FREQUENCY_HZ: u32 = 12_000_000;

/// Debounce sampler cadence. With the 4-tick counter window this makes the
/// debounce time 4 * 5 ms = 20 ms.
const DEBOUNCE_TICK: MicrosDurationU32 = MicrosDurationU32::millis(5);

/// The main loop has to come back around within this period or the chip
/// resets.
const WATCHDOG_PERIOD: MicrosDurationU32 = MicrosDurationU32::millis(1_000);

/// The single monitored input line.
const BUTTON_LINE: LineMask = 1 << 0;

type ButtonPin = Pin<Gpio16, FunctionSioInput, PullUp>;

/// Everything the periodic tick owns: the re-arming alarm, the raw button
/// pin, and the debouncer whose pending-press mask the main loop drains.
///
/// Shared across the interrupt/main-loop boundary behind a critical
/// section; both sides keep the locked region down to a few bit operations
/// so neither USB polling nor the tick cadence suffers.
struct TickSampler {
    alarm: Alarm0,
    button: ButtonPin,
    debouncer: Debouncer,
}

static SAMPLER: Mutex<RefCell<Option<TickSampler>>> = Mutex::new(RefCell::new(None));

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}

#[cortex_m_rt::entry]
fn main() -> ! {
    info!("Start of main()");
    let mut pac = pac::Peripherals::take().unwrap();

    let mut watchdog = Watchdog::new(pac.WATCHDOG);

    let clocks = rp2040_hal::clocks::init_clocks_and_plls(
        EXTERNAL_CRYSTAL_FREQUENCY_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();

    // Setup USB
    let force_vbus_detect_bit = true;
    let usb_bus = UsbBus::new(
        pac.USBCTRL_REGS,
        pac.USBCTRL_DPRAM,
        clocks.usb_clock,
        force_vbus_detect_bit,
        &mut pac.RESETS,
    );

    let bus_allocator = UsbBusAllocator::new(usb_bus);
    let mut hid = HidClass::new(&bus_allocator);

    // https://github.com/obdev/v-usb/blob/master/usbdrv/USB-IDs-for-free.txt
    let mut usb_device = UsbDeviceBuilder::new(&bus_allocator, UsbVidPid(0x16c0, 0x27db))
        .strings(&[StringDescriptors::default().manufacturer("toggle-key").product("toggle key")])
        .unwrap()
        .build();

    info!("USB initialized");

    // Get the GPIO peripherals.
    let sio = Sio::new(pac.SIO);

    let pins =
        rp2040_hal::gpio::Pins::new(pac.IO_BANK0, pac.PADS_BANK0, sio.gpio_bank0, &mut pac.RESETS);

    // One active-low button, two active-high indicator LEDs.
    let mut button = pins.gpio16.into_pull_up_input();
    let mut mode_led = pins.gpio25.into_push_pull_output();
    let mut status_led = pins.gpio24.into_push_pull_output();
    mode_led.set_low().unwrap();
    status_led.set_low().unwrap();

    // Adopt whatever level the button sits at right now, so a button held
    // through reset does not synthesize a press event.
    let held = button.is_low().unwrap();
    let debouncer = Debouncer::with_state(if held { BUTTON_LINE } else { 0 });

    // Timer-based resources: alarm 0 drives the debounce tick.
    let mut timer = Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    let mut alarm = timer.alarm_0().unwrap();
    alarm.schedule(DEBOUNCE_TICK).unwrap();
    alarm.enable_interrupt();

    critical_section::with(|cs| {
        SAMPLER.borrow_ref_mut(cs).replace(TickSampler { alarm, button, debouncer });
    });

    unsafe {
        pac::NVIC::unmask(pac::Interrupt::TIMER_IRQ_0);
    }

    let mut reporter = KeyReporter::new(modifier::LEFT_SHIFT, KeyCode::W);

    watchdog.start(WATCHDOG_PERIOD);

    info!("Start main loop");

    loop {
        watchdog.feed();
        usb_device.poll(&mut [&mut hid]);

        if take_button_press() {
            let active = reporter.toggle();
            info!("button press, active: {}", active);
            if active {
                mode_led.set_high().unwrap();
            } else {
                mode_led.set_low().unwrap();
            }
        }

        // Mirror the host's num-lock flag once LED reports have started.
        match hid.led_state() {
            Some(leds) if leds & led::NUM_LOCK != 0 => status_led.set_high().unwrap(),
            Some(_) => status_led.set_low().unwrap(),
            None => {}
        }

        // Reports only flow once the endpoint is free and the host has sent
        // its initial LED state; the latter doubles as the signal that
        // enumeration is done.
        if hid.ready() && hid.led_state().is_some() {
            if let Some(report) = reporter.next_report() {
                match hid.push_report(report) {
                    Ok(_) => {}
                    Err(err) => match err {
                        UsbError::WouldBlock => info!("UsbError::WouldBlock"),
                        UsbError::ParseError => error!("UsbError::ParseError"),
                        UsbError::BufferOverflow => error!("UsbError::BufferOverflow"),
                        UsbError::EndpointOverflow => error!("UsbError::EndpointOverflow"),
                        UsbError::EndpointMemoryOverflow => {
                            error!("UsbError::EndpointMemoryOverflow")
                        }
                        UsbError::InvalidEndpoint => error!("UsbError::InvalidEndpoint"),
                        UsbError::Unsupported => error!("UsbError::Unsupported"),
                        UsbError::InvalidState => error!("UsbError::InvalidState"),
                    },
                }
            }
        }
    }
}

/// Drain the pending press edge for the button, if any. Runs with the
/// sampler locked out so the read-and-clear is atomic.
fn take_button_press() -> bool {
    critical_section::with(|cs| {
        SAMPLER
            .borrow_ref_mut(cs)
            .as_mut()
            .map_or(false, |sampler| sampler.debouncer.consume(BUTTON_LINE) != 0)
    })
}

/// Periodic debounce tick: read the button, feed the debouncer, re-arm.
#[interrupt]
fn TIMER_IRQ_0() {
    critical_section::with(|cs| {
        if let Some(sampler) = SAMPLER.borrow_ref_mut(cs).as_mut() {
            sampler.alarm.clear_interrupt();
            // Active low: pressed reads as electrically low.
            let raw = if sampler.button.is_low().unwrap() { BUTTON_LINE } else { 0 };
            sampler.debouncer.sample(raw);
            sampler.alarm.schedule(DEBOUNCE_TICK).ok();
        }
    });
}
