use crate::{hid_descriptor::KEYBOARD_REPORT_DESCRIPTOR, report::KeyReport};
use defmt::{info, warn};
use usb_device::{
    class_prelude::{
        ControlIn, ControlOut, DescriptorWriter, EndpointAddress, EndpointIn, InterfaceNumber,
        UsbBus, UsbBusAllocator, UsbClass,
    },
    control::{Recipient, Request, RequestType},
    Result,
};

const USB_CLASS_HID: u8 = 0x03;

// HID 1.11 section 7.1, class descriptor types.
const HID_DESCRIPTOR: u8 = 0x21;
const REPORT_DESCRIPTOR: u8 = 0x22;

// HID 1.11 section 7.2, class-specific requests.
const HID_REQ_GET_REPORT: u8 = 0x01;
const HID_REQ_GET_IDLE: u8 = 0x02;
const HID_REQ_SET_REPORT: u8 = 0x09;
const HID_REQ_SET_IDLE: u8 = 0x0A;

/// Boot-protocol keyboard interface with a single interrupt IN endpoint.
///
/// Output reports (the host's LED state) arrive over the control pipe via
/// SET_REPORT, since no interrupt OUT endpoint is declared. The last LED
/// byte is kept here; `led_state()` stays `None` until the host has sent
/// one, which the main loop uses as its "enumeration finished" signal.
pub struct HidClass<'a, B: UsbBus> {
    usb_interface: InterfaceNumber,

    // The Interrupt pipe carries the input reports; reports are pushed at
    // most one at a time, gated on `in_flight`.
    in_endpoint: EndpointIn<'a, B>,
    in_flight: bool,

    // Received from the host. None until the first LED output report.
    led_state: Option<u8>,

    // HID idle rate, settable by the host and echoed back, otherwise unused.
    idle_rate: u8,
}

impl<'a, B: UsbBus> HidClass<'a, B> {
    pub fn new(bus_allocator: &'a UsbBusAllocator<B>) -> Self {
        let usb_interface = bus_allocator.interface();

        let max_packet_size = 8;
        let poll_interval = 1; // Poll every 1 ms.
        let in_endpoint = bus_allocator.interrupt(max_packet_size, poll_interval);

        Self { usb_interface, in_endpoint, in_flight: false, led_state: None, idle_rate: 0 }
    }

    /// True when the interrupt endpoint is free to take another report.
    pub fn ready(&self) -> bool {
        !self.in_flight
    }

    /// Last LED state received from the host, `None` before first contact.
    pub fn led_state(&self) -> Option<u8> {
        self.led_state
    }

    /// Queue an input report on the interrupt endpoint.
    pub fn push_report(&mut self, report: &KeyReport) -> Result<usize> {
        let written = self.in_endpoint.write(&report.as_bytes())?;
        self.in_flight = true;
        Ok(written)
    }
}

impl<B: UsbBus> UsbClass<B> for HidClass<'_, B> {
    fn get_configuration_descriptors(&self, writer: &mut DescriptorWriter) -> Result<()> {
        // HID class membership is declared on the interface descriptor, not
        // the device descriptor: class 3, boot interface subclass, keyboard
        // protocol.
        writer.interface(
            self.usb_interface,
            USB_CLASS_HID,
            1, // Boot interface subclass
            1, // Keyboard
        )?;

        let descriptor_len = KEYBOARD_REPORT_DESCRIPTOR.len() as u16;
        let [descriptor_len_lsb, descriptor_len_msb] = descriptor_len.to_le_bytes();

        writer.write(
            HID_DESCRIPTOR,
            &[
                0x11, // bcdHID - 1.11 - LSB first
                0x01, // bcdHID - 1.11 - LSB first
                0x00, // bCountryCode - 0 = Not supported/specified
                1,    // bNumDescriptors - Number of HID class descriptors to follow
                REPORT_DESCRIPTOR,  // bDescriptorType
                descriptor_len_lsb, // wDescriptorLength - LSB first
                descriptor_len_msb, // wDescriptorLength - LSB first
            ],
        )?;

        writer.endpoint(&self.in_endpoint)?;

        Ok(())
    }

    fn reset(&mut self) {
        // Bus reset: any in-flight report is gone and the host will
        // renegotiate LED state from scratch.
        self.in_flight = false;
        self.led_state = None;
        self.idle_rate = 0;
    }

    fn control_in(&mut self, xfer: ControlIn<B>) {
        let req = xfer.request();

        if req.recipient != Recipient::Interface
            || req.index != u16::from(u8::from(self.usb_interface))
        {
            return;
        }

        match (req.request_type, req.request) {
            (RequestType::Standard, Request::GET_DESCRIPTOR) => {
                let (descriptor_type, _index) = req.descriptor_type_index();
                if descriptor_type == REPORT_DESCRIPTOR {
                    xfer.accept_with_static(KEYBOARD_REPORT_DESCRIPTOR).ok();
                }
            }
            (RequestType::Class, HID_REQ_GET_REPORT) => {
                // A host polling the control pipe gets a benign "no keys
                // pressed" report, whatever the interrupt pipe is doing.
                xfer.accept_with(&KeyReport::released().as_bytes()).ok();
            }
            (RequestType::Class, HID_REQ_GET_IDLE) => {
                xfer.accept_with(&[self.idle_rate]).ok();
            }
            (RequestType::Class, request) => {
                warn!("unsupported HID control_in request: {=u8:x}", request);
            }
            _ => {}
        }
    }

    fn control_out(&mut self, xfer: ControlOut<B>) {
        let req = xfer.request();

        if req.request_type != RequestType::Class
            || req.recipient != Recipient::Interface
            || req.index != u16::from(u8::from(self.usb_interface))
        {
            return;
        }

        match req.request {
            HID_REQ_SET_REPORT => {
                // The only output report is the single LED byte.
                match xfer.data() {
                    &[leds] => {
                        if self.led_state != Some(leds) {
                            info!("host LED state: {=u8:b}", leds);
                        }
                        self.led_state = Some(leds);
                        xfer.accept().ok();
                    }
                    _ => {
                        xfer.reject().ok();
                    }
                }
            }
            HID_REQ_SET_IDLE => {
                self.idle_rate = (req.value >> 8) as u8;
                xfer.accept().ok();
            }
            request => {
                warn!("unsupported HID control_out request: {=u8:x}", request);
            }
        }
    }

    fn endpoint_in_complete(&mut self, addr: EndpointAddress) {
        if addr == self.in_endpoint.address() {
            self.in_flight = false;
        }
    }
}
