//! Driver for the badge's SPI TFT (MIPI DCS command set, RGB565)
//!
//! Only what the badge needs: reset, init, and full-frame writes from a
//! [`Framebuffer`].

mod command;

use command::Command;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;
use log::debug;

use crate::framebuffer::{Framebuffer, HEIGHT, WIDTH};

/// Bytes sent per SPI write while streaming pixels
const WRITE_CHUNK: usize = 4096;

/// MADCTL: row/column exchange for landscape, BGR order
const MADCTL_LANDSCAPE: u8 = 0x60 | 0x08;
/// COLMOD: 16 bits per pixel
const COLMOD_RGB565: u8 = 0x55;

/// Panel RAM offset of the visible area
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Offset {
    pub x: u16,
    pub y: u16,
}

/// Driver for the 160x120 badge LCD
pub struct Panel<SPI, DC, RST> {
    spi: SPI,
    dc: DC,
    rst: RST,
    offset: Offset,
}

impl<SPI, DC, RST> Panel<SPI, DC, RST>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
{
    /// Create a new panel driver instance.
    ///
    /// Performs hardware reset and initialization.
    pub fn new<DELAY: DelayNs>(
        spi: SPI,
        dc: DC,
        rst: RST,
        offset: Offset,
        delay: &mut DELAY,
    ) -> Result<Self, SPI::Error> {
        let mut panel = Self {
            spi,
            dc,
            rst,
            offset,
        };

        panel.hardware_reset(delay);
        panel.init(delay)?;

        Ok(panel)
    }

    /// Hardware reset sequence
    fn hardware_reset<DELAY: DelayNs>(&mut self, delay: &mut DELAY) {
        let _ = self.rst.set_high();
        delay.delay_ms(10);
        let _ = self.rst.set_low();
        delay.delay_ms(10);
        let _ = self.rst.set_high();
        delay.delay_ms(120);
    }

    fn send_command(&mut self, command: Command) -> Result<(), SPI::Error> {
        let _ = self.dc.set_low();
        self.spi.write(&[command.addr()])
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), SPI::Error> {
        let _ = self.dc.set_high();
        self.spi.write(data)
    }

    fn cmd_with_data(&mut self, command: Command, data: &[u8]) -> Result<(), SPI::Error> {
        self.send_command(command)?;
        self.send_data(data)
    }

    fn init<DELAY: DelayNs>(&mut self, delay: &mut DELAY) -> Result<(), SPI::Error> {
        self.send_command(Command::SWRESET)?;
        delay.delay_ms(150);

        self.send_command(Command::SLPOUT)?;
        delay.delay_ms(120);

        self.cmd_with_data(Command::COLMOD, &[COLMOD_RGB565])?;
        self.cmd_with_data(Command::MADCTL, &[MADCTL_LANDSCAPE])?;

        // IPS panels come up inverted
        self.send_command(Command::INVON)?;
        self.send_command(Command::NORON)?;
        delay.delay_ms(10);

        self.send_command(Command::DISPON)?;
        delay.delay_ms(20);

        debug!("Panel initialized");
        Ok(())
    }

    /// Set the RAM window written by the next memory write
    fn set_window(&mut self, x0: u16, y0: u16, x1: u16, y1: u16) -> Result<(), SPI::Error> {
        let (x0, x1) = (x0 + self.offset.x, x1 + self.offset.x);
        let (y0, y1) = (y0 + self.offset.y, y1 + self.offset.y);

        let [xs_hi, xs_lo] = x0.to_be_bytes();
        let [xe_hi, xe_lo] = x1.to_be_bytes();
        self.cmd_with_data(Command::CASET, &[xs_hi, xs_lo, xe_hi, xe_lo])?;

        let [ys_hi, ys_lo] = y0.to_be_bytes();
        let [ye_hi, ye_lo] = y1.to_be_bytes();
        self.cmd_with_data(Command::RASET, &[ys_hi, ys_lo, ye_hi, ye_lo])
    }

    /// Send a whole frame
    pub fn flush(&mut self, framebuffer: &Framebuffer) -> Result<(), SPI::Error> {
        self.set_window(0, 0, WIDTH as u16 - 1, HEIGHT as u16 - 1)?;
        self.send_command(Command::RAMWR)?;

        let _ = self.dc.set_high();
        for chunk in framebuffer.as_bytes().chunks(WRITE_CHUNK) {
            self.spi.write(chunk)?;
        }
        Ok(())
    }

    /// Turn the display off and put the controller to sleep
    pub fn sleep<DELAY: DelayNs>(&mut self, delay: &mut DELAY) -> Result<(), SPI::Error> {
        self.send_command(Command::DISPOFF)?;
        self.send_command(Command::SLPIN)?;
        delay.delay_ms(5);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::RefCell;
    use core::convert::Infallible;

    use embedded_hal::spi::{ErrorType, Operation};

    use crate::framebuffer::BUFFER_SIZE;

    /// (DC level, bytes) for every SPI write
    type Bus = Rc<RefCell<Vec<(bool, Vec<u8>)>>>;

    struct MockSpi {
        bus: Bus,
        dc: Rc<RefCell<bool>>,
    }

    impl ErrorType for MockSpi {
        type Error = Infallible;
    }

    impl SpiDevice for MockSpi {
        fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Infallible> {
            for op in operations {
                if let Operation::Write(data) = op {
                    self.bus.borrow_mut().push((*self.dc.borrow(), data.to_vec()));
                }
            }
            Ok(())
        }
    }

    struct MockPin(Rc<RefCell<bool>>);

    impl embedded_hal::digital::ErrorType for MockPin {
        type Error = Infallible;
    }

    impl OutputPin for MockPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            *self.0.borrow_mut() = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            *self.0.borrow_mut() = true;
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn panel(offset: Offset) -> (Panel<MockSpi, MockPin, MockPin>, Bus) {
        let bus = Bus::default();
        let dc = Rc::new(RefCell::new(false));
        let spi = MockSpi {
            bus: bus.clone(),
            dc: dc.clone(),
        };
        let rst = MockPin(Rc::new(RefCell::new(false)));
        let panel = Panel::new(spi, MockPin(dc), rst, offset, &mut NoDelay).unwrap();
        (panel, bus)
    }

    fn commands(bus: &Bus) -> Vec<u8> {
        bus.borrow()
            .iter()
            .filter(|(dc, _)| !dc)
            .flat_map(|(_, bytes)| bytes.iter().copied())
            .collect()
    }

    #[test]
    fn test_init_sequence() {
        let (_panel, bus) = panel(Offset::default());

        assert_eq!(commands(&bus), [0x01, 0x11, 0x3A, 0x36, 0x21, 0x13, 0x29]);
        assert!(bus.borrow().contains(&(true, alloc::vec![COLMOD_RGB565])));
    }

    #[test]
    fn test_flush_streams_whole_frame() {
        let (mut panel, bus) = panel(Offset { x: 0, y: 0 });
        bus.borrow_mut().clear();

        panel.flush(&Framebuffer::new()).unwrap();

        assert_eq!(commands(&bus), [0x2A, 0x2B, 0x2C]);
        let bus = bus.borrow();
        assert_eq!(bus[1], (true, alloc::vec![0, 0, 0, 159]));
        assert_eq!(bus[3], (true, alloc::vec![0, 0, 0, 119]));
        let pixels: usize = bus[5..].iter().map(|(dc, b)| if *dc { b.len() } else { 0 }).sum();
        assert_eq!(pixels, BUFFER_SIZE);
    }

    #[test]
    fn test_window_offset() {
        let (mut panel, bus) = panel(Offset { x: 40, y: 53 });
        bus.borrow_mut().clear();

        panel.flush(&Framebuffer::new()).unwrap();

        let bus = bus.borrow();
        assert_eq!(bus[1], (true, alloc::vec![0, 40, 0, 199]));
        assert_eq!(bus[3], (true, alloc::vec![0, 53, 0, 172]));
    }
}
