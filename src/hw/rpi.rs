//! Raspberry Pi hardware backend
//!
//! GPIO through `rppal`, PWM through a PCA9685 16-channel driver board on
//! I2C (steering servo plus the two H-bridge enables), color through a
//! TCS34725. The PCA9685 is shared: each consumer holds a channel handle
//! onto the same mutex-guarded board.

use crate::actuators::drive::{DriveMotors, MotorChannel};
use crate::actuators::steering::SteeringServo;
use crate::config::{CarConfig, MotorPins, SensorPins};
use crate::error::Result;
use crate::hw::{DigitalInput, DigitalOutput, HardwareSet, PwmChannel};
use crate::sensors::rgb::RgbSensor;
use crate::sensors::ultrasonic::{GpioRangeFinder, UltrasonicSensor};
use crate::sensors::DistanceSensor;
use log::info;
use parking_lot::Mutex;
use rppal::gpio::{Gpio, InputPin, OutputPin};
use rppal::i2c::I2c;
use std::sync::Arc;
use std::time::Duration;

// PCA9685 registers
const MODE1: u8 = 0x00;
const PRESCALE: u8 = 0xFE;
const LED0_ON_L: u8 = 0x06;
const MODE1_SLEEP: u8 = 0x10;
const MODE1_AUTO_INC: u8 = 0x20;
const MODE1_RESTART: u8 = 0x80;
/// LED full-off bit in the OFF high byte
const FULL_OFF: u16 = 0x1000;
const OSC_HZ: f64 = 25_000_000.0;

struct RpiOutputPin(OutputPin);

impl DigitalOutput for RpiOutputPin {
    fn set_high(&mut self) {
        self.0.set_high();
    }

    fn set_low(&mut self) {
        self.0.set_low();
    }
}

struct RpiInputPin(InputPin);

impl DigitalInput for RpiInputPin {
    fn is_high(&self) -> bool {
        self.0.is_high()
    }
}

/// PCA9685 16-channel 12-bit PWM driver
pub struct Pca9685 {
    i2c: I2c,
}

impl Pca9685 {
    pub fn new(mut i2c: I2c, addr: u8, frequency_hz: u16) -> Result<Self> {
        i2c.set_slave_address(addr as u16)?;
        // Sleep before touching the prescaler, then restart with
        // auto-increment so channel writes go out as one transfer
        let prescale = (OSC_HZ / (4096.0 * frequency_hz as f64) - 1.0).round() as u8;
        i2c.block_write(MODE1, &[MODE1_SLEEP])?;
        i2c.block_write(PRESCALE, &[prescale])?;
        i2c.block_write(MODE1, &[MODE1_AUTO_INC])?;
        std::thread::sleep(Duration::from_micros(500));
        i2c.block_write(MODE1, &[MODE1_RESTART | MODE1_AUTO_INC])?;
        info!(
            "PCA9685 at 0x{:02x} running at {} Hz (prescale {})",
            addr, frequency_hz, prescale
        );
        Ok(Self { i2c })
    }

    fn set_channel(&mut self, channel: u8, on: u16, off: u16) -> Result<()> {
        let reg = LED0_ON_L + 4 * channel;
        self.i2c.block_write(
            reg,
            &[on as u8, (on >> 8) as u8, off as u8, (off >> 8) as u8],
        )?;
        Ok(())
    }
}

/// One channel of a shared [`Pca9685`]
pub struct Pca9685Channel {
    board: Arc<Mutex<Pca9685>>,
    channel: u8,
}

impl Pca9685Channel {
    pub fn new(board: Arc<Mutex<Pca9685>>, channel: u8) -> Self {
        Self { board, channel }
    }
}

impl PwmChannel for Pca9685Channel {
    fn set_ticks(&mut self, ticks: u16) -> Result<()> {
        self.board.lock().set_channel(self.channel, 0, ticks.min(4095))
    }

    fn disable(&mut self) -> Result<()> {
        self.board.lock().set_channel(self.channel, 0, FULL_OFF)
    }
}

// TCS34725 registers (command bit plus auto-increment protocol)
const TCS_CMD_AUTO_INC: u8 = 0xA0;
const TCS_ENABLE: u8 = 0x00;
const TCS_ATIME: u8 = 0x01;
const TCS_CDATAL: u8 = 0x14;
const TCS_ENABLE_PON: u8 = 0x01;
const TCS_ENABLE_AEN: u8 = 0x02;
const TCS_ADDR: u16 = 0x29;

/// TCS34725 color sensor
pub struct Tcs34725 {
    i2c: I2c,
}

impl Tcs34725 {
    pub fn new(mut i2c: I2c, integration_time_ms: u16) -> Result<Self> {
        i2c.set_slave_address(TCS_ADDR)?;
        let atime = 256u16.saturating_sub((integration_time_ms as f64 / 2.4) as u16) as u8;
        i2c.block_write(TCS_CMD_AUTO_INC | TCS_ATIME, &[atime])?;
        i2c.block_write(TCS_CMD_AUTO_INC | TCS_ENABLE, &[TCS_ENABLE_PON])?;
        std::thread::sleep(Duration::from_millis(3));
        i2c.block_write(
            TCS_CMD_AUTO_INC | TCS_ENABLE,
            &[TCS_ENABLE_PON | TCS_ENABLE_AEN],
        )?;
        info!("TCS34725 enabled (integration {} ms)", integration_time_ms);
        Ok(Self { i2c })
    }
}

impl RgbSensor for Tcs34725 {
    /// Raw clear/red/green/blue counts scaled to bytes against the clear
    /// channel
    fn read_rgb(&mut self) -> Result<(u8, u8, u8)> {
        let mut buf = [0u8; 8];
        self.i2c.block_read(TCS_CMD_AUTO_INC | TCS_CDATAL, &mut buf)?;
        let clear = u16::from_le_bytes([buf[0], buf[1]]) as u32;
        let red = u16::from_le_bytes([buf[2], buf[3]]) as u32;
        let green = u16::from_le_bytes([buf[4], buf[5]]) as u32;
        let blue = u16::from_le_bytes([buf[6], buf[7]]) as u32;
        if clear == 0 {
            return Ok((0, 0, 0));
        }
        let scale = |channel: u32| (channel * 255 / clear).min(255) as u8;
        Ok((scale(red), scale(green), scale(blue)))
    }
}

fn motor_channel(
    gpio: &Gpio,
    board: &Arc<Mutex<Pca9685>>,
    pins: &MotorPins,
) -> Result<MotorChannel> {
    Ok(MotorChannel::new(
        Box::new(RpiOutputPin(gpio.get(pins.pin_a)?.into_output_low())),
        Box::new(RpiOutputPin(gpio.get(pins.pin_b)?.into_output_low())),
        Box::new(Pca9685Channel::new(Arc::clone(board), pins.enable_channel)),
    ))
}

fn rangefinder(
    gpio: &Gpio,
    name: &'static str,
    pins: &SensorPins,
    config: &CarConfig,
) -> Result<Box<dyn DistanceSensor>> {
    let finder = GpioRangeFinder::new(
        name,
        Box::new(RpiOutputPin(gpio.get(pins.trigger)?.into_output_low())),
        Box::new(RpiInputPin(gpio.get(pins.echo)?.into_input())),
        Duration::from_secs_f64(config.sensors.echo_timeout_s),
    );
    Ok(Box::new(UltrasonicSensor::new(
        name,
        Box::new(finder),
        &config.sensors,
    )))
}

/// Open the GPIO and I2C devices and assemble the full hardware set
pub fn create_rpi_hardware(config: &CarConfig) -> Result<HardwareSet> {
    let hw = &config.hardware;
    let gpio = Gpio::new()?;
    let pwm_i2c = I2c::with_bus(hw.i2c_bus)?;
    let board = Arc::new(Mutex::new(Pca9685::new(
        pwm_i2c,
        hw.pca9685_addr,
        config.drive.pwm_frequency_hz,
    )?));

    let drive = DriveMotors::new(
        motor_channel(&gpio, &board, &config.drive.motor0)?,
        motor_channel(&gpio, &board, &config.drive.motor1)?,
    );
    let steering = SteeringServo::new(
        Box::new(Pca9685Channel::new(
            Arc::clone(&board),
            config.steering.channel,
        )),
        &config.steering,
    );

    let rgb_i2c = I2c::with_bus(hw.i2c_bus)?;
    let rgb = Tcs34725::new(rgb_i2c, config.launch.integration_time_ms)?;

    Ok(HardwareSet {
        drive,
        steering,
        front: rangefinder(&gpio, "front", &hw.front, config)?,
        left: rangefinder(&gpio, "left", &hw.left, config)?,
        right: rangefinder(&gpio, "right", &hw.right, config)?,
        rgb: Box::new(rgb),
        line_input: Box::new(RpiInputPin(gpio.get(config.line.pin)?.into_input())),
    })
}
