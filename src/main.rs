//! Click demo: polls a stack of mikroBUS Click boards on an ESP32-S3
//!
//! Every I2C click and the load cell are read once per polling round and
//! each reading is emitted as one NDJSON line over serial. The same lines
//! are streamed to a phone through the BLE 2 click, which also carries
//! host commands back. Weight is broadcast over the LR click and a
//! summary is drawn on the OLED W click.
//!
//! Wiring on the four-socket shield:
//! - socket 1: BLE 2 click (RN4871), UART1
//! - socket 2: LR click, UART2
//! - socket 3: OLED W click, SPI2 with DC on the PWM pin
//! - socket 4: Load Cell click (HX711), bit-banged on the private SPI pins
//! - shared I2C: Accel, 6DOF IMU, Air quality 3, Fuel Gauge, IR Gesture,
//!   LightRanger, Spectral and Expand 2 clicks on a click shuttle. Their
//!   control lines are jumpered to the AN pins of sockets 1-3.

#![no_std]
#![no_main]

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

mod display;

// Re-export library modules so binary submodules can use crate::*
pub(crate) use click_drivers::{board, comm, protocol};

use core::cell::{Cell, RefCell};
use critical_section::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Timer};
use embedded_hal_bus::i2c::RefCellDevice;
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::delay::Delay;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::spi::Mode;
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{Config as UartConfig, Uart};
use esp_hal::Blocking;

use click_drivers::drivers::{
    accel, air_quality, bluetooth, expander, fuel_gauge, gesture, imu, load_cell, lora, oled,
    range, spectral,
};
use click_drivers::Error;
use comm::PollConfig;
use display::Summary;
use protocol::{HostCommand, MsgBuffer, Reading, ScaleRequest, MAX_MSG_LEN, VERSION};

// ── Channel type aliases ──────────────────────────────────────────────

type OutputChannel = Channel<CriticalSectionRawMutex, MsgBuffer, 8>;
type BtOutputChannel = Channel<CriticalSectionRawMutex, MsgBuffer, 4>;
type CommandChannel = Channel<CriticalSectionRawMutex, HostCommand, 4>;
type ScaleChannel = Channel<CriticalSectionRawMutex, ScaleRequest, 2>;
type LoraChannel = Channel<CriticalSectionRawMutex, i32, 2>;

// ── Static channels and shared state ─────────────────────────────────

/// Serialized readings and status messages
static OUTPUT_CHANNEL: OutputChannel = Channel::new();

/// Copy of every output line for the BLE stream
static BT_OUTPUT_CHANNEL: BtOutputChannel = Channel::new();

/// Host commands received over BLE
static CMD_CHANNEL: CommandChannel = Channel::new();

/// Tare/calibrate requests for the polling loop, which owns the HX711
static SCALE_CHANNEL: ScaleChannel = Channel::new();

/// Latest weight (mg) for the LoRa broadcaster
static LORA_CHANNEL: LoraChannel = Channel::new();

/// Polling state, changed by host commands.
static POLL_CONFIG: Mutex<Cell<PollConfig>> = Mutex::new(Cell::new(PollConfig::new()));

/// Click boards that answered during bring-up, reported in status messages.
static CLICKS: Mutex<RefCell<heapless::Vec<&'static str, 16>>> =
    Mutex::new(RefCell::new(heapless::Vec::new()));

/// Samples averaged for tare and calibration
const SCALE_SAMPLES: u8 = 10;

fn get_poll_config() -> PollConfig {
    critical_section::with(|cs| POLL_CONFIG.borrow(cs).get())
}

/// Uptime in milliseconds, truncated to 32 bits for the wire.
fn now_ms() -> u32 {
    (Instant::now().as_millis() & 0xFFFF_FFFF) as u32
}

/// Serialize a reading and queue it for the serial task (drops if full).
fn emit(msg: &Reading<'_>) {
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok();
    if let Some(len) = comm::serialize_message(msg, &mut buf) {
        buf.truncate(len);
        let _ = OUTPUT_CHANNEL.try_send(buf);
    }
}

fn send_status() {
    let config = get_poll_config();
    let uptime = (Instant::now().as_millis() / 1000) as u32;
    critical_section::with(|cs| {
        let clicks = CLICKS.borrow(cs).borrow();
        emit(&Reading::Status {
            polling: config.enabled,
            interval_ms: config.interval_ms,
            uptime,
            clicks: &clicks,
            board: board::BOARD_NAME,
            version: VERSION,
        });
    });
}

/// Log the outcome of a click's init + default configuration and record
/// it in the status list when it came up.
fn bring_up<E: core::fmt::Debug>(name: &'static str, result: Result<(), Error<E>>) -> bool {
    match result {
        Ok(()) => {
            log::info!("{} click ready", name);
            critical_section::with(|cs| {
                let _ = CLICKS.borrow(cs).borrow_mut().push(name);
            });
            true
        }
        Err(e) => {
            log::warn!("{} click not available: {}", name, e);
            false
        }
    }
}

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Start the RTOS: requires timer + software interrupt
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!("Click demo v{} starting on {}", VERSION, board::BOARD_NAME);

    spawner.spawn(output_serial_task()).unwrap();
    spawner.spawn(status_task()).unwrap();
    spawner.spawn(command_task()).unwrap();

    // ── Serial clicks (own tasks) ──────────────────────────────────────

    // Socket 1: BLE 2 click
    let bt_uart = Uart::new(
        peripherals.UART1,
        UartConfig::default().with_baudrate(comm::SERIAL_BAUD),
    )
    .expect("UART1 init failed")
    .with_rx(peripherals.GPIO18)
    .with_tx(peripherals.GPIO17);
    let bt_rst = Output::new(peripherals.GPIO4, Level::High, OutputConfig::default());
    spawner.spawn(bluetooth_task(bt_uart, bt_rst)).unwrap();

    // Socket 2: LR click
    let lora_uart = Uart::new(
        peripherals.UART2,
        UartConfig::default().with_baudrate(comm::SERIAL_BAUD),
    )
    .expect("UART2 init failed")
    .with_rx(peripherals.GPIO39)
    .with_tx(peripherals.GPIO40);
    let lora_rst = Output::new(peripherals.GPIO14, Level::High, OutputConfig::default());
    spawner.spawn(lora_task(lora_uart, lora_rst)).unwrap();

    // ── Polled clicks (owned by this loop) ──────────────────────────────

    let mut delay = Delay::new();

    let i2c = I2c::new(
        peripherals.I2C0,
        I2cConfig::default().with_frequency(Rate::from_khz(board::I2C_FREQ_KHZ)),
    )
    .expect("I2C init failed")
    .with_sda(peripherals.GPIO8)
    .with_scl(peripherals.GPIO9);
    let i2c_bus = RefCell::new(i2c);

    let mut accel = accel::Accel::new(RefCellDevice::new(&i2c_bus), accel::Config::new());
    let accel_ok = bring_up("accel", accel.init().and_then(|_| accel.default_cfg()));

    let mut imu = imu::Imu::new(RefCellDevice::new(&i2c_bus), imu::Config::new());
    let imu_ok = bring_up("imu", imu.init().and_then(|_| imu.default_cfg(&mut delay)));

    let wake = Output::new(peripherals.GPIO1, Level::High, OutputConfig::default());
    let mut air = air_quality::AirQualitySensor::new(
        RefCellDevice::new(&i2c_bus),
        wake,
        air_quality::Config::new(),
    );
    let air_ok = bring_up("air", air.init(&mut delay).and_then(|_| air.default_cfg()));

    let mut gauge = fuel_gauge::FuelGauge::new(RefCellDevice::new(&i2c_bus), fuel_gauge::Config::new());
    let gauge_ok = bring_up("battery", gauge.init().and_then(|_| gauge.default_cfg()));

    let mut gesture = gesture::GestureSensor::new(RefCellDevice::new(&i2c_bus), gesture::Config::new());
    let gesture_ok = bring_up(
        "gesture",
        gesture
            .init()
            .and_then(|_| gesture.default_cfg())
            .and_then(|_| gesture.enable_gesture()),
    );

    let ce = Output::new(peripherals.GPIO3, Level::Low, OutputConfig::default());
    let mut ranger = range::RangeSensor::new(RefCellDevice::new(&i2c_bus), ce);
    let range_ok = bring_up("range", ranger.init(&mut delay).and_then(|_| ranger.default_cfg()));

    let mut spectral = spectral::Spectral::new(RefCellDevice::new(&i2c_bus), spectral::Config::new());
    let spectral_ok = bring_up("spectral", spectral.init().and_then(|_| spectral.default_cfg()));

    let io_rst = Output::new(peripherals.GPIO2, Level::High, OutputConfig::default());
    let mut io = expander::Expander::new(RefCellDevice::new(&i2c_bus), io_rst, expander::Config::new());
    let io_ok = bring_up("io", io.init(&mut delay).and_then(|_| io.default_cfg()));

    // Socket 4: Load Cell click
    let sck = Output::new(peripherals.GPIO38, Level::Low, OutputConfig::default());
    let dout = Input::new(peripherals.GPIO21, InputConfig::default());
    let mut scale = load_cell::LoadCell::new(sck, dout, load_cell::Config::new());
    let scale_ok = bring_up("weight", scale.init(&mut delay));

    // Socket 3: OLED W click
    let spi_config = SpiConfig::default()
        .with_frequency(Rate::from_mhz(board::SPI_FREQ_MHZ))
        .with_mode(Mode::_0);
    let spi = Spi::new(peripherals.SPI2, spi_config)
        .expect("SPI2 init failed")
        .with_sck(peripherals.GPIO12)
        .with_mosi(peripherals.GPIO11);
    let cs = Output::new(peripherals.GPIO42, Level::High, OutputConfig::default());
    let spi_device = ExclusiveDevice::new_no_delay(spi, cs).expect("SPI device init failed");
    let dc = Output::new(peripherals.GPIO47, Level::Low, OutputConfig::default());
    let rst = Output::new(peripherals.GPIO41, Level::High, OutputConfig::default());
    let mut screen = oled::Oled::new(spi_device, dc, rst, oled::Config::new());
    let screen_ok = bring_up("oled", screen.init(&mut delay).and_then(|_| screen.default_cfg()));

    if screen_ok {
        display::draw_splash(&mut screen);
        let _ = screen.flush();
        Timer::after(Duration::from_secs(2)).await;
    }

    send_status();

    // ── Polling loop ────────────────────────────────────────────────────

    let mut summary = Summary::default();

    loop {
        let config = get_poll_config();
        summary.polling = config.enabled;

        if let Ok(request) = SCALE_CHANNEL.try_receive() {
            if !scale_ok {
                log::warn!("Scale request {:?} ignored: no load cell", request);
            } else {
                match request {
                    ScaleRequest::Tare => match scale.tare(&mut delay, SCALE_SAMPLES) {
                        Ok(offset) => log::info!("Scale tared, offset {}", offset),
                        Err(e) => log::warn!("Tare failed: {}", e),
                    },
                    ScaleRequest::Calibrate { grams } => {
                        match scale.calibrate(&mut delay, grams, SCALE_SAMPLES) {
                            Ok(k) => log::info!("Scale calibrated against {} g ({} counts/g)", grams, k),
                            Err(e) => log::warn!("Calibration failed: {}", e),
                        }
                    }
                }
            }
        }

        if config.enabled {
            let ts = now_ms();

            if accel_ok {
                match accel.read_mg() {
                    Ok(a) => emit(&Reading::Accel {
                        x_mg: a.x,
                        y_mg: a.y,
                        z_mg: a.z,
                        ts,
                    }),
                    Err(e) => log::warn!("accel read failed: {}", e),
                }
            }

            if imu_ok {
                match (imu.read_accel_mg(), imu.read_gyro_mdps(), imu.read_temperature_centi()) {
                    (Ok(a), Ok(g), Ok(t)) => emit(&Reading::Imu {
                        accel_mg: a.to_array(),
                        gyro_mdps: g.to_array(),
                        temp_c100: t,
                        ts,
                    }),
                    (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                        log::warn!("imu read failed: {}", e)
                    }
                }
            }

            if air_ok {
                match air.data_ready() {
                    Ok(true) => match air.read_algorithm_results() {
                        Ok(q) => {
                            summary.eco2_ppm = Some(q.eco2_ppm);
                            emit(&Reading::AirQuality {
                                eco2_ppm: q.eco2_ppm,
                                tvoc_ppb: q.tvoc_ppb,
                                ts,
                            });
                        }
                        Err(e) => log::warn!("air quality read failed: {}", e),
                    },
                    Ok(false) => {}
                    Err(e) => log::warn!("air quality status failed: {}", e),
                }
            }

            if gauge_ok {
                match (gauge.voltage_mv(), gauge.state_of_charge_centi(), gauge.alert()) {
                    (Ok(mv), Ok(soc), Ok(alert)) => {
                        summary.battery_c100 = Some(soc);
                        emit(&Reading::Battery {
                            mv,
                            soc_c100: soc,
                            alert,
                            ts,
                        });
                    }
                    (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                        log::warn!("fuel gauge read failed: {}", e)
                    }
                }
            }

            if gesture_ok {
                match gesture.read_gesture(&mut delay) {
                    Ok(Some(g)) => {
                        summary.gesture = Some(g.as_str());
                        emit(&Reading::Gesture { dir: g.as_str(), ts });
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("gesture read failed: {}", e),
                }
            }

            if range_ok {
                match ranger.read_range_mm(&mut delay) {
                    Ok(mm) => {
                        summary.range_mm = Some(mm);
                        emit(&Reading::Range { mm, ts });
                    }
                    Err(e) => {
                        summary.range_mm = None;
                        log::debug!("range read failed: {}", e);
                    }
                }
            }

            if spectral_ok {
                match spectral.data_ready() {
                    Ok(true) => match spectral.read_raw() {
                        Ok(raw) => emit(&Reading::Spectrum { raw: &raw, ts }),
                        Err(e) => log::warn!("spectral read failed: {}", e),
                    },
                    Ok(false) => {}
                    Err(e) => log::warn!("spectral status failed: {}", e),
                }
            }

            if io_ok {
                match io.read_all() {
                    Ok(ports) => emit(&Reading::Io {
                        port_a: ports as u8,
                        port_b: (ports >> 8) as u8,
                        ts,
                    }),
                    Err(e) => log::warn!("expander read failed: {}", e),
                }
            }

            if scale_ok {
                match scale.read_raw(&mut delay) {
                    Ok(raw) => {
                        let mg = (scale.to_grams(raw) * 1000.0) as i32;
                        summary.weight_mg = Some(mg);
                        emit(&Reading::Weight { mg, raw, ts });
                        let _ = LORA_CHANNEL.try_send(mg);
                    }
                    Err(e) => log::warn!("load cell read failed: {}", e),
                }
            }
        }

        if screen_ok {
            display::draw_summary(&mut screen, &summary);
            if let Err(e) = screen.flush() {
                log::warn!("OLED flush failed: {}", e);
            }
        }

        Timer::after(Duration::from_millis(config.interval_ms as u64)).await;
    }
}

/// Serial output task: reads from output channel, logs to serial,
/// and forwards a clone to the BLE output channel.
#[embassy_executor::task]
async fn output_serial_task() {
    log::info!("Serial output task started");

    let output_rx = OUTPUT_CHANNEL.receiver();

    loop {
        let msg = output_rx.receive().await;

        // Forward to BLE output channel (non-blocking, drops if full or not streaming)
        let _ = BT_OUTPUT_CHANNEL.try_send(msg.clone());

        // Log to serial via esp-println
        if let Ok(s) = core::str::from_utf8(&msg) {
            log::info!("{}", s.trim_end());
        }
    }
}

/// Periodic status reporting task
#[embassy_executor::task]
async fn status_task() {
    loop {
        Timer::after(Duration::from_secs(30)).await;
        send_status();
    }
}

/// Host command processing task: drains CMD_CHANNEL, updates polling
/// state, forwards scale work to the polling loop and answers status
/// requests.
#[embassy_executor::task]
async fn command_task() {
    let cmd_rx = CMD_CHANNEL.receiver();

    loop {
        let cmd = cmd_rx.receive().await;

        let mut config = get_poll_config();
        let request = comm::handle_command(&cmd, &mut config);
        critical_section::with(|cs| POLL_CONFIG.borrow(cs).set(config));

        if let Some(request) = request {
            if SCALE_CHANNEL.try_send(request).is_err() {
                log::warn!("Scale busy, dropped {:?}", request);
            }
        }

        if matches!(cmd, HostCommand::GetStatus) {
            send_status();
        }
    }
}

/// BLE 2 click task: configures the RN4871 for transparent UART, streams
/// output lines to a connected phone and feeds received lines to the
/// command parser.
#[embassy_executor::task]
async fn bluetooth_task(uart: Uart<'static, Blocking>, rst: Output<'static>) {
    let mut delay = Delay::new();
    let mut bt = bluetooth::Bluetooth::new(uart, rst, bluetooth::Config::new());

    if !bring_up("ble", bt.init(&mut delay).and_then(|_| bt.default_cfg(&mut delay))) {
        return;
    }

    let out_rx = BT_OUTPUT_CHANNEL.receiver();
    let mut streaming = false;

    loop {
        match bt.poll() {
            Ok(Some(bluetooth::Event::Connected(peer))) => log::info!("BLE peer {} connected", peer),
            Ok(Some(bluetooth::Event::StreamOpen)) => streaming = true,
            Ok(Some(bluetooth::Event::Disconnected)) => {
                streaming = false;
                log::info!("BLE peer disconnected");
            }
            Ok(Some(bluetooth::Event::Line(line))) => {
                if let Some(cmd) = comm::parse_command(&line) {
                    let _ = CMD_CHANNEL.try_send(cmd);
                }
            }
            Ok(Some(_)) | Ok(None) => {}
            Err(e) => log::warn!("BLE read failed: {}", e),
        }

        while let Ok(msg) = out_rx.try_receive() {
            if streaming {
                if let Err(e) = bt.write_data(&msg) {
                    log::warn!("BLE write failed: {}", e);
                }
            }
        }

        Timer::after(Duration::from_millis(20)).await;
    }
}

/// LR click task: broadcasts the latest weight as a 4-byte big-endian
/// milligram value and logs anything heard in between.
#[embassy_executor::task]
async fn lora_task(uart: Uart<'static, Blocking>, rst: Output<'static>) {
    let mut delay = Delay::new();
    let mut radio = lora::Lora::new(uart, rst, lora::Config::new());

    let result = radio.init(&mut delay).and_then(|v| {
        log::info!("LoRa firmware {}.{}.{}", v.major, v.minor, v.patch);
        radio.default_cfg(&mut delay)
    });
    if !bring_up("lora", result) {
        return;
    }

    let weight_rx = LORA_CHANNEL.receiver();

    loop {
        if let Ok(mg) = weight_rx.try_receive() {
            if let Err(e) = radio.transmit(&mut delay, &mg.to_be_bytes()) {
                log::warn!("LoRa transmit failed: {}", e);
            }
        }

        match radio.poll_received() {
            Ok(Some(rx)) => log::info!(
                "LoRa rx {} bytes, rssi {} dBm, snr {} dB",
                rx.data.len(),
                rx.rssi_dbm,
                rx.snr_db
            ),
            Ok(None) => {}
            Err(e) => log::warn!("LoRa read failed: {}", e),
        }

        Timer::after(Duration::from_millis(100)).await;
    }
}
