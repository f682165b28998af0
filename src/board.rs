/// mikroBUS socket wiring for supported boards.
///
/// Each board module defines the GPIO numbers behind the mikroBUS header,
/// selected at compile time via feature flags.

/// GPIO numbers of one mikroBUS socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MikroBus {
    pub an: u8,
    pub rst: u8,
    pub cs: u8,
    pub sck: u8,
    pub miso: u8,
    pub mosi: u8,
    pub pwm: u8,
    pub int: u8,
    pub rx: u8,
    pub tx: u8,
    pub scl: u8,
    pub sda: u8,
}

#[cfg(feature = "board-devkitc")]
mod hw {
    use super::MikroBus;

    // ESP32-S3-DevKitC-1 on a four-socket mikroBUS shield. I2C and SPI are
    // shared by sockets 1-3; sockets 1 and 3 share UART1.
    pub const SOCKET_1: MikroBus = MikroBus {
        an: 1,
        rst: 4,
        cs: 10,
        sck: 12,
        miso: 13,
        mosi: 11,
        pwm: 5,
        int: 6,
        rx: 18,
        tx: 17,
        scl: 9,
        sda: 8,
    };
    pub const SOCKET_2: MikroBus = MikroBus {
        an: 2,
        rst: 14,
        cs: 15,
        sck: 12,
        miso: 13,
        mosi: 11,
        pwm: 16,
        int: 7,
        rx: 39,
        tx: 40,
        scl: 9,
        sda: 8,
    };
    pub const SOCKET_3: MikroBus = MikroBus {
        an: 3,
        rst: 41,
        cs: 42,
        sck: 12,
        miso: 13,
        mosi: 11,
        pwm: 47,
        int: 48,
        rx: 18,
        tx: 17,
        scl: 9,
        sda: 8,
    };
    /// Socket 4 has its SPI lines on private GPIOs so bit-banged boards
    /// (Load Cell click) stay off the shared bus.
    pub const SOCKET_4: MikroBus = MikroBus {
        an: 35,
        rst: 36,
        cs: 37,
        sck: 38,
        miso: 21,
        mosi: 45,
        pwm: 46,
        int: 0,
        rx: 18,
        tx: 17,
        scl: 9,
        sda: 8,
    };
    pub const I2C_FREQ_KHZ: u32 = 100;
    pub const SPI_FREQ_MHZ: u32 = 8;
    pub const BOARD_NAME: &str = "esp32s3_devkitc_mikrobus";
}

#[cfg(not(feature = "board-devkitc"))]
mod hw {
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;
