//! Click board drivers: one module per board, chip-level and
//! board-independent. Only the mikroBUS wiring (in `board`) is
//! board-specific.

pub mod accel;
pub mod air_quality;
pub mod bluetooth;
pub mod expander;
pub mod fuel_gauge;
pub mod gesture;
pub mod imu;
pub mod load_cell;
pub mod lora;
pub mod oled;
pub mod range;
pub mod spectral;
pub mod uart_mux;

/// Three-axis sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Axes<T> {
    pub x: T,
    pub y: T,
    pub z: T,
}

impl<T: Copy> Axes<T> {
    pub fn map<U>(self, f: impl Fn(T) -> U) -> Axes<U> {
        Axes {
            x: f(self.x),
            y: f(self.y),
            z: f(self.z),
        }
    }

    pub fn to_array(self) -> [T; 3] {
        [self.x, self.y, self.z]
    }
}

/// Decode three little-endian `i16` values.
pub(crate) fn axes_from_le(buf: &[u8; 6]) -> Axes<i16> {
    Axes {
        x: i16::from_le_bytes([buf[0], buf[1]]),
        y: i16::from_le_bytes([buf[2], buf[3]]),
        z: i16::from_le_bytes([buf[4], buf[5]]),
    }
}

/// Poll `ready` up to `attempts` times, sleeping `step_us` between tries.
pub(crate) fn poll_until<E, D, F>(
    delay: &mut D,
    attempts: u32,
    step_us: u32,
    mut ready: F,
) -> Result<(), crate::Error<E>>
where
    D: embedded_hal::delay::DelayNs,
    F: FnMut() -> Result<bool, crate::Error<E>>,
{
    for _ in 0..attempts {
        if ready()? {
            return Ok(());
        }
        delay.delay_us(step_us);
    }
    Err(crate::Error::Timeout)
}
