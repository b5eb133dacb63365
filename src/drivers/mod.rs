//! Level-triggered peripheral drivers.
//!
//! Everything here is pure polled logic against the `hal` port traits;
//! the real-time subsystems (IR, servo) live in their own modules.

pub mod button;
pub mod debounce;
pub mod joystick;
pub mod led;
pub mod light;
pub mod motor;
pub mod sound;
pub mod tape;

pub use button::Button;
pub use joystick::Joystick;
pub use led::Led;
pub use light::LightSensor;
pub use motor::Motor;
pub use sound::SoundSensor;
pub use tape::TapeSensor;
