pub mod aqi;
pub mod calibration;
pub mod file_formats;
pub mod reading;
pub mod settings;
