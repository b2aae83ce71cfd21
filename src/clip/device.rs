use clap::ValueEnum;
use std::fmt;

/// Requested compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DevicePreference {
    /// Use an accelerator when the inference backend has one, else the CPU.
    Auto,
    Cpu,
}

/// Device the model actually runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
}

impl DevicePreference {
    /// Picks the device for this process. tract executes on the CPU only, so
    /// `Auto` always falls back.
    pub fn resolve(self) -> Device {
        match self {
            DevicePreference::Auto => {
                tracing::info!("no accelerator backend available, falling back to cpu");
                Device::Cpu
            }
            DevicePreference::Cpu => Device::Cpu,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_falls_back_to_cpu() {
        assert_eq!(DevicePreference::Auto.resolve(), Device::Cpu);
        assert_eq!(DevicePreference::Cpu.resolve(), Device::Cpu);
        assert_eq!(Device::Cpu.to_string(), "cpu");
    }
}
