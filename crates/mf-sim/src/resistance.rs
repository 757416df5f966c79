//! Hydraulic resistance models.

use mf_chip::Channel;

/// Which resistance model to use for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResistanceModelKind {
    /// Rectangular-cross-section Hagen-Poiseuille approximation.
    #[default]
    Rectangular,
    /// Simplified volume-proportional model used by tests.
    Test,
}

/// Maps channel geometry and droplet occupancy to scalar resistances.
pub trait ResistanceModel {
    /// Static resistance of the droplet-free channel in Pa s/m^3.
    fn channel_resistance(&self, channel: &Channel) -> f64;

    /// Resistance contribution of a droplet segment of the given volume
    /// (m^3) inside the channel, in Pa s/m^3.
    fn droplet_resistance(&self, channel: &Channel, volume_inside: f64) -> f64;
}

/// 1D Hagen-Poiseuille model for rigid rectangular channels.
///
/// R_c = L * a * mu / (w * h^3) with the aspect-ratio factor
/// a = 12 / (1 - 192 * h * tanh(pi*w/(2h)) / (pi^5 * w)).
#[derive(Debug, Clone, Copy)]
pub struct RectangularModel {
    continuous_phase_viscosity: f64,
}

impl RectangularModel {
    /// `continuous_phase_viscosity` in Pa s.
    pub fn new(continuous_phase_viscosity: f64) -> Self {
        Self {
            continuous_phase_viscosity,
        }
    }

    fn factor_a(width: f64, height: f64) -> f64 {
        12.0
            / (1.0
                - 192.0 * height * (std::f64::consts::PI * width / (2.0 * height)).tanh()
                    / (std::f64::consts::PI.powi(5) * width))
    }
}

impl ResistanceModel for RectangularModel {
    fn channel_resistance(&self, channel: &Channel) -> f64 {
        let a = Self::factor_a(channel.width(), channel.height());
        channel.length() * a * self.continuous_phase_viscosity
            / (channel.width() * channel.height().powi(3))
    }

    fn droplet_resistance(&self, channel: &Channel, volume_inside: f64) -> f64 {
        let a = Self::factor_a(channel.width(), channel.height());
        let droplet_length = volume_inside / channel.area();
        3.0 * droplet_length * a * self.continuous_phase_viscosity
            / (channel.width() * channel.height().powi(3))
    }
}

/// Volume-proportional stand-in exposed behind the same interface for
/// algorithm tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestModel;

impl ResistanceModel for TestModel {
    fn channel_resistance(&self, channel: &Channel) -> f64 {
        channel.volume()
    }

    fn droplet_resistance(&self, channel: &Channel, volume_inside: f64) -> f64 {
        3.0 * channel.width() * channel.height() * volume_inside
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_chip::ChannelKind;

    fn reference_channel() -> Channel {
        Channel::new(0, 0, 1, 30e-6, 100e-6, 1e-3, ChannelKind::Normal)
    }

    #[test]
    fn rectangular_channel_resistance_closed_form() {
        // w=100um, h=30um, L=1mm, mu=1mPa s
        let model = RectangularModel::new(1e-3);
        let resistance = model.channel_resistance(&reference_channel());
        let expected = 5474886696634.322;
        assert!((resistance - expected).abs() / expected < 1e-9);
    }

    #[test]
    fn rectangular_factor_a_value() {
        let a = RectangularModel::factor_a(100e-6, 30e-6);
        assert!((a - 14.78219408091267).abs() < 1e-9);
    }

    #[test]
    fn rectangular_droplet_resistance_scales_with_volume() {
        let model = RectangularModel::new(1e-3);
        let channel = reference_channel();
        // a droplet filling 15% of the channel adds 45% of R_c
        let volume = 0.15 * channel.volume();
        let ratio = model.droplet_resistance(&channel, volume) / model.channel_resistance(&channel);
        assert!((ratio - 0.45).abs() < 1e-12);
        // and twice the volume adds twice the resistance
        let double = model.droplet_resistance(&channel, 2.0 * volume);
        assert!((double - 2.0 * model.droplet_resistance(&channel, volume)).abs() < 1e-3);
    }

    #[test]
    fn test_model_uses_channel_volume() {
        let channel = reference_channel();
        let model = TestModel;
        assert_eq!(model.channel_resistance(&channel), channel.volume());
        let v = 1e-13;
        assert_eq!(
            model.droplet_resistance(&channel, v),
            3.0 * channel.width() * channel.height() * v
        );
    }
}
