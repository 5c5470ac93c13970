use crate::config::{ChannelConfig, Conversion, InterlockConfig, SimulationParams};
use crate::history::Reading;
use crate::source::{ReadingSource, Sample, SourceError};

#[derive(Debug, Clone)]
struct SimulatedChannel {
    name: String,
    width: usize,
    params: SimulationParams,
    conversion: Conversion,
    value: f64,
}

impl SimulatedChannel {
    fn new(config: &ChannelConfig) -> Self {
        let params = config.simulation.unwrap_or_default();
        Self {
            name: config.name.clone(),
            width: config.width,
            params,
            conversion: config.conversion,
            value: params.ambient,
        }
    }

    fn step(&mut self, dt_s: f64, load_on: bool) {
        let target = if load_on {
            self.params.ambient + self.params.load_rise
        } else {
            self.params.ambient
        };
        let tau = self.params.time_constant_s.max(f64::EPSILON);
        self.value += (target - self.value) * (1.0 - (-dt_s / tau).exp());
    }

    /// Raw instrument values, so that applying the channel conversion
    /// yields the simulated physical value.
    fn raw(&self, elapsed_s: f64) -> Reading {
        let values = (0..self.width)
            .map(|input| {
                let ripple = 0.05 * (elapsed_s * 0.7 + input as f64).sin();
                let physical = self.value + 0.1 * input as f64 + ripple;
                let scale = if self.conversion.scale == 0.0 {
                    1.0
                } else {
                    self.conversion.scale
                };
                (physical - self.conversion.offset) / scale
            })
            .collect();
        Reading::new(values)
    }
}

/// Deterministic thermal model of a small bakeout: one load that
/// alternates between on and off, every channel relaxing toward its
/// ambient or loaded temperature.
#[derive(Debug, Clone)]
pub struct SimulatedLab {
    channels: Vec<SimulatedChannel>,
    load_on_s: f64,
    load_off_s: f64,
    elapsed_s: f64,
}

impl SimulatedLab {
    pub fn new(config: &InterlockConfig) -> Self {
        Self {
            channels: config.channels.iter().map(SimulatedChannel::new).collect(),
            load_on_s: 120.0,
            load_off_s: 60.0,
            elapsed_s: 0.0,
        }
    }

    /// Durations of the load's on and off phases. The cycle starts on.
    pub fn with_duty_cycle(mut self, on_s: f64, off_s: f64) -> Self {
        self.load_on_s = on_s.max(0.0);
        self.load_off_s = off_s.max(0.0);
        self
    }

    pub fn load_on(&self) -> bool {
        let period = self.load_on_s + self.load_off_s;
        if period <= 0.0 {
            return false;
        }
        self.elapsed_s % period < self.load_on_s
    }

    pub fn elapsed_s(&self) -> f64 {
        self.elapsed_s
    }
}

impl ReadingSource for SimulatedLab {
    fn sample(&mut self, dt_s: f64) -> Result<Vec<Sample>, SourceError> {
        let load_on = self.load_on();
        self.elapsed_s += dt_s;
        for channel in &mut self.channels {
            channel.step(dt_s, load_on);
        }
        Ok(self
            .channels
            .iter()
            .map(|c| Sample {
                channel: c.name.clone(),
                reading: c.raw(self.elapsed_s),
            })
            .collect())
    }

    fn is_healthy(&self) -> bool {
        self.channels.iter().all(|c| c.value.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heats_while_loaded_and_cools_after() {
        let config = InterlockConfig::default();
        let mut lab = SimulatedLab::new(&config).with_duty_cycle(10.0, 10.0);

        let mut heater = 0.0;
        for _ in 0..10 {
            let samples = lab.sample(1.0).unwrap();
            heater = samples[0].reading.get(0).unwrap();
        }
        assert!(heater > 5.0, "heater should be loaded, got {heater}");

        for _ in 0..10 {
            let samples = lab.sample(1.0).unwrap();
            heater = samples[0].reading.get(0).unwrap();
        }
        assert!(heater < 5.0, "heater should have cooled, got {heater}");
        assert_eq!(lab.elapsed_s(), 20.0);
        assert!(lab.is_healthy());
    }

    #[test]
    fn emits_raw_values_for_conversion() {
        let mut config = InterlockConfig::default();
        config.channels[1].conversion = Conversion {
            scale: 10.0,
            offset: 1.0,
        };
        config.channels[1].width = 2;
        let mut lab = SimulatedLab::new(&config).with_duty_cycle(0.0, 10.0);

        let samples = lab.sample(0.1).unwrap();
        let turbo = &samples[1];
        assert_eq!(turbo.channel, "Turbo");
        assert_eq!(turbo.reading.width(), 2);
        let physical = config.channels[1].conversion.apply(turbo.reading.get(0).unwrap());
        assert!((physical - 21.0).abs() < 0.1, "got {physical}");
    }
}
