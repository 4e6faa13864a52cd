//! Console Control Surface
//!
//! Single-key commands mapped onto the pipeline's parameter handles. Nothing
//! here touches audio; every action is an atomic store through
//! [`PipelineControls`].

use murmur_core::{EngineStats, PipelineControls};

/// EQ band gain change per key press
pub const BAND_GAIN_STEP: f32 = 0.1;

/// Gate threshold change per key press
pub const THRESHOLD_STEP: f32 = 0.01;

pub const HELP: &str = "\
Commands:
  g  toggle noise gate        e  toggle EQ
  d  toggle de-esser          l  toggle limiter
  1/z  low band  +/- 0.1      2/x  mid band  +/- 0.1
  3/c  high band +/- 0.1      t/T  gate threshold +/- 0.01
  s  status                   q  quit";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsoleCommand {
    ToggleGate,
    ToggleEq,
    ToggleDeEsser,
    ToggleLimiter,
    AdjustBand { band: usize, delta: f32 },
    AdjustThreshold(f32),
    Status,
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn from_key(key: char) -> Option<Self> {
        let command = match key {
            'g' => ConsoleCommand::ToggleGate,
            'e' => ConsoleCommand::ToggleEq,
            'd' => ConsoleCommand::ToggleDeEsser,
            'l' => ConsoleCommand::ToggleLimiter,
            '1' => ConsoleCommand::AdjustBand { band: 0, delta: BAND_GAIN_STEP },
            'z' => ConsoleCommand::AdjustBand { band: 0, delta: -BAND_GAIN_STEP },
            '2' => ConsoleCommand::AdjustBand { band: 1, delta: BAND_GAIN_STEP },
            'x' => ConsoleCommand::AdjustBand { band: 1, delta: -BAND_GAIN_STEP },
            '3' => ConsoleCommand::AdjustBand { band: 2, delta: BAND_GAIN_STEP },
            'c' => ConsoleCommand::AdjustBand { band: 2, delta: -BAND_GAIN_STEP },
            't' => ConsoleCommand::AdjustThreshold(THRESHOLD_STEP),
            'T' => ConsoleCommand::AdjustThreshold(-THRESHOLD_STEP),
            's' => ConsoleCommand::Status,
            'h' | '?' => ConsoleCommand::Help,
            'q' => ConsoleCommand::Quit,
            _ => return None,
        };
        Some(command)
    }

    /// Every recognised command in a line of input, in order
    pub fn parse_line(line: &str) -> Vec<Self> {
        line.chars().filter_map(Self::from_key).collect()
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

/// Apply a parameter command and describe the new state
///
/// `Status`, `Help` and `Quit` are handled by the caller and return `None`.
pub fn apply(command: ConsoleCommand, controls: &PipelineControls) -> Option<String> {
    let message = match command {
        ConsoleCommand::ToggleGate => {
            let enabled = !controls.gate.is_enabled();
            controls.gate.set_enabled(enabled);
            format!("Noise gate {}", on_off(enabled))
        }
        ConsoleCommand::ToggleEq => {
            let enabled = !controls.eq.is_enabled();
            controls.eq.set_enabled(enabled);
            format!("EQ {}", on_off(enabled))
        }
        ConsoleCommand::ToggleDeEsser => {
            let enabled = !controls.de_esser.is_enabled();
            controls.de_esser.set_enabled(enabled);
            format!("De-esser {}", on_off(enabled))
        }
        ConsoleCommand::ToggleLimiter => {
            let enabled = !controls.limiter.is_enabled();
            controls.limiter.set_enabled(enabled);
            format!("Limiter {}", on_off(enabled))
        }
        ConsoleCommand::AdjustBand { band, delta } => {
            let gain = controls.eq.band_gain(band)?;
            controls.eq.set_band_gain(band, gain + delta).ok()?;
            let gain = controls.eq.band_gain(band)?;
            format!("EQ band {} gain {:.2}", band + 1, gain)
        }
        ConsoleCommand::AdjustThreshold(delta) => {
            controls
                .gate
                .set_threshold(controls.gate.threshold() + delta);
            format!("Gate threshold {:.3}", controls.gate.threshold())
        }
        ConsoleCommand::Status | ConsoleCommand::Help | ConsoleCommand::Quit => return None,
    };
    Some(message)
}

/// One-line summary of every effect plus the engine meters
pub fn status_line(controls: &PipelineControls, stats: &EngineStats) -> String {
    let [low, mid, high] = controls.eq.gains();
    format!(
        "gate {} ({:.3}) | eq {} ({:.1}/{:.1}/{:.1}) | de-esser {} | limiter {} ({:.2}) | \
         in {:.2} out {:.2} | underruns {} overflows {} | {:.1} ms",
        on_off(controls.gate.is_enabled()),
        controls.gate.threshold(),
        on_off(controls.eq.is_enabled()),
        low,
        mid,
        high,
        on_off(controls.de_esser.is_enabled()),
        on_off(controls.limiter.is_enabled()),
        controls.limiter.threshold(),
        stats.meters.input_peak,
        stats.meters.output_peak,
        stats.meters.underruns,
        stats.meters.overflows,
        stats.latency_ms,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::{EffectChain, EffectSettings, StreamConfig};

    fn controls() -> PipelineControls {
        EffectChain::new(&StreamConfig::default(), &EffectSettings::default())
            .unwrap()
            .controls()
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(ConsoleCommand::from_key('g'), Some(ConsoleCommand::ToggleGate));
        assert_eq!(ConsoleCommand::from_key('q'), Some(ConsoleCommand::Quit));
        assert_eq!(
            ConsoleCommand::from_key('x'),
            Some(ConsoleCommand::AdjustBand { band: 1, delta: -BAND_GAIN_STEP })
        );
        assert_eq!(ConsoleCommand::from_key('k'), None);
    }

    #[test]
    fn test_parse_line_skips_unknown_keys() {
        let commands = ConsoleCommand::parse_line("g k s\n");
        assert_eq!(commands, vec![ConsoleCommand::ToggleGate, ConsoleCommand::Status]);
    }

    #[test]
    fn test_toggles() {
        let controls = controls();
        assert!(!controls.limiter.is_enabled());

        assert_eq!(
            apply(ConsoleCommand::ToggleLimiter, &controls).as_deref(),
            Some("Limiter on")
        );
        assert!(controls.limiter.is_enabled());

        apply(ConsoleCommand::ToggleLimiter, &controls);
        assert!(!controls.limiter.is_enabled());
    }

    #[test]
    fn test_band_gain_steps_and_clamps() {
        let controls = controls();
        apply(ConsoleCommand::from_key('1').unwrap(), &controls);
        assert!((controls.eq.band_gain(0).unwrap() - 1.1).abs() < 1e-6);

        for _ in 0..20 {
            apply(ConsoleCommand::from_key('c').unwrap(), &controls);
        }
        assert_eq!(controls.eq.band_gain(2), Some(0.0));
    }

    #[test]
    fn test_threshold_steps_and_clamps() {
        let controls = controls();
        let start = controls.gate.threshold();
        apply(ConsoleCommand::AdjustThreshold(THRESHOLD_STEP), &controls);
        assert!((controls.gate.threshold() - (start + THRESHOLD_STEP)).abs() < 1e-6);

        for _ in 0..20 {
            apply(ConsoleCommand::AdjustThreshold(-THRESHOLD_STEP), &controls);
        }
        assert_eq!(controls.gate.threshold(), 0.0);
    }

    #[test]
    fn test_status_line_mentions_every_effect() {
        let line = status_line(&controls(), &EngineStats::default());
        for name in ["gate", "eq", "de-esser", "limiter"] {
            assert!(line.contains(name), "{line}");
        }
        assert_eq!(apply(ConsoleCommand::Status, &controls()), None);
    }
}
