//! Voice-modulator parameter sets.
//!
//! A preset is thirteen numeric knobs.  The server lists presets as a
//! `name → parameters` object; a custom effect is sent as one query pair
//! per knob.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Range and step of one knob.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ParamSpec {
    const fn new(key: &'static str, label: &'static str, min: f64, max: f64, step: f64) -> Self {
        Self { key, label, min, max, step }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// All knobs, in display and query order.
pub const PARAMS: [ParamSpec; 13] = [
    ParamSpec::new("gain", "Gain", 0.0, 10.0, 0.01),
    ParamSpec::new("drive", "Drive", 0.0, 1.0, 0.01),
    ParamSpec::new("tone", "Tone", 0.0, 1.0, 0.01),
    ParamSpec::new("mix", "Mix", 0.0, 1.0, 0.01),
    ParamSpec::new("pitch", "Pitch", -36.0, 36.0, 1.0),
    ParamSpec::new("chorus", "Chorus", 0.0, 1.0, 0.01),
    ParamSpec::new("delay", "Delay (ms)", 0.0, 500.0, 1.0),
    ParamSpec::new("reverb", "Reverb", 0.0, 1.0, 0.01),
    ParamSpec::new("ring_mod", "Ring Mod (Hz)", 0.0, 2000.0, 1.0),
    ParamSpec::new("bitcrusher", "Bitcrusher", 0.0, 1.0, 0.01),
    ParamSpec::new("low_pass", "Low Pass (Hz)", 0.0, 20000.0, 10.0),
    ParamSpec::new("high_pass", "High Pass (Hz)", 0.0, 20000.0, 10.0),
    ParamSpec::new("tremolo", "Tremolo (Hz)", 0.0, 20.0, 0.1),
];

pub fn param_spec(key: &str) -> Option<&'static ParamSpec> {
    PARAMS.iter().find(|p| p.key == key)
}

/// One voice effect.  Missing fields in a server preset default to zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectParams {
    pub gain: f64,
    pub drive: f64,
    pub tone: f64,
    pub mix: f64,
    pub pitch: f64,
    pub chorus: f64,
    pub delay: f64,
    pub reverb: f64,
    pub ring_mod: f64,
    pub bitcrusher: f64,
    pub low_pass: f64,
    pub high_pass: f64,
    pub tremolo: f64,
}

impl EffectParams {
    fn slot(&mut self, key: &str) -> Option<&mut f64> {
        Some(match key {
            "gain" => &mut self.gain,
            "drive" => &mut self.drive,
            "tone" => &mut self.tone,
            "mix" => &mut self.mix,
            "pitch" => &mut self.pitch,
            "chorus" => &mut self.chorus,
            "delay" => &mut self.delay,
            "reverb" => &mut self.reverb,
            "ring_mod" => &mut self.ring_mod,
            "bitcrusher" => &mut self.bitcrusher,
            "low_pass" => &mut self.low_pass,
            "high_pass" => &mut self.high_pass,
            "tremolo" => &mut self.tremolo,
            _ => return None,
        })
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        let mut copy = *self;
        copy.slot(key).map(|v| *v)
    }

    /// Set a knob, clamped into its range.  Returns the stored value, or
    /// `None` for an unknown key.
    pub fn set(&mut self, key: &str, value: f64) -> Option<f64> {
        let spec = param_spec(key)?;
        let clamped = spec.clamp(value);
        *self.slot(key)? = clamped;
        Some(clamped)
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        PARAMS
            .iter()
            .map(|p| (p.key, self.get(p.key).unwrap_or_default().to_string()))
            .collect()
    }
}

/// Saved presets in the order the server lists them.  Names are unique;
/// inserting a known name replaces its parameters in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceEffects(Vec<(String, EffectParams)>);

impl VoiceEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&EffectParams> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    pub fn insert(&mut self, name: String, params: EffectParams) {
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = params,
            None => self.0.push((name, params)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<EffectParams> {
        let idx = self.0.iter().position(|(n, _)| n == name)?;
        Some(self.0.remove(idx).1)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EffectParams)> {
        self.0.iter().map(|(n, p)| (n.as_str(), p))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, EffectParams)> for VoiceEffects {
    fn from_iter<I: IntoIterator<Item = (String, EffectParams)>>(iter: I) -> Self {
        let mut effects = VoiceEffects::new();
        for (name, params) in iter {
            effects.insert(name, params);
        }
        effects
    }
}

impl<'de> Deserialize<'de> for VoiceEffects {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PresetsVisitor;

        impl<'de> Visitor<'de> for PresetsVisitor {
            type Value = VoiceEffects;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of preset names to effect parameters")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<VoiceEffects, A::Error> {
                let mut effects = VoiceEffects::new();
                while let Some((name, params)) = map.next_entry::<String, EffectParams>()? {
                    effects.insert(name, params);
                }
                Ok(effects)
            }
        }

        deserializer.deserialize_map(PresetsVisitor)
    }
}

/// Body of `GET /modulator`.  Older servers only list names.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum VoiceListing {
    Presets(VoiceEffects),
    Names(Vec<String>),
}

impl VoiceListing {
    pub fn into_effects(self) -> VoiceEffects {
        match self {
            VoiceListing::Presets(p) => p,
            VoiceListing::Names(names) => names
                .into_iter()
                .map(|n| (n, EffectParams::default()))
                .collect(),
        }
    }
}
