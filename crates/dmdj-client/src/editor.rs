//! Voice effect editor: a draft preset the operator tweaks, plays as a
//! custom effect and saves under a name.

use dmdj_proto::effect::{EffectParams, VoiceEffects};
use dmdj_proto::protocol::{Channel, EFFECT_OFF};
use tracing::{info, warn};

use crate::error::Result;
use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub name: String,
    pub params: EffectParams,
}

pub struct VoiceEditor {
    orchestrator: Orchestrator,
    draft: Draft,
    selected: String,
}

impl VoiceEditor {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            draft: Draft::default(),
            selected: String::new(),
        }
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn selected(&self) -> &str {
        &self.selected
    }

    pub fn set_name(&mut self, name: &str) {
        self.draft.name = name.to_string();
    }

    /// Set one knob (clamped).  Returns the stored value, `None` for an
    /// unknown knob.
    pub fn set_param(&mut self, key: &str, value: f64) -> Option<f64> {
        self.draft.params.set(key, value)
    }

    /// Pick a base preset.  `""` clears the draft, `"off"` clears it and
    /// silences the modulator, a known name loads its values.
    pub async fn select_preset(&mut self, name: &str, presets: &VoiceEffects) -> Result<()> {
        if name.is_empty() {
            self.selected.clear();
            self.draft = Draft::default();
            return Ok(());
        }

        if name == EFFECT_OFF {
            self.selected = name.to_string();
            self.draft = Draft::default();
            self.orchestrator
                .set_custom_effect(&EffectParams::default())
                .await?;
            return Ok(());
        }

        match presets.get(name) {
            Some(params) => {
                self.selected = name.to_string();
                self.draft = Draft {
                    name: name.to_string(),
                    params: *params,
                };
            }
            None => warn!("editor: unknown preset {:?}", name),
        }
        Ok(())
    }

    /// Send the draft's knobs as the live custom effect.
    pub async fn play(&self) -> Result<()> {
        self.orchestrator.set_custom_effect(&self.draft.params).await?;
        Ok(())
    }

    /// Save the current custom effect under the draft name, then re-list
    /// presets.  A blank name is ignored (`Ok(false)`).
    pub async fn save(&mut self) -> Result<bool> {
        let name = self.draft.name.trim().to_string();
        if name.is_empty() {
            return Ok(false);
        }
        self.orchestrator.save_voice_effect(&name).await?;
        self.orchestrator.refresh(Channel::Modulator).await?;
        info!("editor: saved preset {:?}", name);
        self.selected = name;
        Ok(true)
    }

    pub async fn delete(&mut self, name: &str) -> Result<()> {
        self.orchestrator.delete_voice_effect(name).await?;
        self.orchestrator.refresh(Channel::Modulator).await?;
        if self.selected == name {
            self.selected.clear();
        }
        info!("editor: deleted preset {:?}", name);
        Ok(())
    }
}
