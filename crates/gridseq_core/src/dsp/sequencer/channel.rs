use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

use crate::dsp::sequencer::cells::{CvStage, GATE_OUT_VOLTS, HoldMode, step_cell};
use crate::dsp::sequencer::expander::{ExpanderLink, ExpansionMessage};
use crate::types::{ExpanderFamily, ExpanderHost, ExpanderIdentity};

fn clamp_steps(raw: u32) -> usize {
    if raw <= 12 { 8 } else { 16 }
}

#[derive(Deserialize, JsonSchema, Connect)]
#[serde(default, rename_all = "camelCase")]
struct SeqChannelParams {
    /// module id of the left-hand sequencer or channel this module chains to
    source: String,
    /// channel slot this module responds on, 1-7; 0 selects its own chain slot
    channel: u8,
    /// step count, must match the chain master (8 or 16)
    steps: u32,
    /// per-step switch positions, 0 off / 1 gate / 2 trigger
    step_modes: Vec<u8>,
    /// per-step CV values in volts
    step_cvs: Vec<f32>,
    /// sample-and-hold mode, 0 off / 1 on-trigger / 2 on-gate
    hold_mode: u8,
    /// CV output multiplier
    range: f32,
}

impl Default for SeqChannelParams {
    fn default() -> Self {
        Self {
            source: String::new(),
            channel: 0,
            steps: 16,
            step_modes: Vec::new(),
            step_cvs: Vec::new(),
            hold_mode: 0,
            range: 1.0,
        }
    }
}

#[derive(Outputs, JsonSchema)]
struct SeqChannelOutputs {
    #[output("gate", "gate output", default)]
    gate: f32,
    #[output("gateInv", "inverted gate output")]
    gate_inv: f32,
    #[output("trig", "trigger output")]
    trig: f32,
    #[output("cv", "control voltage output")]
    cv: f32,
    #[output("cvInv", "inverted control voltage output")]
    cv_inv: f32,
    #[output("position", "shared chain position, 0 when parked or unchained")]
    position: f32,
    #[output("slot", "self-numbered chain slot, 0 when no master")]
    slot: f32,
}

/// Channel expander: consumes a chained sequencer's shared position and
/// produces its own gate/trigger/CV lane, active only on its channel slot.
#[derive(Module)]
#[module("seqChannel", "channel expander for a chained step sequencer")]
#[args(source, channel?)]
#[expanders]
pub struct SeqChannel {
    outputs: SeqChannelOutputs,
    params: SeqChannelParams,
    stage: CvStage,
    inbound: Option<Arc<ExpanderLink>>,
    outgoing: Option<Arc<ExpanderLink>>,
}

impl Default for SeqChannel {
    fn default() -> Self {
        Self {
            outputs: SeqChannelOutputs::default(),
            params: SeqChannelParams::default(),
            stage: CvStage::default(),
            inbound: None,
            outgoing: None,
        }
    }
}

impl SeqChannel {
    fn update(&mut self, sample_rate: f32) -> () {
        let dt = 1.0 / sample_rate;

        // No compatible left neighbor: neutral state, rest outputs.
        let inbound = self
            .inbound
            .as_ref()
            .map(|link| link.read())
            .unwrap_or_else(ExpansionMessage::neutral);

        // Self-number from the writer's slot, wrapping 7 back to 1. Only
        // meaningful when a master heads the chain.
        let slot = if inbound.has_master {
            if inbound.channel >= 7 { 1 } else { inbound.channel + 1 }
        } else {
            0
        };
        let effective = if self.params.channel == 0 {
            slot
        } else {
            self.params.channel.min(7)
        };
        let selected = inbound.has_master && slot != 0 && effective == slot;

        let active = selected && inbound.position >= 1;
        // The writer's own step flag, not a position comparison: a length-1
        // sequence re-steps onto the same position every clock.
        let stepped = active && inbound.stepped;

        let (mode, cell_cv) = if active {
            step_cell(
                &self.params.step_modes,
                &self.params.step_cvs,
                inbound.position as usize - 1,
            )
        } else {
            step_cell(&[], &[], 0)
        };

        let stage = self.stage.process(
            mode,
            cell_cv,
            active,
            stepped,
            HoldMode::from_param(self.params.hold_mode),
            self.params.range,
            dt,
        );

        self.outputs.gate = stage.gate;
        self.outputs.gate_inv = if stage.gate > 0.0 { 0.0 } else { GATE_OUT_VOLTS };
        self.outputs.trig = stage.trig;
        self.outputs.cv = stage.cv;
        self.outputs.cv_inv = stage.cv_inv;
        self.outputs.position = if selected { inbound.position as f32 } else { 0.0 };
        self.outputs.slot = slot as f32;

        if let Some(link) = &self.outgoing {
            link.publish(ExpansionMessage {
                position: inbound.position,
                length: inbound.length,
                stepped: inbound.stepped,
                clock_high: inbound.clock_high,
                running: inbound.running,
                channel: slot,
                has_master: inbound.has_master,
            });
        }
    }
}

impl ExpanderHost for SeqChannel {
    fn identity(&self) -> Option<ExpanderIdentity> {
        Some(ExpanderIdentity {
            family: ExpanderFamily::StepSeq,
            steps: clamp_steps(self.params.steps),
        })
    }

    fn bind_expanders(&mut self, id: &str, patch: &crate::Patch) {
        self.inbound = None;
        // A module cannot chain to itself; this also keeps the identity probe
        // below from re-entering our own lock.
        if self.params.source.is_empty() || self.params.source == id {
            return;
        }
        let Some(source) = patch.sampleables.get(&self.params.source) else {
            return;
        };
        // Chain only with a matching family and step count; the link is an
        // explicit capability check, never a type downcast.
        let compatible = match (source.expander_identity(), self.identity()) {
            (Some(theirs), Some(ours)) => ours.can_chain_with(&theirs),
            _ => false,
        };
        if compatible {
            self.inbound = Some(patch.expander_link(&self.params.source));
        }
    }

    fn resolve_expanders(&mut self, id: &str, patch: &crate::Patch) {
        self.outgoing = patch.outgoing_expander(id);
    }
}

message_handlers!(impl SeqChannel {});
