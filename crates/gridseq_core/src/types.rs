use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::{
    collections::HashMap,
    sync::{self, Arc},
};

use crate::error::Result;
use crate::patch::Patch;

pub trait MessageHandler {
    fn handled_message_tags(&self) -> &'static [MessageTag] {
        &[]
    }

    fn handle_message(&self, _message: &Message) -> Result<()> {
        Ok(())
    }
}

/// Implemented by modules that persist a state blob across save/restore.
///
/// `load_state` must be tolerant: fields absent from the blob keep their
/// constructed defaults, and a blob that does not parse at all is ignored.
pub trait StatefulModule {
    fn get_state(&self) -> Option<serde_json::Value> {
        None
    }

    fn load_state(&mut self, _state: &serde_json::Value) {}
}

pub trait Sampleable: MessageHandler + Send + Sync {
    fn get_id(&self) -> &String;
    fn tick(&self) -> ();
    fn update(&self) -> ();
    /// Get the mono sample output for a port.
    fn get_sample(&self, port: &String) -> Result<f32>;
    fn get_module_type(&self) -> String;
    fn try_update_params(&self, params: serde_json::Value) -> Result<()>;
    fn connect(&self, patch: &Patch);
    /// Second wiring phase, called once every module is present in the patch.
    /// Producers resolve their outgoing expander links here.
    fn on_patch_update(&self, _patch: &Patch) {}
    fn expander_identity(&self) -> Option<ExpanderIdentity> {
        None
    }
    fn get_state(&self) -> Option<serde_json::Value> {
        None
    }
    fn load_state(&self, _state: serde_json::Value) -> Result<()> {
        Ok(())
    }
}

pub trait Module {
    fn install_constructor(map: &mut HashMap<String, SampleableConstructor>);
    fn get_schema() -> ModuleSchema;

    /// Register this module's parameter validator in the provided map.
    ///
    /// The key is the module type string (e.g. "stepSeq"). The value is a function
    /// that attempts to deserialize a JSON params object into the module's concrete
    /// `*Params` type.
    fn install_params_validator(map: &mut HashMap<String, ParamsValidator>);

    /// Validate a JSON params object by attempting to parse it as the module's concrete
    /// params type.
    ///
    /// This is intended for host-side patch validation before applying the patch.
    fn validate_params_json(params: &serde_json::Value) -> Result<()>;
}

/// Function pointer type used to validate a module's `ModuleState.params`.
///
/// The validator should return Ok if deserialization into the module's concrete params type succeeds.
pub type ParamsValidator = fn(&serde_json::Value) -> Result<()>;

pub type SampleableMap = HashMap<String, Arc<Box<dyn Sampleable>>>;

pub trait Connect {
    fn connect(&mut self, patch: &Patch);
}

#[derive(Clone, Debug, Default)]
pub enum Signal {
    /// Static voltage value
    Volts(f32),
    /// Cable connection to another module's output
    Cable {
        module: String,
        module_ptr: std::sync::Weak<Box<dyn Sampleable>>,
        port: String,
    },
    #[default]
    Disconnected,
}

// Custom serde deserialization to allow a bare number as shorthand for volts.
//
// Examples accepted:
// - 2.5                                               -> Signal::Volts(2.5)
// - {"type": "cable", "module": "m1", "port": "gate"} -> Signal::Cable
// - {"type": "disconnected"}                          -> Signal::Disconnected
impl<'de> Deserialize<'de> for Signal {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum SignalDe {
            Number(f64),
            Tagged(SignalTagged),
        }

        #[derive(Deserialize)]
        #[serde(
            tag = "type",
            rename_all = "camelCase",
            rename_all_fields = "camelCase"
        )]
        enum SignalTagged {
            Cable { module: String, port: String },
            Disconnected,
        }

        match SignalDe::deserialize(deserializer)? {
            SignalDe::Number(value) => Ok(Signal::Volts(value as f32)),
            SignalDe::Tagged(tagged) => Ok(match tagged {
                SignalTagged::Cable { module, port } => Signal::Cable {
                    module,
                    module_ptr: sync::Weak::new(),
                    port,
                },
                SignalTagged::Disconnected => Signal::Disconnected,
            }),
        }
    }
}

#[derive(JsonSchema)]
#[serde(untagged)]
#[allow(dead_code)]
enum SignalSchema {
    Number(f64),
    Tagged(SignalTaggedSchema),
}

#[derive(JsonSchema)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
#[allow(dead_code)]
enum SignalTaggedSchema {
    Cable { module: String, port: String },
    Disconnected,
}

impl JsonSchema for Signal {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("Signal")
    }

    fn json_schema(r#gen: &mut schemars::SchemaGenerator) -> schemars::Schema {
        SignalSchema::json_schema(r#gen)
    }
}

impl Signal {
    /// Get the current voltage. A dangling or disconnected cable reads 0 V.
    pub fn get_value(&self) -> f32 {
        match self {
            Signal::Volts(v) => *v,
            Signal::Cable {
                module_ptr, port, ..
            } => match module_ptr.upgrade() {
                Some(module_ptr) => module_ptr.get_sample(port).unwrap_or_default(),
                None => 0.0,
            },
            Signal::Disconnected => 0.0,
        }
    }

    /// Get the voltage with a fallback for disconnected (normalled) inputs.
    pub fn get_value_or(&self, default: f32) -> f32 {
        if self.is_disconnected() {
            default
        } else {
            self.get_value()
        }
    }

    /// Check if the signal is disconnected
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Signal::Disconnected)
    }
}

impl Connect for Signal {
    fn connect(&mut self, patch: &Patch) {
        match self {
            Signal::Cable {
                module,
                module_ptr,
                port: _,
            } => {
                if let Some(sampleable) = patch.sampleables.get(module) {
                    *module_ptr = Arc::downgrade(sampleable);
                }
            }
            _ => {}
        }
    }
}

impl PartialEq for Box<dyn Sampleable> {
    fn eq(&self, other: &Self) -> bool {
        self.get_id() == other.get_id()
    }
}

impl PartialEq for Signal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Signal::Volts(v1), Signal::Volts(v2)) => v1 == v2,
            (
                Signal::Cable {
                    module: module_1,
                    module_ptr: module_ptr_1,
                    port: port_1,
                },
                Signal::Cable {
                    module: module_2,
                    module_ptr: module_ptr_2,
                    port: port_2,
                },
            ) => {
                module_ptr_1.upgrade() == module_ptr_2.upgrade()
                    && port_1 == port_2
                    && module_1 == module_2
            }
            (Signal::Disconnected, Signal::Disconnected) => true,
            _ => false,
        }
    }
}

// ─── Expander link identity ──────────────────────────────────────────────────

/// Which sequencer family a module chains with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpanderFamily {
    StepSeq,
    GateSeq,
}

/// Capability tag advertised by modules that participate in the expansion
/// link protocol. Compatibility is an explicit check against this tag, not
/// runtime type inspection: modules chain only within the same family and
/// with matching step counts (8 with 8, 16 with 16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpanderIdentity {
    pub family: ExpanderFamily,
    pub steps: usize,
}

impl ExpanderIdentity {
    pub fn can_chain_with(&self, producer: &ExpanderIdentity) -> bool {
        self.family == producer.family && self.steps == producer.steps
    }
}

/// Implemented by modules that produce or consume expansion messages.
///
/// `bind_expanders` runs during cable wiring (consumers request links to
/// their named source); `resolve_expanders` runs in the second wiring phase
/// (producers look up the link their consumer created, if any).
pub trait ExpanderHost {
    fn identity(&self) -> Option<ExpanderIdentity> {
        None
    }

    fn bind_expanders(&mut self, _id: &str, _patch: &Patch) {}

    fn resolve_expanders(&mut self, _id: &str, _patch: &Patch) {}
}

// ─── Schemas ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSchema {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
}

pub trait OutputStruct: Default + Send + Sync + 'static {
    fn copy_from(&mut self, other: &Self);
    /// Get the mono sample output for a port.
    fn get_sample(&self, port: &str) -> Option<f32>;
    fn schemas() -> Vec<OutputSchema>
    where
        Self: Sized;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaContainer {
    pub schema: schemars::Schema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionalArg {
    pub name: String,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSchema {
    pub name: String,
    pub description: String,
    pub params_schema: SchemaContainer,
    pub outputs: Vec<OutputSchema>,
    pub positional_args: Vec<PositionalArg>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleState {
    pub id: String,
    pub module_type: String,
    pub id_is_explicit: Option<bool>,
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchGraph {
    pub modules: Vec<ModuleState>,
}

pub type SampleableConstructor = Box<dyn Fn(&String, f32) -> Result<Arc<Box<dyn Sampleable>>>>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClockMessages {
    Start,
    Stop,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumTag, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Message {
    Clock(ClockMessages),
}
