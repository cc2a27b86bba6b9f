//! Winner selection and action execution
//!
//! Among validated candidates exactly one action runs: highest priority,
//! then highest confidence, ties broken by registration order. Actions are
//! looked up by trigger name in a closed registry and may ask for speech or
//! a mode switch as side effects.

use crate::collaborators::{SpeechSynthesizer, VoiceSettings};
use crate::coordinator::ModeControl;
use crate::triggers::{TriggerDefinition, ValidationOutcome, ValidationRequest};
use crate::Result;
use parking_lot::RwLock;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Side effects requested by an executed action
#[derive(Clone, Debug, Default)]
pub struct ActionOutcome {
    /// Response text, spoken when `speak` is set
    pub text: Option<String>,

    pub speak: bool,

    pub voice_settings: VoiceSettings,

    pub mode_request: Option<ModeRequest>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeRequest {
    StartAssistant,
    EndAssistant,
}

/// The executable half of a trigger, keyed by the definition's name
pub trait TriggerAction: Send + Sync {
    fn execute(
        &self,
        outcome: &ValidationOutcome,
        transcript: &str,
    ) -> Result<Option<ActionOutcome>>;
}

/// Pick the winning candidate among validated results
///
/// Only `triggered=true` results are considered; order is priority desc,
/// confidence desc, then registration order.
pub fn select_winner(
    results: &[(Arc<TriggerDefinition>, ValidationOutcome)],
) -> Option<&(Arc<TriggerDefinition>, ValidationOutcome)> {
    results
        .iter()
        .filter(|(_, outcome)| outcome.triggered)
        .max_by(|(ta, oa), (tb, ob)| {
            ta.priority()
                .cmp(&tb.priority())
                .then(oa.confidence.total_cmp(&ob.confidence))
                .then_with(|| {
                    // Earlier registration outranks later on a full tie
                    match ta.registration_index().cmp(&tb.registration_index()) {
                        CmpOrdering::Less => CmpOrdering::Greater,
                        CmpOrdering::Greater => CmpOrdering::Less,
                        CmpOrdering::Equal => CmpOrdering::Equal,
                    }
                })
        })
}

/// Runs the winning action and dispatches its side effects
pub struct TriggerExecutor {
    actions: RwLock<HashMap<String, Arc<dyn TriggerAction>>>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    mode_control: RwLock<Option<Arc<dyn ModeControl>>>,
    executed: AtomicU64,
}

impl TriggerExecutor {
    pub fn new(synthesizer: Option<Arc<dyn SpeechSynthesizer>>) -> Self {
        Self {
            actions: RwLock::new(HashMap::new()),
            synthesizer,
            mode_control: RwLock::new(None),
            executed: AtomicU64::new(0),
        }
    }

    /// Wire the mode-switch capability; done after construction because the
    /// coordinator and pipeline are built independently
    pub fn set_mode_control(&self, control: Arc<dyn ModeControl>) {
        *self.mode_control.write() = Some(control);
    }

    pub fn register_action(&self, trigger_name: impl Into<String>, action: Arc<dyn TriggerAction>) {
        self.actions.write().insert(trigger_name.into(), action);
    }

    pub fn executed_count(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Execute the winner for this request; the single-fire flag on the
    /// request makes duplicate completion paths harmless
    pub fn execute(
        &self,
        request: &ValidationRequest,
        trigger: &Arc<TriggerDefinition>,
        outcome: &ValidationOutcome,
    ) {
        if !request.try_fire() {
            debug!("Request {} already executed, skipping", request.id);
            return;
        }

        let action = self.actions.read().get(trigger.name()).cloned();
        let Some(action) = action else {
            warn!("No action registered for trigger '{}'", trigger.name());
            return;
        };

        info!(
            "Executing trigger '{}' (priority {}, confidence {:.2})",
            trigger.name(),
            trigger.priority(),
            outcome.confidence
        );

        match action.execute(outcome, &request.text) {
            Ok(Some(result)) => {
                self.executed.fetch_add(1, Ordering::Relaxed);
                self.dispatch_side_effects(trigger.name(), result);
            }
            Ok(None) => {
                self.executed.fetch_add(1, Ordering::Relaxed);
                debug!("Trigger '{}' produced no response", trigger.name());
            }
            Err(e) => {
                // Action failures never take down the worker loop
                error!("Failed to execute trigger '{}': {}", trigger.name(), e);
            }
        }
    }

    fn dispatch_side_effects(&self, trigger_name: &str, result: ActionOutcome) {
        if let Some(mode_request) = result.mode_request {
            let control = self.mode_control.read().clone();
            match control {
                Some(control) => {
                    let ok = match mode_request {
                        ModeRequest::StartAssistant => control.start_assistant(),
                        ModeRequest::EndAssistant => control.end_assistant(),
                    };
                    if !ok {
                        warn!(
                            "Mode request {:?} from '{}' was rejected",
                            mode_request, trigger_name
                        );
                    }
                }
                None => warn!(
                    "Trigger '{}' requested a mode switch but no mode control is wired",
                    trigger_name
                ),
            }
        }

        if result.speak {
            if let Some(text) = result.text.as_deref().filter(|t| !t.is_empty()) {
                match &self.synthesizer {
                    Some(synthesizer) => {
                        if let Err(e) = synthesizer.speak(text, &result.voice_settings) {
                            error!("Speech synthesis failed: {}", e);
                        }
                    }
                    None => debug!("Speech requested but no synthesizer configured"),
                }
            }
        }
    }
}
