use anyhow::Result;
use hark::collaborators::ValidationCollaborator;
use hark::config::HarkConfig;
use hark::triggers::{
    ActionOutcome, TriggerAction, TriggerDefinition, TriggerExecutor, TriggerPipeline,
    TriggerRegistry, ValidationOutcome,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Keyword scorer used when no external validation backend is wired up:
/// a candidate whose keyword appears in the context passes with a fixed
/// confidence.
struct EchoScorer;

impl ValidationCollaborator for EchoScorer {
    fn validate(
        &self,
        trigger: &TriggerDefinition,
        context: &str,
    ) -> hark::Result<ValidationOutcome> {
        let lower = context.to_lowercase();
        if trigger.keywords().iter().any(|k| lower.contains(k)) {
            Ok(ValidationOutcome {
                triggered: true,
                confidence: 0.9,
                reason: "keyword present in context".into(),
            })
        } else {
            Ok(ValidationOutcome::not_triggered("keyword absent"))
        }
    }
}

struct PrintAction;

impl TriggerAction for PrintAction {
    fn execute(
        &self,
        outcome: &ValidationOutcome,
        transcript: &str,
    ) -> hark::Result<Option<ActionOutcome>> {
        info!(
            "Action fired on '{}' (confidence {:.2})",
            transcript, outcome.confidence
        );
        Ok(None)
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hark=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting hark trigger pipeline demo");

    let config = HarkConfig::default();
    config.validate()?;

    let registry = Arc::new(TriggerRegistry::new());
    registry.register(TriggerDefinition::new("assistant", vec!["hey bot".into()]).with_priority(95));
    registry.register(TriggerDefinition::new("search", vec!["search".into()]));

    let executor = Arc::new(TriggerExecutor::new(None));
    executor.register_action("assistant", Arc::new(PrintAction));
    executor.register_action("search", Arc::new(PrintAction));

    let pipeline = TriggerPipeline::new(
        config.pipeline.clone(),
        registry,
        Arc::new(EchoScorer),
        Arc::clone(&executor),
    );
    pipeline.start();

    pipeline.process_transcript("just talking to myself");
    pipeline.process_transcript("hey bot, search for cats");
    thread::sleep(Duration::from_secs(1));

    let stats = pipeline.stats();
    info!(
        "Processed {} transcript(s), {} matched, {} executed",
        stats.processed, stats.matched, stats.executed
    );

    pipeline.shutdown();
    Ok(())
}
