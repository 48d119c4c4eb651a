use async_trait::async_trait;
use malcore::{
    ActionHandler, ClientError, Config, ConditionHandler, ConditionResult, EffectClass, ExecutionContext, FieldPath,
    NodeConfig, NodeError, NodeRegistry, TriggerContext, TriggerHandler,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Trigger that accepts every event of its type, unless the node config
/// names a `campaignId` the payload does not carry.
pub struct StubTrigger(pub &'static str);

impl TriggerHandler for StubTrigger {
    fn subtype(&self) -> &str {
        self.0
    }

    fn matches(&self, config: &Config, event: &TriggerContext) -> Result<bool, NodeError> {
        let cfg = NodeConfig::new(self.0, config);
        Ok(match cfg.opt_id("campaignId")? {
            Some(expected) => event.payload.get("campaignId").and_then(Value::as_str) == Some(expected.as_str()),
            None => true,
        })
    }

    fn context_key(&self) -> &str {
        "stubContext"
    }

    fn enrich(&self, event: &TriggerContext) -> Value {
        json!({ "source": event.source })
    }
}

/// Condition whose outcome is the boolean at config `field`.
pub struct FlagCondition;

#[async_trait]
impl ConditionHandler for FlagCondition {
    fn subtype(&self) -> &str {
        "if_flag"
    }

    async fn evaluate(
        &self,
        config: &Config,
        input: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<ConditionResult, NodeError> {
        let field = NodeConfig::new(self.subtype(), config).path_or("field", "event.flag")?;
        let flag = field.resolve(input).and_then(Value::as_bool).unwrap_or(false);
        Ok(ConditionResult::new(flag, json!({ "flag": flag })))
    }
}

/// Action that counts its runs. Config `fail: true` makes it fail and
/// `sleepMs` makes it wait first, honouring cancellation.
pub struct CountingAction {
    subtype: &'static str,
    effect: EffectClass,
    runs: AtomicUsize,
}

impl CountingAction {
    pub fn new(subtype: &'static str, effect: EffectClass) -> Arc<Self> {
        Arc::new(Self {
            subtype,
            effect,
            runs: AtomicUsize::new(0),
        })
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionHandler for CountingAction {
    fn subtype(&self) -> &str {
        self.subtype
    }

    fn effect(&self) -> EffectClass {
        self.effect
    }

    async fn run(&self, config: &Config, input: &Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let cfg = NodeConfig::new(self.subtype, config);
        if let Some(ms) = cfg.opt_f64("sleepMs")? {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(ms as u64)) => {}
                _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
            }
        }
        if cfg.value("fail").and_then(Value::as_bool) == Some(true) {
            return Err(NodeError::action(
                self.subtype,
                "Stub failure",
                ClientError::Rejected("configured to fail".to_string()),
            ));
        }

        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = FieldPath::parse("previousNode.subtype")
            .ok()
            .and_then(|p| p.resolve(input).cloned());
        Ok(json!({ "run": run, "after": previous }))
    }
}

/// Registry with the stub handlers: trigger `test_event`, condition
/// `if_flag`, and actions `noop` (no effect), `write` (external write) and
/// `touch_contact` (contact write).
pub struct StubRegistry {
    pub registry: Arc<NodeRegistry>,
    pub noop: Arc<CountingAction>,
    pub write: Arc<CountingAction>,
    pub touch_contact: Arc<CountingAction>,
}

pub fn stub_registry() -> StubRegistry {
    let noop = CountingAction::new("noop", EffectClass::None);
    let write = CountingAction::new("write", EffectClass::ExternalWrite);
    let touch_contact = CountingAction::new("touch_contact", EffectClass::ContactWrite);

    let mut registry = NodeRegistry::new();
    registry.register_trigger(Arc::new(StubTrigger("test_event")));
    registry.register_trigger(Arc::new(StubTrigger("email_open")));
    registry.register_condition(Arc::new(FlagCondition));
    registry.register_action(noop.clone());
    registry.register_action(write.clone());
    registry.register_action(touch_contact.clone());

    StubRegistry {
        registry: Arc::new(registry),
        noop,
        write,
        touch_contact,
    }
}
