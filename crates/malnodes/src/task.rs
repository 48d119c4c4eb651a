use crate::missing_fields;
use crate::time::days_from_now;
use async_trait::async_trait;
use malcore::ports::TaskDraft;
use malcore::{ActionHandler, Config, EffectClass, ExecutionContext, NodeConfig, NodeError};
use serde_json::{json, Value};

/// Creates a task on the release named in the step input
pub struct CreateReleaseTaskAction;

#[async_trait]
impl ActionHandler for CreateReleaseTaskAction {
    fn subtype(&self) -> &str {
        "create_release_task"
    }

    fn description(&self) -> &str {
        "Create a task on a release plan"
    }

    fn effect(&self) -> EffectClass {
        EffectClass::ExternalWrite
    }

    fn validate_config(&self, config: &Config) -> Vec<String> {
        missing_fields(self.subtype(), config, &["title"])
    }

    async fn run(&self, config: &Config, input: &Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let cfg = NodeConfig::new(self.subtype(), config);
        let title = cfg.require_str("title")?;
        let description = cfg.opt_str("description")?.map(str::to_string);
        let due_date = cfg.opt_f64("dueDateDays")?.and_then(days_from_now);

        let release_field = cfg.path_or("releaseIdField", "event.releaseId")?;
        let release_id = release_field.resolve_id(input).ok_or_else(|| NodeError::MissingInput {
            subtype: self.subtype().to_string(),
            path: release_field.to_string(),
        })?;

        let task_id = ctx
            .clients
            .tasks
            .create_task(TaskDraft {
                release_id: release_id.clone(),
                title: title.to_string(),
                description,
                due_date,
            })
            .await
            .map_err(|e| NodeError::action(self.subtype(), "Failed to create release task", e))?;

        tracing::info!(%task_id, %release_id, "Created release task");
        Ok(json!({ "taskId": task_id, "releaseId": release_id, "title": title, "dueDate": due_date }))
    }
}
