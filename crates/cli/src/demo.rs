//! The three classification-service lifecycles, as one graph.
//!
//! - inspect template: create → inspect content with it → delete
//! - stored info type: create → update → delete
//! - job trigger: create → update (daily → every two days) → delete
//!
//! The chains share no edges, so a failure in one never skips another.

use engine::{EngineError, Graph, Step, ValueRef};
use serde_json::{json, Value};

const TEMPLATE_ID: &str = "dlp-inspect-838746";
const CUSTOM_INFO_TYPE_ID: &str = "custom_info_type";
const TRIGGER_ID: &str = "example_trigger";

const DAY_SECS: u64 = 60 * 60 * 24;

fn inspect_config() -> Value {
    json!({
        "info_types": [{ "name": "PHONE_NUMBER" }, { "name": "US_TOLLFREE_PHONE_NUMBER" }]
    })
}

fn job_trigger(recurrence_secs: u64) -> Value {
    json!({
        "inspect_job": { "inspect_config": inspect_config() },
        "triggers": [{ "schedule": { "recurrence_period_duration": { "seconds": recurrence_secs } } }],
        "status": "HEALTHY"
    })
}

fn custom_info_types(pattern: &str) -> Value {
    json!([{ "info_type": { "name": "C_MRN" }, "regex": { "pattern": pattern } }])
}

pub fn example_graph(project_id: &str) -> Result<Graph, EngineError> {
    let project = Value::String(project_id.to_owned());
    let mut graph = Graph::new();

    // Inspect template.
    graph.add_step(
        Step::create("create_template", "inspect_template")
            .param("id", TEMPLATE_ID)
            .param("project_id", project.clone())
            .param("inspect_config", inspect_config()),
    )?;
    graph.add_step(
        Step::create("inspect_content", "content_inspection")
            .param("project_id", project.clone())
            .param("inspect_template_name", ValueRef::new("create_template", "name"))
            .param(
                "item",
                json!({
                    "table": {
                        "headers": [{ "name": "column1" }],
                        "rows": [{ "values": [{ "string_value": "My phone number is (206) 555-0123" }] }]
                    }
                }),
            )
            .after("create_template"),
    )?;
    graph.add_step(
        Step::delete("delete_template", "inspect_template", TEMPLATE_ID).after("inspect_content"),
    )?;

    // Stored info type.
    graph.add_step(
        Step::create("create_info_type", "stored_info_type")
            .param("id", CUSTOM_INFO_TYPE_ID)
            .param("project_id", project.clone())
            .param("config", custom_info_types("[1-9]{3}-[1-9]{1}-[1-9]{5}")),
    )?;
    graph.add_step(
        Step::update("update_info_type", "stored_info_type", CUSTOM_INFO_TYPE_ID)
            .param("config", custom_info_types("[a-z]{3}-[a-z]{1}-[a-z]{5}"))
            .after("create_info_type"),
    )?;
    graph.add_step(
        Step::delete("delete_info_type", "stored_info_type", CUSTOM_INFO_TYPE_ID).after("update_info_type"),
    )?;

    // Job trigger.
    graph.add_step(
        Step::create("create_trigger", "job_trigger")
            .param("id", TRIGGER_ID)
            .param("project_id", project)
            .param("job_trigger", job_trigger(DAY_SECS)),
    )?;
    graph.add_step(
        Step::update("update_trigger", "job_trigger", TRIGGER_ID)
            .param("job_trigger", job_trigger(2 * DAY_SECS))
            .after("create_trigger"),
    )?;
    graph.add_step(
        Step::delete("delete_trigger", "job_trigger", TRIGGER_ID).after("update_trigger"),
    )?;

    Ok(graph)
}
